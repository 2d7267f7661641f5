use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use tracing::{info, warn};

use transit_schedule_model::{DatasetVersion, VersionId};

use crate::archive::ArchiveContents;
use crate::error::ImportError;
use crate::feed::{
    AGENCY_FILE, CALENDAR_DATES_FILE, REQUIRED_FILES, ROUTES_FILE, STOPS_FILE, STOP_TIMES_FILE,
    TRIPS_FILE,
};
use crate::loaders::{
    load_agencies, load_calendar_dates, load_routes, load_stop_times, load_stops, load_trips,
    EntityLoadSummary, LoadedTable,
};
use crate::notice::{ImportNotice, NoticeContainer};
use crate::progress::ImportProgress;
use crate::records::HeaderError;
use crate::store::{Dataset, DatasetParts, DEFAULT_BATCH_SIZE};
use crate::version::VersionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub batch_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ImportOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub version: DatasetVersion,
    pub entities: Vec<EntityLoadSummary>,
    pub notices: Vec<ImportNotice>,
    pub suppressed_notices: usize,
}

impl ImportReport {
    pub fn loaded(&self, file: &str) -> usize {
        self.summary(file).map_or(0, |summary| summary.loaded)
    }

    pub fn skipped(&self, file: &str) -> usize {
        self.summary(file).map_or(0, |summary| summary.skipped)
    }

    fn summary(&self, file: &str) -> Option<&EntityLoadSummary> {
        self.entities.iter().find(|summary| summary.file == file)
    }
}

struct LoadedParts {
    parts: DatasetParts,
    summaries: Vec<EntityLoadSummary>,
    notices: NoticeContainer,
}

pub fn import_archive(
    manager: &VersionManager,
    bytes: &[u8],
    filename: &str,
    uploader_id: i64,
    options: ImportOptions,
    progress: &dyn ImportProgress,
) -> Result<ImportReport, ImportError> {
    let contents = ArchiveContents::from_zip_bytes(bytes)?;
    import_contents(manager, &contents, filename, uploader_id, options, progress)
}

/// Loads already extracted tables as a new version and activates it.
///
/// Missing files fail before any version is created. Any later failure
/// discards the new version and leaves the active one untouched.
pub fn import_contents(
    manager: &VersionManager,
    contents: &ArchiveContents,
    filename: &str,
    uploader_id: i64,
    options: ImportOptions,
    progress: &dyn ImportProgress,
) -> Result<ImportReport, ImportError> {
    contents.check_required(REQUIRED_FILES)?;

    let slot = manager.begin_import();
    let version = manager.create_version(filename, uploader_id);
    info!(
        version = %version.id,
        filename,
        uploader = uploader_id,
        "import started"
    );

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        load_all(contents, version.id, options.batch_size, progress)
    }));
    let loaded = match outcome {
        Ok(Ok(loaded)) => loaded,
        Ok(Err(err)) => {
            warn!(version = %version.id, error = %err, "import failed");
            manager.discard(version.id);
            return Err(err.into());
        }
        Err(panic) => {
            let message = panic_payload_message(&*panic);
            warn!(version = %version.id, %message, "loader panicked");
            manager.discard(version.id);
            return Err(ImportError::LoaderPanic { message });
        }
    };

    let dataset = Dataset::assemble(version.id, loaded.parts);
    let version = manager.commit(slot, dataset)?;
    info!(
        version = %version.id,
        notices = loaded.notices.len(),
        suppressed = loaded.notices.suppressed(),
        "import finished"
    );

    let suppressed_notices = loaded.notices.suppressed();
    Ok(ImportReport {
        version,
        entities: loaded.summaries,
        notices: loaded.notices.into_vec(),
        suppressed_notices,
    })
}

fn load_all(
    contents: &ArchiveContents,
    version: VersionId,
    batch_size: usize,
    progress: &dyn ImportProgress,
) -> Result<LoadedParts, HeaderError> {
    progress.set_total_files(REQUIRED_FILES.len());
    let text = |file: &str| contents.get(file).unwrap_or_default();

    let (agencies, stops) = join(
        || {
            tracked(progress, AGENCY_FILE, || {
                load_agencies(text(AGENCY_FILE), version, batch_size)
            })
        },
        || {
            tracked(progress, STOPS_FILE, || {
                load_stops(text(STOPS_FILE), version, batch_size)
            })
        },
    );
    let (agencies, stops) = (agencies?, stops?);

    let routes = tracked(progress, ROUTES_FILE, || {
        load_routes(text(ROUTES_FILE), version, batch_size, &agencies.table)
    })?;
    let trips = tracked(progress, TRIPS_FILE, || {
        load_trips(text(TRIPS_FILE), version, batch_size, &routes.table)
    })?;

    let (stop_times, calendar_exceptions) = join(
        || {
            tracked(progress, STOP_TIMES_FILE, || {
                load_stop_times(
                    text(STOP_TIMES_FILE),
                    version,
                    batch_size,
                    &trips.table,
                    &stops.table,
                )
            })
        },
        || {
            tracked(progress, CALENDAR_DATES_FILE, || {
                load_calendar_dates(text(CALENDAR_DATES_FILE), version, batch_size)
            })
        },
    );
    let (stop_times, calendar_exceptions) = (stop_times?, calendar_exceptions?);

    let mut summaries = Vec::with_capacity(REQUIRED_FILES.len());
    let mut notices = NoticeContainer::new();
    let mut collect = |summary: &EntityLoadSummary, file_notices: &NoticeContainer| {
        summaries.push(summary.clone());
        notices.merge(file_notices.clone());
    };
    collect(&agencies.summary, &agencies.notices);
    collect(&stops.summary, &stops.notices);
    collect(&routes.summary, &routes.notices);
    collect(&trips.summary, &trips.notices);
    collect(&stop_times.summary, &stop_times.notices);
    collect(&calendar_exceptions.summary, &calendar_exceptions.notices);

    Ok(LoadedParts {
        parts: DatasetParts {
            agencies: agencies.table,
            stops: stops.table,
            routes: routes.table,
            trips: trips.table,
            stop_times: stop_times.table,
            calendar_exceptions: calendar_exceptions.table,
        },
        summaries,
        notices,
    })
}

fn tracked<T>(
    progress: &dyn ImportProgress,
    file: &str,
    load: impl FnOnce() -> Result<LoadedTable<T>, HeaderError>,
) -> Result<LoadedTable<T>, HeaderError> {
    progress.on_start_file_load(file);
    let loaded = load()?;
    progress.on_finish_file_load(file, loaded.summary.loaded, loaded.summary.skipped);
    Ok(loaded)
}

#[cfg(feature = "parallel")]
fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    rayon::join(a, b)
}

#[cfg(not(feature = "parallel"))]
fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA,
    B: FnOnce() -> RB,
{
    (a(), b())
}

fn panic_payload_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const AGENCY: &str = "agency_name,agency_url,agency_timezone\nMetro,https://m.example,UTC\n";
    const STOPS: &str = "stop_id,stop_name,stop_lat,stop_lon\nA,Alpha,1,1\nB,Beta,2,2\n";
    const ROUTES: &str = "route_id,route_short_name,route_type\nR1,1,3\n";
    const TRIPS: &str = "route_id,service_id,trip_id\nR1,WK,T1\n";
    const STOP_TIMES: &str = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\nT1,08:00:00,08:00:00,A,1\nT1,08:10:00,08:10:00,B,2\n";
    const CALENDAR: &str = "service_id,date,exception_type\nWK,20240102,1\n";

    fn contents() -> ArchiveContents {
        ArchiveContents::from_files([
            (AGENCY_FILE, AGENCY),
            (STOPS_FILE, STOPS),
            (ROUTES_FILE, ROUTES),
            (TRIPS_FILE, TRIPS),
            (STOP_TIMES_FILE, STOP_TIMES),
            (CALENDAR_DATES_FILE, CALENDAR),
        ])
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ImportProgress for RecordingProgress {
        fn on_start_file_load(&self, file: &str) {
            self.events.lock().unwrap().push(format!("start {file}"));
        }

        fn on_finish_file_load(&self, file: &str, loaded: usize, _skipped: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finish {file} {loaded}"));
        }
    }

    #[test]
    fn loads_every_file_and_reports_progress() {
        let manager = VersionManager::new();
        let progress = RecordingProgress::default();
        let report = import_contents(
            &manager,
            &contents(),
            "feed.zip",
            42,
            ImportOptions::default().with_batch_size(1),
            &progress,
        )
        .expect("import");

        assert_eq!(report.entities.len(), 6);
        assert_eq!(report.loaded(STOP_TIMES_FILE), 2);
        assert_eq!(report.version.uploaded_by, 42);
        assert!(report.version.active);

        let events = progress.events.lock().unwrap();
        assert!(events.contains(&"finish stop_times.txt 2".to_string()));
        assert_eq!(events.len(), 12);
    }

    #[test]
    fn header_error_discards_version() {
        let manager = VersionManager::new();
        let files = ArchiveContents::from_files([
            (AGENCY_FILE, AGENCY),
            (STOPS_FILE, STOPS),
            (ROUTES_FILE, ROUTES),
            (TRIPS_FILE, "route_id,trip_id\nR1,T1\n"),
            (STOP_TIMES_FILE, STOP_TIMES),
            (CALENDAR_DATES_FILE, CALENDAR),
        ]);

        let err = import_contents(
            &manager,
            &files,
            "broken.zip",
            1,
            ImportOptions::default(),
            &crate::progress::NoOpProgress,
        )
        .unwrap_err();

        assert!(matches!(err, ImportError::Header(HeaderError::MissingColumns { .. })));
        assert!(manager.active_dataset().is_none());
        let versions = manager.versions();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].state, transit_schedule_model::VersionState::Discarded);
    }

    #[test]
    fn extracts_panic_messages() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_payload_message(&*payload), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_payload_message(&*payload), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(5u8);
        assert_eq!(panic_payload_message(&*payload), "panic");
    }
}
