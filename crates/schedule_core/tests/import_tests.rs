mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use common::{feed_with, feed_without, minimal_feed, zip_archive};
use transit_schedule_core::notice::{NOTICE_CODE_DUPLICATE_KEY, NOTICE_CODE_FOREIGN_KEY_VIOLATION};
use transit_schedule_core::{
    import_archive, HeaderError, ImportError, ImportOptions, ImportProgress, NoOpProgress,
    ScheduleService, VersionManager,
};
use transit_schedule_model::{VersionId, VersionState};

fn active_count(service: &ScheduleService) -> usize {
    service.versions().iter().filter(|v| v.active).count()
}

#[test]
fn minimal_archive_imports_and_activates() {
    let service = ScheduleService::default();
    let report = service
        .import_dataset(&zip_archive(&minimal_feed()), "minimal.zip", 7)
        .expect("import");

    assert!(report.version.active);
    assert_eq!(report.version.filename, "minimal.zip");
    assert_eq!(report.version.uploaded_by, 7);
    assert_eq!(report.version.state, VersionState::Imported);
    assert_eq!(report.loaded("stops.txt"), 2);
    assert_eq!(report.loaded("stop_times.txt"), 2);
    assert!(report.notices.is_empty());
    assert_eq!(service.active_version().map(|v| v.id), Some(report.version.id));
}

#[test]
fn exactly_one_version_active_after_many_imports() {
    let service = ScheduleService::default();
    let archive = zip_archive(&minimal_feed());
    let mut last = None;
    for n in 0..3 {
        let report = service
            .import_dataset(&archive, &format!("feed-{n}.zip"), 1)
            .expect("import");
        assert_eq!(active_count(&service), 1);
        last = Some(report.version.id);
    }
    assert_eq!(service.active_version().map(|v| v.id), last);
    assert_eq!(service.versions().len(), 3);
}

#[test]
fn reactivating_active_version_changes_nothing() {
    let service = ScheduleService::default();
    let report = service
        .import_dataset(&zip_archive(&minimal_feed()), "feed.zip", 1)
        .expect("import");

    let version = service
        .activate_version(report.version.id)
        .expect("activate");
    assert!(version.active);
    assert_eq!(active_count(&service), 1);
    assert_eq!(service.active_version().map(|v| v.id), Some(report.version.id));
}

#[test]
fn missing_stops_file_fails_before_any_state_change() {
    let service = ScheduleService::default();
    let first = service
        .import_dataset(&zip_archive(&minimal_feed()), "good.zip", 1)
        .expect("import");

    let err = service
        .import_dataset(&zip_archive(&feed_without("stops.txt")), "bad.zip", 1)
        .unwrap_err();

    match err {
        ImportError::MissingFiles(missing) => {
            assert_eq!(missing.names, vec!["stops.txt".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(service.versions().len(), 1);
    assert_eq!(service.active_version().map(|v| v.id), Some(first.version.id));
}

#[test]
fn stop_time_with_unknown_trip_is_dropped() {
    let service = ScheduleService::default();
    let stop_times = format!("{}T9,09:00:00,09:00:00,A,1\n", common::STOP_TIMES);
    let report = service
        .import_dataset(
            &zip_archive(&feed_with("stop_times.txt", &stop_times)),
            "feed.zip",
            1,
        )
        .expect("import");

    assert!(report.version.active);
    assert_eq!(report.loaded("stop_times.txt"), 2);
    assert_eq!(report.skipped("stop_times.txt"), 1);
    let notice = &report.notices[0];
    assert_eq!(notice.code, NOTICE_CODE_FOREIGN_KEY_VIOLATION);
    assert_eq!(notice.field.as_deref(), Some("trip_id"));
    assert_eq!(notice.row, Some(4));
}

#[test]
fn every_stored_reference_resolves() {
    let service = ScheduleService::default();
    let trips = format!("{}R9,WK,T2,Nowhere,0\n", common::TRIPS);
    let stop_times = format!(
        "{}T1,08:30:00,08:30:00,Z,3\nT2,08:00:00,08:00:00,A,1\n",
        common::STOP_TIMES
    );
    let routes = format!("{}R2,X,U2,Orphan,3\n", common::ROUTES);
    let mut files = feed_with("trips.txt", &trips);
    files = files
        .into_iter()
        .map(|(name, text)| match name {
            "stop_times.txt" => (name, stop_times.clone()),
            "routes.txt" => (name, routes.clone()),
            _ => (name, text),
        })
        .collect();

    let manager = VersionManager::new();
    import_archive(
        &manager,
        &zip_archive(&files),
        "feed.zip",
        1,
        ImportOptions::default(),
        &NoOpProgress,
    )
    .expect("import");
    let dataset = manager.active_dataset().expect("active");

    for route in dataset.routes() {
        if let Some(agency_id) = &route.agency_id {
            assert!(dataset.agency(agency_id).is_some());
        }
    }
    assert_eq!(dataset.route("R2").and_then(|r| r.agency_id.clone()), None);
    for trip in dataset.trips() {
        assert!(dataset.route(&trip.route_id).is_some());
    }
    for entry in dataset.stop_times() {
        assert!(dataset.trip(&entry.trip_id).is_some());
        assert!(dataset.stop(&entry.stop_id).is_some());
        assert_eq!(entry.dataset_version_id, dataset.version());
    }
    assert_eq!(dataset.trips().len(), 1);
    assert_eq!(dataset.stop_times().len(), 2);
}

#[test]
fn header_without_required_column_fails_import() {
    let service = ScheduleService::default();
    let stops = "stop_id,stop_name,stop_lat\nA,Alpha,48.1\n";
    let err = service
        .import_dataset(&zip_archive(&feed_with("stops.txt", stops)), "feed.zip", 1)
        .unwrap_err();

    match err {
        ImportError::Header(HeaderError::MissingColumns { file, columns }) => {
            assert_eq!(file, "stops.txt");
            assert_eq!(columns, vec!["stop_lon".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(service.active_version().is_none());
    assert_eq!(service.versions()[0].state, VersionState::Discarded);
}

#[test]
fn duplicate_stop_sequence_is_skipped() {
    let service = ScheduleService::default();
    let stop_times = format!("{}T1,08:20:00,08:20:00,A,2\n", common::STOP_TIMES);
    let report = service
        .import_dataset(
            &zip_archive(&feed_with("stop_times.txt", &stop_times)),
            "feed.zip",
            1,
        )
        .expect("import");

    assert_eq!(report.loaded("stop_times.txt"), 2);
    assert_eq!(report.skipped("stop_times.txt"), 1);
    assert_eq!(report.notices[0].code, NOTICE_CODE_DUPLICATE_KEY);

    let details = service.trip("T1").expect("trip");
    let stops: Vec<&str> = details.stops.iter().map(|s| s.stop_id.as_str()).collect();
    assert_eq!(stops, vec!["A", "B"]);
}

#[test]
fn tolerates_bom_mixed_case_headers_and_nested_folder() {
    let service = ScheduleService::default();
    let files: Vec<(String, String)> = minimal_feed()
        .into_iter()
        .map(|(name, text)| (format!("gtfs/{name}"), text))
        .collect();
    let mut files: Vec<(&str, String)> = files
        .iter()
        .map(|(name, text)| (name.as_str(), text.clone()))
        .collect();
    files[1].1 = "\u{feff}Stop_Lon, STOP_LAT ,stop_name,stop_id\n11.5,48.1,Alpha,A\n11.6,48.2,Beta,B\n"
        .to_string();

    let report = service
        .import_dataset(&zip_archive(&files), "nested.zip", 1)
        .expect("import");
    assert_eq!(report.loaded("stops.txt"), 2);
    assert_eq!(service.active_stops()[1].stop_lon, 11.6);
}

#[test]
fn small_batches_produce_the_same_dataset() {
    let archive = zip_archive(&minimal_feed());
    let small = ScheduleService::new(ImportOptions::default().with_batch_size(1));
    let large = ScheduleService::default();

    let small_report = small.import_dataset(&archive, "f.zip", 1).expect("import");
    let large_report = large.import_dataset(&archive, "f.zip", 1).expect("import");

    assert_eq!(small_report.entities, large_report.entities);
    assert_eq!(small.active_stops(), large.active_stops());
}

#[test]
fn concurrent_imports_serialize() {
    let service = Arc::new(ScheduleService::default());
    let archive = Arc::new(zip_archive(&minimal_feed()));

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let service = Arc::clone(&service);
            let archive = Arc::clone(&archive);
            thread::spawn(move || {
                service
                    .import_dataset(&archive, &format!("feed-{n}.zip"), n)
                    .map(|report| report.version.id)
            })
        })
        .collect();

    let mut ids: Vec<VersionId> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread").expect("import"))
        .collect();
    ids.sort();
    ids.dedup();

    assert_eq!(ids.len(), 4);
    assert_eq!(active_count(&service), 1);
    assert!(service
        .versions()
        .iter()
        .all(|version| version.state == VersionState::Imported));
}

/// Rolls the active version back while the import is loading.
struct RollbackDuringImport<'a> {
    manager: &'a VersionManager,
    target: VersionId,
    fired: AtomicBool,
}

impl ImportProgress for RollbackDuringImport<'_> {
    fn on_start_file_load(&self, _file: &str) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.manager.activate(self.target).expect("rollback");
        }
    }

    fn on_finish_file_load(&self, _file: &str, _loaded: usize, _skipped: usize) {}
}

#[test]
fn rollback_racing_an_import_is_a_conflict() {
    let manager = VersionManager::new();
    let archive = zip_archive(&minimal_feed());
    let import = |progress: &dyn ImportProgress| {
        import_archive(
            &manager,
            &archive,
            "feed.zip",
            1,
            ImportOptions::default(),
            progress,
        )
    };
    let first = import(&NoOpProgress).expect("first");
    let second = import(&NoOpProgress).expect("second");

    let progress = RollbackDuringImport {
        manager: &manager,
        target: first.version.id,
        fired: AtomicBool::new(false),
    };
    let err = import(&progress).unwrap_err();

    match err {
        ImportError::ActivationConflict(conflict) => {
            assert_eq!(conflict.expected, Some(second.version.id));
            assert_eq!(conflict.found, Some(first.version.id));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(manager.active_id(), Some(first.version.id));
    assert_eq!(
        manager.versions().last().map(|v| v.state),
        Some(VersionState::Discarded)
    );
}

struct PanickingProgress;

impl ImportProgress for PanickingProgress {
    fn on_start_file_load(&self, file: &str) {
        if file == "trips.txt" {
            panic!("progress sink failed");
        }
    }

    fn on_finish_file_load(&self, _file: &str, _loaded: usize, _skipped: usize) {}
}

#[test]
fn loader_panic_leaves_active_version_untouched() {
    let manager = VersionManager::new();
    let archive = zip_archive(&minimal_feed());
    let first = import_archive(
        &manager,
        &archive,
        "feed.zip",
        1,
        ImportOptions::default(),
        &NoOpProgress,
    )
    .expect("first");

    let err = import_archive(
        &manager,
        &archive,
        "feed.zip",
        1,
        ImportOptions::default(),
        &PanickingProgress,
    )
    .unwrap_err();

    match err {
        ImportError::LoaderPanic { message } => assert_eq!(message, "progress sink failed"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(manager.active_id(), Some(first.version.id));
}
