use std::path::Path;

use transit_schedule_model::{DatasetVersion, VersionId};

use crate::archive::ArchiveContents;
use crate::connections::{find_connections, Connection, ConnectionQuery};
use crate::error::{ImportError, NotFoundError, VersionError};
use crate::pipeline::{import_archive, import_contents, ImportOptions, ImportReport};
use crate::progress::{ImportProgress, NoOpProgress};
use crate::queries::{self, StopDeparture, StopSummary, TripDetails};
use crate::version::VersionManager;

/// Entry point for transports: imports archives and answers queries against
/// the active dataset version.
#[derive(Default)]
pub struct ScheduleService {
    versions: VersionManager,
    options: ImportOptions,
}

impl ScheduleService {
    pub fn new(options: ImportOptions) -> Self {
        Self {
            versions: VersionManager::new(),
            options,
        }
    }

    pub fn options(&self) -> ImportOptions {
        self.options
    }

    pub fn import_dataset(
        &self,
        bytes: &[u8],
        filename: &str,
        uploader_id: i64,
    ) -> Result<ImportReport, ImportError> {
        self.import_dataset_with_progress(bytes, filename, uploader_id, &NoOpProgress)
    }

    pub fn import_dataset_with_progress(
        &self,
        bytes: &[u8],
        filename: &str,
        uploader_id: i64,
        progress: &dyn ImportProgress,
    ) -> Result<ImportReport, ImportError> {
        import_archive(
            &self.versions,
            bytes,
            filename,
            uploader_id,
            self.options,
            progress,
        )
    }

    /// Imports an unpacked feed directory.
    pub fn import_directory(
        &self,
        path: &Path,
        uploader_id: i64,
        progress: &dyn ImportProgress,
    ) -> Result<ImportReport, ImportError> {
        let contents = ArchiveContents::from_directory(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        import_contents(
            &self.versions,
            &contents,
            &filename,
            uploader_id,
            self.options,
            progress,
        )
    }

    /// Empty when no version is active.
    pub fn find_connections(&self, query: &ConnectionQuery) -> Vec<Connection> {
        match self.versions.active_dataset() {
            Some(dataset) => find_connections(&dataset, query),
            None => Vec::new(),
        }
    }

    pub fn active_stops(&self) -> Vec<StopSummary> {
        self.versions
            .active_dataset()
            .map(|dataset| queries::stops(&dataset))
            .unwrap_or_default()
    }

    pub fn trip(&self, trip_id: &str) -> Result<TripDetails, NotFoundError> {
        let dataset = self
            .versions
            .active_dataset()
            .ok_or_else(|| NotFoundError::new("trip", trip_id))?;
        queries::trip(&dataset, trip_id)
    }

    pub fn departures(&self, stop_id: &str) -> Result<Vec<StopDeparture>, NotFoundError> {
        let dataset = self
            .versions
            .active_dataset()
            .ok_or_else(|| NotFoundError::new("stop", stop_id))?;
        queries::departures(&dataset, stop_id)
    }

    pub fn versions(&self) -> Vec<DatasetVersion> {
        self.versions.versions()
    }

    pub fn active_version(&self) -> Option<DatasetVersion> {
        self.versions.active_version()
    }

    pub fn activate_version(&self, id: VersionId) -> Result<DatasetVersion, VersionError> {
        self.versions.activate(id)
    }

    /// Drops an inactive version's data so rollback can no longer reach it.
    pub fn forget_version(&self, id: VersionId) -> Result<DatasetVersion, VersionError> {
        self.versions.forget(id)
    }
}
