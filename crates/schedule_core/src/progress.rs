/// Progress events emitted while an archive is imported.
pub trait ImportProgress: Send + Sync {
    /// Called when starting to load a file
    fn on_start_file_load(&self, file: &str);

    /// Called when finished loading a file
    fn on_finish_file_load(&self, file: &str, loaded: usize, skipped: usize);

    /// Set total number of files to load
    fn set_total_files(&self, count: usize) {
        let _ = count;
    }
}

/// A no-op progress handler
pub struct NoOpProgress;

impl ImportProgress for NoOpProgress {
    fn on_start_file_load(&self, _file: &str) {}
    fn on_finish_file_load(&self, _file: &str, _loaded: usize, _skipped: usize) {}
}
