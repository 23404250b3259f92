/// Trait for reporting pipeline progress.
///
/// The CLI implements this with indicatif bars; tests and embedding use
/// the silent reporter. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_progress(&self, _files_found: usize, _current_path: &str) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_hash_start(&self) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_hash_complete(&self, _total_hashed: usize, _duration_secs: f64) {}
    fn on_db_write_start(&self) {}
    fn on_db_write_complete(&self, _rows: usize, _duration_secs: f64) {}
    fn on_analyze_start(&self) {}
    fn on_analyze_complete(&self, _groups: usize, _duration_secs: f64) {}
    fn on_execute_start(&self, _total_actions: usize) {}
    fn on_execute_progress(&self, _actions_done: usize, _total_actions: usize) {}
    fn on_execute_complete(&self, _succeeded: usize, _failed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
