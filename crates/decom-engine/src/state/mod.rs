pub mod lock;
pub mod report;
pub mod run_log;

pub use lock::{atomic_write, AdvisoryLock};
pub use report::{Summary, DISCOVERY_PREFIX, RESULTS_PREFIX};
pub use run_log::RunLog;
