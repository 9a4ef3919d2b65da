mod context;
mod detect;
mod engine;
pub mod guard;
pub mod incident;
mod runner;

#[cfg(test)]
mod testing;

pub use context::RunContext;
pub use detect::{detector_for, ChangeDetector, InstantComparison, MarkerEquality};
pub use engine::{ScanEngine, ScanOutcome, ScanReport};
pub use guard::{admit, try_lock, Admission, RunLock};
pub use runner::{execute, load_feed_list, FeedResult, RunOptions, RunSummary};
