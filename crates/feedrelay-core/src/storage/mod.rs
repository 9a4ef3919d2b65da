mod checkpoint;
mod database;
mod ledger;

pub use checkpoint::{CheckpointStore, FeedCheckpoint};
pub use database::Database;
pub use ledger::{DedupLedger, LedgerBatch, PostedEntryRecord};
