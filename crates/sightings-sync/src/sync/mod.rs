pub mod engine;
pub mod import;
pub mod types;

pub use engine::SyncEngine;
pub use import::{merge_records, ImportPlan};
pub use types::{
    DrainOutcome, DrainReport, ImportReport, RemoteStore, SkipReason, SyncOptions,
};
