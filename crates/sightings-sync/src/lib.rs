//! Offline-first synchronization core for field observation records.
//!
//! A [`SyncContext`] keeps a durable local snapshot of every record, accepts
//! writes regardless of connectivity, logs unconfirmed writes in a durable
//! pending log, and reconciles that log with the remote store once the
//! network is back.

pub mod error;
pub mod types;

pub mod cache;
pub mod connectivity;
pub mod context;
pub mod events;
pub mod queue;
pub mod replica;
pub mod storage;
pub mod sync;

pub use context::SyncContext;
pub use error::{RemoteError, RemoteErrorKind, Result, StorageError, SyncError};
pub use types::Record;
