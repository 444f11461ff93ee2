//! Storage abstractions and backends.
//!
//! The engine talks to persistence exclusively through the [`ScheduleStore`]
//! and [`ExecutionStore`] traits; [`file`] provides the filesystem-backed
//! implementations used by the daemon.

pub mod error;
pub mod execution;
pub mod file;
pub mod schedule;

pub use error::{StorageError, StorageResult};
pub use execution::ExecutionStore;
pub use schedule::ScheduleStore;
