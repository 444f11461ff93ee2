//! Reportd - a scheduling and execution engine for recurring report jobs.
//!
//! Schedule definitions and execution history are persisted as files; the
//! engine itself is in [`scheduler`], the opaque job pipeline contract in
//! [`runner`].

pub mod config;
pub mod runner;
pub mod scheduler;
pub mod store;
