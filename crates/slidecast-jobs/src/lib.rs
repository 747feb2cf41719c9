//! Render job registry.
//!
//! This crate provides:
//! - The [`JobStore`] abstraction with atomic patch updates
//! - An in-process [`InMemoryJobStore`]
//! - A [`RetentionSweeper`] purging jobs past the retention window

pub mod error;
pub mod store;
pub mod sweeper;

pub use error::{JobsError, JobsResult};
pub use store::{InMemoryJobStore, JobStore, DEFAULT_RETENTION};
pub use sweeper::RetentionSweeper;
