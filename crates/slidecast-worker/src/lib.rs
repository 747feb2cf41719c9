//! Render job orchestration.
//!
//! [`RenderService`] is the entry point: it validates and registers jobs,
//! runs each one as a supervised background [`RenderPipeline`], and
//! coordinates cancellation of the FFmpeg processes a job owns.

pub mod config;
pub mod controls;
pub mod error;
pub mod janitor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod reporter;
pub mod service;

pub use config::WorkerConfig;
pub use controls::{ControlTable, JobControl};
pub use error::{WorkerError, WorkerResult};
pub use janitor::{JanitorReport, OutputJanitor};
pub use logging::{JobLogger, RenderStage};
pub use pipeline::RenderPipeline;
pub use reporter::{MuxProgressMonitor, ProgressReporter};
pub use service::{CancelOutcome, RenderService};
