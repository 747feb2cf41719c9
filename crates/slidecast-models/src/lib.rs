//! Shared data models for the Slidecast render service.
//!
//! This crate provides Serde-serializable types for:
//! - Render requests (scenes, audio, video and subtitle settings)
//! - Render jobs, their lifecycle and step log
//! - Atomic job patches applied by the registry

pub mod job;
pub mod request;

// Re-export common types
pub use job::{Job, JobId, JobOutput, JobPatch, JobStatus, PatchError, StepEntry};
pub use request::{
    ContainerFormat, EffectType, InputError, RenderMethod, RenderRequest, Scene, SubtitleSettings,
    VideoSettings,
};
