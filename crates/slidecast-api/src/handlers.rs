//! Request handlers.

pub mod health;
pub mod jobs;
pub mod render;

pub use health::*;
pub use jobs::*;
pub use render::*;
