//! mediaforge-common: shared types, IDs, errors, configuration and progress
//! events.
//!
//! This crate is the foundational dependency for the other mediaforge crates.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use events::ProgressEvent;
pub use ids::JobId;
pub use media::*;
