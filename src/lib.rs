//! mediaforge - Media transformation job orchestrator
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod conversion;

pub use conversion::{JobOrchestrator, ProgressBroadcaster, ProgressStream};
