//! Media conversion module.
//!
//! This module turns conversion requests into finished artifacts. It includes:
//!
//! - Job registration and cancellation ([`JobOrchestrator`], [`JobRegistry`])
//! - Stage execution with job-wide progress ([`StageExecutor`])
//! - Per-job progress channels with replay ([`ProgressBroadcaster`])
//!
//! # Job lifecycle
//!
//! A job is registered as soon as it is submitted, runs its stages one at a
//! time, and ends with exactly one terminal event:
//! - `complete` when the output was produced
//! - `error` when validation, probing, or a stage failed
//! - `cancelled` when [`JobOrchestrator::cancel`] won the race
//!
//! Scratch files are removed before `complete` or `error` is published.

mod executor;
mod orchestrator;
mod progress;
mod registry;

pub use executor::{PlanOutcome, StageExecutor};
pub use orchestrator::{JobOrchestrator, JobOrchestratorBuilder};
pub use progress::{ProgressBroadcaster, ProgressStream};
pub use registry::{JobRecord, JobRegistry, JobState};
