//! Per-job progress events.
//!
//! The wire shape is adjacently tagged so an SSE collaborator can forward
//! events verbatim:
//!
//! ```json
//! {"type":"progress","data":{"percent":42.5}}
//! {"type":"error","data":{"message":"Conversion failed"}}
//! {"type":"complete"}
//! ```

use serde::{Deserialize, Serialize};

/// Something that happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Overall completion in `0.0..=100.0`.
    Progress { percent: f64 },
    /// The job produced its output.
    Complete,
    /// The job failed.
    Error { message: String },
    /// The job was cancelled.
    Cancelled,
}

impl ProgressEvent {
    pub fn progress(percent: f64) -> Self {
        ProgressEvent::Progress { percent }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    /// Terminal events end a job's stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }

    /// Percent carried by a progress event.
    pub fn percent(&self) -> Option<f64> {
        match self {
            ProgressEvent::Progress { percent } => Some(*percent),
            _ => None,
        }
    }
}
