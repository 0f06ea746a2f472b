//! Unified error type for mediaforge.
//!
//! Every crate in the workspace funnels its failures into [`Error`]. The
//! variants distinguish the conditions a caller can act on (a bad request, a
//! source that cannot satisfy the conversion) from generic execution failures,
//! and [`Error::http_status`] gives an HTTP collaborator a status code to use.

/// Unified error type covering all failure modes in mediaforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request was rejected before any work started (unsupported source
    /// extension, malformed option, unknown target format).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The source media cannot satisfy the requested conversion (for example
    /// extracting audio from a file with no audio stream).
    #[error("Incompatible source: {0}")]
    Incompatible(String),

    /// The transcoding engine reported a failure while the job was live.
    #[error("Conversion failed: {0}")]
    Engine(String),

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Packing extracted frames into an archive failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Incompatible(_) => 422,
            Error::Engine(_) => 502,
            Error::Tool { .. } => 502,
            Error::Probe(_) => 422,
            Error::Archive(_) => 500,
            Error::Io { .. } => 500,
            Error::Config(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Whether the error was raised before any subprocess was spawned and is
    /// actionable by the end user.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::Incompatible(_))
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
