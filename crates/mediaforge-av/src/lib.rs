//! # mediaforge-av
//!
//! Media knowledge and ffmpeg plumbing for mediaforge.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   cancellation, and streamed stderr.
//! - **Probing** ([`Prober`], [`FfprobeProber`]) -- stream summaries used for
//!   compatibility checks and progress estimation.
//! - **Format tables** ([`formats`], [`codecs`]) -- accepted sources, codec
//!   profiles, content types.
//! - **Stage plans** ([`CommandBuilder`]) -- validated ffmpeg invocations per
//!   conversion category.
//! - **Scratch space** ([`ScratchArea`], [`Scratch`]) -- per-job temporary
//!   files, frame archiving, and cleanup.
//! - **Engines** ([`TranscodeEngine`], [`FfmpegEngine`]) -- stage execution
//!   with progress reporting.

pub mod builder;
pub mod codecs;
pub mod command;
pub mod engine;
pub mod formats;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use builder::{BuildRequest, CommandBuilder, OutputTarget, PercentRange, Stage, StagePlan};
pub use command::{ToolCommand, ToolOutput};
pub use engine::{FfmpegEngine, ProgressParser, TranscodeEngine};
pub use probe::{FfprobeProber, Prober, StreamSummary};
pub use tools::{ToolInfo, ToolRegistry};
pub use workspace::{cleanup_paths, Scratch, ScratchArea};
