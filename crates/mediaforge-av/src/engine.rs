//! Stage execution.
//!
//! A [`TranscodeEngine`] runs one [`Stage`] to completion, reporting
//! stage-local progress (0..100) as it goes. [`FfmpegEngine`] is the real
//! implementation; tests substitute scripted engines.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use mediaforge_common::Result;
use tokio_util::sync::CancellationToken;

use crate::builder::Stage;
use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Flags prepended to every ffmpeg invocation. Progress goes to stderr as
/// `key=value` blocks so it shares the pipe the command runner reads.
const FFMPEG_GLOBAL_ARGS: &[&str] = &[
    "-hide_banner",
    "-nostdin",
    "-y",
    "-progress",
    "pipe:2",
    "-nostats",
];

/// Runs stages of a plan.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Run `stage`, calling `on_progress` with the percent complete within
    /// the stage. Firing `cancel` must terminate the work promptly; the
    /// returned result is then ignored by the caller.
    async fn run(
        &self,
        stage: &Stage,
        cancel: CancellationToken,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<()>;
}

/// [`TranscodeEngine`] that shells out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegEngine {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self {
            ffmpeg,
            timeout: None,
        }
    }

    /// Use the ffmpeg found by the registry.
    pub fn from_registry(tools: &ToolRegistry) -> Result<Self> {
        Ok(Self::new(tools.require("ffmpeg")?.to_path_buf()))
    }

    /// Limit each stage's wall-clock time. Transcodes are unbounded by
    /// default.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, stage: &Stage) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.args(FFMPEG_GLOBAL_ARGS.iter().copied())
            .args(stage.args.iter().cloned())
            .timeout(self.timeout);
        cmd
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn run(
        &self,
        stage: &Stage,
        cancel: CancellationToken,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<()> {
        let cmd = self.command(stage);
        tracing::debug!("Running ffmpeg {}: {:?}", stage.label, cmd.get_args());

        let mut parser = ProgressParser::new(stage.duration_secs);
        cmd.execute_with_stderr_callback(
            |line| {
                if let Some(percent) = parser.feed(line) {
                    on_progress(percent);
                }
            },
            Some(cancel),
        )
        .await?;

        Ok(())
    }
}

/// Turns ffmpeg `-progress` blocks into percent values.
///
/// Each block ends with `progress=continue` or `progress=end`; a percent is
/// produced at the end of a block from the latest output timestamp.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    duration_secs: Option<f64>,
    out_time_secs: Option<f64>,
}

impl ProgressParser {
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| d.is_finite() && *d > 0.0),
            out_time_secs: None,
        }
    }

    /// Feed one stderr line; returns a percent when a block completes.
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // out_time_ms is in microseconds as well, despite the name.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<i64>() {
                    self.out_time_secs = Some(us.max(0) as f64 / 1_000_000.0);
                }
                None
            }
            "progress" if value.trim() == "end" => Some(100.0),
            "progress" => {
                let duration = self.duration_secs?;
                let elapsed = self.out_time_secs?;
                Some((elapsed / duration * 100.0).clamp(0.0, 100.0))
            }
            _ => None,
        }
    }
}
