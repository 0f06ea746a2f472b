//! Application configuration types.
//!
//! The top-level [`Config`] is deserialized from TOML by the binary. Every
//! section defaults sensibly so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub scratch: ScratchConfig,
    pub progress: ProgressConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.progress.channel_capacity == 0 {
            return Err(Error::Config(
                "progress.channel_capacity must be greater than 0".into(),
            ));
        }
        if self.progress.settled_retention == 0 {
            return Err(Error::Config(
                "progress.settled_retention must be greater than 0".into(),
            ));
        }
        if let Some(dir) = &self.scratch.dir {
            if dir.is_file() {
                return Err(Error::Config(format!(
                    "scratch.dir points at a file: {}",
                    dir.display()
                )));
            }
        }
        if self.engine.stage_timeout_secs == Some(0) {
            return Err(Error::Config(
                "engine.stage_timeout_secs must be greater than 0 when set".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Overrides for external tool locations. Unset tools are looked up in `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Where per-job scratch files are created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Scratch root. Defaults to `<system temp>/mediaforge`.
    pub dir: Option<PathBuf>,
}

impl ScratchConfig {
    /// Resolved scratch root.
    pub fn root(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("mediaforge"))
    }
}

/// Progress channel sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Buffered events per job before slow subscribers start lagging.
    pub channel_capacity: usize,
    /// Number of finished jobs whose terminal event is kept for late
    /// subscribers.
    pub settled_retention: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            settled_retention: 256,
        }
    }
}

/// Transcoding engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Kill a stage that runs longer than this. Unset means no limit; callers
    /// impose deadlines by cancelling.
    pub stage_timeout_secs: Option<u64>,
}
