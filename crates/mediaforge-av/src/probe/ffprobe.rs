//! FFprobe-based preflight probing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use mediaforge_common::{Error, Result};
use serde::Deserialize;

use super::{Prober, StreamSummary};
use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Probing a header should never take long; a stuck probe is a broken file.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

/// [`Prober`] backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe: PathBuf) -> Self {
        Self { ffprobe }
    }

    /// Use the ffprobe found by the registry.
    pub fn from_registry(tools: &ToolRegistry) -> Result<Self> {
        Ok(Self::new(tools.require("ffprobe")?.to_path_buf()))
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<StreamSummary> {
        if !path.exists() {
            return Err(Error::Probe(format!("file not found: {}", path.display())));
        }

        let output = ToolCommand::new(self.ffprobe.clone())
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path.to_string_lossy())
            .timeout(Some(PROBE_TIMEOUT))
            .execute()
            .await?;

        parse_ffprobe_json(&output.stdout)
    }
}

/// Parse `ffprobe -print_format json` output into a [`StreamSummary`].
pub(crate) fn parse_ffprobe_json(json: &str) -> Result<StreamSummary> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("invalid ffprobe output: {e}")))?;

    let mut summary = StreamSummary::default();

    if let Some(format) = output.format {
        summary.container = format.format_name;
        summary.duration_secs = format
            .duration
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0);
    }

    for stream in output.streams {
        match stream.codec_type.as_deref() {
            // Cover art in audio files is reported as a video stream.
            Some("video") if stream.disposition.attached_pic == 0 => summary.video_streams += 1,
            Some("audio") => summary.audio_streams += 1,
            _ => {}
        }
    }

    Ok(summary)
}
