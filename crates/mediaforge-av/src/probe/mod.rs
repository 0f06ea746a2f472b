//! Preflight media probing.
//!
//! A probe inspects container metadata without decoding: which kinds of
//! streams are present and how long the media runs. The command builder uses
//! it for compatibility checks and progress estimation; collaborators use
//! [`Prober::duration_seconds`] for admission limits.

mod ffprobe;

pub use ffprobe::FfprobeProber;

use std::path::Path;

use async_trait::async_trait;
use mediaforge_common::Result;
use serde::{Deserialize, Serialize};

/// Stream-level summary of a media file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Container format name as reported by the prober (e.g. `mov,mp4,m4a`).
    pub container: Option<String>,
    pub audio_streams: u32,
    pub video_streams: u32,
    pub duration_secs: Option<f64>,
}

impl StreamSummary {
    pub fn has_audio(&self) -> bool {
        self.audio_streams > 0
    }

    pub fn has_video(&self) -> bool {
        self.video_streams > 0
    }
}

/// Backend capable of summarizing a media file's streams.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Summarize the streams of the file at `path`.
    async fn probe(&self, path: &Path) -> Result<StreamSummary>;

    async fn has_audio_stream(&self, path: &Path) -> Result<bool> {
        Ok(self.probe(path).await?.has_audio())
    }

    async fn has_video_stream(&self, path: &Path) -> Result<bool> {
        Ok(self.probe(path).await?.has_video())
    }

    /// Duration in seconds, `None` when the container does not record one.
    async fn duration_seconds(&self, path: &Path) -> Result<Option<f64>> {
        Ok(self.probe(path).await?.duration_secs)
    }
}
