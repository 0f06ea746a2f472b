//! Stage plan construction.
//!
//! [`CommandBuilder`] turns a conversion request into an ordered list of
//! ffmpeg invocations. All validation and probing happens here, before any
//! subprocess is spawned, so a rejected request never touches the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mediaforge_common::{ConversionCategory, Error, Result, TransformOptions};
use uuid::Uuid;

use crate::codecs::{audio_profile, frame_codec, video_profile};
use crate::formats::{validate_source_extension, FRAME_EXTENSIONS};
use crate::probe::Prober;

/// Slice of the job's 0..100 progress scale a stage reports into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentRange {
    pub start: f64,
    pub end: f64,
}

impl PercentRange {
    pub const FULL: PercentRange = PercentRange {
        start: 0.0,
        end: 100.0,
    };

    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Map a stage-local percent into this range.
    pub fn map(&self, stage_percent: f64) -> f64 {
        let p = if stage_percent.is_finite() {
            stage_percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.start + (self.end - self.start) * p / 100.0
    }
}

/// One ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct Stage {
    /// Short human-readable name, used in logs.
    pub label: &'static str,
    /// Arguments after the engine's fixed global flags.
    pub args: Vec<String>,
    pub range: PercentRange,
    /// Source duration used to turn encoder timestamps into percent.
    pub duration_secs: Option<f64>,
}

/// Where the final stage writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    FrameDirectory(PathBuf),
}

impl OutputTarget {
    pub fn path(&self) -> &Path {
        match self {
            OutputTarget::File(p) | OutputTarget::FrameDirectory(p) => p,
        }
    }
}

/// Ordered stages for one job.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub stages: Vec<Stage>,
    /// Files created between stages; the caller must register them for
    /// cleanup.
    pub intermediates: Vec<PathBuf>,
    pub output: OutputTarget,
}

/// Everything the builder needs to know about a job.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub category: ConversionCategory,
    /// Materialized source file.
    pub input: &'a Path,
    /// Extension of the source as uploaded, lowercased.
    pub source_extension: Option<&'a str>,
    /// Allocated output: a file for single-file conversions, an existing
    /// directory for frame extraction.
    pub output: &'a Path,
    pub target_format: &'a str,
    pub options: &'a TransformOptions,
}

/// Builds [`StagePlan`]s, probing sources through a [`Prober`].
#[derive(Clone)]
pub struct CommandBuilder {
    prober: Arc<dyn Prober>,
}

impl CommandBuilder {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self { prober }
    }

    /// Validate the request and build its stage plan.
    pub async fn build(&self, req: &BuildRequest<'_>) -> Result<StagePlan> {
        validate_source_extension(req.category, req.source_extension)?;

        match req.category {
            ConversionCategory::VideoToAudio | ConversionCategory::AudioToAudio => {
                self.audio_plan(req).await
            }
            ConversionCategory::VideoToVideo => self.video_plan(req).await,
            ConversionCategory::VideoToImage => self.frames_plan(req).await,
        }
    }

    async fn audio_plan(&self, req: &BuildRequest<'_>) -> Result<StagePlan> {
        let summary = self.prober.probe(req.input).await?;
        if !summary.has_audio() {
            return Err(Error::Incompatible(format!(
                "source has no audio stream to convert to {}",
                req.target_format
            )));
        }

        let profile = audio_profile(req.target_format);
        let mut args = input_args(req.input);
        if summary.has_video() {
            args.push("-vn".into());
        }
        args.extend(["-c:a".into(), profile.codec.into()]);
        if let (true, Some(bitrate)) = (profile.supports_bitrate, req.options.bitrate) {
            args.extend(["-b:a".into(), bitrate.to_arg()]);
        }
        if let Some(rate) = profile.sample_rate {
            args.extend(["-ar".into(), rate.to_string()]);
        }
        if let Some(channels) = profile.channels {
            args.extend(["-ac".into(), channels.to_string()]);
        }
        if let Some(muxer) = profile.muxer {
            args.extend(["-f".into(), muxer.into()]);
        }
        args.push(path_arg(req.output));

        Ok(StagePlan {
            stages: vec![Stage {
                label: "extract audio",
                args,
                range: PercentRange::FULL,
                duration_secs: summary.duration_secs,
            }],
            intermediates: Vec::new(),
            output: OutputTarget::File(req.output.to_path_buf()),
        })
    }

    async fn video_plan(&self, req: &BuildRequest<'_>) -> Result<StagePlan> {
        let duration = self.source_duration(req.input).await;
        let profile = video_profile(req.target_format);

        let mut args = input_args(req.input);
        args.extend(["-c:v".into(), profile.video_codec.into()]);
        match profile.audio_codec {
            Some(codec) => {
                args.extend(["-c:a".into(), codec.into()]);
                if let Some(bitrate) = req.options.bitrate {
                    args.extend(["-b:a".into(), bitrate.to_arg()]);
                }
            }
            None => args.push("-an".into()),
        }
        args.extend(profile.extra_args.iter().map(|a| a.to_string()));
        if req.options.reshapes_video() {
            args.extend(["-vf".into(), filter_chain(req.options)]);
        }
        args.push(path_arg(req.output));

        Ok(StagePlan {
            stages: vec![Stage {
                label: "transcode",
                args,
                range: PercentRange::FULL,
                duration_secs: duration,
            }],
            intermediates: Vec::new(),
            output: OutputTarget::File(req.output.to_path_buf()),
        })
    }

    async fn frames_plan(&self, req: &BuildRequest<'_>) -> Result<StagePlan> {
        let codec = frame_codec(req.target_format).ok_or_else(|| {
            Error::Validation(format!(
                "unsupported frame format '{}'; expected one of: {}",
                req.target_format,
                FRAME_EXTENSIONS.join(", ")
            ))
        })?;
        let duration = self.source_duration(req.input).await;
        let output = OutputTarget::FrameDirectory(req.output.to_path_buf());

        if !req.options.reshapes_video() {
            return Ok(StagePlan {
                stages: vec![extract_frames_stage(
                    req.input,
                    req.output,
                    req.target_format,
                    codec,
                    PercentRange::FULL,
                    duration,
                )],
                intermediates: Vec::new(),
                output,
            });
        }

        // Reshape first so the extractor sees exactly the requested frames.
        let intermediate = intermediate_path(req.output);
        let mut reshape = input_args(req.input);
        reshape.extend(
            ["-an", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-vf"]
                .into_iter()
                .map(String::from),
        );
        reshape.push(filter_chain(req.options));
        reshape.push(path_arg(&intermediate));

        Ok(StagePlan {
            stages: vec![
                Stage {
                    label: "reshape video",
                    args: reshape,
                    range: PercentRange::new(0.0, 50.0),
                    duration_secs: duration,
                },
                extract_frames_stage(
                    &intermediate,
                    req.output,
                    req.target_format,
                    codec,
                    PercentRange::new(50.0, 100.0),
                    duration,
                ),
            ],
            intermediates: vec![intermediate],
            output,
        })
    }

    /// Duration is only needed for progress on video sources, so a failed
    /// probe degrades to no progress instead of failing the job.
    async fn source_duration(&self, input: &Path) -> Option<f64> {
        match self.prober.duration_seconds(input).await {
            Ok(duration) => duration,
            Err(e) => {
                tracing::debug!("Could not probe {} for duration: {e}", input.display());
                None
            }
        }
    }
}

fn input_args(input: &Path) -> Vec<String> {
    vec!["-i".into(), path_arg(input)]
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Combined `-vf` chain for resolution and frame rate.
fn filter_chain(options: &TransformOptions) -> String {
    let mut filters = Vec::new();
    if let Some(resolution) = options.resolution {
        filters.push(resolution.scale_filter());
    }
    if let Some(fps) = options.fps {
        filters.push(format!("fps={fps}"));
    }
    filters.join(",")
}

fn intermediate_path(frames_dir: &Path) -> PathBuf {
    let parent = frames_dir.parent().unwrap_or(frames_dir);
    parent.join(format!("{}-intermediate.mp4", Uuid::new_v4()))
}

fn extract_frames_stage(
    input: &Path,
    frames_dir: &Path,
    ext: &str,
    codec: &str,
    range: PercentRange,
    duration_secs: Option<f64>,
) -> Stage {
    let mut args = input_args(input);
    args.extend(
        ["-an", "-c:v", codec, "-f", "image2", "-start_number", "1", "-vsync", "0"]
            .into_iter()
            .map(String::from),
    );
    args.push(path_arg(&frames_dir.join(format!("frame_%05d.{ext}"))));

    Stage {
        label: "extract frames",
        args,
        range,
        duration_secs,
    }
}
