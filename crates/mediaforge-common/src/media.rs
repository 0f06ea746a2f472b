//! Request and result types for media transformations.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ids::JobId;

/// Largest accepted output dimension on either axis.
const MAX_DIMENSION: u32 = 8192;

/// Highest accepted output frame rate.
const MAX_FPS: f64 = 240.0;

// ---------------------------------------------------------------------------
// ConversionCategory
// ---------------------------------------------------------------------------

/// Kind of transformation requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionCategory {
    /// Extract the audio track of a video file.
    #[serde(rename = "video_audio")]
    VideoToAudio,
    /// Re-encode an audio file into another audio format.
    #[serde(rename = "audio_audio")]
    AudioToAudio,
    /// Convert a video between containers/codecs.
    #[serde(rename = "video_video")]
    VideoToVideo,
    /// Extract a frame sequence from a video.
    #[serde(rename = "video_image")]
    VideoToImage,
}

impl ConversionCategory {
    /// All categories, in display order.
    pub const ALL: [ConversionCategory; 4] = [
        ConversionCategory::VideoToAudio,
        ConversionCategory::AudioToAudio,
        ConversionCategory::VideoToVideo,
        ConversionCategory::VideoToImage,
    ];

    /// Canonical string form (`video_audio`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionCategory::VideoToAudio => "video_audio",
            ConversionCategory::AudioToAudio => "audio_audio",
            ConversionCategory::VideoToVideo => "video_video",
            ConversionCategory::VideoToImage => "video_image",
        }
    }

    /// What the job produces on disk.
    pub fn output_kind(&self) -> OutputKind {
        match self {
            ConversionCategory::VideoToImage => OutputKind::FrameSequence,
            ConversionCategory::VideoToAudio
            | ConversionCategory::AudioToAudio
            | ConversionCategory::VideoToVideo => OutputKind::File,
        }
    }
}

impl fmt::Display for ConversionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionCategory {
    type Err = Error;

    /// Accepts both `video_audio` and `video-audio` spellings.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "video_audio" => Ok(ConversionCategory::VideoToAudio),
            "audio_audio" => Ok(ConversionCategory::AudioToAudio),
            "video_video" => Ok(ConversionCategory::VideoToVideo),
            "video_image" => Ok(ConversionCategory::VideoToImage),
            other => Err(Error::Validation(format!(
                "unsupported conversion category: {other}"
            ))),
        }
    }
}

/// Shape of a job's raw output before it is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A single media file.
    File,
    /// A directory of numbered frames, archived before return.
    FrameSequence,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Audio bitrate in kilobits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bitrate(u32);

impl Bitrate {
    /// Create a bitrate, rejecting zero.
    pub fn from_kbps(kbps: u32) -> Result<Self> {
        if kbps == 0 {
            return Err(Error::Validation("bitrate must be positive".into()));
        }
        Ok(Self(kbps))
    }

    pub fn kbps(&self) -> u32 {
        self.0
    }

    /// ffmpeg argument form, e.g. `192k`.
    pub fn to_arg(&self) -> String {
        format!("{}k", self.0)
    }
}

impl FromStr for Bitrate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_suffix('k')
            .or_else(|| trimmed.strip_suffix('K'))
            .unwrap_or(trimmed);
        let kbps = digits
            .parse::<u32>()
            .map_err(|_| Error::Validation(format!("invalid bitrate: {s}")))?;
        Self::from_kbps(kbps)
    }
}

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        for (axis, value) in [("width", width), ("height", height)] {
            if value == 0 || value > MAX_DIMENSION {
                return Err(Error::Validation(format!(
                    "resolution {axis} must be between 1 and {MAX_DIMENSION}, got {value}"
                )));
            }
            // yuv420p encoders reject odd dimensions.
            if value % 2 != 0 {
                return Err(Error::Validation(format!(
                    "resolution {axis} must be even, got {value}"
                )));
            }
        }
        Ok(Self { width, height })
    }

    /// ffmpeg `scale` filter for this size.
    pub fn scale_filter(&self) -> String {
        format!("scale={}:{}", self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Validation(format!("invalid resolution (expected WxH): {s}"));
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(width, height)
    }
}

/// Untyped options as received from a collaborator (form fields, JSON body).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    pub bitrate: Option<String>,
    pub resolution: Option<String>,
    pub fps: Option<f64>,
}

/// Validated conversion options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformOptions {
    pub bitrate: Option<Bitrate>,
    pub resolution: Option<Resolution>,
    pub fps: Option<f64>,
}

impl TransformOptions {
    /// Validate a frame rate value.
    pub fn check_fps(fps: f64) -> Result<f64> {
        if !fps.is_finite() || fps <= 0.0 || fps > MAX_FPS {
            return Err(Error::Validation(format!(
                "fps must be greater than 0 and at most {MAX_FPS}, got {fps}"
            )));
        }
        Ok(fps)
    }

    /// Whether the options change the picture (and so force a re-encode
    /// before frame extraction).
    pub fn reshapes_video(&self) -> bool {
        self.fps.is_some() || self.resolution.is_some()
    }
}

impl TryFrom<RawOptions> for TransformOptions {
    type Error = Error;

    fn try_from(raw: RawOptions) -> Result<Self> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Ok(Self {
            bitrate: non_empty(raw.bitrate).map(|s| s.parse()).transpose()?,
            resolution: non_empty(raw.resolution).map(|s| s.parse()).transpose()?,
            fps: raw.fps.map(Self::check_fps).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Request / Output
// ---------------------------------------------------------------------------

/// Where the source bytes live.
#[derive(Debug, Clone)]
pub enum SourceData {
    /// Uploaded bytes held in memory.
    Bytes(Bytes),
    /// A file already on disk. It is copied into scratch space, never
    /// modified or removed.
    Path(PathBuf),
}

/// Source media plus the name it was uploaded under.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub data: SourceData,
    pub original_name: String,
}

impl SourceFile {
    pub fn from_bytes(data: impl Into<Bytes>, original_name: impl Into<String>) -> Self {
        Self {
            data: SourceData::Bytes(data.into()),
            original_name: original_name.into(),
        }
    }

    /// Use a file on disk; the original name is taken from the path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            data: SourceData::Path(path),
            original_name,
        }
    }

    /// Lowercased extension of the original name, without the dot.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.original_name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
    }
}

/// A transformation job as submitted by a caller.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub job_id: JobId,
    pub source: SourceFile,
    pub category: ConversionCategory,
    pub target_format: String,
    pub options: TransformOptions,
}

impl TransformRequest {
    /// Build a request, normalizing the target format to a lowercase
    /// extension without a leading dot.
    pub fn new(
        job_id: JobId,
        source: SourceFile,
        category: ConversionCategory,
        target_format: impl AsRef<str>,
        options: TransformOptions,
    ) -> Self {
        Self {
            job_id,
            source,
            category,
            target_format: normalize_extension(target_format.as_ref()),
            options,
        }
    }
}

/// Lowercase an extension and strip any leading dot.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Finished artifact returned to the caller.
#[derive(Debug, Clone)]
pub struct Output {
    pub bytes: Bytes,
    pub content_type: String,
    /// Suggested download name.
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_both_spellings() {
        assert_eq!(
            "video-audio".parse::<ConversionCategory>().unwrap(),
            ConversionCategory::VideoToAudio
        );
        assert_eq!(
            "video_image".parse::<ConversionCategory>().unwrap(),
            ConversionCategory::VideoToImage
        );
        assert!("mp4_png".parse::<ConversionCategory>().is_err());
    }

    #[test]
    fn category_serde_matches_wire_names() {
        let json = serde_json::to_string(&ConversionCategory::AudioToAudio).unwrap();
        assert_eq!(json, "\"audio_audio\"");
        for category in ConversionCategory::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
    }

    #[test]
    fn only_frame_extraction_produces_sequences() {
        for category in ConversionCategory::ALL {
            let expected = if category == ConversionCategory::VideoToImage {
                OutputKind::FrameSequence
            } else {
                OutputKind::File
            };
            assert_eq!(category.output_kind(), expected);
        }
    }

    #[test]
    fn bitrate_parsing() {
        assert_eq!("192k".parse::<Bitrate>().unwrap().kbps(), 192);
        assert_eq!("320K".parse::<Bitrate>().unwrap().to_arg(), "320k");
        assert_eq!(" 128 ".parse::<Bitrate>().unwrap().kbps(), 128);
        assert!("0k".parse::<Bitrate>().is_err());
        assert!("fast".parse::<Bitrate>().is_err());
    }

    #[test]
    fn resolution_parsing() {
        let r: Resolution = "1280x720".parse().unwrap();
        assert_eq!((r.width, r.height), (1280, 720));
        assert_eq!(r.scale_filter(), "scale=1280:720");
        assert_eq!(r.to_string(), "1280x720");
        assert!("1280".parse::<Resolution>().is_err());
        assert!("0x720".parse::<Resolution>().is_err());
        assert!("641x480".parse::<Resolution>().is_err());
        assert!("10000x720".parse::<Resolution>().is_err());
    }

    #[test]
    fn raw_options_are_validated() {
        let opts = TransformOptions::try_from(RawOptions {
            bitrate: Some("192k".into()),
            resolution: Some("640x360".into()),
            fps: Some(10.0),
        })
        .unwrap();
        assert_eq!(opts.bitrate.unwrap().kbps(), 192);
        assert_eq!(opts.resolution.unwrap().width, 640);
        assert_eq!(opts.fps, Some(10.0));
        assert!(opts.reshapes_video());

        let empty = TransformOptions::try_from(RawOptions {
            bitrate: Some("".into()),
            resolution: Some("  ".into()),
            fps: None,
        })
        .unwrap();
        assert_eq!(empty, TransformOptions::default());
        assert!(!empty.reshapes_video());

        let bad_fps = TransformOptions::try_from(RawOptions {
            fps: Some(-1.0),
            ..Default::default()
        });
        assert!(matches!(bad_fps, Err(Error::Validation(_))));
    }

    #[test]
    fn raw_options_from_json() {
        let raw: RawOptions =
            serde_json::from_str(r#"{"bitrate":"128k","fps":24}"#).unwrap();
        let opts = TransformOptions::try_from(raw).unwrap();
        assert_eq!(opts.bitrate.unwrap().kbps(), 128);
        assert_eq!(opts.fps, Some(24.0));
        assert!(opts.resolution.is_none());
    }

    #[test]
    fn source_extension_is_lowercased() {
        let src = SourceFile::from_bytes(vec![0u8; 4], "Holiday.MOV");
        assert_eq!(src.extension().as_deref(), Some("mov"));
        let none = SourceFile::from_bytes(vec![], "README");
        assert_eq!(none.extension(), None);
        let from_path = SourceFile::from_path("/media/clips/intro.mkv");
        assert_eq!(from_path.original_name, "intro.mkv");
    }

    #[test]
    fn request_normalizes_target() {
        let req = TransformRequest::new(
            JobId::from("a"),
            SourceFile::from_bytes(vec![], "a.mp4"),
            ConversionCategory::VideoToAudio,
            ".MP3",
            TransformOptions::default(),
        );
        assert_eq!(req.target_format, "mp3");
    }
}
