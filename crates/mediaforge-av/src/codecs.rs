//! Codec selection tables for each target format.

/// How to encode audio for a target extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecProfile {
    /// ffmpeg encoder name.
    pub codec: &'static str,
    /// Whether `-b:a` is meaningful for the encoder (false for lossless/PCM).
    pub supports_bitrate: bool,
    /// Explicit muxer when ffmpeg cannot infer one from the extension.
    pub muxer: Option<&'static str>,
    /// Required sample rate, if the encoder only accepts one.
    pub sample_rate: Option<u32>,
    /// Required channel count, if the encoder only accepts one.
    pub channels: Option<u8>,
}

impl CodecProfile {
    const fn lossy(codec: &'static str) -> Self {
        Self {
            codec,
            supports_bitrate: true,
            muxer: None,
            sample_rate: None,
            channels: None,
        }
    }

    const fn lossless(codec: &'static str) -> Self {
        Self {
            codec,
            supports_bitrate: false,
            muxer: None,
            sample_rate: None,
            channels: None,
        }
    }

    const fn with_muxer(mut self, muxer: &'static str) -> Self {
        self.muxer = Some(muxer);
        self
    }
}

/// Profile used for target extensions missing from the table.
pub const DEFAULT_AUDIO_PROFILE: CodecProfile = CodecProfile::lossy("aac");

const AUDIO_PROFILES: &[(&str, CodecProfile)] = &[
    ("mp3", CodecProfile::lossy("libmp3lame")),
    ("aac", CodecProfile::lossy("aac")),
    ("m4a", CodecProfile::lossy("aac")),
    ("ogg", CodecProfile::lossy("libvorbis")),
    ("oga", CodecProfile::lossy("libvorbis")),
    ("opus", CodecProfile::lossy("libopus")),
    ("wma", CodecProfile::lossy("wmav2")),
    ("ac3", CodecProfile::lossy("ac3")),
    ("dts", CodecProfile::lossy("dca")),
    ("mp2", CodecProfile::lossy("mp2")),
    ("spx", CodecProfile::lossy("libspeex").with_muxer("ogg")),
    (
        "amr",
        CodecProfile {
            codec: "libopencore_amrnb",
            supports_bitrate: true,
            muxer: None,
            sample_rate: Some(8000),
            channels: Some(1),
        },
    ),
    ("flac", CodecProfile::lossless("flac")),
    ("wav", CodecProfile::lossless("pcm_s16le")),
    ("alac", CodecProfile::lossless("alac").with_muxer("ipod")),
    ("aiff", CodecProfile::lossless("pcm_s16be")),
    ("aif", CodecProfile::lossless("pcm_s16be").with_muxer("aiff")),
    ("au", CodecProfile::lossless("pcm_s16be")),
];

/// Audio profile for a target extension, if the table knows it.
pub fn known_audio_profile(ext: &str) -> Option<CodecProfile> {
    AUDIO_PROFILES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, profile)| *profile)
}

/// Audio profile for a target extension, falling back to
/// [`DEFAULT_AUDIO_PROFILE`].
pub fn audio_profile(ext: &str) -> CodecProfile {
    known_audio_profile(ext).unwrap_or(DEFAULT_AUDIO_PROFILE)
}

/// Every audio target with its profile, in table order.
pub fn audio_profiles() -> impl Iterator<Item = (&'static str, CodecProfile)> {
    AUDIO_PROFILES.iter().copied()
}

/// How to encode a video container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoProfile {
    pub video_codec: &'static str,
    /// `None` drops audio (formats without an audio track, like GIF).
    pub audio_codec: Option<&'static str>,
    /// Container-specific output flags.
    pub extra_args: &'static [&'static str],
}

/// Profile used for video containers missing from the table.
pub const DEFAULT_VIDEO_PROFILE: VideoProfile = VideoProfile {
    video_codec: "libx264",
    audio_codec: Some("aac"),
    extra_args: &["-pix_fmt", "yuv420p"],
};

const MP4_FAMILY: VideoProfile = VideoProfile {
    video_codec: "libx264",
    audio_codec: Some("aac"),
    extra_args: &["-pix_fmt", "yuv420p", "-movflags", "+faststart"],
};

const VIDEO_PROFILES: &[(&str, VideoProfile)] = &[
    ("mp4", MP4_FAMILY),
    ("m4v", MP4_FAMILY),
    ("mov", MP4_FAMILY),
    ("mkv", DEFAULT_VIDEO_PROFILE),
    (
        "webm",
        VideoProfile {
            video_codec: "libvpx-vp9",
            audio_codec: Some("libopus"),
            extra_args: &["-b:v", "0", "-crf", "32"],
        },
    ),
    (
        "avi",
        VideoProfile {
            video_codec: "mpeg4",
            audio_codec: Some("libmp3lame"),
            extra_args: &["-q:v", "4"],
        },
    ),
    (
        "flv",
        VideoProfile {
            video_codec: "flv1",
            audio_codec: Some("aac"),
            extra_args: &[],
        },
    ),
    (
        "ogv",
        VideoProfile {
            video_codec: "libtheora",
            audio_codec: Some("libvorbis"),
            extra_args: &["-q:v", "7"],
        },
    ),
    (
        "gif",
        VideoProfile {
            video_codec: "gif",
            audio_codec: None,
            extra_args: &["-loop", "0"],
        },
    ),
];

/// Video profile for a target container, falling back to
/// [`DEFAULT_VIDEO_PROFILE`].
pub fn video_profile(ext: &str) -> VideoProfile {
    VIDEO_PROFILES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, profile)| *profile)
        .unwrap_or(DEFAULT_VIDEO_PROFILE)
}

/// Every video target with its profile, in table order.
pub fn video_profiles() -> impl Iterator<Item = (&'static str, VideoProfile)> {
    VIDEO_PROFILES.iter().copied()
}

/// Image encoder for an extracted frame format.
pub fn frame_codec(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("png"),
        "jpg" | "jpeg" => Some("mjpeg"),
        "bmp" => Some("bmp"),
        "tiff" => Some("tiff"),
        "webp" => Some("libwebp"),
        _ => None,
    }
}
