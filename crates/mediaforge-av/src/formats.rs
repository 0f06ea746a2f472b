//! Static format tables: accepted source extensions per conversion category,
//! content types, and download names.

use std::path::Path;

use mediaforge_common::{ConversionCategory, Error, Result};

/// Video containers accepted as conversion sources.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "mov", "avi", "flv", "webm", "ts", "m2ts", "3gp", "ogv", "gif", "mxf", "vob",
    "mpg", "mpeg", "wmv", "f4v", "m4v", "nut",
];

/// Audio containers accepted as conversion sources.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "aac", "flac", "ogg", "oga", "m4a", "opus", "alac", "wma", "amr", "aiff", "aif",
    "au", "ac3", "dts", "mp2", "spx",
];

/// Image formats frames can be extracted to.
pub const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "webp"];

/// Source extensions accepted for a conversion category.
pub fn allowed_source_extensions(category: ConversionCategory) -> &'static [&'static str] {
    match category {
        ConversionCategory::VideoToAudio
        | ConversionCategory::VideoToVideo
        | ConversionCategory::VideoToImage => VIDEO_EXTENSIONS,
        ConversionCategory::AudioToAudio => AUDIO_EXTENSIONS,
    }
}

/// Reject a source whose extension is not on the category's allow-list.
pub fn validate_source_extension(category: ConversionCategory, ext: Option<&str>) -> Result<()> {
    let allowed = allowed_source_extensions(category);
    match ext {
        Some(ext) if allowed.contains(&ext) => Ok(()),
        Some(ext) => Err(Error::Validation(format!(
            "unsupported source extension '{ext}' for {category} conversion"
        ))),
        None => Err(Error::Validation(format!(
            "source file has no extension; {category} conversion needs one of: {}",
            allowed.join(", ")
        ))),
    }
}

/// Content type for a file extension.
pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "mp3" => "audio/mpeg",
        "mp2" => "audio/mpeg",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "ogg" | "oga" | "spx" => "audio/ogg",
        "opus" => "audio/opus",
        "m4a" | "alac" => "audio/mp4",
        "wma" => "audio/x-ms-wma",
        "amr" => "audio/amr",
        "aiff" | "aif" => "audio/aiff",
        "au" => "audio/basic",
        "ac3" => "audio/ac3",
        "dts" => "audio/vnd.dts",
        "mp4" | "m4v" | "f4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "flv" => "video/x-flv",
        "ts" | "m2ts" => "video/mp2t",
        "3gp" => "video/3gpp",
        "ogv" => "video/ogg",
        "mpg" | "mpeg" | "vob" => "video/mpeg",
        "wmv" => "video/x-ms-wmv",
        "gif" => "image/gif",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "tiff" => "image/tiff",
        "webp" => "image/webp",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Download name for an output: the original stem with the new extension.
pub fn output_file_name(original_name: &str, ext: &str) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "processed-file".to_string());
    format!("{stem}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_categories_share_the_video_list() {
        for category in [
            ConversionCategory::VideoToAudio,
            ConversionCategory::VideoToVideo,
            ConversionCategory::VideoToImage,
        ] {
            assert!(validate_source_extension(category, Some("mov")).is_ok());
            assert!(validate_source_extension(category, Some("mp3")).is_err());
        }
    }

    #[test]
    fn audio_category_uses_audio_list() {
        let category = ConversionCategory::AudioToAudio;
        assert!(validate_source_extension(category, Some("flac")).is_ok());
        let err = validate_source_extension(category, Some("mp4")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("'mp4'"));
    }

    #[test]
    fn missing_extension_is_rejected() {
        let err = validate_source_extension(ConversionCategory::VideoToVideo, None).unwrap_err();
        assert!(err.to_string().contains("no extension"));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("mp3"), "audio/mpeg");
        assert_eq!(content_type_for("zip"), "application/zip");
        assert_eq!(content_type_for("webm"), "video/webm");
        assert_eq!(content_type_for("xyz"), "application/octet-stream");
    }

    #[test]
    fn output_names() {
        assert_eq!(output_file_name("holiday.mov", "mp3"), "holiday.mp3");
        assert_eq!(output_file_name("my.clip.v2.mp4", "zip"), "my.clip.v2.zip");
        assert_eq!(output_file_name("", "wav"), "processed-file.wav");
    }
}
