pub use mediaforge_common::config::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default config locations, searched in order.
const DEFAULT_PATHS: &[&str] = &[
    "./mediaforge.toml",
    "./config.toml",
    "~/.config/mediaforge/config.toml",
    "/etc/mediaforge/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Expand `~` in configured paths.
fn expand_paths(config: &mut Config) {
    let expand = |p: &mut Option<PathBuf>| {
        if let Some(path) = p.as_mut() {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
            *path = PathBuf::from(expanded);
        }
    };

    expand(&mut config.tools.ffmpeg_path);
    expand(&mut config.tools.ffprobe_path);
    expand(&mut config.scratch.dir);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_all_sections() {
        let file = write_config(
            r#"
[tools]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

[scratch]
dir = "/var/tmp/mediaforge"

[progress]
channel_capacity = 16
settled_retention = 8

[engine]
stage_timeout_secs = 600
"#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(
            config.tools.ffmpeg_path.as_deref(),
            Some(Path::new("/opt/ffmpeg/bin/ffmpeg"))
        );
        assert_eq!(config.tools.ffprobe_path, None);
        assert_eq!(config.scratch.root(), PathBuf::from("/var/tmp/mediaforge"));
        assert_eq!(config.progress.channel_capacity, 16);
        assert_eq!(config.progress.settled_retention, 8);
        assert_eq!(config.engine.stage_timeout_secs, Some(600));
    }

    #[test]
    fn empty_file_gives_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.progress.channel_capacity, 64);
        assert_eq!(config.engine.stage_timeout_secs, None);
    }

    #[test]
    fn tilde_is_expanded() {
        let file = write_config("[scratch]\ndir = \"~/mediaforge-scratch\"\n");
        let config = load_config(file.path()).unwrap();
        let dir = config.scratch.dir.unwrap();
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.ends_with("mediaforge-scratch"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_config("[progress]\nchannel_capacity = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("channel_capacity"));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let file = write_config("[progress\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        assert!(load_config_or_default(Some(Path::new("/no/such/mediaforge.toml"))).is_err());
    }
}
