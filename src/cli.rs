use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediaforge")]
#[command(author, version, about = "Media transformation job runner built on ffmpeg")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a media file
    Convert {
        /// Source media file
        #[arg(required = true)]
        input: PathBuf,

        /// Conversion category: video-audio, audio-audio, video-video, video-image
        #[arg(long)]
        category: String,

        /// Target format extension (mp3, webm, png, ...)
        #[arg(long = "to")]
        to: String,

        /// Audio bitrate, e.g. 192k
        #[arg(long)]
        bitrate: Option<String>,

        /// Output resolution, e.g. 1280x720
        #[arg(long)]
        resolution: Option<String>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<f64>,

        /// Where to write the result (defaults to the suggested name in the
        /// current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Job id to use (random if not specified)
        #[arg(long)]
        job_id: Option<String>,
    },

    /// Probe a media file and display its streams
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List accepted source formats and codec choices
    Formats {
        /// Only show one category
        #[arg(long)]
        category: Option<String>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
