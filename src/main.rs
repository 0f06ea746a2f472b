mod cli;

use mediaforge::{config, JobOrchestrator};
use mediaforge_av::{codecs, formats, FfprobeProber, Prober, ToolRegistry};
use mediaforge_common::{
    ConversionCategory, JobId, ProgressEvent, RawOptions, SourceFile, TransformOptions,
    TransformRequest,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediaforge=trace,mediaforge_av=trace,mediaforge_common=debug".to_string()
        } else {
            "mediaforge=info,mediaforge_av=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            input,
            category,
            to,
            bitrate,
            resolution,
            fps,
            output,
            job_id,
        } => {
            let raw = RawOptions {
                bitrate,
                resolution,
                fps,
            };
            let job = ConvertJob {
                input,
                category,
                to,
                raw,
                output,
                job_id,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_file(job, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::Formats { category } => list_formats(category.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediaforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

struct ConvertJob {
    input: PathBuf,
    category: String,
    to: String,
    raw: RawOptions,
    output: Option<PathBuf>,
    job_id: Option<String>,
}

async fn convert_file(job: ConvertJob, config_path: Option<&Path>) -> Result<()> {
    // Validate everything cheap before touching config or tools.
    let category: ConversionCategory = job.category.parse()?;
    let options = TransformOptions::try_from(job.raw)?;
    if !job.input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", job.input);
    }

    let config = config::load_config_or_default(config_path)?;
    let orchestrator = Arc::new(
        JobOrchestrator::builder(config)
            .build()
            .context("Failed to set up conversion")?,
    );

    let job_id = job.job_id.map(JobId::from).unwrap_or_else(JobId::generate);
    let request = TransformRequest::new(
        job_id.clone(),
        SourceFile::from_path(&job.input),
        category,
        &job.to,
        options,
    );

    let mut events = orchestrator.subscribe(&job_id);
    let progress = tokio::spawn(async move {
        let mut stderr = std::io::stderr();
        while let Some(event) = events.next().await {
            match event {
                ProgressEvent::Progress { percent } => {
                    let _ = write!(stderr, "\rProgress: {percent:>5.1}%");
                }
                ProgressEvent::Complete => {
                    let _ = writeln!(stderr, "\rProgress: 100.0%");
                }
                ProgressEvent::Error { .. } | ProgressEvent::Cancelled => {
                    let _ = writeln!(stderr);
                }
            }
            let _ = stderr.flush();
        }
    });

    let submit = orchestrator.submit(request);
    tokio::pin!(submit);
    let result = loop {
        tokio::select! {
            result = &mut submit => break result,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!("Failed to listen for Ctrl-C: {e}");
                    break (&mut submit).await;
                }
                eprintln!("\nCancelling {job_id}...");
                orchestrator.cancel(&job_id);
            }
        }
    };
    let _ = progress.await;

    let Some(output) = result.with_context(|| format!("Conversion of {:?} failed", job.input))?
    else {
        anyhow::bail!("Conversion cancelled");
    };

    let destination = job
        .output
        .unwrap_or_else(|| PathBuf::from(&output.filename));
    std::fs::write(&destination, &output.bytes)
        .with_context(|| format!("Failed to write output: {:?}", destination))?;

    println!(
        "Wrote {} ({}, {} bytes)",
        destination.display(),
        output.content_type,
        output.bytes.len()
    );
    Ok(())
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools);
    let prober = FfprobeProber::from_registry(&tools)?;
    let summary = prober.probe(file).await?;

    if json {
        let json_str = serde_json::to_string_pretty(&summary)?;
        println!("{}", json_str);
    } else {
        println!("File: {}", file.display());
        if let Some(ref container) = summary.container {
            println!("Container: {}", container);
        }
        if let Some(duration) = summary.duration_secs {
            let secs = duration as u64;
            let mins = secs / 60;
            let hours = mins / 60;
            println!("Duration: {:02}:{:02}:{:02}", hours, mins % 60, secs % 60);
        }
        println!("Video streams: {}", summary.video_streams);
        println!("Audio streams: {}", summary.audio_streams);
    }

    Ok(())
}

fn list_formats(category: Option<&str>) -> Result<()> {
    let categories = match category {
        Some(c) => vec![c.parse::<ConversionCategory>()?],
        None => ConversionCategory::ALL.to_vec(),
    };

    for category in &categories {
        println!("{}:", category);
        println!(
            "  sources: {}",
            formats::allowed_source_extensions(*category).join(" ")
        );
    }

    let wants = |c: ConversionCategory| categories.contains(&c);

    if wants(ConversionCategory::VideoToAudio) || wants(ConversionCategory::AudioToAudio) {
        println!("\nAudio targets:");
        for (ext, profile) in codecs::audio_profiles() {
            print!("  {:<6} {}", ext, profile.codec);
            if !profile.supports_bitrate {
                print!(" (lossless)");
            }
            if let Some(muxer) = profile.muxer {
                print!(" [muxer {}]", muxer);
            }
            println!();
        }
        println!("  other  {} (default)", codecs::DEFAULT_AUDIO_PROFILE.codec);
    }

    if wants(ConversionCategory::VideoToVideo) {
        println!("\nVideo targets:");
        for (ext, profile) in codecs::video_profiles() {
            println!(
                "  {:<6} {} + {}",
                ext,
                profile.video_codec,
                profile.audio_codec.unwrap_or("no audio")
            );
        }
    }

    if wants(ConversionCategory::VideoToImage) {
        println!("\nFrame targets:");
        for ext in formats::FRAME_EXTENSIONS {
            println!("  {:<6} {}", ext, codecs::frame_codec(ext).unwrap_or("?"));
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable conversions.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            print_config(&config);
        }
    }

    Ok(())
}

fn print_config(config: &config::Config) {
    println!("  Scratch dir: {}", config.scratch.root().display());
    println!(
        "  Progress: capacity {}, settled retention {}",
        config.progress.channel_capacity, config.progress.settled_retention
    );
    match config.engine.stage_timeout_secs {
        Some(secs) => println!("  Stage timeout: {}s", secs),
        None => println!("  Stage timeout: none"),
    }
}
