use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "loopframe", version)]
struct Cli {
    /// Log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print image and frame properties as JSON.
    Info(InfoArgs),
    /// Decode a single composited frame to a PNG.
    Frame(FrameArgs),
    /// Stream the file into a player and drive it on a simulated clock.
    Play(PlayArgs),
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Input animated image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Pretty-print the JSON.
    #[arg(long)]
    pretty: bool,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input animated image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Frame index (0-based).
    #[arg(long)]
    frame: usize,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct PlayArgs {
    /// Input animated image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Player configuration JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bytes fed to the decoder per tick, 0 feeds everything up front.
    #[arg(long, default_value_t = 4096)]
    chunk_size: usize,

    /// Number of clock ticks to run.
    #[arg(long, default_value_t = 120)]
    ticks: u32,

    /// Simulated time between ticks in milliseconds.
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,

    /// Display scale factor.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,
}

#[derive(serde::Serialize)]
struct PlayReport {
    state: loopframe::PlaybackState,
    playback: loopframe::PlaybackStats,
    cache: loopframe::CacheStats,
    image: loopframe::ImageProperties,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Info(args) => cmd_info(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Play(args) => cmd_play(args),
    }
}

fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))
}

fn cmd_info(args: InfoArgs) -> anyhow::Result<()> {
    let bytes = read_image(&args.in_path)?;
    let img = loopframe::AnimatedImage::from_bytes(&bytes)?;
    let props = img.properties();
    let json = if args.pretty {
        serde_json::to_string_pretty(&props)?
    } else {
        serde_json::to_string(&props)?
    };
    println!("{json}");
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let bytes = read_image(&args.in_path)?;
    let img = loopframe::AnimatedImage::from_bytes(&bytes)?;
    let frame_count = img.frame_count();
    if args.frame >= frame_count {
        anyhow::bail!("frame {} out of range (image has {frame_count})", args.frame);
    }
    let frame = img
        .frame_for_encoding(args.frame)
        .with_context(|| format!("frame {} could not be decoded", args.frame))?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.pixels,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_play(args: PlayArgs) -> anyhow::Result<()> {
    let bytes = read_image(&args.in_path)?;
    let config = match &args.config {
        Some(path) => loopframe::PlayerConfig::from_json_path(path)?,
        None => loopframe::PlayerConfig::default(),
    };

    let img = loopframe::AnimatedImage::streaming(args.scale)?;
    let mut player = img.player(&config)?;

    let chunk_size = if args.chunk_size == 0 {
        bytes.len().max(1)
    } else {
        args.chunk_size
    };
    let mut chunks = bytes.chunks(chunk_size).peekable();
    if chunks.peek().is_none() {
        img.update_data(&[], true)?;
    }

    let tick = std::time::Duration::from_millis(args.tick_ms).as_secs_f64();
    let mut dropped = 0u64;
    for _ in 0..args.ticks {
        if let Some(chunk) = chunks.next() {
            img.update_data(chunk, chunks.peek().is_none())?;
        }
        let report = player.advance(tick);
        dropped += u64::from(report.dropped_frames);
        if report.finished {
            tracing::info!(index = report.current_index, "playback finished");
            break;
        }
    }
    // Anything not fed during the run still completes the image for the report.
    let rest: Vec<u8> = chunks.flatten().copied().collect();
    if !img.decoder().is_finalized() {
        img.update_data(&rest, true)?;
    }
    tracing::debug!(dropped, "run complete");

    let report = PlayReport {
        state: player.playback_state(),
        playback: player.stats(),
        cache: player.cache().stats(),
        image: img.properties(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
