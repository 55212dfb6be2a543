use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use mpv_bridge::engine::default_backend;
use mpv_bridge::{
    logging, BridgeConfig, EngineEvent, EngineEventId, EngineHandle, EventDispatcher,
    EventSubscription, LogLevel, PlaybackTracker,
};

#[derive(Parser, Debug)]
#[command(
    name = "mpv_bridge_cli",
    about = "Drive a playback session from the command line and print its events"
)]
struct Cli {
    /// Configuration file (defaults to assets/bridge_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Send engine and bridge logs to stderr
    #[arg(long)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a file and stream its events as JSON lines
    Play {
        url: String,
        /// Stop listening after this many milliseconds
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
        /// Print the track list once streaming stops
        #[arg(long)]
        tracks: bool,
    },
    /// Print the effective configuration
    DumpConfig,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    if cli.verbose {
        init_stderr_logging();
    }

    let config = match &cli.config {
        Some(path) => BridgeConfig::load_from_file(path),
        None => BridgeConfig::load_from_file("assets/bridge_config.json"),
    };

    match cli.command {
        Commands::Play {
            url,
            timeout_ms,
            tracks,
        } => run_play(config, &url, Duration::from_millis(timeout_ms), tracks),
        Commands::DumpConfig => run_dump(&config),
    }
}

fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(logging::tracing_level(LogLevel::V))
        .try_init();
}

fn run_play(config: BridgeConfig, url: &str, timeout: Duration, tracks: bool) -> Result<ExitCode> {
    let engine = EngineHandle::with_backend(
        default_backend(),
        Arc::new(EventDispatcher::new()),
        config,
    );
    let tracker = Arc::new(PlaybackTracker::new());
    engine.dispatcher().register(&tracker);
    let mut events = engine.subscribe_events();

    engine.start().context("starting engine session")?;
    engine
        .load_file(url)
        .with_context(|| format!("loading {}", url))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("building event runtime")?;

    let ended = runtime.block_on(stream_events(&mut events, timeout))?;

    if tracks {
        for track in engine.track_list().context("reading track list")? {
            let marker = if track.selected { "*" } else { " " };
            eprintln!("{} {:?} {}", marker, track.kind, track.label());
        }
    }

    let snapshot = tracker.snapshot();
    eprintln!("{}", snapshot.progress_label());
    if ended {
        let report = engine.end_file_report()?;
        eprintln!("ended: {} ({})", report.reason, report.error);
    }

    engine.destroy().context("destroying engine session")?;
    Ok(ExitCode::from(0))
}

/// Print events until the file ends or `timeout` elapses. Returns whether
/// the file ended.
async fn stream_events(events: &mut EventSubscription, timeout: Duration) -> Result<bool> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return Ok(false),
            event = events.next() => {
                let Some(event) = event else {
                    return Ok(true);
                };
                println!("{}", serde_json::to_string(&event)?);
                if matches!(
                    event,
                    EngineEvent::Lifecycle {
                        id: EngineEventId::EndFile | EngineEventId::Shutdown
                    }
                ) {
                    return Ok(true);
                }
            }
        }
    }
}

fn run_dump(config: &BridgeConfig) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(ExitCode::from(0))
}
