//! CRYB calls - call lifecycle state machine and terminal call console
//!
//! Tracks one voice/video/screen-share call through connecting, connected,
//! reconnecting and disconnecting states, with a live duration and a status
//! indicator.

mod calling;
mod config;
mod simulate;
mod tui;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use calling::{CallController, CallType};
use config::Config;
use tui::log_capture::LogBuffer;

#[derive(Parser)]
#[command(name = "cryb-calls")]
#[command(about = "Call lifecycle console for CRYB", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the interactive call console
    Tui,

    /// Run a scripted call without a UI and print every state change
    Simulate {
        /// Call type: voice, video or screen_share
        #[arg(short = 't', long, default_value = "video")]
        call_type: CallType,

        /// Room identifier (random if omitted)
        #[arg(short, long)]
        room: Option<String>,

        /// Join as host
        #[arg(long)]
        host: bool,

        /// Seconds to stay connected before (and after) a drop
        #[arg(short, long, default_value = "3")]
        connected: u64,

        /// Failed reconnection attempts after a simulated drop (0 = no drop)
        #[arg(short, long, default_value = "0")]
        drops: u32,

        /// Print one JSON object per snapshot
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write a config file with default values
        #[arg(long)]
        init: bool,
    },
}

fn init_logging(verbose: bool, capture: Option<LogBuffer>) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    match capture {
        Some(buffer) => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(buffer),
            )
            .init(),
        None => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The console owns the screen, so its logs go to the in-app pane.
    let capture = matches!(cli.command, Commands::Tui).then(LogBuffer::new);
    init_logging(cli.verbose, capture.clone());

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Tui => {
            let controller = CallController::new(config.call_policy());
            tui::run(controller, capture.unwrap_or_default()).await?;
        }
        Commands::Simulate {
            call_type,
            room,
            host,
            connected,
            drops,
            json,
        } => {
            let mut scenario = simulate::Scenario {
                call_type,
                is_host: host,
                connected: Duration::from_secs(connected),
                drops,
                json,
                ..simulate::Scenario::default()
            };
            if let Some(room) = room {
                scenario.room_id = room;
            }
            let session = simulate::run(config.call_policy(), scenario).await?;
            if session.state == calling::CallState::Failed {
                anyhow::bail!(
                    "Call failed: {}",
                    session
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
        Commands::Config { init } => {
            let path = Config::resolve_path(cli.config.as_deref())?;
            if init {
                if path.exists() {
                    tracing::warn!("Config already exists at {}, leaving it untouched", path.display());
                } else {
                    let written = Config::default().save(Some(&path))?;
                    println!("Wrote default config to {}", written.display());
                }
            }
            println!("Config file: {}", path.display());
            println!(
                "  max_reconnection_attempts = {}",
                config.call.max_reconnection_attempts
            );
            println!("  end_call_delay_ms = {}", config.call.end_call_delay_ms);
            println!("  duration_tick_ms = {}", config.call.duration_tick_ms);
        }
    }

    Ok(())
}
