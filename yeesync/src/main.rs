//! yeesync: entry point.
//!
//! ```text
//! yeesync                      Discover a bulb and open the console
//! yeesync --config <path>      Load a custom config TOML
//! yeesync --address <ip>       Fallback address when discovery finds nothing
//! yeesync --sync               Start ambient sync right after connecting
//! yeesync --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use yeesync::config::YeesyncConfig;
use yeesync::console::{self, Flow};
use yeesync_core::{DeviceSession, DxgiScreens};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "yeesync", about = "Yeelight console with screen ambient sync")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "yeesync.toml")]
    config: PathBuf,

    /// Bulb address used when discovery finds nothing (overrides config).
    #[arg(short, long)]
    address: Option<String>,

    /// Start ambient sync once the session is ready.
    #[arg(long)]
    sync: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&YeesyncConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let config = YeesyncConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("yeesync v{}", env!("CARGO_PKG_VERSION"));

    let session = Arc::new(DeviceSession::new(
        config.to_session_config(cli.address.as_deref()),
        Arc::new(config.to_locator()),
        Arc::new(DxgiScreens::default()),
    ));

    session.initialize().await?;

    if cli.sync {
        let outcome = session.set_sync_running(true).await;
        if !outcome.is_done() {
            error!("could not start sync: {outcome:?}");
        }
    }

    println!("{}", console::status(&session));
    println!("type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match console::parse_command(&line) {
                    Ok(Some(command)) => {
                        if console::dispatch(&session, command) == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(msg) => println!("{msg}"),
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
