//! socksvpn - controller for an autossh SOCKS tunnel
//!
//! Main entry point for the command-line application.
//!
//! # Overview
//!
//! This binary initializes:
//! - Logging infrastructure (daily rotating file + optional console output)
//! - Tokio async runtime (4 worker threads for OS commands and timers)
//! - The [`AppController`] with the real OS host, the console sink and the
//!   system editor
//!
//! `socksvpn run` (the default) is interactive: a console reader thread turns
//! typed commands into intents for the controller's dispatch loop, while the
//! status reconciler re-probes the tunnel every few seconds. The other
//! subcommands run one controller operation and exit.
//!
//! # Execution Flow
//!
//! 1. Parse the command line
//! 2. Initialize logging → `<cache dir>/socksvpn/logs/socksvpn.<date>`
//! 3. Create tokio runtime with 4 worker threads
//! 4. Load `~/.vpn.json` (falling back to defaults if it is broken)
//! 5. Run the requested command
//! 6. Log the metrics summary and shut the runtime down with a 5s timeout

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use socksvpn::config::ConfigStore;
use socksvpn::logging::{self, LOG_PREFIX};
use socksvpn::services::{SettleOutcome, SystemEditor, SystemHost};
use socksvpn::ui::{AppController, ConsoleSink, Intent, IntentBridge};
use socksvpn::{APP_NAME, Metrics, Timings, VERSION};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

const INTERACTIVE_HELP: &str = "Commands: connect <name> | disconnect | edit | quit";

#[derive(Parser, Debug)]
#[command(
    name = "socksvpn",
    version,
    about,
    after_help = "Examples:\n  socksvpn\n  socksvpn connect office\n  socksvpn status\n  socksvpn init"
)]
struct Cli {
    /// Configuration file [default: ~/.vpn.json]
    #[arg(long, env = "SOCKSVPN_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    /// Directory for log files [default: <cache dir>/socksvpn/logs]
    #[arg(long)]
    log_dir: Option<Utf8PathBuf>,

    /// Only log to the log file
    #[arg(long)]
    no_console_log: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive controller (default)
    Run,
    /// Connect to a configured server, replacing any running tunnel
    Connect {
        /// Server name from the configuration
        name: String,
    },
    /// Disable the SOCKS proxy and stop the tunnel
    Disconnect,
    /// Probe whether a tunnel is running
    Status,
    /// List configured servers
    Profiles,
    /// Write the example configuration
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.log_dir.clone().unwrap_or_else(logging::default_log_dir);
    let _guard =
        logging::setup_logging_with_console(&log_dir, LOG_PREFIX, cli.debug, !cli.no_console_log)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let store = match cli.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::default_location().context("Failed to locate configuration file")?,
    };
    let command = cli.command.unwrap_or(Command::Run);

    if let Command::Init { force } = command {
        return init(&store, force);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("socksvpn-worker")
        .build()
        .context("Failed to build tokio runtime")?;

    tracing::info!("Tokio runtime initialized with {} worker threads", 4);

    let metrics = Arc::new(Metrics::new());
    let result = runtime.block_on(async {
        let controller = Arc::new(AppController::new(
            store,
            Arc::new(SystemHost::new()),
            Arc::new(ConsoleSink::stdout()),
            Arc::new(SystemEditor::from_env()),
            Timings::default(),
            Arc::clone(&metrics),
        ));
        execute(command, &controller).await
    });

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");
    result
}

fn init(store: &ConfigStore, force: bool) -> Result<()> {
    if store.exists() && !force {
        println!(
            "{} already exists (use --force to overwrite)",
            store.path()
        );
        return Ok(());
    }
    store
        .create_default()
        .with_context(|| format!("Failed to write {}", store.path()))?;
    println!("Wrote example configuration to {}", store.path());
    Ok(())
}

async fn execute(command: Command, controller: &Arc<AppController>) -> Result<()> {
    match command {
        Command::Run => {
            run_interactive(controller).await;
            Ok(())
        }
        Command::Connect { name } => {
            controller.connect(&name).await?;
            Ok(())
        }
        Command::Disconnect => {
            if controller.disconnect().await? == SettleOutcome::TimedOut {
                println!("Tunnel still detected; it may take a moment to exit");
            }
            Ok(())
        }
        Command::Status => {
            let report = controller.status().await;
            match report.method {
                Some(method) => println!("Detected by {}: {}", method, report.detail),
                None => println!("{}", report.detail),
            }
            Ok(())
        }
        Command::Profiles => {
            // Strict load so a broken file is reported instead of an empty list
            let config = controller
                .store()
                .load()
                .with_context(|| format!("Failed to load {}", controller.store().path()))?;
            controller.show_profiles(&config);
            Ok(())
        }
        Command::Init { .. } => Ok(()),
    }
}

async fn run_interactive(controller: &Arc<AppController>) {
    let (bridge, intents) = controller.intent_bridge();

    let ctrl_c_bridge = bridge.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            ctrl_c_bridge.submit(Intent::Quit);
        }
    });

    if let Err(e) = spawn_console_reader(bridge) {
        tracing::error!("Console input unavailable: {:#}", e);
    }

    println!("{}", INTERACTIVE_HELP);
    Arc::clone(controller).run(intents).await;
}

/// Read commands from stdin on a plain thread; EOF counts as quit
fn spawn_console_reader(bridge: IntentBridge) -> Result<()> {
    std::thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            tracing::debug!("Console reader thread started");

            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!("Failed to read console input: {}", e);
                        break;
                    }
                };

                match Intent::parse(&line) {
                    Some(Intent::Quit) => break,
                    Some(intent) => {
                        bridge.submit(intent);
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("{}", INTERACTIVE_HELP),
                }

                if bridge.is_closed() {
                    break;
                }
            }

            bridge.submit(Intent::Quit);
            tracing::debug!("Console reader thread terminated");
        })
        .context("Failed to spawn console reader thread")?;
    Ok(())
}
