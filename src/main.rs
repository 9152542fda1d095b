//! towel - rest break enforcer for X11 desktops.
//!
//! Tracks how long the user has been active and, every fifty minutes of work,
//! locks the screen behind a five minute countdown.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use towel::config::Config;
use towel::daemon;
use towel::display::{DisplayServerAdapter, X11Display, X11Renderer, X11Session};
use towel::idle;
use towel::machine::{BreakStateMachine, Schedule};
use towel::notify::Notifier;

/// Rest break enforcer for X11.
///
/// Covers the screen with a countdown after long stretches of activity.
#[derive(Parser, Debug)]
#[command(name = "towel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// X display to use (overrides config and $DISPLAY).
    #[arg(short, long)]
    display: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Disable desktop notifications.
    #[arg(long)]
    no_notify: bool,

    /// Print idle time samples and exit.
    #[arg(long)]
    probe: bool,

    /// Number of samples to print in probe mode.
    #[arg(long, default_value = "5")]
    probe_count: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level)?;

    info!("towel v{} starting", env!("CARGO_PKG_VERSION"));

    // Load config
    let mut config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    if args.display.is_some() {
        config.display = args.display;
    }
    if args.no_notify {
        config.notifications = false;
    }

    info!(
        "Configuration loaded (display={}, notifications={})",
        config.display.as_deref().unwrap_or("$DISPLAY"),
        config.notifications
    );

    let session = match X11Session::connect(config.display.as_deref()) {
        Ok(session) => session,
        Err(e) => {
            error!("Could not use the X server: {}", e);
            for diag in X11Session::get_diagnostics() {
                error!("  {}", diag);
            }
            return Err(e).context("X11 connection failed");
        }
    };
    for diag in X11Session::get_diagnostics() {
        debug!("{}", diag);
    }

    let mut display = X11Display::new(session.clone());

    // Probe mode
    if args.probe {
        return run_probe(&mut display, args.probe_count).await;
    }

    let mut renderer = X11Renderer::new(session, config.shadow_offset);
    let notifier = Notifier::new(config.notifications);
    let mut machine = BreakStateMachine::new(Schedule::default());

    daemon::run(
        &mut machine,
        &mut display,
        &mut renderer,
        &notifier,
        shutdown_signal(),
    )
    .await
    .context("Break enforcer stopped")
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("towel={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

/// Print a few idle samples, one second apart, and exit.
async fn run_probe(display: &mut impl DisplayServerAdapter, count: usize) -> Result<()> {
    info!("Running in probe mode, taking {} samples", count);

    for n in 1..=count {
        let sample = idle::sample(display).context("Idle query failed")?;
        println!("[{n}] idle={}s", sample.seconds_since_last_input);
        if n < count {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
