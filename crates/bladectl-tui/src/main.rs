//! `bladectl`: keyboard control of a blade's per-source color correction.
//!
//! Digit keys pick the source routed to the output; `e`/`d` nudge hue and
//! `r`/`f` nudge saturation on the selected source, repeating while held.
//! Every key only moves the target record; a background convergence loop
//! keeps the (simulated) blade in line with it.
//!
//! Logs are written to a file (default `/tmp/bladectl.log`) to avoid
//! corrupting the terminal UI.

mod action;
mod app;
mod bridge;
mod event;
mod theme;
mod tui;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use bladectl_config::Config;

use crate::app::App;

/// Keyboard-driven hue/saturation control for a multi-source blade.
#[derive(Parser, Debug)]
#[command(name = "bladectl", version, about)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, env = "BLADECTL_CONFIG")]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long, conflicts_with = "print_config")]
    write_config: bool,

    /// Log file path (defaults to /tmp/bladectl.log)
    #[arg(long, default_value = "/tmp/bladectl.log")]
    log_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Set up file-based tracing. Nothing may log to stdout/stderr while the
/// TUI owns the terminal. The returned guard flushes logs on drop.
fn setup_tracing(cli: &Cli) -> WorkerGuard {
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("bladectl={log_level},bladectl_core={log_level}"))
    });

    let log_dir = cli
        .log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(std::path::Path::new("/tmp"));
    let log_filename = cli
        .log_file
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("bladectl.log"));

    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => bladectl_config::load_config_from(path)?,
        None => bladectl_config::load_config()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Install panic/error hooks BEFORE entering the terminal
    tui::install_hooks()?;

    let config = load_config(&cli)?;
    if cli.print_config {
        print!("{}", bladectl_config::to_toml(&config)?);
        return Ok(());
    }
    if cli.write_config {
        let path = cli.config.clone().unwrap_or_else(bladectl_config::config_path);
        bladectl_config::save_config_to(&config, &path)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let _log_guard = setup_tracing(&cli);
    info!(
        slots = config.reconciler.slots,
        tolerance = config.reconciler.tolerance,
        "starting bladectl"
    );

    let mut app = App::new(&config)?;
    app.run().await?;

    Ok(())
}
