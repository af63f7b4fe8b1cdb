//! Portamon - live particle counter monitor
//!
//! CLI entry point: validates identity, opens the instrument and capture file, joins
//! the instance group and runs the session until quit or end of stream.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, bail};
use ratatui::style::Color;
use tracing::{debug, info};

use portamon::cli::{Cli, default_capture_path, get_log_path};
use portamon::config::Config;
use portamon::monitor::{LineSource, RunOptions, StopReason, open_serial, run_headless, run_tui};
use portamon::{DataIngestionEngine, Instance, Lifecycle, Monitor};

fn parse_level(level: Option<&str>) -> tracing::Level {
    match level.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, headless: bool, index: usize) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = parse_level(cli_log_level.or(config_log_level));
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if headless {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        // The terminal belongs to the view, so logs go to a file
        let log_path = get_log_path(index);
        if let Some(log_dir) = log_path.parent() {
            fs::create_dir_all(log_dir).context("Failed to create log directory")?;
        }
        let log_file = File::create(&log_path).context("Failed to create log file")?;
        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Create the capture file; it must not exist yet
fn create_capture(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .custom_flags(libc::O_CLOEXEC)
        .open(path)
        .wrap_err_with(|| format!("Failed to create capture file {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Identity first: nothing is opened for an instance that cannot exist
    let instance = Instance::new(cli.index, cli.total).context("Invalid instance identity")?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(
        cli.log_level.as_deref(),
        config_log_level.as_deref(),
        cli.headless,
        instance.index(),
    )
    .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    debug!(?config, "main: configuration loaded");

    // Opened now, read only once the group is up
    let reader: Box<dyn Read + Send> = if cli.reads_stdin() {
        if !cli.headless {
            bail!("Reading from stdin requires --headless");
        }
        Box::new(io::stdin())
    } else {
        Box::new(open_serial(&cli.device, cli.baud)?)
    };

    let capture_path = cli
        .capture
        .clone()
        .unwrap_or_else(|| default_capture_path(instance.index(), chrono::Local::now()));
    let capture = create_capture(&capture_path)?;
    info!(path = %capture_path.display(), "Capturing instrument stream");
    let engine = DataIngestionEngine::new(config.mode, capture).context("Failed to build line parser")?;

    let lifecycle = Lifecycle::new(config.segment_prefix.clone(), config.poll_interval());
    let manager = lifecycle.start(instance).context("Failed to join instance group")?;
    let source = LineSource::spawn(reader);

    let [r, g, b] = cli.color.unwrap_or(config.color);
    let options = RunOptions {
        refresh: config.refresh_interval(),
        color: Color::Rgb(r, g, b),
    };

    let mut monitor = Monitor::with_engine(manager, engine);
    let reason = if cli.headless {
        run_headless(&mut monitor, source, options).await?
    } else {
        run_tui(&mut monitor, source, options).await?
    };
    info!(?reason, "Session ended");

    let (manager, mut capture) = monitor.into_parts();
    capture.flush().context("Failed to flush capture file")?;
    lifecycle.stop(manager).context("Failed to leave instance group")?;

    println!(
        "{} instance {} stopped, capture saved to {}",
        "✓".green(),
        instance,
        capture_path.display().to_string().bold()
    );

    match reason {
        StopReason::SourceError(e) => bail!("Instrument stream failed: {e}"),
        StopReason::Quit | StopReason::EndOfStream => Ok(()),
    }
}
