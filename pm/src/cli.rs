//! CLI argument parsing

use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::Parser;
use tracing::debug;

use crate::monitor::Baud;

/// Portamon - live particle counter monitor
#[derive(Parser, Debug)]
#[command(
    name = "pm",
    author,
    version,
    about = "Live particle counter monitor with y-axes synchronized across instances"
)]
pub struct Cli {
    /// Serial device the instrument is attached to, or `-` for stdin (headless only)
    #[arg(value_name = "DEVICE")]
    pub device: PathBuf,

    /// Line speed (300, 600, 1200, 2400 or 9600)
    #[arg(short, long, default_value = "9600")]
    pub baud: Baud,

    /// File receiving a copy of everything read; must not exist yet
    #[arg(long, value_name = "PATH")]
    pub capture: Option<PathBuf>,

    /// Number of cooperating instances
    #[arg(short = 'n', long, value_name = "N")]
    pub total: usize,

    /// This instance's index, 0-based and below --total
    #[arg(short, long, value_name = "I")]
    pub index: usize,

    /// Point colour as R,G,B (overrides config)
    #[arg(long, value_name = "R,G,B", value_parser = parse_color)]
    pub color: Option<[u8; 3]>,

    /// Run without the terminal view; quit on SIGINT/SIGTERM
    #[arg(long)]
    pub headless: bool,

    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,
}

impl Cli {
    /// Whether the instrument stream is standard input
    pub fn reads_stdin(&self) -> bool {
        self.device.as_os_str() == "-"
    }
}

/// Parse `R,G,B` with each component in 0..=255
pub fn parse_color(s: &str) -> Result<[u8; 3], String> {
    debug!(%s, "parse_color: called");
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [r, g, b] = parts[..] else {
        return Err(format!("expected R,G,B, got '{s}'"));
    };
    let component = |c: &str| c.parse::<u8>().map_err(|_| format!("invalid colour component '{c}' (0-255)"));
    Ok([component(r)?, component(g)?, component(b)?])
}

/// Log file for an instance
pub fn get_log_path(index: usize) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("portamon")
        .join("logs")
        .join(format!("portamon-{index}.log"))
}

/// Default capture file name: `portamon-<index>-<YYYYmmdd-HHMMSS>.txt`
pub fn default_capture_path(index: usize, now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("portamon-{index}-{}.txt", now.format("%Y%m%d-%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("255,0,128"), Ok([255, 0, 128]));
        assert_eq!(parse_color(" 1, 2 ,3"), Ok([1, 2, 3]));
        assert!(parse_color("256,0,0").is_err());
        assert!(parse_color("1,2").is_err());
        assert!(parse_color("red").is_err());
    }

    #[test]
    fn test_minimal_invocation() {
        let cli = Cli::try_parse_from(["pm", "/dev/ttyUSB0", "--total", "2", "--index", "1"]).unwrap();
        assert_eq!(cli.baud, Baud::B9600);
        assert_eq!((cli.total, cli.index), (2, 1));
        assert!(!cli.headless);
        assert!(!cli.reads_stdin());
    }

    #[test]
    fn test_invalid_baud_is_rejected() {
        assert!(Cli::try_parse_from(["pm", "/dev/ttyUSB0", "-n", "1", "-i", "0", "--baud", "4800"]).is_err());
    }

    #[test]
    fn test_stdin_device() {
        let cli = Cli::try_parse_from(["pm", "-", "-n", "1", "-i", "0", "--headless", "--color", "0,255,0"]).unwrap();
        assert!(cli.reads_stdin());
        assert_eq!(cli.color, Some([0, 255, 0]));
    }

    #[test]
    fn test_default_capture_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(default_capture_path(3, now), PathBuf::from("portamon-3-20240309-140507.txt"));
    }
}
