//! Instrument byte source
//!
//! Opening and configuring the serial device, and a reader thread that splits the
//! stream into lines for the session loop.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, IsTerminal, Read};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::str::FromStr;

use eyre::{Context, Result, bail};
use nix::sys::termios::{self, BaudRate, ControlFlags, InputFlags, SetArg};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Line speeds the instrument supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Baud {
    B300,
    B600,
    B1200,
    B2400,
    #[default]
    B9600,
}

impl Baud {
    pub const ALL: [Baud; 5] = [Baud::B300, Baud::B600, Baud::B1200, Baud::B2400, Baud::B9600];

    pub fn bits_per_second(self) -> u32 {
        match self {
            Baud::B300 => 300,
            Baud::B600 => 600,
            Baud::B1200 => 1200,
            Baud::B2400 => 2400,
            Baud::B9600 => 9600,
        }
    }

    fn rate(self) -> BaudRate {
        match self {
            Baud::B300 => BaudRate::B300,
            Baud::B600 => BaudRate::B600,
            Baud::B1200 => BaudRate::B1200,
            Baud::B2400 => BaudRate::B2400,
            Baud::B9600 => BaudRate::B9600,
        }
    }
}

impl fmt::Display for Baud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits_per_second())
    }
}

impl FromStr for Baud {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Baud::ALL
            .into_iter()
            .find(|b| b.bits_per_second().to_string() == s.trim())
            .ok_or_else(|| format!("invalid baud rate '{s}' (expected 300, 600, 1200, 2400 or 9600)"))
    }
}

const FRAMING_MASK: ControlFlags = ControlFlags::CSIZE.union(ControlFlags::CSTOPB).union(ControlFlags::PARENB);
const NEWLINE_MAPPING: InputFlags = InputFlags::ICRNL.union(InputFlags::INLCR);

/// Open a serial device read-only at 8N1, without newline translation, and claim it
/// exclusively
pub fn open_serial(path: &Path, baud: Baud) -> Result<File> {
    debug!(?path, %baud, "open_serial: called");
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOCTTY | libc::O_CLOEXEC)
        .open(path)
        .wrap_err_with(|| format!("Failed to open serial device {}", path.display()))?;

    if !file.is_terminal() {
        bail!("{} is not a terminal device", path.display());
    }

    let mut config = termios::tcgetattr(&file).context("tcgetattr failed")?;
    config.control_flags &= !FRAMING_MASK;
    config.control_flags |= ControlFlags::CS8;
    config.input_flags &= !NEWLINE_MAPPING;
    termios::cfsetispeed(&mut config, baud.rate()).context("cfsetispeed failed")?;
    termios::cfsetospeed(&mut config, baud.rate()).context("cfsetospeed failed")?;
    termios::tcsetattr(&file, SetArg::TCSANOW, &config).context("tcsetattr failed")?;

    let applied = termios::tcgetattr(&file).context("tcgetattr failed")?;
    let framing_ok = applied.control_flags & FRAMING_MASK == ControlFlags::CS8;
    let newlines_ok = !applied.input_flags.intersects(NEWLINE_MAPPING);
    let speed_ok = termios::cfgetispeed(&applied) == baud.rate() && termios::cfgetospeed(&applied) == baud.rate();
    if !(framing_ok && newlines_ok && speed_ok) {
        bail!(
            "{} did not accept settings (framing: {framing_ok}, newlines: {newlines_ok}, speed: {speed_ok})",
            path.display()
        );
    }

    // SAFETY: TIOCEXCL takes no argument and the descriptor is open
    if unsafe { libc::ioctl(file.as_raw_fd(), libc::TIOCEXCL) } != 0 {
        return Err(io::Error::last_os_error()).context("ioctl TIOCEXCL failed");
    }

    info!(path = %path.display(), %baud, "Serial device configured");
    Ok(file)
}

/// What the reader thread reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// One raw line, terminator included (the last line may lack one)
    Line(Vec<u8>),
    /// The source closed
    Eof,
    /// Reading failed; no more events follow
    Error(String),
}

/// Lines from a blocking reader, delivered over a channel
pub struct LineSource {
    rx: mpsc::UnboundedReceiver<SourceEvent>,
}

impl LineSource {
    /// Start a reader thread over `reader`
    pub fn spawn<R: Read + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || {
            debug!("LineSource: reader thread started");
            let mut reader = BufReader::new(reader);
            loop {
                let mut line = Vec::new();
                let event = match reader.read_until(b'\n', &mut line) {
                    Ok(0) => SourceEvent::Eof,
                    Ok(_) => SourceEvent::Line(line),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "LineSource: read failed");
                        SourceEvent::Error(e.to_string())
                    }
                };
                let last = !matches!(event, SourceEvent::Line(_));
                if tx.send(event).is_err() || last {
                    break;
                }
            }
            debug!("LineSource: reader thread exiting");
        });

        Self { rx }
    }

    /// Next event; `None` once the reader thread has gone
    pub async fn next(&mut self) -> Option<SourceEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_baud_parsing() {
        assert_eq!("9600".parse::<Baud>().unwrap(), Baud::B9600);
        assert_eq!("300".parse::<Baud>().unwrap(), Baud::B300);
        assert!("115200".parse::<Baud>().is_err());
        assert_eq!(Baud::default().to_string(), "9600");
    }

    #[tokio::test]
    async fn test_lines_keep_terminators() {
        let mut source = LineSource::spawn(Cursor::new(b"Conc. 1 #/cc\r\nnoise\npartial".to_vec()));
        assert_eq!(source.next().await, Some(SourceEvent::Line(b"Conc. 1 #/cc\r\n".to_vec())));
        assert_eq!(source.next().await, Some(SourceEvent::Line(b"noise\n".to_vec())));
        assert_eq!(source.next().await, Some(SourceEvent::Line(b"partial".to_vec())));
        assert_eq!(source.next().await, Some(SourceEvent::Eof));
        assert_eq!(source.next().await, None);
    }

    #[test]
    fn test_regular_file_is_not_a_serial_device() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let err = open_serial(temp.path(), Baud::B9600).unwrap_err();
        assert!(err.to_string().contains("not a terminal"));
    }
}
