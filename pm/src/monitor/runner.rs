//! Session loop
//!
//! A single-threaded loop that owns the `Monitor` and reacts to instrument lines, key
//! presses (or signals, headless), and the refresh interval. Refreshing runs the axis
//! sync against peers; in TUI mode it also redraws.

use std::io::{self, Stdout, Write};
use std::time::Duration;

use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use eyre::Result;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::style::Color;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use super::events::{Event, EventHandler, command_for_key};
use super::source::{LineSource, SourceEvent};
use super::{Command, Monitor, PlotFrame, views};
use crate::sync::SlotBoard;

/// Terminal type alias
pub type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Loop settings
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Interval between axis syncs
    pub refresh: Duration,
    /// Point colour for this instance
    pub color: Color,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            refresh: Duration::from_millis(200),
            color: Color::Rgb(255, 0, 0),
        }
    }
}

/// Why the loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The user (or a signal) asked to quit
    Quit,
    /// The instrument stream closed
    EndOfStream,
    /// Reading the instrument failed
    SourceError(String),
}

/// Initialize the terminal for TUI mode
pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore the terminal to normal mode
pub fn restore() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}

/// Apply one source event; returns a stop reason once the source is finished
fn on_source<B: SlotBoard, W: Write>(monitor: &mut Monitor<B, W>, event: Option<SourceEvent>) -> Result<Option<StopReason>> {
    match event {
        Some(SourceEvent::Line(line)) => {
            monitor.handle_line(&line)?;
            Ok(None)
        }
        Some(SourceEvent::Eof) | None => {
            info!("Instrument stream closed");
            Ok(Some(StopReason::EndOfStream))
        }
        Some(SourceEvent::Error(e)) => {
            error!(error = %e, "Instrument stream failed");
            Ok(Some(StopReason::SourceError(e)))
        }
    }
}

/// Run with the terminal view until quit or end of stream.
///
/// The terminal is restored before this returns, whatever the outcome.
pub async fn run_tui<B: SlotBoard, W: Write>(
    monitor: &mut Monitor<B, W>,
    mut source: LineSource,
    options: RunOptions,
) -> Result<StopReason> {
    debug!(?options, "run_tui: called");
    let mut terminal = init()?;

    struct TerminalGuard;
    impl Drop for TerminalGuard {
        fn drop(&mut self) {
            let _ = restore();
        }
    }
    let _guard = TerminalGuard;

    let mut events = EventHandler::new(Duration::from_millis(50));
    let mut events_open = true;
    let mut interval = time::interval(options.refresh);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut plot = monitor.refresh()?;
    let draw = |terminal: &mut Tui, plot: &PlotFrame| -> Result<()> {
        terminal.draw(|f| views::render(plot, options.color, f))?;
        Ok(())
    };
    draw(&mut terminal, &plot)?;

    loop {
        let mut redraw = false;
        tokio::select! {
            _ = interval.tick() => {
                plot = monitor.refresh()?;
                redraw = true;
            }
            event = source.next() => {
                if let Some(reason) = on_source(monitor, event)? {
                    return Ok(reason);
                }
            }
            event = events.next(), if events_open => match event {
                Some(Event::Key(key)) => {
                    if let Some(command) = command_for_key(key) {
                        monitor.handle_command(command);
                    }
                }
                Some(Event::Resize(..)) => redraw = true,
                None => {
                    debug!("run_tui: terminal event thread gone");
                    events_open = false;
                }
            },
        }

        if monitor.is_quit() {
            return Ok(StopReason::Quit);
        }
        if monitor.take_redraw() {
            plot = monitor.refresh()?;
            redraw = true;
        }
        if redraw {
            draw(&mut terminal, &plot)?;
        }
    }
}

/// Run without a view until SIGINT/SIGTERM or end of stream
pub async fn run_headless<B: SlotBoard, W: Write>(
    monitor: &mut Monitor<B, W>,
    mut source: LineSource,
    options: RunOptions,
) -> Result<StopReason> {
    debug!(?options, "run_headless: called");
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut interval = time::interval(options.refresh);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => log_plot(&monitor.refresh()?),
            event = source.next() => {
                if let Some(reason) = on_source(monitor, event)? {
                    return Ok(reason);
                }
            }
            _ = sigint.recv() => {
                info!("SIGINT received");
                monitor.handle_command(Command::Quit);
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                monitor.handle_command(Command::Quit);
            }
        }

        if monitor.is_quit() {
            return Ok(StopReason::Quit);
        }
        if monitor.take_redraw() {
            log_plot(&monitor.refresh()?);
        }
    }
}

fn log_plot(plot: &PlotFrame) {
    for panel in &plot.panels {
        debug!(
            mode = %plot.mode,
            quantity = panel.quantity.label(),
            min = panel.axis.min,
            max = panel.axis.max,
            is_default = panel.axis.is_default,
            points = panel.values.len(),
            "Synchronized axis"
        );
    }
}
