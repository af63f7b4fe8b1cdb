//! Monitor session
//!
//! `Monitor` is the one piece of process state: the ingestion engine, the board used
//! to synchronize axes with peers, and whether the user asked to quit. The runner feeds
//! it lines and commands and asks it for a `PlotFrame` every refresh.

pub mod events;
pub mod runner;
pub mod source;
pub mod views;

pub use events::{Event, EventHandler, command_for_key};
pub use runner::{RunOptions, StopReason, run_headless, run_tui};
pub use source::{Baud, LineSource, SourceEvent, open_serial};

use std::io::Write;

use eyre::{Context, Result};
use tracing::{debug, info};

use crate::axis::AxisBounds;
use crate::error::ShmError;
use crate::ingest::{DataIngestionEngine, Reading};
use crate::instance::Instance;
use crate::quantity::{Mode, Quantity};
use crate::sync::{CrossInstanceAxisSync, SlotBoard};

/// User actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetMode(Mode),
    Reset,
    Quit,
}

/// One plotted quantity with its synchronized axis
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub quantity: Quantity,
    pub axis: AxisBounds,
    pub values: Vec<f64>,
}

/// Everything the view needs to draw one frame
#[derive(Debug, Clone, PartialEq)]
pub struct PlotFrame {
    pub mode: Mode,
    pub horizon: f64,
    pub instance: Instance,
    /// Top panel first
    pub panels: Vec<Panel>,
}

impl PlotFrame {
    pub fn panel(&self, quantity: Quantity) -> Option<&Panel> {
        self.panels.iter().find(|p| p.quantity == quantity)
    }
}

/// Session state for one running monitor
pub struct Monitor<B: SlotBoard, W: Write> {
    board: B,
    engine: DataIngestionEngine<W>,
    quit: bool,
}

impl<B: SlotBoard, W: Write> Monitor<B, W> {
    pub fn new(board: B, mode: Mode, capture: W) -> Result<Self> {
        let engine = DataIngestionEngine::new(mode, capture).context("Failed to build line parser")?;
        Ok(Self::with_engine(board, engine))
    }

    /// Wrap an engine built before the board existed
    pub fn with_engine(board: B, engine: DataIngestionEngine<W>) -> Self {
        debug!(instance = %board.instance(), mode = %engine.mode(), "Monitor::with_engine: called");
        Self {
            board,
            engine,
            quit: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.engine.mode()
    }

    pub fn engine(&self) -> &DataIngestionEngine<W> {
        &self.engine
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn is_quit(&self) -> bool {
        self.quit
    }

    /// Feed one raw line from the instrument
    pub fn handle_line(&mut self, raw: &[u8]) -> Result<Option<Reading>> {
        self.engine.ingest(raw).context("Failed to write capture file")
    }

    pub fn handle_command(&mut self, command: Command) {
        debug!(?command, "Monitor::handle_command: called");
        match command {
            Command::SetMode(mode) => self.engine.set_mode(mode),
            Command::Reset => self.engine.reset(),
            Command::Quit => {
                info!("Quit requested");
                self.quit = true;
            }
        }
    }

    /// Consume the pending redraw request
    pub fn take_redraw(&mut self) -> bool {
        self.engine.take_redraw()
    }

    /// Publish local bounds, merge peers' and snapshot the active mode for drawing
    pub fn refresh(&self) -> Result<PlotFrame, ShmError> {
        let mode = self.engine.mode();
        let group = self.engine.active();

        let local: Vec<(Quantity, AxisBounds)> = group.iter().map(|(q, series)| (q, series.bounds(q))).collect();
        let merged = CrossInstanceAxisSync::synchronize(&self.board, mode, &local)?;

        let panels = merged
            .into_iter()
            .map(|(quantity, axis)| Panel {
                quantity,
                axis,
                values: group.series(quantity).map(|s| s.values().to_vec()).unwrap_or_default(),
            })
            .collect();

        Ok(PlotFrame {
            mode,
            horizon: group.horizon(),
            instance: self.board.instance(),
            panels,
        })
    }

    /// End the session, handing the board back for teardown
    pub fn into_parts(self) -> (B, W) {
        (self.board, self.engine.into_capture())
    }
}
