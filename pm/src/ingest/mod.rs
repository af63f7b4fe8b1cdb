//! Data ingestion
//!
//! Turns raw instrument lines into log10 readings appended to the active mode's
//! series. Every line is mirrored to the capture sink before it is parsed, so the
//! capture is a byte-exact record of the stream whether or not a line matched.

mod parser;
mod series;

pub use parser::{LineParser, RawReading};
pub use series::{INITIAL_HORIZON, Series, SeriesGroup};

use std::io::{self, Write};

use tracing::{debug, trace};

use crate::quantity::{Mode, Quantity};

/// Concentration substituted for a zero count so its logarithm stays finite
const ZERO_COUNT_SUBSTITUTE: f64 = 0.001;

/// A reading appended to a series, in log10 units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub quantity: Quantity,
    pub value: f64,
}

/// Local series state for both modes plus the capture sink
pub struct DataIngestionEngine<W: Write> {
    mode: Mode,
    parser: LineParser,
    count: SeriesGroup,
    fit_test: SeriesGroup,
    capture: W,
    redraw: bool,
}

impl<W: Write> DataIngestionEngine<W> {
    /// Fails only if the line patterns do not compile
    pub fn new(mode: Mode, capture: W) -> Result<Self, regex::Error> {
        Ok(Self {
            mode,
            parser: LineParser::new()?,
            count: SeriesGroup::new(Mode::Count.quantities()),
            fit_test: SeriesGroup::new(Mode::FitTest.quantities()),
            capture,
            redraw: false,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch the active parser; existing series are kept
    pub fn set_mode(&mut self, mode: Mode) {
        debug!(from = %self.mode, to = %mode, "DataIngestionEngine::set_mode: called");
        self.mode = mode;
        self.redraw = true;
    }

    /// Series group for a mode
    pub fn group(&self, mode: Mode) -> &SeriesGroup {
        match mode {
            Mode::Count => &self.count,
            Mode::FitTest => &self.fit_test,
        }
    }

    /// Series group for the active mode
    pub fn active(&self) -> &SeriesGroup {
        self.group(self.mode)
    }

    /// Mirror a raw line to the capture sink, then parse and append it.
    ///
    /// Returns the appended reading, or `None` if the line was not recognized (or its
    /// value has no finite logarithm). Only capture write failures are errors.
    pub fn ingest(&mut self, raw: &[u8]) -> io::Result<Option<Reading>> {
        self.capture.write_all(raw)?;
        self.capture.flush()?;

        let line = String::from_utf8_lossy(raw);
        let Some(raw_reading) = self.parser.parse(self.mode, &line) else {
            trace!(line = %line.trim_end(), "ingest: unrecognized line");
            return Ok(None);
        };

        let value = transform(raw_reading);
        if !value.is_finite() {
            debug!(?raw_reading, "ingest: reading has no finite logarithm, ignoring");
            return Ok(None);
        }

        let group = match raw_reading.quantity.mode() {
            Mode::Count => &mut self.count,
            Mode::FitTest => &mut self.fit_test,
        };
        group.push(raw_reading.quantity, value);
        self.redraw = true;

        let reading = Reading {
            quantity: raw_reading.quantity,
            value,
        };
        debug!(?reading, horizon = group.horizon(), "ingest: appended reading");
        Ok(Some(reading))
    }

    /// Clear the active mode's series and horizon
    pub fn reset(&mut self) {
        debug!(mode = %self.mode, "DataIngestionEngine::reset: called");
        match self.mode {
            Mode::Count => self.count.reset(),
            Mode::FitTest => self.fit_test.reset(),
        }
        self.redraw = true;
    }

    /// Consume the pending redraw request, if any
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }

    /// The capture sink
    pub fn capture(&self) -> &W {
        &self.capture
    }

    /// Give up the engine, returning the capture sink
    pub fn into_capture(self) -> W {
        self.capture
    }
}

/// log10 of a raw reading, substituting a small concentration for zero counts
fn transform(reading: RawReading) -> f64 {
    let value = if reading.quantity == Quantity::Count && reading.value == 0.0 {
        ZERO_COUNT_SUBSTITUTE
    } else {
        reading.value
    };
    value.log10()
}
