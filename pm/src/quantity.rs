//! Measurement modes and the quantities plotted in each

use std::fmt;

use serde::{Deserialize, Serialize};

/// Instrument mode, selected by the user at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Plain particle concentration readings
    #[default]
    Count,
    /// Fit test: ambient, in-mask sample and fit factor readings
    FitTest,
}

impl Mode {
    /// Tag stored in a shared slot; zero means "no mode published"
    pub fn tag(self) -> u32 {
        match self {
            Mode::Count => 1,
            Mode::FitTest => 2,
        }
    }

    /// Decode a slot tag
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Mode::Count),
            2 => Some(Mode::FitTest),
            _ => None,
        }
    }

    /// Quantities plotted in this mode, top panel first
    pub fn quantities(self) -> &'static [Quantity] {
        match self {
            Mode::Count => &[Quantity::Count],
            Mode::FitTest => &[Quantity::FitFactor, Quantity::Sample, Quantity::Ambient],
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Count => write!(f, "count"),
            Mode::FitTest => write!(f, "fit-test"),
        }
    }
}

/// A plotted quantity; each has its own series and its own synchronized axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quantity {
    Count,
    Ambient,
    Sample,
    FitFactor,
}

/// Number of quantities, i.e. bound records per shared slot
pub const QUANTITY_COUNT: usize = 4;

impl Quantity {
    pub const ALL: [Quantity; QUANTITY_COUNT] = [Quantity::Count, Quantity::Ambient, Quantity::Sample, Quantity::FitFactor];

    /// Position of this quantity's bound record within a slot
    pub fn index(self) -> usize {
        match self {
            Quantity::Count => 0,
            Quantity::Ambient => 1,
            Quantity::Sample => 2,
            Quantity::FitFactor => 3,
        }
    }

    /// Mode in which this quantity is measured
    pub fn mode(self) -> Mode {
        match self {
            Quantity::Count => Mode::Count,
            _ => Mode::FitTest,
        }
    }

    /// Fallback axis range (log10 units) while the series is empty
    pub fn default_bounds(self) -> (f64, f64) {
        match self {
            Quantity::Count => (-3.0, 5.0),
            Quantity::Ambient => (3.0, 6.0),
            Quantity::Sample => (-1.0, 3.0),
            Quantity::FitFactor => (0.0, 3.0),
        }
    }

    /// Axis title
    pub fn label(self) -> &'static str {
        match self {
            Quantity::Count => "Count",
            Quantity::Ambient => "Ambient",
            Quantity::Sample => "Mask",
            Quantity::FitFactor => "Fit factor",
        }
    }
}
