//! Append-only series with running extrema and a shared time horizon

use crate::axis::AxisBounds;
use crate::quantity::Quantity;

/// Horizon (expected number of samples on the x axis) after start-up or reset
pub const INITIAL_HORIZON: f64 = 18.0;

/// An ordered, append-only sequence of log10 readings
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    values: Vec<f64>,
    min: f64,
    max: f64,
}

impl Default for Series {
    fn default() -> Self {
        Self::new()
    }
}

impl Series {
    pub fn new() -> Self {
        Self {
            values: Vec::with_capacity(20),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Append a value and fold it into the running min/max
    pub fn push(&mut self, value: f64) {
        self.values.push(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Drop every value and restore the empty sentinels
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Running minimum; `+inf` while empty
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Running maximum; `-inf` while empty
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Local axis bounds for this series
    pub fn bounds(&self, quantity: Quantity) -> AxisBounds {
        let (default_min, default_max) = quantity.default_bounds();
        AxisBounds::compute(self.min, self.max, default_min, default_max)
    }
}

/// The series of one mode, sharing a single time horizon
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesGroup {
    horizon: f64,
    series: Vec<(Quantity, Series)>,
}

impl SeriesGroup {
    pub fn new(quantities: &[Quantity]) -> Self {
        Self {
            horizon: INITIAL_HORIZON,
            series: quantities.iter().map(|&q| (q, Series::new())).collect(),
        }
    }

    /// Current horizon; grows by doubling, never shrinks until reset
    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    pub fn series(&self, quantity: Quantity) -> Option<&Series> {
        self.series.iter().find(|(q, _)| *q == quantity).map(|(_, s)| s)
    }

    /// Append to one quantity's series, doubling the horizon once it is exceeded.
    /// Returns false if the group does not track `quantity`.
    pub fn push(&mut self, quantity: Quantity, value: f64) -> bool {
        let Some((_, series)) = self.series.iter_mut().find(|(q, _)| *q == quantity) else {
            return false;
        };
        series.push(value);
        if series.len() as f64 > self.horizon {
            self.horizon *= 2.0;
        }
        true
    }

    /// Clear every series and restore the initial horizon
    pub fn reset(&mut self) {
        for (_, series) in &mut self.series {
            series.clear();
        }
        self.horizon = INITIAL_HORIZON;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Quantity, &Series)> {
        self.series.iter().map(|(q, s)| (*q, s))
    }
}
