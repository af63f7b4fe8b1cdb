//! Axis range computation
//!
//! Converts the running min/max of a log-scale series into whole-decade axis bounds.

/// Axis bounds for one plotted quantity, in log10 units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds {
    /// Lower bound (a whole decade)
    pub min: f64,
    /// Upper bound, always at least `min + 1`
    pub max: f64,
    /// True when the bounds are the quantity's fallback range rather than derived from data
    pub is_default: bool,
}

impl AxisBounds {
    /// Derive axis bounds from a series' running min/max.
    ///
    /// An empty series carries the `+inf`/`-inf` sentinels, which makes the rounded max
    /// fall below the rounded min; the defaults are used instead and flagged as such.
    pub fn compute(series_min: f64, series_max: f64, default_min: f64, default_max: f64) -> Self {
        let mut min = series_min.floor();
        let mut max = series_max.ceil();
        let mut is_default = false;

        if max < min {
            min = default_min;
            max = default_max;
            is_default = true;
        }
        if max - min < 1.0 {
            max = min + 1.0;
        }

        Self { min, max, is_default }
    }

    /// Widen these bounds to also cover `[min, max]`.
    ///
    /// A widened default stops being default: it now carries another instance's data.
    pub fn union(self, min: f64, max: f64) -> Self {
        Self {
            min: self.min.min(min),
            max: self.max.max(max),
            is_default: false,
        }
    }

    /// Number of whole decades covered
    pub fn span(&self) -> u32 {
        (self.max - self.min).round().max(1.0) as u32
    }

    /// Tick labels for every decade boundary, bottom to top (`1e-3`, `1e+0`, ...)
    pub fn decade_labels(&self) -> Vec<String> {
        let base = self.min as i32;
        (0..=self.span() as i32).map(|i| format!("1e{:+}", base + i)).collect()
    }
}

/// Compute `(axis_min, axis_max, is_default)` for a series
pub fn compute(series_min: f64, series_max: f64, default_min: f64, default_max: f64) -> (f64, f64, bool) {
    let bounds = AxisBounds::compute(series_min, series_max, default_min, default_max);
    (bounds.min, bounds.max, bounds.is_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_series_uses_defaults() {
        let bounds = AxisBounds::compute(f64::INFINITY, f64::NEG_INFINITY, -3.0, 5.0);
        assert_eq!(bounds.min, -3.0);
        assert_eq!(bounds.max, 5.0);
        assert!(bounds.is_default);
    }

    #[test]
    fn test_single_value_gets_one_decade() {
        // log10(1000) == 3.0 exactly, so floor and ceil agree
        assert_eq!(compute(3.0, 3.0, -3.0, 5.0), (3.0, 4.0, false));
    }

    #[test]
    fn test_fractional_values_round_outward() {
        assert_eq!(compute(2.3, 5.1, -3.0, 5.0), (2.0, 6.0, false));
        assert_eq!(compute(-0.5, 0.5, 0.0, 3.0), (-1.0, 1.0, false));
    }

    #[test]
    fn test_degenerate_defaults_are_widened() {
        let bounds = AxisBounds::compute(f64::INFINITY, f64::NEG_INFINITY, 2.0, 2.0);
        assert_eq!((bounds.min, bounds.max), (2.0, 3.0));
        assert!(bounds.is_default);
    }

    #[test]
    fn test_union_clears_default_flag() {
        let local = AxisBounds::compute(f64::INFINITY, f64::NEG_INFINITY, -3.0, 5.0);
        let merged = local.union(2.0, 6.0);
        assert_eq!((merged.min, merged.max), (-3.0, 6.0));
        assert!(!merged.is_default);
    }

    #[test]
    fn test_decade_labels() {
        let bounds = AxisBounds::compute(-1.2, 1.0, 0.0, 3.0);
        assert_eq!(bounds.span(), 3);
        assert_eq!(bounds.decade_labels(), vec!["1e-2", "1e-1", "1e+0", "1e+1"]);
    }

    proptest! {
        #[test]
        fn prop_compute_matches_closed_form(a in -50.0f64..50.0, b in -50.0f64..50.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let (min, max, is_default) = compute(lo, hi, -3.0, 5.0);
            prop_assert!(!is_default);
            prop_assert_eq!(min, lo.floor());
            prop_assert_eq!(max, hi.ceil().max(lo.floor() + 1.0));
            prop_assert!(max >= min + 1.0);
        }

        #[test]
        fn prop_inverted_inputs_fall_back(a in -50.0f64..50.0, gap in 1.0f64..10.0) {
            // min beyond max by at least a decade after rounding
            let (min, max, is_default) = compute(a + gap + 1.0, a, -1.0, 3.0);
            prop_assert_eq!((min, max, is_default), (-1.0, 3.0, true));
        }
    }
}
