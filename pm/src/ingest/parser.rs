//! Line parsers for the instrument's textual output

use regex::Regex;

use crate::quantity::{Mode, Quantity};

/// Decimal float as printed by the instrument (sign, fraction and exponent optional)
const FLOAT: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

/// A reading recognized in a line, before the log transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub quantity: Quantity,
    pub value: f64,
}

/// Recognizes the three line patterns; only the active mode's patterns apply
#[derive(Debug, Clone)]
pub struct LineParser {
    concentration: Regex,
    mask: Regex,
    ambient: Regex,
    fit_factor: Regex,
}

impl LineParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            concentration: Regex::new(&format!(r"^Conc\.[ \t]+({FLOAT})[ \t]+#/cc"))?,
            mask: Regex::new(&format!(r"^Mask[ \t]+({FLOAT})[ \t]+#/cc"))?,
            ambient: Regex::new(&format!(r"^Ambient[ \t]+({FLOAT})[ \t]+#/cc"))?,
            fit_factor: Regex::new(&format!(r"^FF[ \t]+\d+[ \t]+({FLOAT})[ \t]+(?:PASS|FAIL)"))?,
        })
    }

    /// Parse one line under `mode`; `None` for anything unrecognized
    pub fn parse(&self, mode: Mode, line: &str) -> Option<RawReading> {
        let candidates: &[(&Regex, Quantity)] = match mode {
            Mode::Count => &[(&self.concentration, Quantity::Count)],
            Mode::FitTest => &[
                (&self.mask, Quantity::Sample),
                (&self.ambient, Quantity::Ambient),
                (&self.fit_factor, Quantity::FitFactor),
            ],
        };

        candidates.iter().find_map(|(regex, quantity)| {
            let value = regex.captures(line)?.get(1)?.as_str().parse::<f64>().ok()?;
            Some(RawReading {
                quantity: *quantity,
                value,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(mode: Mode, line: &str) -> Option<(Quantity, f64)> {
        LineParser::new().unwrap().parse(mode, line).map(|r| (r.quantity, r.value))
    }

    #[test]
    fn test_count_line() {
        assert_eq!(parse(Mode::Count, "Conc. 1000 #/cc\r\n"), Some((Quantity::Count, 1000.0)));
        assert_eq!(parse(Mode::Count, "Conc. 0.52 #/cc"), Some((Quantity::Count, 0.52)));
        assert_eq!(parse(Mode::Count, "Conc. 1.5e3 #/cc"), Some((Quantity::Count, 1500.0)));
    }

    #[test]
    fn test_fit_test_lines() {
        assert_eq!(parse(Mode::FitTest, "Mask 12.3 #/cc"), Some((Quantity::Sample, 12.3)));
        assert_eq!(parse(Mode::FitTest, "Ambient 4100 #/cc"), Some((Quantity::Ambient, 4100.0)));
        assert_eq!(parse(Mode::FitTest, "FF 3 215 PASS"), Some((Quantity::FitFactor, 215.0)));
        assert_eq!(parse(Mode::FitTest, "FF 12 4.5 FAIL\r\n"), Some((Quantity::FitFactor, 4.5)));
    }

    #[test]
    fn test_patterns_are_mode_specific() {
        assert_eq!(parse(Mode::FitTest, "Conc. 1000 #/cc"), None);
        assert_eq!(parse(Mode::Count, "Mask 12.3 #/cc"), None);
        assert_eq!(parse(Mode::Count, "FF 3 215 PASS"), None);
    }

    #[test]
    fn test_unrecognized_lines() {
        for line in [
            "garbage unrelated text",
            "",
            "Conc. #/cc",
            " Conc. 1000 #/cc",
            "FF 3 215 MAYBE",
            "FF x 215 PASS",
            "Conc. 1000 ppm",
        ] {
            assert_eq!(parse(Mode::Count, line), None, "{line:?}");
            assert_eq!(parse(Mode::FitTest, line), None, "{line:?}");
        }
    }
}
