//! Parsing of human duration expressions into milliseconds.

use serde::{Deserialize, Serialize};

use crate::error::{FloodgateError, Result};

/// A duration as it appears in configuration: either a bare number of
/// milliseconds or a unit-suffixed string such as `"500ms"` or `"1s"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationInput {
    /// Already-milliseconds numeric form
    Millis(f64),
    /// `<number><unit>` string form
    Text(String),
}

impl From<f64> for DurationInput {
    fn from(ms: f64) -> Self {
        DurationInput::Millis(ms)
    }
}

impl From<&str> for DurationInput {
    fn from(text: &str) -> Self {
        DurationInput::Text(text.to_string())
    }
}

/// Millisecond multipliers for the recognized unit suffixes. `ms` is listed
/// first so `"500ms"` is never read as 500 minutes.
const UNITS: [(&str, f64); 4] = [
    ("ms", 1.0),
    ("s", 1000.0),
    ("m", 60_000.0),
    ("h", 3_600_000.0),
];

/// Convert a duration expression into milliseconds.
///
/// Numeric input is treated as milliseconds and must not be negative or NaN.
/// String input must carry one of the `ms`/`s`/`m`/`h` suffixes with a
/// non-negative numeric prefix; fractional values are allowed (`"0.5s"` is
/// 500ms). Zero and non-finite results pass through here and are rejected by
/// the options validator, which owns the positivity rule.
pub fn parse_duration(input: &DurationInput) -> Result<f64> {
    match input {
        DurationInput::Millis(ms) => {
            if ms.is_nan() || *ms < 0.0 {
                return Err(invalid(&format!("{ms}")));
            }
            Ok(*ms)
        }
        DurationInput::Text(text) => {
            for (suffix, multiplier) in UNITS {
                if let Some(number) = text.strip_suffix(suffix) {
                    let value: f64 = number.parse().map_err(|_| invalid(text))?;
                    if value.is_nan() || value < 0.0 {
                        return Err(invalid(text));
                    }
                    return Ok(value * multiplier);
                }
            }
            Err(invalid(text))
        }
    }
}

fn invalid(value: &str) -> FloodgateError {
    FloodgateError::InvalidDuration {
        value: value.to_string(),
    }
}
