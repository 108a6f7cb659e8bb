//! Rate limit configuration and window construction.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::duration::{parse_duration, DurationInput};
use crate::error::{FloodgateError, Result};
use crate::throttle::WindowSpec;

/// Raw rate limit options, as built in code or deserialized from a file.
///
/// Exactly one of the forms is honored, in order of precedence:
/// `max_rps` (a shorthand for a 1000ms window), `limits` (multiple windows
/// enforced conjunctively), or `max_requests` combined with either
/// `duration` or `per_milliseconds`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitOptions {
    /// Window capacity for the single-window forms
    pub max_requests: Option<f64>,
    /// Window period in milliseconds
    pub per_milliseconds: Option<f64>,
    /// Window period as a duration expression; wins over `per_milliseconds`
    pub duration: Option<DurationInput>,
    /// Capacity of a 1000ms window; wins over every other form
    pub max_rps: Option<f64>,
    /// Multiple windows, all enforced conjunctively
    pub limits: Option<Vec<LimitRule>>,
}

/// One window of the multi-window form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitRule {
    pub max_requests: Option<f64>,
    pub duration: Option<DurationInput>,
}

impl LimitRule {
    pub fn new(max_requests: f64, duration: impl Into<DurationInput>) -> Self {
        Self {
            max_requests: Some(max_requests),
            duration: Some(duration.into()),
        }
    }

    fn build_window(&self, index: usize) -> Result<WindowSpec> {
        let capacity = require_positive(
            self.max_requests,
            &format!("limits[{index}]: max_requests is required and must be a positive number"),
        )?;
        let Some(duration) = &self.duration else {
            return Err(FloodgateError::InvalidOptions(format!(
                "limits[{index}]: duration is required"
            )));
        };
        let period_ms = parse_duration(duration)?;
        require_period(period_ms, Some(index))?;
        Ok(WindowSpec::new(capacity, period_ms))
    }
}

impl RateLimitOptions {
    /// Single window of `max_requests` per `per_milliseconds`.
    pub fn per_milliseconds(max_requests: f64, per_milliseconds: f64) -> Self {
        Self {
            max_requests: Some(max_requests),
            per_milliseconds: Some(per_milliseconds),
            ..Self::default()
        }
    }

    /// Single window of `max_requests` per parsed duration expression.
    pub fn duration(max_requests: f64, duration: impl Into<DurationInput>) -> Self {
        Self {
            max_requests: Some(max_requests),
            duration: Some(duration.into()),
            ..Self::default()
        }
    }

    /// Shorthand for `max_rps` requests per 1000ms window.
    pub fn max_rps(max_rps: f64) -> Self {
        Self {
            max_rps: Some(max_rps),
            ..Self::default()
        }
    }

    /// Multiple windows, all enforced conjunctively.
    pub fn limits<I>(limits: I) -> Self
    where
        I: IntoIterator<Item = LimitRule>,
    {
        Self {
            limits: Some(limits.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Load options from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            FloodgateError::InvalidOptions(format!("failed to parse rate limit options: {e}"))
        })
    }

    /// Load options from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            FloodgateError::InvalidOptions(format!("failed to parse rate limit options: {e}"))
        })
    }

    /// Load options from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit options");

        let contents = std::fs::read_to_string(path).map_err(|e| {
            FloodgateError::InvalidOptions(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&contents)
    }

    /// Validate these options and resolve them into concrete window specs.
    ///
    /// Validation happens before any state is touched, so a failed result
    /// leaves a live limiter's previous windows intact.
    pub fn build_windows(&self) -> Result<Vec<WindowSpec>> {
        if let Some(rps) = self.max_rps {
            let capacity = require_positive(
                Some(rps),
                "max_rps is required and must be a positive number",
            )?;
            return Ok(vec![WindowSpec::new(capacity, 1000.0)]);
        }

        if let Some(limits) = &self.limits {
            if limits.is_empty() {
                return Err(FloodgateError::InvalidOptions(
                    "limits must contain at least one entry".to_string(),
                ));
            }
            return limits
                .iter()
                .enumerate()
                .map(|(index, rule)| rule.build_window(index))
                .collect();
        }

        if self.max_requests.is_none()
            && self.per_milliseconds.is_none()
            && self.duration.is_none()
        {
            return Err(FloodgateError::InvalidOptions(
                "no recognized options were provided".to_string(),
            ));
        }

        let capacity = require_positive(
            self.max_requests,
            "max_requests is required and must be a positive number",
        )?;
        let period_ms = match (&self.duration, self.per_milliseconds) {
            (Some(duration), _) => parse_duration(duration)?,
            (None, Some(ms)) => ms,
            (None, None) => {
                return Err(FloodgateError::InvalidOptions(
                    "one of max_rps, duration, or per_milliseconds is required".to_string(),
                ))
            }
        };
        require_period(period_ms, None)?;
        Ok(vec![WindowSpec::new(capacity, period_ms)])
    }
}

fn require_positive(value: Option<f64>, message: &str) -> Result<u64> {
    match value {
        // Fractional capacities round up to the next whole admission.
        Some(v) if v.is_finite() && v > 0.0 => Ok(v.ceil() as u64),
        _ => Err(FloodgateError::InvalidOptions(message.to_string())),
    }
}

fn require_period(period_ms: f64, limit_index: Option<usize>) -> Result<()> {
    if period_ms.is_finite() && period_ms > 0.0 {
        return Ok(());
    }
    let message = "duration must be a positive finite number";
    Err(FloodgateError::InvalidOptions(match limit_index {
        Some(index) => format!("limits[{index}]: {message}"),
        None => message.to_string(),
    }))
}
