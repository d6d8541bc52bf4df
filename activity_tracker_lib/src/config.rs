use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    validation::{AnomalyPolicy, SampleValidator},
};

pub const DEFAULT_MAX_PLAUSIBLE_SPEED_MS: f64 = 50.0;

/// A `key = value` line and the line number it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub line: usize,
    pub key: String,
    pub value: String,
}

/// Splits configuration text into entries. Blank lines and lines starting
/// with `#` are skipped.
pub fn parse_entries(text: &str) -> Result<Vec<ConfigEntry>, ConfigError> {
    let mut entries = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let malformed = || ConfigError::MalformedLine {
            line: index + 1,
            content: line.to_string(),
        };

        let (key, value) = line.split_once('=').ok_or_else(malformed)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed());
        }

        entries.push(ConfigEntry {
            line: index + 1,
            key: key.to_string(),
            value: value.trim().to_string(),
        });
    }

    Ok(entries)
}

/// Parses a value that has to be a finite number above zero.
pub fn parse_positive(key: &str, value: &str) -> Result<f64, ConfigError> {
    match f64::from_str(value) {
        Ok(number) if number.is_finite() && number > 0.0 => Ok(number),
        _ => Err(ConfigError::invalid(key, value)),
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub anomaly_policy: AnomalyPolicy,
    /// Surface rejected samples as errors from `ingest` instead of dropping them quietly.
    pub strict_validation: bool,
    pub max_plausible_speed_ms: f64,
    pub body_weight_kg: Option<f64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            anomaly_policy: AnomalyPolicy::default(),
            strict_validation: false,
            max_plausible_speed_ms: DEFAULT_MAX_PLAUSIBLE_SPEED_MS,
            body_weight_kg: None,
        }
    }
}

impl TrackerConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for entry in parse_entries(text)? {
            if !config.apply(&entry.key, &entry.value)? {
                return Err(ConfigError::UnknownKey {
                    line: entry.line,
                    key: entry.key,
                });
            }
        }
        Ok(config)
    }

    /// Applies a single setting. Returns `Ok(false)` if the key is not a
    /// tracker setting, so callers can layer their own keys on top.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<bool, ConfigError> {
        match key {
            "anomaly_policy" => self.anomaly_policy = value.parse()?,
            "strict_validation" => {
                self.strict_validation = bool::from_str(value).map_err(|_| ConfigError::invalid(key, value))?
            }
            "max_plausible_speed_ms" => self.max_plausible_speed_ms = parse_positive(key, value)?,
            "body_weight_kg" => {
                self.body_weight_kg = match value {
                    "" | "none" => None,
                    _ => Some(parse_positive(key, value)?),
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn validator(&self) -> SampleValidator {
        SampleValidator::new(self.anomaly_policy, self.max_plausible_speed_ms)
    }
}
