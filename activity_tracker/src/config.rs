use std::{fs, path::Path, str::FromStr};

use activity_tracker_lib::{
    ConfigError, TrackerConfig,
    config::{parse_entries, parse_positive},
};
use serde::Serialize;

use crate::error::DriverError;

/// Tracker settings plus the settings of the host around it, read from one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverConfig {
    pub tracker: TrackerConfig,
    pub channel_capacity: usize,
    pub broadcast_capacity: usize,
    /// `None` replays as fast as possible.
    pub replay_speedup: Option<f64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            channel_capacity: 64,
            broadcast_capacity: 100,
            replay_speedup: None,
        }
    }
}

impl DriverConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for entry in parse_entries(text)? {
            if config.tracker.apply(&entry.key, &entry.value)? {
                continue;
            }

            let (key, value) = (entry.key.as_str(), entry.value.as_str());
            match key {
                "channel_capacity" => config.channel_capacity = parse_capacity(key, value)?,
                "broadcast_capacity" => config.broadcast_capacity = parse_capacity(key, value)?,
                "replay_speedup" => {
                    config.replay_speedup = match value {
                        "" | "none" => None,
                        _ => Some(parse_positive(key, value)?),
                    }
                }
                _ => {
                    return Err(ConfigError::UnknownKey {
                        line: entry.line,
                        key: key.to_string(),
                    });
                }
            }
        }

        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text)?)
    }
}

fn parse_capacity(key: &str, value: &str) -> Result<usize, ConfigError> {
    match usize::from_str(value) {
        Ok(capacity) if capacity > 0 => Ok(capacity),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
