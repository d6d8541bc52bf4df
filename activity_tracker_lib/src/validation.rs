use std::str::FromStr;

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{error::ConfigError, geodesic::haversine_distance, track_point::TrackPoint};

/// What to do with a sample whose implied speed is implausible.
///
/// `Reject` drops it. `Flag` keeps it and reports the finding with the
/// snapshot. `AcceptAll` skips validation entirely and takes every fix.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnomalyPolicy {
    #[default]
    Reject,
    Flag,
    AcceptAll,
}

impl FromStr for AnomalyPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(AnomalyPolicy::Reject),
            "flag" => Ok(AnomalyPolicy::Flag),
            "accept_all" | "accept-all" => Ok(AnomalyPolicy::AcceptAll),
            _ => Err(ConfigError::invalid("anomaly_policy", s)),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SampleRejection {
    #[error("latitude {0} is outside -90..=90")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside -180..=180")]
    LongitudeOutOfRange(f64),
    #[error("reported speed {0} m/s is not a valid speed")]
    InvalidSpeed(f64),
    #[error("timestamp {timestamp} is not after the previous sample at {previous}")]
    NonIncreasingTimestamp {
        previous: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    #[error("implied speed {speed_ms:.1} m/s exceeds the plausible maximum of {limit_ms:.1} m/s")]
    ImplausibleSpeed { speed_ms: f64, limit_ms: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accept,
    /// Accepted, but the finding travels with the snapshot.
    Flag(SampleRejection),
    Reject(SampleRejection),
}

#[derive(Debug, Clone)]
pub struct SampleValidator {
    policy: AnomalyPolicy,
    max_plausible_speed_ms: f64,
}

impl SampleValidator {
    pub fn new(policy: AnomalyPolicy, max_plausible_speed_ms: f64) -> Self {
        Self {
            policy,
            max_plausible_speed_ms,
        }
    }

    pub fn policy(&self) -> AnomalyPolicy {
        self.policy
    }

    /// Checks `point` against the last accepted sample of the session.
    pub fn check(&self, previous: Option<&TrackPoint>, point: &TrackPoint) -> Verdict {
        if self.policy == AnomalyPolicy::AcceptAll {
            return Verdict::Accept;
        }

        if let Err(rejection) = check_reading(point) {
            return Verdict::Reject(rejection);
        }

        let Some(previous) = previous else {
            return Verdict::Accept;
        };

        if point.timestamp <= previous.timestamp {
            return Verdict::Reject(SampleRejection::NonIncreasingTimestamp {
                previous: previous.timestamp,
                timestamp: point.timestamp,
            });
        }

        let speed_ms = implied_speed(previous, point);
        if speed_ms > self.max_plausible_speed_ms {
            let rejection = SampleRejection::ImplausibleSpeed {
                speed_ms,
                limit_ms: self.max_plausible_speed_ms,
            };
            return match self.policy {
                AnomalyPolicy::Flag => Verdict::Flag(rejection),
                _ => Verdict::Reject(rejection),
            };
        }

        Verdict::Accept
    }
}

/// Checks that only need the sample itself.
fn check_reading(point: &TrackPoint) -> Result<(), SampleRejection> {
    let latitude = point.position.latitude();
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(SampleRejection::LatitudeOutOfRange(latitude));
    }

    let longitude = point.position.longitude();
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(SampleRejection::LongitudeOutOfRange(longitude));
    }

    match point.speed {
        Some(speed) if !speed.is_finite() || speed < 0.0 => Err(SampleRejection::InvalidSpeed(speed)),
        _ => Ok(()),
    }
}

/// Speed in m/s needed to get from `previous` to `point` in the time between them.
pub fn implied_speed(previous: &TrackPoint, point: &TrackPoint) -> f64 {
    let distance = haversine_distance(previous.position, point.position);
    let seconds = (point.timestamp - previous.timestamp)
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or(f64::MAX);

    if seconds > 0.0 {
        distance / seconds
    } else if distance == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}
