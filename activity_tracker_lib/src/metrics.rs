use chrono::TimeDelta;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const MS_PER_HOUR: f64 = 3_600_000.0;
const MS_PER_MINUTE: f64 = 60_000.0;

/// Running totals kept by a session, updated once per accepted sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTotals {
    pub distance_m: f64,
    pub max_speed_ms: Option<f64>,
    pub min_altitude_m: Option<f64>,
    pub max_altitude_m: Option<f64>,
    pub elevation_gain_m: f64,
    pub elevation_loss_m: f64,
    pub sample_count: usize,
    last_altitude_m: Option<f64>,
}

impl SessionTotals {
    pub fn add_distance(&mut self, meters: f64) {
        if meters.is_finite() && meters > 0.0 {
            self.distance_m += meters;
        }
    }

    pub fn record_speed(&mut self, speed_ms: f64) {
        if !speed_ms.is_finite() {
            return;
        }
        self.max_speed_ms = Some(self.max_speed_ms.map_or(speed_ms, |max| max.max(speed_ms)));
    }

    /// Samples without a finite altitude are skipped, so gain and loss are
    /// measured against the last sample that had one.
    pub fn record_altitude(&mut self, altitude_m: f64) {
        if !altitude_m.is_finite() {
            return;
        }
        self.min_altitude_m = Some(self.min_altitude_m.map_or(altitude_m, |min| min.min(altitude_m)));
        self.max_altitude_m = Some(self.max_altitude_m.map_or(altitude_m, |max| max.max(altitude_m)));

        if let Some(last) = self.last_altitude_m {
            let delta = altitude_m - last;
            if delta > 0.0 {
                self.elevation_gain_m += delta;
            } else {
                self.elevation_loss_m -= delta;
            }
        }
        self.last_altitude_m = Some(altitude_m);
    }
}

/// Sums of climbs and descents over a sequence of altitude readings.
pub fn elevation_change<I>(altitudes: I) -> (f64, f64)
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut totals = SessionTotals::default();
    altitudes.into_iter().flatten().for_each(|altitude| totals.record_altitude(altitude));
    (totals.elevation_gain_m, totals.elevation_loss_m)
}

/// Speed bands used to pick a MET value for the calorie estimate.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityBand {
    Walking,
    Running,
    Cycling,
}

impl ActivityBand {
    pub fn from_speed_kmh(speed_kmh: f64) -> Self {
        if speed_kmh < 8.0 {
            ActivityBand::Walking
        } else if speed_kmh < 16.0 {
            ActivityBand::Running
        } else {
            ActivityBand::Cycling
        }
    }

    pub fn met(self) -> f64 {
        match self {
            ActivityBand::Walking => 3.5,
            ActivityBand::Running => 9.8,
            ActivityBand::Cycling => 7.5,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub distance_m: f64,
    pub elapsed_active_ms: i64,
    pub avg_speed_kmh: f64,
    /// Minutes per kilometer. `None` until some distance is covered.
    pub pace_min_per_km: Option<f64>,
    pub max_speed_ms: Option<f64>,
    pub elevation_gain_m: f64,
    pub elevation_loss_m: f64,
    pub min_altitude_m: Option<f64>,
    pub max_altitude_m: Option<f64>,
    pub sample_count: usize,
    /// Only present when a body weight was known.
    pub calories_kcal: Option<f64>,
}

impl DerivedMetrics {
    pub fn derive(totals: &SessionTotals, elapsed_active: TimeDelta, body_weight_kg: Option<f64>) -> Self {
        let distance_m = totals.distance_m;
        let elapsed_ms = elapsed_active.num_milliseconds().max(0);

        let avg_speed_kmh = if elapsed_ms > 0 {
            (distance_m / 1000.0) / (elapsed_ms as f64 / MS_PER_HOUR)
        } else {
            0.0
        };

        let pace_min_per_km = if distance_m > 0.0 {
            Some((elapsed_ms as f64 / MS_PER_MINUTE) / (distance_m / 1000.0))
        } else {
            None
        };

        let mut metrics = Self {
            distance_m,
            elapsed_active_ms: elapsed_ms,
            avg_speed_kmh,
            pace_min_per_km,
            max_speed_ms: totals.max_speed_ms,
            elevation_gain_m: totals.elevation_gain_m,
            elevation_loss_m: totals.elevation_loss_m,
            min_altitude_m: totals.min_altitude_m,
            max_altitude_m: totals.max_altitude_m,
            sample_count: totals.sample_count,
            calories_kcal: None,
        };
        metrics.calories_kcal = body_weight_kg.map(|kg| metrics.estimate_calories(kg));
        metrics
    }

    pub fn elapsed_active(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.elapsed_active_ms)
    }

    pub fn activity_band(&self) -> ActivityBand {
        ActivityBand::from_speed_kmh(self.avg_speed_kmh)
    }

    /// MET(band) x weight x active hours.
    pub fn estimate_calories(&self, body_weight_kg: f64) -> f64 {
        let hours = self.elapsed_active_ms as f64 / MS_PER_HOUR;
        self.activity_band().met() * body_weight_kg * hours
    }

    pub fn with_body_weight(mut self, body_weight_kg: f64) -> Self {
        self.calories_kcal = Some(self.estimate_calories(body_weight_kg));
        self
    }

    pub fn max_speed_kmh(&self) -> Option<f64> {
        self.max_speed_ms.map(|ms| ms * 3.6)
    }
}
