use chrono::{DateTime, TimeDelta, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::TrackingError,
    geodesic::haversine_distance,
    metrics::{DerivedMetrics, SessionTotals},
    notifier::Snapshot,
    time_accountant::TimeAccountant,
    track_point::{Position, TrackPoint},
    validation::{SampleRejection, SampleValidator, Verdict},
};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Paused,
    Terminal,
}

/// What happened to a sample handed to [`TrackSession::ingest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    Accepted,
    /// Accepted and counted, with a finding attached.
    Flagged(SampleRejection),
    Rejected(SampleRejection),
    /// The session was not active.
    Ignored(SessionState),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted | IngestOutcome::Flagged(_))
    }

    pub fn anomaly(&self) -> Option<SampleRejection> {
        match self {
            IngestOutcome::Flagged(rejection) => Some(*rejection),
            _ => None,
        }
    }
}

/// One activity from `start` to `stop`.
///
/// Distance and elapsed active time never decrease. Both stop moving on
/// `pause` and pick up from the same values on `resume`. Once stopped the
/// metrics are frozen and the session takes no more samples.
#[derive(Debug, Clone)]
pub struct TrackSession {
    session_id: i64,
    state: SessionState,
    samples: Vec<TrackPoint>,
    totals: SessionTotals,
    time: TimeAccountant,
    body_weight_kg: Option<f64>,
    stopped_at: Option<DateTime<Utc>>,
    final_metrics: Option<DerivedMetrics>,
}

impl TrackSession {
    pub fn start(session_id: i64, now: DateTime<Utc>, body_weight_kg: Option<f64>) -> Self {
        Self {
            session_id,
            state: SessionState::Active,
            samples: Vec::new(),
            totals: SessionTotals::default(),
            time: TimeAccountant::new(now),
            body_weight_kg,
            stopped_at: None,
            final_metrics: None,
        }
    }

    pub fn ingest(&mut self, point: TrackPoint, validator: &SampleValidator, now: DateTime<Utc>) -> IngestOutcome {
        if self.state != SessionState::Active {
            debug!("Session {} is {:?}, ignoring sample at {}", self.session_id, self.state, point.timestamp);
            return IngestOutcome::Ignored(self.state);
        }

        let outcome = match validator.check(self.samples.last(), &point) {
            Verdict::Accept => IngestOutcome::Accepted,
            Verdict::Flag(rejection) => {
                warn!("Session {}: accepting flagged sample: {}", self.session_id, rejection);
                IngestOutcome::Flagged(rejection)
            }
            Verdict::Reject(rejection) => {
                warn!("Session {}: dropping sample: {}", self.session_id, rejection);
                return IngestOutcome::Rejected(rejection);
            }
        };

        if let Some(previous) = self.samples.last() {
            self.totals.add_distance(haversine_distance(previous.position, point.position));
        }
        if let Some(speed) = point.speed {
            self.totals.record_speed(speed);
        }
        if let Some(altitude) = point.altitude {
            self.totals.record_altitude(altitude);
        }
        self.totals.sample_count += 1;
        self.samples.push(point);

        let elapsed = self.time.advance(now);
        debug!(
            "Session {}: sample #{} accepted, {:.1} m in {} s",
            self.session_id,
            self.totals.sample_count,
            self.totals.distance_m,
            elapsed.num_seconds()
        );

        outcome
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), TrackingError> {
        if self.state != SessionState::Active {
            return Err(TrackingError::NotTracking);
        }
        self.time.pause(now);
        self.state = SessionState::Paused;
        Ok(())
    }

    /// Returns how long the session was paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<TimeDelta, TrackingError> {
        if self.state != SessionState::Paused {
            return Err(TrackingError::NotPaused);
        }
        let paused_for = self.time.resume(now);
        self.state = SessionState::Active;
        Ok(paused_for)
    }

    /// Freezes the metrics. Stopping while paused keeps the values from the pause.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<DerivedMetrics, TrackingError> {
        if !matches!(self.state, SessionState::Active | SessionState::Paused) {
            return Err(TrackingError::NotTracking);
        }

        let elapsed = self.time.advance(now);
        let metrics = DerivedMetrics::derive(&self.totals, elapsed, self.body_weight_kg);
        self.final_metrics = Some(metrics.clone());
        self.stopped_at = Some(now);
        self.state = SessionState::Terminal;
        Ok(metrics)
    }

    pub fn metrics(&self, now: DateTime<Utc>) -> DerivedMetrics {
        self.derive(now, self.body_weight_kg)
    }

    /// Like [`Self::metrics`], with calories for the given weight.
    pub fn metrics_with_weight(&self, now: DateTime<Utc>, body_weight_kg: f64) -> DerivedMetrics {
        self.derive(now, Some(body_weight_kg))
    }

    fn derive(&self, now: DateTime<Utc>, body_weight_kg: Option<f64>) -> DerivedMetrics {
        match &self.final_metrics {
            Some(metrics) => match body_weight_kg {
                Some(kg) => metrics.clone().with_body_weight(kg),
                None => metrics.clone(),
            },
            None => DerivedMetrics::derive(&self.totals, self.time.elapsed_active(now), body_weight_kg),
        }
    }

    /// Snapshot for the most recent sample, if there is one.
    pub fn snapshot(&self, now: DateTime<Utc>, anomaly: Option<SampleRejection>) -> Option<Snapshot> {
        let sample = self.samples.last()?.clone();
        Some(Snapshot {
            session_id: self.session_id,
            sample,
            metrics: self.metrics(now),
            anomaly,
        })
    }

    /// Accepted positions in order. Can be iterated any number of times.
    pub fn polyline(&self) -> impl Iterator<Item = Position> + Clone + '_ {
        self.samples.iter().map(|sample| sample.position)
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn samples(&self) -> &[TrackPoint] {
        &self.samples
    }

    pub fn distance_m(&self) -> f64 {
        self.totals.distance_m
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.time.started_at()
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }

    pub fn paused_total(&self) -> TimeDelta {
        self.time.paused_total()
    }
}
