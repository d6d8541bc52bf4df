use std::sync::Arc;

use chrono::{DateTime, Utc};
use geo_types::LineString;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    clock::Clock,
    config::TrackerConfig,
    error::TrackingError,
    metrics::DerivedMetrics,
    notifier::{Notifier, ObserverError, Snapshot, SubscriptionId},
    track_point::{to_line_string, Position, TrackPoint},
    track_session::{IngestOutcome, SessionState, TrackSession},
    validation::SampleValidator,
};

/// Everything about a finished session that is worth keeping.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub session_id: i64,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub metrics: DerivedMetrics,
    pub polyline: Vec<Position>,
    pub samples: Vec<TrackPoint>,
}

impl ActivityRecord {
    pub fn line_string(&self) -> LineString<f64> {
        to_line_string(self.polyline.iter().copied())
    }
}

/// Owns at most one running session and the observers watching it.
#[derive(Debug)]
pub struct ActivityTracker {
    config: TrackerConfig,
    validator: SampleValidator,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    session: Option<TrackSession>,
    next_session_id: i64,
}

impl ActivityTracker {
    pub fn new(config: TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        let validator = config.validator();
        Self {
            config,
            validator,
            clock,
            notifier: Notifier::new(),
            session: None,
            next_session_id: 1,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.session.as_ref().map_or(SessionState::Idle, TrackSession::state)
    }

    fn is_tracking(&self) -> bool {
        matches!(self.state(), SessionState::Active | SessionState::Paused)
    }

    /// Begins a new session and returns its id.
    pub fn start(&mut self) -> Result<i64, TrackingError> {
        if self.is_tracking() {
            return Err(TrackingError::AlreadyTracking);
        }

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        let now = self.clock.now();
        self.session = Some(TrackSession::start(session_id, now, self.config.body_weight_kg));
        info!("Started session {} at {}", session_id, now);
        Ok(session_id)
    }

    /// Feeds one sample to the running session. Samples that arrive while
    /// nothing is being tracked are ignored, not errors. Rejected samples
    /// only become errors with strict validation.
    pub fn ingest(&mut self, point: TrackPoint) -> Result<IngestOutcome, TrackingError> {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return Ok(IngestOutcome::Ignored(SessionState::Idle));
        };

        let outcome = session.ingest(point, &self.validator, now);
        match outcome {
            IngestOutcome::Rejected(rejection) if self.config.strict_validation => {
                Err(TrackingError::InvalidSample(rejection))
            }
            IngestOutcome::Accepted | IngestOutcome::Flagged(_) => {
                if let Some(snapshot) = session.snapshot(now, outcome.anomaly()) {
                    self.notifier.publish(&snapshot);
                }
                Ok(outcome)
            }
            _ => Ok(outcome),
        }
    }

    pub fn pause(&mut self) -> Result<(), TrackingError> {
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or(TrackingError::NotTracking)?;
        session.pause(now)?;
        info!("Paused session {} at {}", session.session_id(), now);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), TrackingError> {
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or(TrackingError::NotPaused)?;
        let paused_for = session.resume(now)?;
        info!(
            "Resumed session {} after {} s paused",
            session.session_id(),
            paused_for.num_seconds()
        );
        Ok(())
    }

    /// Ends the session and hands back what should be persisted.
    pub fn stop(&mut self) -> Result<ActivityRecord, TrackingError> {
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or(TrackingError::NotTracking)?;
        let metrics = session.stop(now)?;

        info!(
            "Stopped session {}: {:.1} m, {} s active, {} samples",
            session.session_id(),
            metrics.distance_m,
            metrics.elapsed_active().num_seconds(),
            metrics.sample_count
        );

        Ok(ActivityRecord {
            session_id: session.session_id(),
            started_at: session.started_at(),
            stopped_at: now,
            metrics,
            polyline: session.polyline().collect(),
            samples: session.samples().to_vec(),
        })
    }

    /// Metrics of the current (or last stopped) session.
    pub fn metrics(&self) -> Option<DerivedMetrics> {
        let now = self.clock.now();
        self.session.as_ref().map(|session| session.metrics(now))
    }

    pub fn metrics_with_weight(&self, body_weight_kg: f64) -> Option<DerivedMetrics> {
        let now = self.clock.now();
        self.session
            .as_ref()
            .map(|session| session.metrics_with_weight(now, body_weight_kg))
    }

    pub fn polyline(&self) -> impl Iterator<Item = Position> + Clone + '_ {
        self.session.iter().flat_map(|session| session.polyline())
    }

    pub fn session(&self) -> Option<&TrackSession> {
        self.session.as_ref()
    }

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&Snapshot) -> Result<(), ObserverError> + Send + 'static,
    {
        self.notifier.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}
