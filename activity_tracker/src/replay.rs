use std::time::Duration;

use activity_tracker_lib::TrackPoint;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::source::{PositionSource, SampleSink};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Deliver as fast as the queue accepts.
    Immediate,
    /// Wait out the recorded gaps between points, divided by `speedup`.
    RealTime { speedup: f64 },
}

impl Pacing {
    pub fn from_speedup(speedup: Option<f64>) -> Self {
        match speedup {
            Some(speedup) if speedup.is_finite() && speedup > 0.0 => Pacing::RealTime { speedup },
            _ => Pacing::Immediate,
        }
    }

    fn delay(&self, previous: &TrackPoint, next: &TrackPoint) -> Option<Duration> {
        let Pacing::RealTime { speedup } = *self else {
            return None;
        };
        let gap = (next.timestamp - previous.timestamp).to_std().ok()?;
        Some(gap.div_f64(speedup))
    }
}

/// Plays back recorded track points as if a receiver were producing them.
pub struct GpxReplaySource {
    points: Vec<TrackPoint>,
    pacing: Pacing,
    task: Option<JoinHandle<()>>,
    finished: Option<oneshot::Sender<usize>>,
}

impl GpxReplaySource {
    /// The receiver resolves with the number of delivered points once the
    /// whole recording has been queued.
    pub fn new(points: Vec<TrackPoint>, pacing: Pacing) -> (Self, oneshot::Receiver<usize>) {
        let (finished, done) = oneshot::channel();
        let source = Self {
            points,
            pacing,
            task: None,
            finished: Some(finished),
        };
        (source, done)
    }
}

impl PositionSource for GpxReplaySource {
    fn attach(&mut self, sink: SampleSink) {
        self.detach();

        let points = self.points.clone();
        let pacing = self.pacing;
        let finished = self.finished.take();

        info!("Replaying {} points ({:?})", points.len(), pacing);
        self.task = Some(tokio::spawn(async move {
            let mut delivered = 0;
            let mut previous: Option<&TrackPoint> = None;

            for point in &points {
                if let Some(delay) = previous.and_then(|previous| pacing.delay(previous, point)) {
                    tokio::time::sleep(delay).await;
                }
                if let Err(err) = sink.deliver(point.clone()).await {
                    warn!("Replay stopped early: {}", err);
                    break;
                }
                delivered += 1;
                previous = Some(point);
            }

            debug!("Replay delivered {} points", delivered);
            if let Some(finished) = finished {
                let _ = finished.send(delivered);
            }
        }));
    }

    fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use activity_tracker_lib::{ActivityTracker, ManualClock, TrackerConfig};
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::driver::Driver;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn route() -> Vec<TrackPoint> {
        (0..30)
            .map(|i| TrackPoint::at(56.0, 10.0 + 0.0002 * i as f64, t(i * 3)).with_altitude(20.0 + (i % 5) as f64))
            .collect()
    }

    #[test]
    fn pacing_from_speedup() {
        assert_eq!(Pacing::from_speedup(None), Pacing::Immediate);
        assert_eq!(Pacing::from_speedup(Some(0.0)), Pacing::Immediate);
        assert_eq!(Pacing::from_speedup(Some(60.0)), Pacing::RealTime { speedup: 60.0 });

        let pacing = Pacing::RealTime { speedup: 10.0 };
        let delay = pacing.delay(&TrackPoint::at(0.0, 0.0, t(0)), &TrackPoint::at(0.0, 0.0, t(5)));
        assert_eq!(delay, Some(Duration::from_millis(500)));
        assert_eq!(pacing.delay(&TrackPoint::at(0.0, 0.0, t(5)), &TrackPoint::at(0.0, 0.0, t(0))), None);
    }

    #[tokio::test]
    async fn replay_through_driver_matches_direct_ingestion() {
        let points = route();

        let direct_clock = ManualClock::new(t(0));
        let mut direct = ActivityTracker::new(TrackerConfig::default(), Arc::new(direct_clock.clone()));
        direct.start().unwrap();
        for point in points.iter().cloned() {
            direct_clock.advance_to(point.timestamp);
            direct.ingest(point).unwrap();
        }
        let expected = direct.stop().unwrap();

        let clock = ManualClock::new(t(0));
        let tracker = ActivityTracker::new(TrackerConfig::default(), Arc::new(clock.clone()));
        let (source, done) = GpxReplaySource::new(points, Pacing::Immediate);
        let (driver, handle) = Driver::new(tracker, 4);
        let driver = tokio::spawn(driver.with_source(Box::new(source)).follow_sample_time(clock).run());

        handle.start().await.unwrap();
        assert_eq!(done.await.unwrap(), 30);
        let record = handle.stop().await.unwrap();

        assert_eq!(record.metrics, expected.metrics);
        assert_eq!(record.polyline, expected.polyline);

        handle.shutdown().await.unwrap();
        driver.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn real_time_pacing_waits_between_points() {
        let clock = ManualClock::new(t(0));
        let tracker = ActivityTracker::new(TrackerConfig::default(), Arc::new(clock.clone()));
        let (source, done) = GpxReplaySource::new(route(), Pacing::RealTime { speedup: 3.0 });
        let (driver, handle) = Driver::new(tracker, 4);
        let _driver = tokio::spawn(driver.with_source(Box::new(source)).follow_sample_time(clock).run());

        let started = tokio::time::Instant::now();
        handle.start().await.unwrap();
        assert_eq!(done.await.unwrap(), 30);

        // 29 gaps of 3 s, three times faster.
        assert!(started.elapsed() >= Duration::from_secs(29));
        assert_eq!(handle.metrics().await.unwrap().unwrap().sample_count, 30);
    }
}
