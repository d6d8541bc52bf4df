use activity_tracker_lib::{
    ActivityRecord, ActivityTracker, Clock, DerivedMetrics, IngestOutcome, ManualClock, Snapshot, TrackPoint,
    TrackingError,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    error::DriverError,
    source::{PositionSource, SampleSink},
};

type Reply<T> = oneshot::Sender<Result<T, TrackingError>>;

#[derive(Debug)]
pub enum DriverMessage {
    Start(Reply<i64>),
    Sample(TrackPoint),
    Pause(Reply<()>),
    Resume(Reply<()>),
    Stop(Reply<ActivityRecord>),
    Metrics(oneshot::Sender<Option<DerivedMetrics>>),
    Shutdown,
}

/// Owns the tracker and applies queued messages to it one at a time.
pub struct Driver {
    tracker: ActivityTracker,
    rx: mpsc::Receiver<DriverMessage>,
    // Weak, so the loop still ends once every handle is gone.
    sink_tx: mpsc::WeakSender<DriverMessage>,
    source: Option<Box<dyn PositionSource>>,
    sample_clock: Option<ManualClock>,
}

impl Driver {
    pub fn new(tracker: ActivityTracker, capacity: usize) -> (Self, DriverHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let driver = Self {
            tracker,
            rx,
            sink_tx: tx.downgrade(),
            source: None,
            sample_clock: None,
        };
        (driver, DriverHandle { tx })
    }

    pub fn with_source(mut self, source: Box<dyn PositionSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Moves `clock` forward to each sample's timestamp before it is ingested.
    /// Used for replays, where the tracker should run on recorded time.
    pub fn follow_sample_time(mut self, clock: ManualClock) -> Self {
        self.sample_clock = Some(clock);
        self
    }

    /// Runs until a `Shutdown` message arrives or every handle is dropped,
    /// then gives the tracker back.
    pub async fn run(mut self) -> ActivityTracker {
        info!("Driver running");

        while let Some(message) = self.rx.recv().await {
            match message {
                DriverMessage::Start(reply) => {
                    let result = self.tracker.start();
                    if result.is_ok() {
                        self.attach_source();
                    }
                    let _ = reply.send(result);
                }
                DriverMessage::Sample(point) => self.ingest(point),
                DriverMessage::Pause(reply) => {
                    let _ = reply.send(self.tracker.pause());
                }
                DriverMessage::Resume(reply) => {
                    let _ = reply.send(self.tracker.resume());
                }
                DriverMessage::Stop(reply) => {
                    let result = self.tracker.stop();
                    if result.is_ok() {
                        self.detach_source();
                    }
                    let _ = reply.send(result);
                }
                DriverMessage::Metrics(reply) => {
                    let _ = reply.send(self.tracker.metrics());
                }
                DriverMessage::Shutdown => break,
            }
        }

        self.detach_source();
        info!("Driver stopped");
        self.tracker
    }

    fn ingest(&mut self, point: TrackPoint) {
        let before = self.sample_clock.as_ref().map(|clock| {
            let before = clock.now();
            clock.advance_to(point.timestamp);
            before
        });

        let result = self.tracker.ingest(point);
        match &result {
            Ok(outcome) => debug!("Sample handled: {:?}", outcome),
            Err(err) => warn!("Sample failed: {}", err),
        }

        // Dropped samples leave recorded time where it was.
        if let (Some(clock), Some(before)) = (&self.sample_clock, before) {
            if matches!(result, Ok(IngestOutcome::Rejected(_)) | Err(_)) {
                clock.set(before);
            }
        }
    }

    fn attach_source(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        match self.sink_tx.upgrade() {
            Some(tx) => {
                source.attach(SampleSink::new(tx));
                debug!("Position source attached");
            }
            None => warn!("No handles left, not attaching position source"),
        }
    }

    fn detach_source(&mut self) {
        if let Some(source) = self.source.as_mut() {
            source.detach();
            debug!("Position source detached");
        }
    }
}

/// Cheap to clone. Every clone feeds the same driver.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: mpsc::Sender<DriverMessage>,
}

impl DriverHandle {
    async fn request<T>(&self, message: impl FnOnce(Reply<T>) -> DriverMessage) -> Result<T, DriverError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(message(reply_tx)).await.map_err(|_| DriverError::Closed)?;
        let result = reply_rx.await.map_err(|_| DriverError::Closed)?;
        Ok(result?)
    }

    pub async fn start(&self) -> Result<i64, DriverError> {
        self.request(DriverMessage::Start).await
    }

    pub async fn pause(&self) -> Result<(), DriverError> {
        self.request(DriverMessage::Pause).await
    }

    pub async fn resume(&self) -> Result<(), DriverError> {
        self.request(DriverMessage::Resume).await
    }

    pub async fn stop(&self) -> Result<ActivityRecord, DriverError> {
        self.request(DriverMessage::Stop).await
    }

    pub async fn metrics(&self) -> Result<Option<DerivedMetrics>, DriverError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DriverMessage::Metrics(reply_tx))
            .await
            .map_err(|_| DriverError::Closed)?;
        reply_rx.await.map_err(|_| DriverError::Closed)
    }

    pub async fn sample(&self, point: TrackPoint) -> Result<(), DriverError> {
        self.sink().deliver(point).await
    }

    pub async fn shutdown(&self) -> Result<(), DriverError> {
        self.tx.send(DriverMessage::Shutdown).await.map_err(|_| DriverError::Closed)
    }

    pub fn sink(&self) -> SampleSink {
        SampleSink::new(self.tx.clone())
    }
}

/// Re-publishes the tracker's snapshots on a broadcast channel for async
/// consumers. Slow receivers lag instead of blocking ingestion.
pub fn forward_snapshots(tracker: &mut ActivityTracker, capacity: usize) -> broadcast::Sender<Snapshot> {
    let (tx, _rx) = broadcast::channel(capacity.max(1));
    let forward = tx.clone();
    tracker.subscribe(move |snapshot| {
        // Having no receivers right now is fine.
        let _ = forward.send(snapshot.clone());
        Ok(())
    });
    tx
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use activity_tracker_lib::{SessionState, TrackerConfig};
    use chrono::{DateTime, TimeDelta, Utc};

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn spawn_driver(source: Option<Box<dyn PositionSource>>) -> (DriverHandle, tokio::task::JoinHandle<ActivityTracker>) {
        let clock = ManualClock::new(t(0));
        let tracker = ActivityTracker::new(TrackerConfig::default(), Arc::new(clock.clone()));
        let (mut driver, handle) = Driver::new(tracker, 16);
        driver = driver.follow_sample_time(clock);
        if let Some(source) = source {
            driver = driver.with_source(source);
        }
        (handle, tokio::spawn(driver.run()))
    }

    #[derive(Default)]
    struct RecordingSource {
        events: Arc<Mutex<Vec<&'static str>>>,
    }

    impl PositionSource for RecordingSource {
        fn attach(&mut self, _sink: SampleSink) {
            self.events.lock().unwrap().push("attach");
        }

        fn detach(&mut self) {
            self.events.lock().unwrap().push("detach");
        }
    }

    #[tokio::test]
    async fn commands_and_samples_are_applied_in_order() {
        let (handle, driver) = spawn_driver(None);

        // Sent before start, so it is ignored.
        handle.sample(TrackPoint::at(0.0, 0.0, t(0))).await.unwrap();
        assert_eq!(handle.start().await.unwrap(), 1);

        handle.sample(TrackPoint::at(0.0, 0.0, t(1))).await.unwrap();
        handle.sample(TrackPoint::at(0.0, 0.001, t(11))).await.unwrap();
        handle.pause().await.unwrap();
        handle.sample(TrackPoint::at(0.0, 0.002, t(21))).await.unwrap();

        let metrics = handle.metrics().await.unwrap().unwrap();
        assert_eq!(metrics.sample_count, 2);
        assert_eq!(metrics.elapsed_active(), TimeDelta::seconds(11));

        let record = handle.stop().await.unwrap();
        assert_eq!(record.polyline.len(), 2);

        handle.shutdown().await.unwrap();
        let tracker = driver.await.unwrap();
        assert_eq!(tracker.state(), SessionState::Terminal);
    }

    #[tokio::test]
    async fn rejected_sample_does_not_move_recorded_time() {
        let (handle, driver) = spawn_driver(None);
        handle.start().await.unwrap();

        handle.sample(TrackPoint::at(0.0, 0.0, t(0))).await.unwrap();
        handle.sample(TrackPoint::at(0.0, 0.001, t(10))).await.unwrap();
        // Out of range and a day ahead.
        handle.sample(TrackPoint::at(120.0, 0.0, t(86_400))).await.unwrap();

        let metrics = handle.metrics().await.unwrap().unwrap();
        assert_eq!(metrics.sample_count, 2);
        assert_eq!(metrics.elapsed_active(), TimeDelta::seconds(10));

        // Time picks up again from the last good sample.
        handle.sample(TrackPoint::at(0.0, 0.002, t(20))).await.unwrap();
        let metrics = handle.metrics().await.unwrap().unwrap();
        assert_eq!(metrics.sample_count, 3);
        assert_eq!(metrics.elapsed_active(), TimeDelta::seconds(20));

        handle.shutdown().await.unwrap();
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn tracking_errors_come_back_to_the_caller() {
        let (handle, _driver) = spawn_driver(None);

        assert!(matches!(handle.resume().await, Err(DriverError::Tracking(TrackingError::NotPaused))));
        handle.start().await.unwrap();
        assert!(matches!(handle.start().await, Err(DriverError::Tracking(TrackingError::AlreadyTracking))));
        handle.stop().await.unwrap();
        assert!(matches!(handle.stop().await, Err(DriverError::Tracking(TrackingError::NotTracking))));
    }

    #[tokio::test]
    async fn source_is_attached_on_start_and_detached_on_stop() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let source = RecordingSource { events: events.clone() };
        let (handle, driver) = spawn_driver(Some(Box::new(source)));

        handle.start().await.unwrap();
        // A failed start must not attach a second time.
        assert!(handle.start().await.is_err());
        handle.stop().await.unwrap();
        assert_eq!(*events.lock().unwrap(), vec!["attach", "detach"]);

        drop(handle);
        driver.await.unwrap();
        assert_eq!(*events.lock().unwrap(), vec!["attach", "detach", "detach"]);
    }

    #[tokio::test]
    async fn handle_fails_once_driver_is_gone() {
        let (handle, driver) = spawn_driver(None);
        handle.shutdown().await.unwrap();
        driver.await.unwrap();

        assert!(matches!(handle.start().await, Err(DriverError::Closed)));
        assert!(matches!(handle.sample(TrackPoint::at(0.0, 0.0, t(0))).await, Err(DriverError::Closed)));
    }

    #[tokio::test]
    async fn snapshots_reach_broadcast_receivers() {
        let clock = ManualClock::new(t(0));
        let mut tracker = ActivityTracker::new(TrackerConfig::default(), Arc::new(clock.clone()));
        let snapshots = forward_snapshots(&mut tracker, 8);
        let mut rx = snapshots.subscribe();

        let (driver, handle) = Driver::new(tracker, 8);
        let driver = tokio::spawn(driver.follow_sample_time(clock).run());

        handle.start().await.unwrap();
        handle.sample(TrackPoint::at(0.0, 0.0, t(0))).await.unwrap();
        handle.sample(TrackPoint::at(0.0, 0.001, t(10))).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.session_id, 1);
        assert_eq!(first.metrics.distance_m, 0.0);
        assert!(second.metrics.distance_m > 100.0);

        handle.shutdown().await.unwrap();
        driver.await.unwrap();
    }
}
