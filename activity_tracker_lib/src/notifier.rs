use std::{
    any::Any,
    fmt::{self, Debug},
    panic::{self, AssertUnwindSafe},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{metrics::DerivedMetrics, track_point::TrackPoint, validation::SampleRejection};

pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// What observers receive after every accepted sample.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub session_id: i64,
    pub sample: TrackPoint,
    pub metrics: DerivedMetrics,
    /// Set when the sample was accepted despite a validation finding.
    pub anomaly: Option<SampleRejection>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Callback = Box<dyn FnMut(&Snapshot) -> Result<(), ObserverError> + Send>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

impl Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscriber {{ id: {} }}", self.id)
    }
}

/// Synchronous fan-out of snapshots, in registration order.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Snapshot) -> Result<(), ObserverError> + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns whether anything was removed. Unknown ids are ignored.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    /// Delivers `snapshot` to every observer and returns how many took it
    /// without failing. A failing or panicking observer is logged and skipped.
    pub fn publish(&mut self, snapshot: &Snapshot) -> usize {
        let mut delivered = 0;

        for subscriber in self.subscribers.iter_mut() {
            let callback = &mut subscriber.callback;
            match panic::catch_unwind(AssertUnwindSafe(|| callback(snapshot))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    error!("Observer {} failed on session {}: {}", subscriber.id, snapshot.session_id, err);
                }
                Err(payload) => {
                    error!(
                        "Observer {} panicked on session {}: {}",
                        subscriber.id,
                        snapshot.session_id,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        delivered
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, TimeDelta};

    use super::*;
    use crate::metrics::SessionTotals;

    fn snapshot() -> Snapshot {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Snapshot {
            session_id: 1,
            sample: TrackPoint::at(0.0, 0.0, ts),
            metrics: DerivedMetrics::derive(&SessionTotals::default(), TimeDelta::zero(), None),
            anomaly: None,
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> impl FnMut(&Snapshot) -> Result<(), ObserverError> {
        let log = log.clone();
        move |_| {
            log.lock().unwrap().push(name);
            Ok(())
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = Notifier::new();
        notifier.subscribe(recorder(&log, "a"));
        notifier.subscribe(recorder(&log, "b"));
        notifier.subscribe(recorder(&log, "c"));

        assert_eq!(notifier.publish(&snapshot()), 3);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = Notifier::new();
        let a = notifier.subscribe(recorder(&log, "a"));
        notifier.subscribe(recorder(&log, "b"));

        assert!(notifier.unsubscribe(a));
        assert!(!notifier.unsubscribe(a));
        assert!(!notifier.unsubscribe(SubscriptionId(99)));
        assert_eq!(notifier.len(), 1);

        notifier.publish(&snapshot());
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn failing_observers_do_not_stop_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = Notifier::new();
        notifier.subscribe(|_| Err("dashboard went away".into()));
        notifier.subscribe(|_| panic!("observer bug"));
        notifier.subscribe(recorder(&log, "last"));

        assert_eq!(notifier.publish(&snapshot()), 1);
        assert_eq!(notifier.publish(&snapshot()), 1);
        assert_eq!(*log.lock().unwrap(), vec!["last", "last"]);
    }

    #[test]
    fn ids_are_not_reused() {
        let mut notifier = Notifier::new();
        let first = notifier.subscribe(|_| Ok(()));
        notifier.unsubscribe(first);
        let second = notifier.subscribe(|_| Ok(()));
        assert_ne!(first, second);
        assert!(!notifier.is_empty());
    }
}
