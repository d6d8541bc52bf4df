use activity_tracker_lib::TrackPoint;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{driver::DriverMessage, error::DriverError};

/// Where a position source delivers its readings. Samples go into the same
/// queue as lifecycle commands, so they are processed in arrival order.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: mpsc::Sender<DriverMessage>,
}

impl SampleSink {
    pub(crate) fn new(tx: mpsc::Sender<DriverMessage>) -> Self {
        Self { tx }
    }

    /// Waits for room in the queue.
    pub async fn deliver(&self, point: TrackPoint) -> Result<(), DriverError> {
        self.tx
            .send(DriverMessage::Sample(point))
            .await
            .map_err(|_| DriverError::Closed)
    }

    /// For callers that cannot wait, such as a receiver callback.
    pub fn try_deliver(&self, point: TrackPoint) -> Result<(), DriverError> {
        self.tx.try_send(DriverMessage::Sample(point)).map_err(|err| match err {
            TrySendError::Full(_) => DriverError::QueueFull,
            TrySendError::Closed(_) => DriverError::Closed,
        })
    }
}

/// A positioning receiver. The driver attaches it when a session starts and
/// detaches it when the session stops; after `detach` it must not deliver
/// anything more.
pub trait PositionSource: Send {
    fn attach(&mut self, sink: SampleSink);
    fn detach(&mut self);
}
