use activity_tracker_lib::{ConfigError, TrackingError};
use gpx::errors::GpxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error("the driver task is no longer running")]
    Closed,
    #[error("the sample queue is full")]
    QueueFull,
    #[error("GPX error: {0}")]
    Gpx(#[from] GpxError),
    #[error("invalid GPX timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
