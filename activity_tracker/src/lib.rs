pub mod config;
pub mod driver;
pub mod error;
pub mod gpx_util;
pub mod replay;
pub mod source;

pub use config::DriverConfig;
pub use driver::{Driver, DriverHandle, DriverMessage, forward_snapshots};
pub use error::DriverError;
pub use replay::{GpxReplaySource, Pacing};
pub use source::{PositionSource, SampleSink};
