pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod geodesic;
pub mod metrics;
pub mod notifier;
pub mod time_accountant;
pub mod track_point;
pub mod track_session;
pub mod tracker;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TrackerConfig;
pub use error::{ConfigError, TrackingError};
pub use metrics::DerivedMetrics;
pub use notifier::{Snapshot, SubscriptionId};
pub use track_point::{Position, TrackPoint};
pub use track_session::{IngestOutcome, SessionState, TrackSession};
pub use tracker::{ActivityRecord, ActivityTracker};
pub use validation::{AnomalyPolicy, SampleRejection};
