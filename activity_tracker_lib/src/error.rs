use thiserror::Error;

use crate::validation::SampleRejection;

/// Failed lifecycle operation. A failed call never changes session state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("a tracking session is already in progress")]
    AlreadyTracking,
    #[error("no tracking session is in progress")]
    NotTracking,
    #[error("the tracking session is not paused")]
    NotPaused,
    /// Only surfaced when strict validation is enabled.
    #[error("sample rejected: {0}")]
    InvalidSample(SampleRejection),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("line {line}: expected `key = value`, got `{content}`")]
    MalformedLine { line: usize, content: String },
    #[error("line {line}: unknown key `{key}`")]
    UnknownKey { line: usize, key: String },
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: &str) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
