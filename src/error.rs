//! Error taxonomy for the evaluation engine.
//!
//! None of these are fatal. Evaluation degrades to the `offline` tier or
//! silently excludes data; the variants exist so sources and the
//! application edge can log or report what was skipped.

use thiserror::Error;

/// Errors raised while ingesting or evaluating sensor data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A timestamp could not be resolved to an absolute instant.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// No reading has been received yet.
    #[error("no reading available")]
    MissingReading,

    /// A historical entry was skipped.
    #[error("malformed historical entry {key:?}: {reason}")]
    MalformedHistoricalEntry { key: String, reason: String },

    /// A live payload could not be turned into a reading.
    #[error("malformed reading: {0}")]
    MalformedReading(String),

    /// The subscription was cancelled; nothing further will be dispatched.
    #[error("subscription cancelled")]
    SubscriptionCancelled,

    /// Configuration could not be loaded or contained an invalid value.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let err = EngineError::MalformedHistoricalEntry {
            key: "yesterday".to_string(),
            reason: "unparseable timestamp".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "malformed historical entry \"yesterday\": unparseable timestamp"
        );
        assert_eq!(
            EngineError::InvalidTimestamp("abc".into()).to_string(),
            "invalid timestamp: abc"
        );
    }
}
