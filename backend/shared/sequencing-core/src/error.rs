use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid time range: from {from} is after to {to}")]
    InvalidTimeRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("invalid validator identity: {0}")]
    InvalidIdentity(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
