use axum::http::StatusCode;
use sequencing_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectorError {
    #[error("Store error: {0}")]
    Store(#[from] clickhouse::error::Error),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Upstream error: {0}")]
    UpstreamStatus(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InspectorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InspectorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            InspectorError::NotFound(_) => StatusCode::NOT_FOUND,
            InspectorError::Upstream(_) | InspectorError::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for InspectorError {
    fn from(err: CoreError) -> Self {
        InspectorError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InspectorError>;
