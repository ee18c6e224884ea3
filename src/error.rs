use crate::config::ConfigError;
use crate::reports::ReportError;
use crate::store::StoreError;
use thiserror::Error;

/// Everything an engine call can fail with, as seen by the IPC layer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Store(StoreError::Db(e))
    }
}

impl EngineError {
    /// Stable error code sent back to the host.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "config_invalid",
            EngineError::Store(StoreError::Missing(_)) | EngineError::NotFound(_) => "not_found",
            EngineError::Store(StoreError::Db(_)) | EngineError::Other(_) => "db_query_failed",
            EngineError::Report(_) => "report_blocked",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
