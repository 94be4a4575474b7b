// Error taxonomy shared by the generator and both storage backends

use datafusion::arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use thiserror::Error;

use crate::repository::Backend;

/// Convenience alias for `Result<T, SalesError>`.
pub type Result<T> = std::result::Result<T, SalesError>;

#[derive(Error, Debug)]
pub enum SalesError {
    /// Malformed generator parameters or query arguments. Never clamped.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection, ingest or query failure inside a store.
    #[error("{backend} backend error: {source}")]
    Backend {
        backend: Backend,
        #[source]
        source: BackendError,
    },

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),
}

/// Underlying cause of a backend failure.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot decode aggregated combination: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    DataFusion(#[from] DataFusionError),

    #[error(transparent)]
    Arrow(#[from] ArrowError),

    #[error("query runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("numeric overflow: {0}")]
    Overflow(String),

    #[error("session is closed")]
    SessionClosed,

    #[error("corrupt data part: {0}")]
    CorruptPart(String),
}

impl SalesError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SalesError::InvalidArgument(msg.into())
    }

    pub fn backend(backend: Backend, source: impl Into<BackendError>) -> Self {
        SalesError::Backend {
            backend,
            source: source.into(),
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, SalesError::InvalidArgument(_))
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, SalesError::Backend { .. })
    }
}

impl From<rusqlite::Error> for SalesError {
    fn from(err: rusqlite::Error) -> Self {
        SalesError::backend(Backend::Row, err)
    }
}
