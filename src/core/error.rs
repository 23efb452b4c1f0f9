use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Bulk write error ({written} written): {message}")]
    BulkWrite { written: usize, message: String },

    #[error("Read error: {0}")]
    Read(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl DocError {
    /// Number of documents a failed write still managed to apply.
    pub fn written(&self) -> usize {
        match self {
            Self::BulkWrite { written, .. } => *written,
            _ => 0,
        }
    }

    /// Re-labels any failure as a read failure, keeping connection errors as-is.
    pub(crate) fn into_read(self) -> Self {
        match self {
            Self::Connection(_) | Self::Read(_) => self,
            other => Self::Read(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DocError>;

impl<T> From<std::sync::PoisonError<T>> for DocError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<serde_json::Error> for DocError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(format!("invalid document: {}", err))
    }
}

impl From<base64::DecodeError> for DocError {
    fn from(err: base64::DecodeError) -> Self {
        Self::InvalidCredentials(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DocError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Write(format!("worker task failed: {}", err))
    }
}
