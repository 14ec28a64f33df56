//! Request-level failures of the two jobs.

use crate::chapters::ChapterError;
use crate::encode::EncodeError;
use crate::urls::UrlError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Rejected before any work starts.
    #[error("{0}")]
    InvalidInput(String),

    /// The external encoder failed; carries its diagnostics.
    #[error("{0}")]
    Encoder(#[from] EncodeError),

    /// Staging, archive or spool I/O failed.
    #[error("{0:#}")]
    Io(anyhow::Error),
}

impl JobError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<UrlError> for JobError {
    fn from(err: UrlError) -> Self {
        Self::InvalidInput(format!("invalid url: {err}"))
    }
}

impl From<ChapterError> for JobError {
    fn from(err: ChapterError) -> Self {
        Self::InvalidInput(format!("invalid chapters: {err}"))
    }
}
