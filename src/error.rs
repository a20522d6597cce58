use std::error::Error as StdError;
use std::fmt;

use crate::segmenter::SegmenterError;
use crate::storage::StorageError;

/// Closed set of failure kinds for the split pipeline.
///
/// The orchestrator matches on these to decide which compensating rollback
/// to run; the HTTP layer maps them onto response statuses.
#[derive(Debug)]
pub enum SplitError {
    /// Recording does not exist, or is not owned by the caller. The two
    /// cases are indistinguishable on purpose.
    NotFound,
    /// Prior split segments exist and `force` was not set
    Conflict { existing: usize },
    /// Source produced fewer than two chunks at the requested segment length
    TooShort,
    /// The external segmentation process failed or timed out
    Segmenter(SegmenterError),
    /// A blob storage operation failed
    Storage(StorageError),
    /// A metadata store query or transaction failed
    Database(sqlx::Error),
    /// Filesystem error in the working directory
    Io(std::io::Error),
}

impl fmt::Display for SplitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitError::NotFound => write!(f, "Recording not found"),
            SplitError::Conflict { existing } => {
                write!(f, "Recording already has {} split segments", existing)
            }
            SplitError::TooShort => write!(f, "Recording too short to split"),
            SplitError::Segmenter(err) => write!(f, "Segmenter error: {}", err),
            SplitError::Storage(err) => write!(f, "Storage error: {}", err),
            SplitError::Database(err) => write!(f, "Database error: {}", err),
            SplitError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl StdError for SplitError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SplitError::Segmenter(err) => Some(err),
            SplitError::Storage(err) => Some(err),
            SplitError::Database(err) => Some(err),
            SplitError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SegmenterError> for SplitError {
    fn from(err: SegmenterError) -> Self {
        SplitError::Segmenter(err)
    }
}

impl From<StorageError> for SplitError {
    fn from(err: StorageError) -> Self {
        SplitError::Storage(err)
    }
}

impl From<sqlx::Error> for SplitError {
    fn from(err: sqlx::Error) -> Self {
        SplitError::Database(err)
    }
}

impl From<std::io::Error> for SplitError {
    fn from(err: std::io::Error) -> Self {
        SplitError::Io(err)
    }
}
