//! Error types for convoy writers.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by every public writer operation.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("cannot create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("writer is closed")]
    Closed,

    #[error("encoding failed while {context}: {source}")]
    Encoding {
        context: &'static str,
        #[source]
        source: Arc<EncodingFault>,
    },
}

/// What the encoder or the underlying stream rejected.
#[derive(Debug, Error)]
pub enum EncodingFault {
    #[error("record has {found} fields, expected {expected}")]
    UnequalLengths { expected: usize, found: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl WriterError {
    pub(crate) fn encoding(context: &'static str, fault: impl Into<EncodingFault>) -> Self {
        Self::Encoding {
            context,
            source: Arc::new(fault.into()),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_encoding(&self) -> bool {
        matches!(self, Self::Encoding { .. })
    }

    /// The underlying fault, if this is an encoding error.
    pub fn fault(&self) -> Option<&EncodingFault> {
        match self {
            Self::Encoding { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Alias for `Result<T, WriterError>`.
pub type WriterResult<T> = Result<T, WriterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_error_exposes_fault() {
        let err = WriterError::encoding(
            "writing a row",
            EncodingFault::UnequalLengths { expected: 3, found: 2 },
        );
        assert!(err.is_encoding());
        assert!(!err.is_closed());
        assert!(matches!(
            err.fault(),
            Some(EncodingFault::UnequalLengths { expected: 3, found: 2 })
        ));
        assert_eq!(
            err.to_string(),
            "encoding failed while writing a row: record has 2 fields, expected 3"
        );
    }

    #[test]
    fn closed_has_no_fault() {
        assert!(WriterError::Closed.fault().is_none());
        assert_eq!(WriterError::Closed.to_string(), "writer is closed");
    }
}
