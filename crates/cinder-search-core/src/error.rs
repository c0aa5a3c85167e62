//! Error taxonomy for search sessions.
//!
//! Every variant aborts the session it occurs in. Empty cells are never
//! errors; they simply leave a field unset.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::SessionState;

pub type Result<T, E = SearchError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SearchError {
    /// A declared column role names a column the document header lacks.
    #[error("document {document}: column '{column}' is not present in the header")]
    MissingColumn { document: String, column: String },

    #[error("document {document}: column '{column}' holds non-numeric value '{value}'")]
    InvalidNumber {
        document: String,
        column: String,
        value: String,
    },

    #[error("document {document}: {reason}")]
    UnsupportedDocument { document: String, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse delimited row in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("line search failed: {0}")]
    LineSearch(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error("session cannot move from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("search session was cancelled")]
    Cancelled,
}

impl SearchError {
    pub fn missing_column(document: impl Into<String>, column: impl Into<String>) -> Self {
        SearchError::MissingColumn {
            document: document.into(),
            column: column.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SearchError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        SearchError::Csv {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by a document's declared schema rather than
    /// by infrastructure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SearchError::MissingColumn { .. }
                | SearchError::InvalidNumber { .. }
                | SearchError::UnsupportedDocument { .. }
        )
    }
}
