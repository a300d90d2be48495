//! Error handling for CSV import operations.
//!
//! Two tiers: [`LoaderError`] is fatal and aborts a run before any row is
//! streamed, [`BatchWriteError`] is reported by a sink for a single batch and
//! is folded into the import state without interrupting the run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Input file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Input file is empty: {path}")]
    EmptyInput { path: PathBuf },

    #[error("Schema discovery failed for destination '{destination}': {reason}")]
    SchemaFetch { destination: String, reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Config file error in {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Export failed: {message}")]
    Export { message: String },

    #[error("Processing interrupted: {reason}")]
    Interrupted { reason: String },
}

impl LoaderError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a schema discovery error
    pub fn schema_fetch(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaFetch {
            destination: destination.into(),
            reason: reason.into(),
        }
    }

    /// Create an export error
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export {
            message: message.into(),
        }
    }

    /// Create an interrupted error
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            reason: reason.into(),
        }
    }

    /// True for errors raised while checking configuration or input
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::FileNotFound { .. }
                | Self::EmptyInput { .. }
                | Self::ConfigFile { .. }
        )
    }
}

/// A sink failed to commit one batch. Recoverable: the run continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("batch {batch_number} failed: {message}")]
pub struct BatchWriteError {
    pub batch_number: u64,
    pub message: String,
}

impl BatchWriteError {
    pub fn new(batch_number: u64, message: impl Into<String>) -> Self {
        Self {
            batch_number,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_classification() {
        assert!(LoaderError::configuration("missing delimiter").is_setup_error());
        assert!(
            LoaderError::FileNotFound {
                path: PathBuf::from("/nope.csv")
            }
            .is_setup_error()
        );
        assert!(!LoaderError::schema_fetch("people", "no such table").is_setup_error());
    }

    #[test]
    fn test_error_messages() {
        let err = LoaderError::schema_fetch("people", "no such table");
        assert_eq!(
            err.to_string(),
            "Schema discovery failed for destination 'people': no such table"
        );

        let batch_err = BatchWriteError::new(3, "UNIQUE constraint failed");
        assert_eq!(batch_err.to_string(), "batch 3 failed: UNIQUE constraint failed");
    }
}
