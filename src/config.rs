//! Configuration management and validation.
//!
//! Provides the import configuration with its defaults, builder-style
//! overrides, JSON config file loading, and the setup checks that make a
//! run fail before any row is streamed.

use crate::coercer::BooleanPolicy;
use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_BATCH_SIZE, DEFAULT_DELIMITER,
    DEFAULT_HEADER_ROW_COUNT, DEFAULT_TIMEOUT_SECONDS,
};
use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Settings for one import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Delimited text file to import
    pub file_path: PathBuf,

    /// Destination table (or dataset) name
    pub destination: String,

    /// Field delimiter, `\t` accepted for tab
    pub delimiter: String,

    /// Lines discarded before the data region
    pub header_row_count: usize,

    /// Comma-separated column names; derived from the first line when absent
    pub explicit_columns: Option<String>,

    /// Rows per transaction
    pub batch_size: usize,

    /// Per-batch commit timeout
    pub timeout_seconds: u64,

    /// Treatment of unrecognised boolean text
    pub boolean_policy: BooleanPolicy,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::new(),
            destination: String::new(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            header_row_count: DEFAULT_HEADER_ROW_COUNT,
            explicit_columns: None,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            boolean_policy: BooleanPolicy::default(),
        }
    }
}

impl ImportConfig {
    pub fn new(file_path: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_header_row_count(mut self, header_row_count: usize) -> Self {
        self.header_row_count = header_row_count;
        self
    }

    pub fn with_explicit_columns(mut self, columns: impl Into<String>) -> Self {
        self.explicit_columns = Some(columns.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_boolean_policy(mut self, policy: BooleanPolicy) -> Self {
        self.boolean_policy = policy;
        self
    }

    /// Delimiter with the `\t` escape expanded
    pub fn resolved_delimiter(&self) -> String {
        unescape_delimiter(&self.delimiter)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Check the settings that are fatal to a run
    pub fn validate(&self) -> Result<()> {
        if self.file_path.as_os_str().is_empty() {
            return Err(LoaderError::configuration("Parameter 'path' is required"));
        }
        if self.destination.trim().is_empty() {
            return Err(LoaderError::configuration(
                "Parameter 'destination' is required",
            ));
        }
        if self.delimiter.is_empty() {
            return Err(LoaderError::configuration(
                "Parameter 'delimiter' is required",
            ));
        }
        if self.batch_size == 0 {
            return Err(LoaderError::configuration(
                "Batch size must be greater than zero",
            ));
        }
        if let Some(columns) = &self.explicit_columns {
            if columns.trim().is_empty() {
                return Err(LoaderError::configuration(
                    "Explicit column list must not be empty",
                ));
            }
        }

        debug!("Configuration validated: {:?}", self);
        Ok(())
    }

    /// Load settings from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| LoaderError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `<user config dir>/csv-loader/config.json`
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or_else(|| LoaderError::configuration("Could not determine user config directory"))
    }
}

/// Expand `\t` to a tab character
pub fn unescape_delimiter(delimiter: &str) -> String {
    delimiter.replace("\\t", "\t")
}
