//! Progress reporting for import runs
//!
//! Wraps an optional `indicatif` bar over data rows. A reporter that was
//! never set up ignores every call, so the importer can drive it
//! unconditionally.

use crate::models::ImportState;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

const ROWS_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%) | {msg}";

/// Progress reporter for one import
pub struct ProgressReporter {
    progress_bar: Option<ProgressBar>,
    total_rows: u64,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            progress_bar: None,
            total_rows: 0,
        }
    }

    /// Create the bar for `total_rows` data rows
    pub fn setup_progress(&mut self, total_rows: u64) {
        self.total_rows = total_rows;

        let pb = ProgressBar::new(total_rows);
        let style = ProgressStyle::default_bar()
            .template(ROWS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ");
        pb.set_style(style);
        pb.set_message("Importing");

        debug!("Progress bar initialized for {} rows", total_rows);
        self.progress_bar = Some(pb);
    }

    pub fn increment(&self, rows: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(rows);
        }
    }

    /// Show batch and failure counts next to the bar
    pub fn update_with_state(&self, state: &ImportState) {
        if let Some(ref pb) = self.progress_bar {
            let message = if state.has_errors() {
                format!("{} batches, {} failed", state.batch_count, state.errors.len())
            } else {
                format!("{} batches", state.batch_count)
            };
            pb.set_message(message);
        }
    }

    pub fn finish(&self, state: &ImportState) {
        if let Some(ref pb) = self.progress_bar {
            let message = format!(
                "Completed: {} rows written in {} batches",
                state.rows_written, state.batch_count
            );
            pb.finish_with_message(message.clone());
            debug!("Progress reporting completed: {}", message);
        }
    }

    pub fn finish_with_error(&self, error_message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.abandon_with_message(format!("Finished with errors: {}", error_message));
            debug!("Progress reporting finished with error: {}", error_message);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.progress_bar.is_some()
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn current_position(&self) -> u64 {
        self.progress_bar.as_ref().map_or(0, ProgressBar::position)
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            (self.current_position() as f64 / self.total_rows as f64) * 100.0
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(ref pb) = self.progress_bar {
            if !pb.is_finished() {
                pb.finish_and_clear();
            }
        }
    }
}
