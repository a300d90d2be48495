//! Import orchestration.
//!
//! The [`Importer`] drives one run through `Idle → Counting → Streaming →
//! (Flushing)* → Done`. Setup problems (configuration, missing or empty
//! input, schema discovery) end the run in `Failed` before any row is read.
//! Once streaming starts the run always reaches `Done`: field coercion
//! failures become nulls, short rows are skipped and sink failures are
//! recorded in [`ImportState::errors`].

pub mod progress;

#[cfg(test)]
pub mod tests;

use crate::coercer::ValueCoercer;
use crate::config::ImportConfig;
use crate::constants::COLUMN_LIST_DELIMITER;
use crate::destination::{BulkSink, SchemaProbe};
use crate::error::{LoaderError, Result};
use crate::models::{Batch, ImportPhase, ImportState, Row, Schema};
use crate::planner::{BatchPlan, should_flush};
use crate::tokenizer::{Tokenizer, has_balanced_quotes};
use progress::ProgressReporter;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Shared stop request, checked between batches
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything resolved before the first data row is read
struct RunSetup {
    tokenizer: Tokenizer,
    schema: Arc<Schema>,
}

/// Streams one delimited file into a destination in batches
pub struct Importer<P, S> {
    config: ImportConfig,
    probe: P,
    sink: S,
    coercer: ValueCoercer,
    cancellation: CancellationFlag,
    show_progress: bool,
    phase: ImportPhase,
}

impl<P: SchemaProbe, S: BulkSink> Importer<P, S> {
    pub fn new(config: ImportConfig, probe: P, sink: S) -> Self {
        let coercer = ValueCoercer::new(config.boolean_policy);
        Self {
            config,
            probe,
            sink,
            coercer,
            cancellation: CancellationFlag::default(),
            show_progress: false,
            phase: ImportPhase::Idle,
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run the import to completion.
    ///
    /// Returns `Err` only for setup failures. Batch failures are reported
    /// through the returned state.
    pub fn run(&mut self) -> Result<ImportState> {
        let setup = match self.prepare() {
            Ok(setup) => setup,
            Err(e) => {
                self.phase = ImportPhase::Failed;
                error!(
                    "Import of {} failed during setup: {}",
                    self.config.file_path.display(),
                    e
                );
                return Err(e);
            }
        };

        self.phase = ImportPhase::Counting;
        let total_data_rows =
            match count_data_rows(&self.config.file_path, self.config.header_row_count) {
                Ok(total) => total,
                Err(e) => {
                    self.phase = ImportPhase::Failed;
                    return Err(e.into());
                }
            };

        let plan = BatchPlan::new(total_data_rows, self.config.batch_size as u64);
        info!(
            "Importing {} data rows from {} into {} ({} batches of up to {})",
            total_data_rows,
            self.config.file_path.display(),
            self.config.destination,
            plan.batch_count(),
            plan.batch_size
        );

        let mut state = ImportState::new(total_data_rows);
        if let Err(e) = self.stream(&setup, &mut state) {
            self.phase = ImportPhase::Failed;
            return Err(e);
        }

        self.phase = ImportPhase::Done;
        info!(
            "Import finished: {}/{} rows written in {} batches, {} failed",
            state.rows_written,
            state.rows_attempted,
            state.batch_count,
            state.errors.len()
        );
        Ok(state)
    }

    fn prepare(&self) -> Result<RunSetup> {
        self.config.validate()?;
        let tokenizer = Tokenizer::new(self.config.resolved_delimiter())?;
        debug!("Splitting fields on {:?}", tokenizer.delimiter());

        let path = &self.config.file_path;
        if !path.exists() {
            return Err(LoaderError::FileNotFound { path: path.clone() });
        }
        if std::fs::metadata(path)?.len() == 0 {
            return Err(LoaderError::EmptyInput { path: path.clone() });
        }

        let column_names = self.column_names(&tokenizer)?;
        debug!("Requesting columns {:?}", column_names);

        let schema = self
            .probe
            .fetch_schema(&self.config.destination, &column_names)?;
        if schema.is_empty() {
            return Err(LoaderError::schema_fetch(
                &self.config.destination,
                "no columns to import",
            ));
        }
        if !column_names.is_empty() && schema.len() != column_names.len() {
            return Err(LoaderError::schema_fetch(
                &self.config.destination,
                format!(
                    "expected {} columns, destination returned {}",
                    column_names.len(),
                    schema.len()
                ),
            ));
        }

        info!(
            "Destination {} schema: {}",
            self.config.destination,
            schema
                .columns()
                .iter()
                .map(|c| format!("{} {}", c.name, c.column_type))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(RunSetup {
            tokenizer,
            schema: Arc::new(schema),
        })
    }

    /// Explicit column list when configured, otherwise the first line of the file
    fn column_names(&self, tokenizer: &Tokenizer) -> Result<Vec<String>> {
        if let Some(columns) = &self.config.explicit_columns {
            return Ok(split_column_list(columns));
        }

        if self.config.header_row_count == 0 {
            return Err(LoaderError::configuration(
                "Column names must be given explicitly when the file has no header row",
            ));
        }

        read_header_columns(&self.config.file_path, tokenizer)
    }

    fn stream(&mut self, setup: &RunSetup, state: &mut ImportState) -> Result<()> {
        self.phase = ImportPhase::Streaming;

        let mut reporter = ProgressReporter::new();
        if self.show_progress {
            reporter.setup_progress(state.total_data_rows);
        }

        let batch_size = self.config.batch_size as u64;
        let mut batch = Batch::new(setup.schema.clone(), self.config.batch_size);
        let mut reader = BufReader::new(File::open(&self.config.file_path)?);
        let mut buf = Vec::new();
        let mut data_line_number = 0u64;

        for index in 0usize.. {
            let line = match read_line_lossy(&mut reader, &mut buf, index) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped reading at line {}: {}", index + 1, e);
                    state.record_error(state.batch_count + 1, format!("read error: {}", e));
                    break;
                }
            };

            if index < self.config.header_row_count {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            data_line_number += 1;

            match self.build_row(&setup.tokenizer, &setup.schema, &line) {
                Some(row) => batch.push(row),
                None => {
                    warn!(
                        "Skipping line {}: fewer fields than the {} expected columns",
                        index + 1,
                        setup.schema.len()
                    );
                    state.rows_skipped += 1;
                    batch.skip();
                }
            }

            let consumed = batch.consumed() as u64;
            if should_flush(consumed, state.batch_count, state.total_data_rows, batch_size)
                || consumed >= batch_size
            {
                self.flush(&mut batch, state, &reporter);

                if self.cancellation.is_cancelled() {
                    info!(
                        "Import cancelled after batch {} ({} of {} data lines read)",
                        state.batch_count, data_line_number, state.total_data_rows
                    );
                    state.cancelled = true;
                    break;
                }
            }
        }

        if batch.consumed() > 0 && !state.cancelled {
            warn!(
                "Flushing {} rows left after the last batch boundary",
                batch.consumed()
            );
            self.flush(&mut batch, state, &reporter);
        }

        if state.has_errors() || state.cancelled {
            reporter.finish_with_error(&format!(
                "{} failed batches{}",
                state.errors.len(),
                if state.cancelled { ", cancelled" } else { "" }
            ));
        } else {
            reporter.finish(state);
        }
        Ok(())
    }

    /// Tokenize and coerce one data line; `None` when it has too few fields
    fn build_row(&self, tokenizer: &Tokenizer, schema: &Schema, line: &str) -> Option<Row> {
        if !has_balanced_quotes(line) {
            warn!("Unbalanced quotes, fields after the open quote are merged: {}", line);
        }

        let fields = tokenizer.split(line);
        if fields.len() < schema.len() {
            return None;
        }

        Some(
            schema
                .columns()
                .iter()
                .zip(fields.iter())
                .map(|(column, field)| self.coercer.coerce(field, column.column_type))
                .collect(),
        )
    }

    fn flush(&mut self, batch: &mut Batch, state: &mut ImportState, reporter: &ProgressReporter) {
        self.phase = ImportPhase::Flushing;
        let batch_number = state.batch_count + 1;
        state.rows_attempted += batch.len() as u64;

        if batch.is_empty() {
            debug!("Batch {} holds no rows, nothing to write", batch_number);
        } else {
            debug!(
                "Flushing batch {}: {} rows ({} lines consumed)",
                batch_number,
                batch.len(),
                batch.consumed()
            );
            match self
                .sink
                .write_batch(&self.config.destination, batch, self.config.timeout())
            {
                Ok(written) => state.rows_written += written,
                Err(e) => {
                    warn!("Batch {} failed: {}", batch_number, e.message);
                    state.record_error(batch_number, e.message);
                }
            }
        }

        reporter.increment(batch.consumed() as u64);
        state.batch_count += 1;
        reporter.update_with_state(state);
        batch.reset(state.batch_count + 1);
        self.phase = ImportPhase::Streaming;
    }
}

/// Column names from the first line of `path`, cleaned of quotes and brackets
pub fn read_header_columns(path: &Path, tokenizer: &Tokenizer) -> Result<Vec<String>> {
    let mut reader = BufReader::new(File::open(path)?);
    let first_line = read_line_lossy(&mut reader, &mut Vec::new(), 0)?.unwrap_or_default();

    let names: Vec<String> = tokenizer
        .split(&first_line)
        .iter()
        .map(|name| clean_column_name(name))
        .collect();

    if names.iter().all(|name| name.is_empty()) {
        return Err(LoaderError::configuration(format!(
            "Header line of {} does not contain any column names",
            path.display()
        )));
    }
    Ok(names)
}

/// Count data lines: everything after the header rows that is not blank
pub fn count_data_rows(path: &Path, header_row_count: usize) -> std::io::Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    let mut total = 0u64;

    for index in 0usize.. {
        let Some(line) = read_line_lossy(&mut reader, &mut buf, index)? else {
            break;
        };
        if index >= header_row_count && !line.trim().is_empty() {
            total += 1;
        }
    }

    debug!("Counted {} data rows in {}", total, path.display());
    Ok(total)
}

/// Read line `index` without its terminator; `None` at end of input.
///
/// Invalid UTF-8 is replaced rather than rejected, and a byte order mark
/// is dropped from the first line.
fn read_line_lossy<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    index: usize,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }

    let line = String::from_utf8_lossy(buf);
    if index == 0 {
        Ok(Some(line.trim_start_matches(BYTE_ORDER_MARK).to_string()))
    } else {
        Ok(Some(line.into_owned()))
    }
}

/// Split a comma-separated column list into cleaned names
pub fn split_column_list(columns: &str) -> Vec<String> {
    columns
        .split(COLUMN_LIST_DELIMITER)
        .map(clean_column_name)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Trim and drop bracket quoting: `[Order Id]` becomes `Order Id`
pub fn clean_column_name(name: &str) -> String {
    name.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .to_string()
}
