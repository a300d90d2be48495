//! Importer tests against in-memory destinations


use crate::destination::{BulkSink, SchemaProbe};
use crate::error::{BatchWriteError, LoaderError, Result};
use crate::models::{Batch, Column, ColumnType, Row, Schema};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Probe returning a fixed schema, projected like a real destination
pub struct StaticProbe {
    pub schema: Schema,
}

impl StaticProbe {
    pub fn people() -> Self {
        Self {
            schema: Schema::new(vec![
                Column::new("id", ColumnType::Int32, false),
                Column::new("name", ColumnType::String, true),
                Column::new("active", ColumnType::Boolean, true),
            ]),
        }
    }
}

impl SchemaProbe for StaticProbe {
    fn fetch_schema(&self, destination: &str, column_names: &[String]) -> Result<Schema> {
        self.schema.project(column_names).map_err(|missing| {
            LoaderError::schema_fetch(destination, format!("no column {}", missing))
        })
    }
}

/// Probe that always fails
pub struct BrokenProbe;

impl SchemaProbe for BrokenProbe {
    fn fetch_schema(&self, destination: &str, _column_names: &[String]) -> Result<Schema> {
        Err(LoaderError::schema_fetch(destination, "catalogue unavailable"))
    }
}

/// Sink keeping every committed batch in memory
#[derive(Default)]
pub struct MemorySink {
    pub batches: Vec<(u64, Vec<Row>)>,
    /// Batch numbers to reject
    pub fail_batches: Vec<u64>,
}

impl MemorySink {
    pub fn failing_on(batches: &[u64]) -> Self {
        Self {
            batches: Vec::new(),
            fail_batches: batches.to_vec(),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.iter().map(|(_, rows)| rows.len()).collect()
    }

    pub fn all_rows(&self) -> Vec<Row> {
        self.batches
            .iter()
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect()
    }
}

impl BulkSink for MemorySink {
    fn write_batch(
        &mut self,
        _destination: &str,
        batch: &Batch,
        _timeout: Duration,
    ) -> std::result::Result<u64, BatchWriteError> {
        if self.fail_batches.contains(&batch.sequence()) {
            return Err(BatchWriteError::new(batch.sequence(), "constraint violation"));
        }
        self.batches.push((batch.sequence(), batch.rows().to_vec()));
        Ok(batch.len() as u64)
    }
}

/// Write `content` to a file inside a fresh temporary directory
pub fn write_input(content: impl AsRef<[u8]>) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("input.csv");
    fs::write(&path, content).unwrap();
    (dir, path)
}

/// Header plus `rows` people lines
pub fn people_csv(rows: usize) -> String {
    let mut content = String::from("id,name,active\n");
    for i in 1..=rows {
        content.push_str(&format!("{},\"Person {}\",{}\n", i, i, i % 2 == 0));
    }
    content
}
