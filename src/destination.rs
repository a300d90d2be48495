//! Destination capabilities consumed by the importer.
//!
//! A destination supplies its schema through [`SchemaProbe`] and accepts
//! whole batches through [`BulkSink`]. Schema failures are fatal to a run;
//! batch failures are reported back as [`BatchWriteError`] and recorded.

pub mod definition;
pub mod parquet;
pub mod sqlite;

pub use definition::DefinitionFileProbe;
pub use parquet::ParquetSink;
pub use sqlite::SqliteDestination;

use crate::error::{BatchWriteError, Result};
use crate::models::{Batch, Schema};
use std::time::Duration;

/// Discovers the ordered, typed columns of a destination
pub trait SchemaProbe {
    /// Fetch the schema of `destination` restricted to `column_names`, in
    /// that order. An empty name list requests every column.
    fn fetch_schema(&self, destination: &str, column_names: &[String]) -> Result<Schema>;
}

/// Commits one batch of typed rows inside a single transaction
pub trait BulkSink {
    /// Write `batch` to `destination` and return the number of rows committed
    fn write_batch(
        &mut self,
        destination: &str,
        batch: &Batch,
        timeout: Duration,
    ) -> std::result::Result<u64, BatchWriteError>;
}

impl<T: SchemaProbe + ?Sized> SchemaProbe for &T {
    fn fetch_schema(&self, destination: &str, column_names: &[String]) -> Result<Schema> {
        (**self).fetch_schema(destination, column_names)
    }
}

impl<T: BulkSink + ?Sized> BulkSink for &mut T {
    fn write_batch(
        &mut self,
        destination: &str,
        batch: &Batch,
        timeout: Duration,
    ) -> std::result::Result<u64, BatchWriteError> {
        (**self).write_batch(destination, batch, timeout)
    }
}

impl<T: SchemaProbe + ?Sized> SchemaProbe for Box<T> {
    fn fetch_schema(&self, destination: &str, column_names: &[String]) -> Result<Schema> {
        (**self).fetch_schema(destination, column_names)
    }
}

impl<T: BulkSink + ?Sized> BulkSink for Box<T> {
    fn write_batch(
        &mut self,
        destination: &str,
        batch: &Batch,
        timeout: Duration,
    ) -> std::result::Result<u64, BatchWriteError> {
        (**self).write_batch(destination, batch, timeout)
    }
}
