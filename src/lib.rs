//! CSV Batch Loader Library
//!
//! Streams large delimited text files into a destination table in bounded,
//! transactionally-committed batches.
//!
//! This library provides tools for:
//! - Quote-aware splitting of delimited lines with a configurable delimiter
//! - Converting text fields to destination-typed values, with nulls on failure
//! - Discovering destination schemas (SQLite catalogue or a definition listing)
//! - Writing batches to SQLite in one transaction each, or to Parquet part files
//! - Recording failed batches without aborting the run
//! - Exporting tables as CSV, definition listings, `CREATE TABLE` and `MERGE` SQL

pub mod coercer;
pub mod config;
pub mod constants;
pub mod destination;
pub mod error;
pub mod export;
pub mod models;
pub mod planner;
pub mod processor;
pub mod tokenizer;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use config::ImportConfig;
pub use destination::{BulkSink, DefinitionFileProbe, ParquetSink, SchemaProbe, SqliteDestination};
pub use error::{BatchWriteError, LoaderError, Result};
pub use models::{Batch, Column, ColumnType, ImportPhase, ImportState, Row, Schema, Value};
pub use processor::{CancellationFlag, Importer};
