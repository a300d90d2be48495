//! Schema probe backed by a table-definition listing.
//!
//! The listing is the plain-text file produced by `export::table_definition`:
//!
//! ```text
//! TableName: people
//! ColumnName: id, DataType: Int32, AllowNulls: false
//! ColumnName: name, DataType: String, AllowNulls: true
//! ```
//!
//! Destinations without a live catalogue (Parquet part files) are typed
//! from such a listing.

use super::SchemaProbe;
use crate::error::{LoaderError, Result};
use crate::models::{Column, ColumnType, Schema};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static TABLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^TableName:\s*(.+?)\s*$").expect("table line pattern is valid"));

static COLUMN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^ColumnName:\s*(.+?),\s*DataType:\s*([\w.]+),\s*AllowNulls:\s*(true|false)\s*$")
        .expect("column line pattern is valid")
});

/// A parsed table-definition listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub table_name: String,
    pub schema: Schema,
}

/// Parse a listing; the error carries the 1-based line number
pub fn parse_table_definition(text: &str) -> std::result::Result<TableDefinition, String> {
    let mut table_name = None;
    let mut columns = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = TABLE_LINE.captures(line) {
            if table_name.is_some() {
                return Err(format!("line {}: duplicate TableName entry", line_number));
            }
            table_name = Some(caps[1].to_string());
            continue;
        }

        let caps = COLUMN_LINE
            .captures(line)
            .ok_or_else(|| format!("line {}: unrecognised entry '{}'", line_number, line))?;
        let column_type: ColumnType = caps[2]
            .parse()
            .map_err(|e| format!("line {}: {}", line_number, e))?;
        let nullable = caps[3].eq_ignore_ascii_case("true");

        columns.push(Column::new(caps[1].trim(), column_type, nullable));
    }

    let table_name = table_name.ok_or_else(|| "missing TableName entry".to_string())?;
    if columns.is_empty() {
        return Err(format!("table '{}' lists no columns", table_name));
    }

    Ok(TableDefinition {
        table_name,
        schema: Schema::new(columns),
    })
}

/// Reads the schema of one table from a definition listing on disk
#[derive(Debug, Clone)]
pub struct DefinitionFileProbe {
    path: PathBuf,
}

impl DefinitionFileProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SchemaProbe for DefinitionFileProbe {
    fn fetch_schema(&self, destination: &str, column_names: &[String]) -> Result<Schema> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            LoaderError::schema_fetch(
                destination,
                format!("cannot read {}: {}", self.path.display(), e),
            )
        })?;

        let definition = parse_table_definition(&text)
            .map_err(|reason| LoaderError::schema_fetch(destination, reason))?;

        if !definition.table_name.eq_ignore_ascii_case(destination) {
            return Err(LoaderError::schema_fetch(
                destination,
                format!(
                    "{} describes table '{}'",
                    self.path.display(),
                    definition.table_name
                ),
            ));
        }

        debug!(
            "Loaded {} column definitions for {} from {}",
            definition.schema.len(),
            destination,
            self.path.display()
        );

        definition.schema.project(column_names).map_err(|missing| {
            LoaderError::schema_fetch(destination, format!("column '{}' not found", missing))
        })
    }
}
