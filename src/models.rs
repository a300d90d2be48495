//! Core data structures for the import pipeline.
//!
//! Defines the destination schema, typed values and rows, the reusable batch
//! buffer, and the counters an import run accumulates.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Upper bound on rows reserved up front; larger batches grow on demand
const MAX_PREALLOCATED_ROWS: usize = 64 * 1024;

/// Destination column types understood by the coercer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Int16,
    Int32,
    Int64,
    Decimal,
    Float,
    Boolean,
    DateTime,
    Char,
    String,
}

impl ColumnType {
    pub const ALL: [ColumnType; 9] = [
        ColumnType::Int16,
        ColumnType::Int32,
        ColumnType::Int64,
        ColumnType::Decimal,
        ColumnType::Float,
        ColumnType::Boolean,
        ColumnType::DateTime,
        ColumnType::Char,
        ColumnType::String,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Int16 => "Int16",
            ColumnType::Int32 => "Int32",
            ColumnType::Int64 => "Int64",
            ColumnType::Decimal => "Decimal",
            ColumnType::Float => "Float",
            ColumnType::Boolean => "Boolean",
            ColumnType::DateTime => "DateTime",
            ColumnType::Char => "Char",
            ColumnType::String => "String",
        }
    }

    /// Whether values of this type are quoted in the CSV artifact
    pub fn is_quoted_in_csv(&self) -> bool {
        matches!(self, ColumnType::String | ColumnType::DateTime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    /// Accepts the canonical names plus the `System.*` spellings found in
    /// table definitions written by older tooling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let name = name
            .strip_prefix("System.")
            .or_else(|| name.strip_prefix("system."))
            .unwrap_or(name);

        match name.to_ascii_lowercase().as_str() {
            "int16" | "short" | "smallint" => Ok(ColumnType::Int16),
            "int32" | "int" => Ok(ColumnType::Int32),
            "int64" | "long" | "bigint" => Ok(ColumnType::Int64),
            "decimal" | "double" => Ok(ColumnType::Decimal),
            "float" | "single" => Ok(ColumnType::Float),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "datetime" => Ok(ColumnType::DateTime),
            "char" => Ok(ColumnType::Char),
            "string" => Ok(ColumnType::String),
            _ => Err(format!("unknown column type '{}'", s)),
        }
    }
}

/// One destination column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }
}

/// Ordered, immutable column list of a destination
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Reorder and narrow the schema to the requested column names.
    ///
    /// An empty request returns the full schema. Returns the first name
    /// that has no matching column as the error.
    pub fn project(&self, names: &[String]) -> Result<Schema, String> {
        if names.is_empty() {
            return Ok(self.clone());
        }

        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let index = self.position(name).ok_or_else(|| name.clone())?;
            columns.push(self.columns[index].clone());
        }
        Ok(Schema { columns })
    }
}

/// A destination-typed value. Nulls are represented by `None` in a [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Decimal(f64),
    Float(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Char(char),
    String(String),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Int16(_) => ColumnType::Int16,
            Value::Int32(_) => ColumnType::Int32,
            Value::Int64(_) => ColumnType::Int64,
            Value::Decimal(_) => ColumnType::Decimal,
            Value::Float(_) => ColumnType::Float,
            Value::Boolean(_) => ColumnType::Boolean,
            Value::DateTime(_) => ColumnType::DateTime,
            Value::Char(_) => ColumnType::Char,
            Value::String(_) => ColumnType::String,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int16(n) => write!(f, "{}", n),
            Value::Int32(n) => write!(f, "{}", n),
            Value::Int64(n) => write!(f, "{}", n),
            Value::Decimal(d) | Value::Float(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(dt) => {
                write!(f, "{}", dt.format(crate::constants::DATETIME_OUTPUT_FORMAT))
            }
            Value::Char(c) => write!(f, "{}", c),
            Value::String(s) => f.write_str(s),
        }
    }
}

/// One typed row, positionally aligned with the schema
pub type Row = Vec<Option<Value>>;

/// Fixed-capacity row buffer handed whole to a sink, then cleared for reuse.
///
/// `consumed` counts every data line routed to this batch, including lines
/// dropped for having too few fields, so batch boundaries stay aligned with
/// the counting pre-pass.
#[derive(Debug, Clone)]
pub struct Batch {
    schema: Arc<Schema>,
    sequence: u64,
    capacity: usize,
    rows: Vec<Row>,
    consumed: usize,
}

impl Batch {
    pub fn new(schema: Arc<Schema>, capacity: usize) -> Self {
        Self {
            schema,
            sequence: 1,
            capacity,
            rows: Vec::with_capacity(capacity.min(MAX_PREALLOCATED_ROWS)),
            consumed: 0,
        }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
        self.consumed += 1;
    }

    /// Account for a data line that produced no row
    pub fn skip(&mut self) {
        self.consumed += 1;
    }

    /// Empty the buffer, keeping its allocation, and advance the sequence number
    pub fn reset(&mut self, next_sequence: u64) {
        self.rows.clear();
        self.consumed = 0;
        self.sequence = next_sequence;
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

/// A batch that the sink rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub batch_number: u64,
    pub message: String,
}

/// Counters accumulated by one import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportState {
    /// Data rows found by the counting pre-pass
    pub total_data_rows: u64,
    /// Rows handed to the sink, summed over all dispatched batches
    pub rows_attempted: u64,
    /// Rows the sink reported as committed
    pub rows_written: u64,
    /// Batches dispatched, successful or not
    pub batch_count: u64,
    /// Data lines dropped before coercion (too few fields)
    pub rows_skipped: u64,
    /// Failed batches in the order they occurred
    pub errors: Vec<BatchError>,
    /// Streaming stopped early on request
    pub cancelled: bool,
}

impl ImportState {
    pub fn new(total_data_rows: u64) -> Self {
        Self {
            total_data_rows,
            ..Default::default()
        }
    }

    pub fn record_error(&mut self, batch_number: u64, message: impl Into<String>) {
        self.errors.push(BatchError {
            batch_number,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Every dispatched row was committed and nothing was cut short
    pub fn is_complete_success(&self) -> bool {
        !self.has_errors() && !self.cancelled && self.rows_written == self.rows_attempted
    }

    /// Written rows as a percentage of data rows
    pub fn success_rate(&self) -> f64 {
        if self.total_data_rows == 0 {
            100.0
        } else {
            (self.rows_written as f64 / self.total_data_rows as f64) * 100.0
        }
    }
}

/// Lifecycle of an import run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Idle,
    Counting,
    Streaming,
    Flushing,
    Done,
    Failed,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportPhase::Idle => "idle",
            ImportPhase::Counting => "counting",
            ImportPhase::Streaming => "streaming",
            ImportPhase::Flushing => "flushing",
            ImportPhase::Done => "done",
            ImportPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", ColumnType::Int32, false),
            Column::new("name", ColumnType::String, true),
            Column::new("joined", ColumnType::DateTime, true),
        ])
    }

    #[test]
    fn test_column_type_from_str() {
        assert_eq!("Int32".parse::<ColumnType>().unwrap(), ColumnType::Int32);
        assert_eq!("int16".parse::<ColumnType>().unwrap(), ColumnType::Int16);
        assert_eq!(
            "System.DateTime".parse::<ColumnType>().unwrap(),
            ColumnType::DateTime
        );
        assert_eq!(
            "System.Double".parse::<ColumnType>().unwrap(),
            ColumnType::Decimal
        );
        assert!("uuid".parse::<ColumnType>().is_err());

        for column_type in ColumnType::ALL {
            assert_eq!(
                column_type.to_string().parse::<ColumnType>().unwrap(),
                column_type
            );
        }
    }

    #[test]
    fn test_schema_project_reorders() {
        let schema = sample_schema();
        let projected = schema
            .project(&["JOINED".to_string(), "id".to_string()])
            .unwrap();

        assert_eq!(projected.names(), vec!["joined", "id"]);
        assert_eq!(projected.column(0).unwrap().column_type, ColumnType::DateTime);
    }

    #[test]
    fn test_schema_project_missing_column() {
        let schema = sample_schema();
        let err = schema
            .project(&["id".to_string(), "email".to_string()])
            .unwrap_err();
        assert_eq!(err, "email");
    }

    #[test]
    fn test_schema_project_empty_request() {
        let schema = sample_schema();
        assert_eq!(schema.project(&[]).unwrap(), schema);
    }

    #[test]
    fn test_batch_reset_keeps_capacity() {
        let mut batch = Batch::new(Arc::new(sample_schema()), 4);
        batch.push(vec![Some(Value::Int32(1)), None, None]);
        batch.skip();
        batch.push(vec![Some(Value::Int32(2)), None, None]);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.consumed(), 3);
        assert_eq!(batch.sequence(), 1);

        let capacity_before = batch.rows.capacity();
        batch.reset(2);

        assert!(batch.is_empty());
        assert_eq!(batch.consumed(), 0);
        assert_eq!(batch.sequence(), 2);
        assert_eq!(batch.rows.capacity(), capacity_before);
    }

    #[test]
    fn test_huge_batch_size_reserves_bounded_memory() {
        let mut batch = Batch::new(Arc::new(sample_schema()), usize::MAX);
        assert_eq!(batch.capacity(), usize::MAX);
        assert!(batch.rows.capacity() < 4 * MAX_PREALLOCATED_ROWS);

        batch.push(vec![Some(Value::Int32(1)), None, None]);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_import_state_success() {
        let mut state = ImportState::new(10);
        state.rows_attempted = 10;
        state.rows_written = 10;
        assert!(state.is_complete_success());
        assert_eq!(state.success_rate(), 100.0);

        state.record_error(2, "disk full");
        assert!(state.has_errors());
        assert!(!state.is_complete_success());
        assert_eq!(state.errors[0].batch_number, 2);
    }

    #[test]
    fn test_value_display() {
        let dt = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        assert_eq!(Value::DateTime(dt).to_string(), "2024-03-09 14:05:00");
        assert_eq!(Value::Decimal(1234.56).to_string(), "1234.56");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Char('x').to_string(), "x");
    }
}
