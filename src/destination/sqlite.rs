//! SQLite destination.
//!
//! Schema discovery reads `PRAGMA table_info`; each batch is written on its
//! own connection inside one transaction of prepared inserts. The
//! connection is dropped on every exit path, and an uncommitted transaction
//! rolls back when dropped.

use super::{BulkSink, SchemaProbe};
use crate::coercer::ValueCoercer;
use crate::error::{BatchWriteError, LoaderError, Result};
use crate::models::{Batch, Column, ColumnType, Row, Schema, Value};
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Storage layout for datetimes; fractional seconds only when non-zero
const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Virtual machine steps between timeout checks
const PROGRESS_CHECK_OPS: i32 = 1000;

static SINGLE_CHAR_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^N?CHAR(ACTER)?\s*\(\s*1\s*\)$").expect("char type pattern is valid")
});

/// SQLite database file acting as schema probe and bulk sink
#[derive(Debug, Clone)]
pub struct SqliteDestination {
    db_path: PathBuf,
}

impl SqliteDestination {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self, create: bool) -> rusqlite::Result<Connection> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if create {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Connection::open_with_flags(&self.db_path, flags)
    }

    /// Run a SQL script, creating the database file if needed
    pub fn execute_sql(&self, sql: &str) -> Result<()> {
        let conn = self.open(true)?;
        conn.execute_batch(sql)?;
        debug!("Executed SQL script against {}", self.db_path.display());
        Ok(())
    }

    /// Full schema of `table` in declaration order
    pub fn table_schema(&self, table: &str) -> Result<Schema> {
        let conn = self.open(false)?;
        Ok(read_table_schema(&conn, table)?)
    }

    /// Read every row of `table` for the columns of `schema`
    pub fn read_rows(&self, table: &str, schema: &Schema) -> Result<Vec<Row>> {
        let conn = self.open(false)?;
        let columns: Vec<String> = schema
            .columns()
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect();
        let sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            quote_qualified(table)
        );

        let coercer = ValueCoercer::default();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();

        while let Some(row) = rows.next()? {
            let mut typed = Vec::with_capacity(schema.len());
            for (index, column) in schema.columns().iter().enumerate() {
                typed.push(from_sql_value(
                    row.get_ref(index)?,
                    column.column_type,
                    &coercer,
                ));
            }
            out.push(typed);
        }

        Ok(out)
    }
}

impl SqliteDestination {
    /// Run a query and type its result columns.
    ///
    /// Columns read straight from a table take their declared type; computed
    /// columns are typed from their first non-null value.
    pub fn query_rows(&self, sql: &str) -> Result<(Schema, Vec<Row>)> {
        let conn = self.open(false)?;
        let mut stmt = conn.prepare(sql)?;
        let declared: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
            .collect();

        let mut raw: Vec<Vec<SqlValue>> = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(declared.len());
            for index in 0..declared.len() {
                values.push(SqlValue::from(row.get_ref(index)?));
            }
            raw.push(values);
        }

        let columns: Vec<Column> = declared
            .into_iter()
            .enumerate()
            .map(|(index, (name, decl_type))| {
                let column_type = match decl_type {
                    Some(decl_type) => column_type_for_declared(&decl_type),
                    None => infer_column_type(raw.iter().map(|values| &values[index])),
                };
                Column::new(name, column_type, true)
            })
            .collect();
        let schema = Schema::new(columns);

        let coercer = ValueCoercer::default();
        let typed: Vec<Row> = raw
            .iter()
            .map(|values| {
                values
                    .iter()
                    .zip(schema.columns())
                    .map(|(value, column)| {
                        from_sql_value(ValueRef::from(value), column.column_type, &coercer)
                    })
                    .collect()
            })
            .collect();

        debug!("Query returned {} columns", schema.len());
        Ok((schema, typed))
    }
}

fn infer_column_type<'a>(mut values: impl Iterator<Item = &'a SqlValue>) -> ColumnType {
    match values.find(|value| !matches!(value, SqlValue::Null)) {
        Some(SqlValue::Integer(_)) => ColumnType::Int64,
        Some(SqlValue::Real(_)) => ColumnType::Float,
        _ => ColumnType::String,
    }
}

impl SchemaProbe for SqliteDestination {
    fn fetch_schema(&self, destination: &str, column_names: &[String]) -> Result<Schema> {
        let conn = self
            .open(false)
            .map_err(|e| LoaderError::schema_fetch(destination, e.to_string()))?;
        let schema = read_table_schema(&conn, destination)
            .map_err(|e| LoaderError::schema_fetch(destination, e.to_string()))?;

        if schema.is_empty() {
            return Err(LoaderError::schema_fetch(
                destination,
                "table does not exist or has no columns",
            ));
        }

        schema.project(column_names).map_err(|missing| {
            LoaderError::schema_fetch(destination, format!("column '{}' not found", missing))
        })
    }
}

impl BulkSink for SqliteDestination {
    fn write_batch(
        &mut self,
        destination: &str,
        batch: &Batch,
        timeout: Duration,
    ) -> std::result::Result<u64, BatchWriteError> {
        let batch_number = batch.sequence();
        let fail = |e: rusqlite::Error| {
            if matches!(e.sqlite_error_code(), Some(rusqlite::ErrorCode::OperationInterrupted)) {
                BatchWriteError::new(
                    batch_number,
                    format!("commit timed out after {}s", timeout.as_secs()),
                )
            } else {
                BatchWriteError::new(batch_number, e.to_string())
            }
        };

        let mut conn = self.open(false).map_err(fail)?;
        conn.busy_timeout(timeout).map_err(fail)?;

        let started = Instant::now();
        conn.progress_handler(
            PROGRESS_CHECK_OPS,
            Some(move || started.elapsed() > timeout),
        );

        let sql = insert_statement(destination, batch.schema());
        let tx = conn.transaction().map_err(fail)?;
        let mut written = 0u64;
        {
            let mut stmt = tx.prepare(&sql).map_err(fail)?;
            for row in batch.rows() {
                written += stmt
                    .execute(params_from_iter(row.iter().map(to_sql_value)))
                    .map_err(fail)? as u64;
            }
        }
        tx.commit().map_err(fail)?;

        info!(
            "Committed batch {} to {}: {} rows",
            batch_number, destination, written
        );
        Ok(written)
    }
}

fn read_table_schema(conn: &Connection, table: &str) -> rusqlite::Result<Schema> {
    let sql = match split_qualified(table) {
        (Some(schema), name) => format!(
            "PRAGMA {}.table_info({})",
            quote_identifier(schema),
            quote_identifier(name)
        ),
        (None, name) => format!("PRAGMA table_info({})", quote_identifier(name)),
    };

    let mut stmt = conn.prepare(&sql)?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let declared: String = row.get(2)?;
            let not_null: i64 = row.get(3)?;
            Ok(Column::new(
                name,
                column_type_for_declared(&declared),
                not_null == 0,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Schema::new(columns))
}

/// Map a declared SQL column type onto the coercer's type universe
pub fn column_type_for_declared(declared: &str) -> ColumnType {
    let upper = declared.trim().to_ascii_uppercase();

    if SINGLE_CHAR_TYPE.is_match(&upper) {
        ColumnType::Char
    } else if upper.contains("BIGINT") || upper == "INTEGER" {
        ColumnType::Int64
    } else if upper.contains("SMALLINT") || upper.contains("TINYINT") {
        ColumnType::Int16
    } else if upper.contains("INT") {
        ColumnType::Int32
    } else if upper.contains("BOOL") || upper == "BIT" {
        ColumnType::Boolean
    } else if upper.contains("DATE") || upper.contains("TIME") {
        ColumnType::DateTime
    } else if upper.contains("DEC") || upper.contains("NUMERIC") || upper.contains("MONEY") {
        ColumnType::Decimal
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        ColumnType::Float
    } else {
        ColumnType::String
    }
}

fn insert_statement(destination: &str, schema: &Schema) -> String {
    let columns: Vec<String> = schema
        .columns()
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect();
    let placeholders: Vec<String> = (1..=schema.len()).map(|i| format!("?{}", i)).collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_qualified(destination),
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn to_sql_value(value: &Option<Value>) -> SqlValue {
    match value {
        None => SqlValue::Null,
        Some(Value::Int16(n)) => SqlValue::Integer(i64::from(*n)),
        Some(Value::Int32(n)) => SqlValue::Integer(i64::from(*n)),
        Some(Value::Int64(n)) => SqlValue::Integer(*n),
        Some(Value::Decimal(d)) | Some(Value::Float(d)) => SqlValue::Real(*d),
        Some(Value::Boolean(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::DateTime(dt)) => {
            SqlValue::Text(dt.format(SQLITE_DATETIME_FORMAT).to_string())
        }
        Some(Value::Char(c)) => SqlValue::Text(c.to_string()),
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
    }
}

fn from_sql_value(
    value: ValueRef<'_>,
    column_type: ColumnType,
    coercer: &ValueCoercer,
) -> Option<Value> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(n) => match column_type {
            ColumnType::Int16 => i16::try_from(n).ok().map(Value::Int16),
            ColumnType::Int32 => i32::try_from(n).ok().map(Value::Int32),
            ColumnType::Int64 => Some(Value::Int64(n)),
            ColumnType::Decimal => Some(Value::Decimal(n as f64)),
            ColumnType::Float => Some(Value::Float(n as f64)),
            ColumnType::Boolean => Some(Value::Boolean(n != 0)),
            ColumnType::DateTime => {
                chrono::DateTime::from_timestamp(n, 0).map(|dt| Value::DateTime(dt.naive_utc()))
            }
            ColumnType::Char | ColumnType::String => coercer.coerce(&n.to_string(), column_type),
        },
        ValueRef::Real(f) => match column_type {
            ColumnType::Decimal => Some(Value::Decimal(f)),
            ColumnType::Float => Some(Value::Float(f)),
            _ => coercer.coerce(&f.to_string(), column_type),
        },
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            match column_type {
                ColumnType::String => Some(Value::String(text.into_owned())),
                _ => coercer.coerce(&text, column_type),
            }
        }
    }
}

/// Quote one identifier, dropping T-SQL style brackets
pub fn quote_identifier(name: &str) -> String {
    let bare = name.trim().trim_start_matches('[').trim_end_matches(']');
    format!("\"{}\"", bare.replace('"', "\"\""))
}

fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}

fn quote_qualified(name: &str) -> String {
    match split_qualified(name) {
        (Some(schema), table) => {
            format!("{}.{}", quote_identifier(schema), quote_identifier(table))
        }
        (None, table) => quote_identifier(table),
    }
}
