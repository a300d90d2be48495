//! Text artifacts produced from a schema and its typed rows.
//!
//! - CSV: header line, then one line per row. String and DateTime values
//!   are double-quoted, everything else is bare, nulls are empty.
//! - Table definition listing: the plain-text schema read back by
//!   [`DefinitionFileProbe`](crate::destination::DefinitionFileProbe).
//! - `CREATE TABLE` DDL built from a CSV header line.
//! - `MERGE` SQL upserting every row of a table.

use crate::constants::{DATETIME_OUTPUT_FORMAT, DEFAULT_SQL_SCHEMA, DEFAULT_SQL_TYPE};
use crate::error::{LoaderError, Result};
use crate::models::{Row, Schema, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

const MERGE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Render one value for the CSV artifact
pub fn format_csv_value(value: &Option<Value>) -> String {
    match value {
        None => String::new(),
        Some(v) if v.column_type().is_quoted_in_csv() => format!("\"{}\"", v),
        Some(v) => v.to_string(),
    }
}

pub fn format_csv_row(row: &Row, delimiter: &str) -> String {
    row.iter()
        .map(format_csv_value)
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Write the header line and every row, each terminated by a newline
pub fn write_csv<W: Write>(
    writer: &mut W,
    schema: &Schema,
    rows: &[Row],
    delimiter: &str,
) -> Result<()> {
    writeln!(writer, "{}", schema.names().join(delimiter))?;
    for row in rows {
        writeln!(writer, "{}", format_csv_row(row, delimiter))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv_file(path: &Path, schema: &Schema, rows: &[Row], delimiter: &str) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_csv(&mut writer, schema, rows, delimiter)?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// `TableName:` line followed by one line per column
pub fn table_definition(table: &str, schema: &Schema) -> String {
    let mut out = format!("TableName: {}\n", table);
    for column in schema.columns() {
        out.push_str(&format!(
            "ColumnName: {}, DataType: {}, AllowNulls: {}\n",
            column.name, column.column_type, column.nullable
        ));
    }
    out
}

pub fn write_table_definition(path: &Path, table: &str, schema: &Schema) -> Result<()> {
    std::fs::write(path, table_definition(table, schema))?;
    info!("Wrote table definition for {} to {}", table, path.display());
    Ok(())
}

/// Bracket-quote a T-SQL identifier
pub fn bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Table name implied by a file path: the file name without its extension
pub fn table_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

/// Options for [`create_table_ddl`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlOptions {
    pub schema_name: String,
    pub sql_type: String,
}

impl Default for DdlOptions {
    fn default() -> Self {
        Self {
            schema_name: DEFAULT_SQL_SCHEMA.to_string(),
            sql_type: DEFAULT_SQL_TYPE.to_string(),
        }
    }
}

/// `CREATE TABLE` statement typing every column with the default SQL type
pub fn create_table_ddl(
    table: &str,
    column_names: &[String],
    options: &DdlOptions,
) -> Result<String> {
    if column_names.is_empty() {
        return Err(LoaderError::export(format!(
            "cannot build DDL for {}: no columns",
            table
        )));
    }

    let columns: Vec<String> = column_names
        .iter()
        .map(|name| format!("\t{} {} NULL", bracket(name), options.sql_type))
        .collect();

    Ok(format!(
        "CREATE TABLE {}.{} (\n{}\n);\n",
        bracket(&options.schema_name),
        bracket(table),
        columns.join(",\n")
    ))
}

/// Options for [`merge_sql`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub schema_name: String,
    /// Columns joined in the `ON` clause
    pub match_columns: Vec<String>,
    /// Identity column left out of the statement unless `include_identity`
    pub identity_column: Option<String>,
    pub include_identity: bool,
}

impl MergeOptions {
    pub fn new(match_columns: Vec<String>) -> Self {
        Self {
            schema_name: DEFAULT_SQL_SCHEMA.to_string(),
            match_columns,
            identity_column: None,
            include_identity: false,
        }
    }

    fn excludes(&self, column: &str) -> bool {
        !self.include_identity
            && self
                .identity_column
                .as_deref()
                .is_some_and(|identity| identity.eq_ignore_ascii_case(column))
    }
}

/// Render one value as a T-SQL literal
pub fn sql_literal(value: &Option<Value>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(Value::String(s)) => format!("'{}'", s.replace('\'', "''")),
        Some(Value::Char(c)) => format!("'{}'", c.to_string().replace('\'', "''")),
        Some(Value::DateTime(dt)) => format!("'{}'", dt.format(MERGE_DATETIME_FORMAT)),
        Some(Value::Boolean(b)) => (if *b { "1" } else { "0" }).to_string(),
        Some(other) => other.to_string(),
    }
}

/// `MERGE` statement upserting `rows` into `table`
pub fn merge_sql(
    table: &str,
    schema: &Schema,
    rows: &[Row],
    options: &MergeOptions,
) -> Result<String> {
    if options.match_columns.is_empty() {
        return Err(LoaderError::export("MERGE needs at least one match column"));
    }
    if rows.is_empty() {
        return Err(LoaderError::export(format!("table {} has no rows", table)));
    }
    for name in &options.match_columns {
        if schema.position(name.trim()).is_none() {
            return Err(LoaderError::export(format!(
                "match column '{}' is not a column of {}",
                name, table
            )));
        }
    }

    let kept: Vec<usize> = schema
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, column)| !options.excludes(&column.name))
        .map(|(index, _)| index)
        .collect();
    let names: Vec<&str> = kept
        .iter()
        .map(|&i| schema.columns()[i].name.as_str())
        .collect();
    let column_list = names
        .iter()
        .map(|n| bracket(n))
        .collect::<Vec<_>>()
        .join(", ");

    let values = rows
        .iter()
        .map(|row| {
            let literals: Vec<String> = kept
                .iter()
                .map(|&i| sql_literal(row.get(i).unwrap_or(&None)))
                .collect();
            format!("\t\t({})", literals.join(", "))
        })
        .collect::<Vec<_>>()
        .join(",\n");

    let on = options
        .match_columns
        .iter()
        .map(|name| format!("t.{0} = x.{0}", bracket(name.trim())))
        .collect::<Vec<_>>()
        .join(" AND ");

    let updates = names
        .iter()
        .filter(|name| {
            !options
                .match_columns
                .iter()
                .any(|m| m.trim().eq_ignore_ascii_case(name))
        })
        .map(|name| format!("\t\tt.{0} = x.{0}", bracket(name)))
        .collect::<Vec<_>>();

    let inserted = names
        .iter()
        .map(|name| format!("x.{}", bracket(name)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "MERGE INTO {}.{} AS t\n\tUSING (\n\t\tVALUES\n{}\n\t) AS x ({})\n\tON {}\n",
        bracket(&options.schema_name),
        bracket(table),
        values,
        column_list,
        on
    );
    if !updates.is_empty() {
        sql.push_str(&format!(
            "WHEN MATCHED THEN\n\tUPDATE SET\n{}\n",
            updates.join(",\n")
        ));
    }
    sql.push_str(&format!(
        "WHEN NOT MATCHED THEN\n\tINSERT ({})\n\tVALUES ({});\n",
        column_list, inserted
    ));

    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercer::ValueCoercer;
    use crate::destination::definition::parse_table_definition;
    use crate::models::{Column, ColumnType};
    use crate::tokenizer::Tokenizer;
    use chrono::NaiveDate;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", ColumnType::Int64, false),
            Column::new("name", ColumnType::String, true),
            Column::new("price", ColumnType::Decimal, true),
            Column::new("active", ColumnType::Boolean, true),
            Column::new("seen", ColumnType::DateTime, true),
        ])
    }

    fn row(id: i64, name: Option<&str>) -> Row {
        vec![
            Some(Value::Int64(id)),
            name.map(|n| Value::String(n.to_string())),
            Some(Value::Decimal(1234.56)),
            Some(Value::Boolean(false)),
            Some(Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 2, 29)
                    .unwrap()
                    .and_hms_opt(13, 5, 0)
                    .unwrap(),
            )),
        ]
    }

    #[test]
    fn test_csv_formatting() {
        let mut out = Vec::new();
        write_csv(&mut out, &schema(), &[row(1, Some("Ada")), row(2, None)], ",").unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "id,name,price,active,seen\n\
             1,\"Ada\",1234.56,false,\"2024-02-29 13:05:00\"\n\
             2,,1234.56,false,\"2024-02-29 13:05:00\"\n"
        );
    }

    #[test]
    fn test_csv_round_trip_through_tokenizer() {
        let schema = Schema::new(vec![
            Column::new("id", ColumnType::Int32, false),
            Column::new("name", ColumnType::String, true),
            Column::new("ratio", ColumnType::Float, true),
        ]);
        let rows: Vec<Row> = vec![
            vec![
                Some(Value::Int32(-7)),
                Some(Value::String("Smith, John".to_string())),
                Some(Value::Float(0.25)),
            ],
            vec![
                Some(Value::Int32(8)),
                Some(Value::String("O'Brien".to_string())),
                Some(Value::Float(3.0)),
            ],
        ];

        for delimiter in [",", "|", "\t"] {
            let mut out = Vec::new();
            write_csv(&mut out, &schema, &rows, delimiter).unwrap();
            let text = String::from_utf8(out).unwrap();

            let tokenizer = Tokenizer::new(delimiter).unwrap();
            let coercer = ValueCoercer::default();
            let parsed: Vec<Row> = text
                .lines()
                .skip(1)
                .map(|line| {
                    tokenizer
                        .split(line)
                        .iter()
                        .zip(schema.columns())
                        .map(|(field, column)| coercer.coerce(field, column.column_type))
                        .collect()
                })
                .collect();

            assert_eq!(parsed, rows, "delimiter {:?}", delimiter);
        }
    }

    #[test]
    fn test_table_definition_parses_back() {
        let listing = table_definition("orders", &schema());
        assert!(listing.starts_with("TableName: orders\n"));
        assert!(listing.contains("ColumnName: id, DataType: Int64, AllowNulls: false\n"));

        let definition = parse_table_definition(&listing).unwrap();
        assert_eq!(definition.table_name, "orders");
        assert_eq!(definition.schema, schema());
    }

    #[test]
    fn test_create_table_ddl() {
        let ddl = create_table_ddl(
            "people",
            &["id".to_string(), "full name".to_string()],
            &DdlOptions::default(),
        )
        .unwrap();

        assert_eq!(
            ddl,
            "CREATE TABLE [dbo].[people] (\n\t[id] nvarchar(255) NULL,\n\t[full name] nvarchar(255) NULL\n);\n"
        );
        assert!(create_table_ddl("people", &[], &DdlOptions::default()).is_err());
    }

    #[test]
    fn test_sql_literals() {
        assert_eq!(sql_literal(&None), "NULL");
        assert_eq!(
            sql_literal(&Some(Value::String("O'Brien".to_string()))),
            "'O''Brien'"
        );
        assert_eq!(sql_literal(&Some(Value::Boolean(true))), "1");
        assert_eq!(sql_literal(&Some(Value::Int16(-3))), "-3");
        assert_eq!(sql_literal(&row(1, None)[4]), "'2024-02-29T13:05:00'");
    }

    #[test]
    fn test_merge_sql() {
        let options = MergeOptions::new(vec!["id".to_string()]);
        let rows = [row(1, Some("Tea")), row(2, None)];
        let sql = merge_sql("products", &schema(), &rows, &options).unwrap();

        assert!(sql.starts_with("MERGE INTO [dbo].[products] AS t\n"));
        assert!(sql.contains("(1, 'Tea', 1234.56, 0, '2024-02-29T13:05:00'),\n"));
        assert!(sql.contains("(2, NULL, 1234.56, 0, '2024-02-29T13:05:00')\n"));
        assert!(sql.contains(") AS x ([id], [name], [price], [active], [seen])\n"));
        assert!(sql.contains("\tON t.[id] = x.[id]\n"));
        assert!(sql.contains("\t\tt.[name] = x.[name],\n"));
        assert!(!sql.contains("t.[id] = x.[id],"));
        assert!(sql.ends_with(
            "\tINSERT ([id], [name], [price], [active], [seen])\n\tVALUES (x.[id], x.[name], x.[price], x.[active], x.[seen]);\n"
        ));
    }

    #[test]
    fn test_merge_sql_excludes_identity() {
        let mut options = MergeOptions::new(vec!["name".to_string()]);
        options.identity_column = Some("id".to_string());

        let sql = merge_sql("products", &schema(), &[row(1, Some("Tea"))], &options).unwrap();
        assert!(sql.contains(") AS x ([name], [price], [active], [seen])\n"));
        assert!(sql.contains("('Tea', 1234.56, 0, '2024-02-29T13:05:00')"));

        options.include_identity = true;
        let sql = merge_sql("products", &schema(), &[row(1, Some("Tea"))], &options).unwrap();
        assert!(sql.contains("([id], [name]"));
    }

    #[test]
    fn test_merge_sql_rejects_bad_options() {
        let rows = [row(1, None)];
        assert!(merge_sql("p", &schema(), &rows, &MergeOptions::new(vec![])).is_err());
        let unknown = MergeOptions::new(vec!["sku".to_string()]);
        assert!(merge_sql("p", &schema(), &rows, &unknown).is_err());
        assert!(merge_sql("p", &schema(), &[], &MergeOptions::new(vec!["id".to_string()])).is_err());
    }

    #[test]
    fn test_table_name_from_path() {
        assert_eq!(
            table_name_from_path(Path::new("/data/orders.csv")).as_deref(),
            Some("orders")
        );
        assert_eq!(table_name_from_path(Path::new("/")), None);
    }
}
