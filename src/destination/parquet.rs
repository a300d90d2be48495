//! Parquet part-file sink.
//!
//! Every batch becomes one `<destination>-<batch>.parquet` file in the
//! output directory. The frame is written to a temporary file in the same
//! directory and renamed into place, so a failed batch leaves no part file
//! behind.

use super::BulkSink;
use crate::error::BatchWriteError;
use crate::models::{Batch, Column, ColumnType, Value};
use clap::ValueEnum;
use polars::prelude::{
    DataFrame, DataType, IntoColumn, NamedFrom, ParquetCompression, ParquetWriter, PlSmallStr, PolarsResult,
    Series, TimeUnit,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Supported compression algorithms for part files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    #[default]
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

/// Writes each batch as a standalone Parquet file
#[derive(Debug, Clone)]
pub struct ParquetSink {
    output_dir: PathBuf,
    compression: CompressionAlgorithm,
}

impl ParquetSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            compression: CompressionAlgorithm::default(),
        }
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Final path of the part file for `batch_number`
    pub fn part_path(&self, destination: &str, batch_number: u64) -> PathBuf {
        self.output_dir
            .join(format!("{}-{:05}.parquet", destination, batch_number))
    }

    fn write_part(&self, destination: &str, batch: &Batch) -> Result<PathBuf, String> {
        let mut df = batch_to_dataframe(batch).map_err(|e| e.to_string())?;

        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            format!(
                "cannot create output directory {}: {}",
                self.output_dir.display(),
                e
            )
        })?;

        let mut staging = NamedTempFile::new_in(&self.output_dir).map_err(|e| e.to_string())?;
        ParquetWriter::new(staging.as_file_mut())
            .with_compression(self.compression.to_polars_compression())
            .finish(&mut df)
            .map_err(|e| format!("failed to write parquet: {}", e))?;

        let path = self.part_path(destination, batch.sequence());
        staging
            .persist(&path)
            .map_err(|e| format!("cannot move part file into place: {}", e.error))?;

        Ok(path)
    }
}

impl BulkSink for ParquetSink {
    fn write_batch(
        &mut self,
        destination: &str,
        batch: &Batch,
        _timeout: Duration,
    ) -> Result<u64, BatchWriteError> {
        let path = self
            .write_part(destination, batch)
            .map_err(|message| BatchWriteError::new(batch.sequence(), message))?;

        info!(
            "Wrote batch {} ({} rows) to {}",
            batch.sequence(),
            batch.len(),
            path.display()
        );
        Ok(batch.len() as u64)
    }
}

/// Build a typed frame from the batch, one series per schema column
pub fn batch_to_dataframe(batch: &Batch) -> PolarsResult<DataFrame> {
    let mut columns = Vec::with_capacity(batch.schema().len());

    for (index, column) in batch.schema().columns().iter().enumerate() {
        let cells = batch.rows().iter().map(|row| row.get(index).cloned().flatten());
        let series = column_series(column, cells)?;
        columns.push(series.into_column());
    }

    debug!(
        "Built frame for batch {}: {} columns x {} rows",
        batch.sequence(),
        columns.len(),
        batch.len()
    );
    DataFrame::new(columns)
}

fn column_series(
    column: &Column,
    cells: impl Iterator<Item = Option<Value>>,
) -> PolarsResult<Series> {
    let name = PlSmallStr::from(column.name.as_str());

    let series = match column.column_type {
        ColumnType::Int16 => Series::new(
            name,
            cells
                .map(|v| match v {
                    Some(Value::Int16(n)) => Some(n),
                    _ => None,
                })
                .collect::<Vec<Option<i16>>>(),
        ),
        ColumnType::Int32 => Series::new(
            name,
            cells
                .map(|v| match v {
                    Some(Value::Int32(n)) => Some(n),
                    _ => None,
                })
                .collect::<Vec<Option<i32>>>(),
        ),
        ColumnType::Int64 => Series::new(
            name,
            cells
                .map(|v| match v {
                    Some(Value::Int64(n)) => Some(n),
                    _ => None,
                })
                .collect::<Vec<Option<i64>>>(),
        ),
        ColumnType::Decimal | ColumnType::Float => Series::new(
            name,
            cells
                .map(|v| match v {
                    Some(Value::Decimal(d)) | Some(Value::Float(d)) => Some(d),
                    _ => None,
                })
                .collect::<Vec<Option<f64>>>(),
        ),
        ColumnType::Boolean => Series::new(
            name,
            cells
                .map(|v| match v {
                    Some(Value::Boolean(b)) => Some(b),
                    _ => None,
                })
                .collect::<Vec<Option<bool>>>(),
        ),
        ColumnType::DateTime => Series::new(
            name,
            cells
                .map(|v| match v {
                    Some(Value::DateTime(dt)) => Some(dt.and_utc().timestamp_millis()),
                    _ => None,
                })
                .collect::<Vec<Option<i64>>>(),
        )
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        ColumnType::Char | ColumnType::String => Series::new(
            name,
            cells
                .map(|v| v.map(|value| value.to_string()))
                .collect::<Vec<Option<String>>>(),
        ),
    };

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Schema;
    use chrono::NaiveDate;
    use polars::prelude::{ParquetReader, SerReader};
    use std::fs::File;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_batch() -> Batch {
        let schema = Arc::new(Schema::new(vec![
            Column::new("id", ColumnType::Int32, false),
            Column::new("name", ColumnType::String, true),
            Column::new("score", ColumnType::Decimal, true),
            Column::new("active", ColumnType::Boolean, true),
            Column::new("seen", ColumnType::DateTime, true),
        ]));

        let seen = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();

        let mut batch = Batch::new(schema, 4);
        batch.push(vec![
            Some(Value::Int32(1)),
            Some(Value::String("Ada".to_string())),
            Some(Value::Decimal(9.5)),
            Some(Value::Boolean(true)),
            Some(Value::DateTime(seen)),
        ]);
        batch.push(vec![Some(Value::Int32(2)), None, None, None, None]);
        batch
    }

    #[test]
    fn test_batch_to_dataframe_types() {
        let df = batch_to_dataframe(&sample_batch()).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 5);
        assert_eq!(df.column("id").unwrap().dtype(), &DataType::Int32);
        assert_eq!(df.column("name").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("score").unwrap().dtype(), &DataType::Float64);
        assert_eq!(
            df.column("seen").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        assert_eq!(df.column("name").unwrap().null_count(), 1);
    }

    #[test]
    fn test_write_batch_creates_part_file() {
        let dir = TempDir::new().unwrap();
        let mut sink = ParquetSink::new(dir.path().join("out"));

        let written = sink
            .write_batch("people", &sample_batch(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(written, 2);

        let path = dir.path().join("out").join("people-00001.parquet");
        assert!(path.exists());

        let df = ParquetReader::new(File::open(&path).unwrap())
            .finish()
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.get_column_names_str(),
            vec!["id", "name", "score", "active", "seen"]
        );
    }

    #[test]
    fn test_part_path_numbering() {
        let sink = ParquetSink::new("/data");
        assert_eq!(
            sink.part_path("orders", 42),
            PathBuf::from("/data/orders-00042.parquet")
        );
    }

    #[test]
    fn test_compression_variants() {
        let dir = TempDir::new().unwrap();
        for compression in [
            CompressionAlgorithm::Snappy,
            CompressionAlgorithm::Zstd,
            CompressionAlgorithm::Lz4,
            CompressionAlgorithm::Uncompressed,
        ] {
            let out = dir.path().join(format!("{:?}", compression));
            let mut sink = ParquetSink::new(&out).with_compression(compression);
            sink.write_batch("t", &sample_batch(), Duration::from_secs(1))
                .unwrap();
            assert!(out.join("t-00001.parquet").exists());
        }
    }

    #[test]
    fn test_unwritable_directory_is_batch_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut sink = ParquetSink::new(blocker.join("nested"));
        let err = sink
            .write_batch("people", &sample_batch(), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.batch_number, 1);
    }
}
