//! Command-line argument definitions for the CSV batch loader
//!
//! Defines the CLI interface using the clap derive API. Import settings are
//! optional here so that values from a JSON config file survive unless a
//! flag overrides them.

use crate::coercer::BooleanPolicy;
use crate::config::ImportConfig;
use crate::constants::{DEFAULT_SQL_SCHEMA, DEFAULT_SQL_TYPE};
use crate::destination::parquet::CompressionAlgorithm;
use crate::error::{LoaderError, Result};
use crate::export::table_name_from_path;
use crate::processor::split_column_list;
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the CSV batch loader
#[derive(Debug, Clone, Parser)]
#[command(
    name = "csv-loader",
    version,
    about = "Stream delimited text files into SQLite or Parquet in transactional batches",
    long_about = "Imports large delimited text files into a destination table in bounded-size \
                  batches, converting each field to the destination column type. A failed batch \
                  is reported and skipped; the rest of the file is still imported.",
    arg_required_else_help = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors, hide progress
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Hide the progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Import a delimited file into a destination table
    Import(ImportArgs),
    /// Write the table-definition listing of a SQLite table
    Describe(DescribeArgs),
    /// Generate CREATE TABLE statements from CSV header lines
    Ddl(DdlArgs),
    /// Export a SQLite table or query result as CSV or MERGE SQL
    Export(ExportArgs),
    /// Run a SQL script (such as `ddl` output) against a SQLite database
    Exec(ExecArgs),
}

/// Arguments for the import command
#[derive(Debug, Clone, ClapArgs)]
pub struct ImportArgs {
    /// Delimited text file to import
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Destination table; defaults to the config file value, then the file name
    #[arg(short, long, value_name = "NAME")]
    pub table: Option<String>,

    /// SQLite database holding the destination table
    #[arg(
        long,
        value_name = "DB",
        conflicts_with = "parquet_dir",
        required_unless_present = "parquet_dir"
    )]
    pub sqlite: Option<PathBuf>,

    /// Write one Parquet part file per batch into this directory
    #[arg(long, value_name = "DIR", requires = "definition")]
    pub parquet_dir: Option<PathBuf>,

    /// Table-definition listing typing the Parquet columns
    #[arg(long, value_name = "FILE")]
    pub definition: Option<PathBuf>,

    /// Parquet compression
    #[arg(long, value_enum, default_value_t = CompressionAlgorithm::Snappy)]
    pub compression: CompressionAlgorithm,

    /// Field delimiter (`\t` for tab)
    #[arg(short, long)]
    pub delimiter: Option<String>,

    /// Lines to discard before the data rows
    #[arg(long, value_name = "N")]
    pub header_rows: Option<usize>,

    /// Comma-separated destination column names, in file order
    #[arg(long, value_name = "LIST")]
    pub columns: Option<String>,

    /// Rows per transaction
    #[arg(short, long, value_name = "ROWS")]
    pub batch_size: Option<usize>,

    /// Per-batch commit timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Store unrecognised boolean text as null instead of false
    #[arg(long)]
    pub strict_booleans: bool,

    /// JSON config file (default: <config dir>/csv-loader/config.json)
    #[arg(short, long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,
}

impl ImportArgs {
    pub fn validate(&self) -> Result<()> {
        if let Some(config_file) = &self.config_file {
            if !config_file.exists() {
                return Err(LoaderError::configuration(format!(
                    "Config file does not exist: {}",
                    config_file.display()
                )));
            }
        }
        if let Some(definition) = &self.definition {
            if self.parquet_dir.is_none() {
                return Err(LoaderError::configuration(format!(
                    "--definition {} is only used with --parquet-dir",
                    definition.display()
                )));
            }
        }
        Ok(())
    }

    /// Overlay the flags that were given onto `config`
    pub fn apply_overrides(&self, config: &mut ImportConfig) {
        config.file_path = self.file.clone();

        if let Some(table) = &self.table {
            config.destination = table.clone();
        } else if config.destination.trim().is_empty() {
            config.destination = table_name_from_path(&self.file).unwrap_or_default();
        }
        if let Some(delimiter) = &self.delimiter {
            config.delimiter = delimiter.clone();
        }
        if let Some(header_rows) = self.header_rows {
            config.header_row_count = header_rows;
        }
        if let Some(columns) = &self.columns {
            config.explicit_columns = Some(columns.clone());
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_seconds = timeout;
        }
        if self.strict_booleans {
            config.boolean_policy = BooleanPolicy::Strict;
        }
    }
}

/// Arguments for the describe command
#[derive(Debug, Clone, ClapArgs)]
pub struct DescribeArgs {
    /// SQLite database holding the table
    #[arg(long, value_name = "DB")]
    pub sqlite: PathBuf,

    /// Table to describe
    #[arg(short, long, value_name = "NAME")]
    pub table: String,

    /// Restrict the listing to these comma-separated columns
    #[arg(long, value_name = "LIST")]
    pub columns: Option<String>,

    /// Output file; stdout when omitted
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl DescribeArgs {
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .as_deref()
            .map(split_column_list)
            .unwrap_or_default()
    }
}

/// Arguments for the ddl command
#[derive(Debug, Clone, ClapArgs)]
pub struct DdlArgs {
    /// CSV files, or directories scanned for files with the given extension
    #[arg(value_name = "PATH", required = true, num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Extension of files picked up from directories
    #[arg(long, default_value = "csv")]
    pub extension: String,

    /// Field delimiter of the header lines (`\t` for tab)
    #[arg(short, long, default_value = ",")]
    pub delimiter: String,

    /// Schema the tables are created in
    #[arg(long, default_value = DEFAULT_SQL_SCHEMA)]
    pub schema: String,

    /// SQL type given to every column
    #[arg(long, default_value = DEFAULT_SQL_TYPE)]
    pub sql_type: String,

    /// Output file; stdout when omitted
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Export artifact formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Header line plus one delimited line per row
    Csv,
    /// A single MERGE statement upserting every row
    Merge,
}

/// Arguments for the export command
#[derive(Debug, Clone, ClapArgs)]
pub struct ExportArgs {
    /// SQLite database holding the table
    #[arg(long, value_name = "DB")]
    pub sqlite: PathBuf,

    /// Table to export; also the MERGE target when exporting a query
    #[arg(short, long, value_name = "NAME", required_unless_present = "query")]
    pub table: Option<String>,

    /// Export the result of this SELECT instead of the whole table
    #[arg(long, value_name = "SQL")]
    pub query: Option<String>,

    /// Artifact to produce
    #[arg(short, long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,

    /// Output file
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// CSV field delimiter (`\t` for tab)
    #[arg(short, long, default_value = ",")]
    pub delimiter: String,

    /// Comma-separated columns matched in the MERGE ON clause
    #[arg(long, value_name = "LIST", required_if_eq("format", "merge"))]
    pub match_columns: Option<String>,

    /// Identity column left out of the MERGE statement
    #[arg(long, value_name = "NAME")]
    pub identity_column: Option<String>,

    /// Keep the identity column in the MERGE statement
    #[arg(long, requires = "identity_column")]
    pub include_identity: bool,

    /// Schema named in the MERGE target
    #[arg(long, default_value = DEFAULT_SQL_SCHEMA)]
    pub schema: String,
}

/// Arguments for the exec command
#[derive(Debug, Clone, ClapArgs)]
pub struct ExecArgs {
    /// SQLite database, created if missing
    #[arg(long, value_name = "DB")]
    pub sqlite: PathBuf,

    /// SQL script to run
    #[arg(value_name = "FILE")]
    pub script: PathBuf,
}

impl Args {
    /// Log level implied by the verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }

    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.no_progress
    }
}
