//! Command implementations for the CSV batch loader CLI
//!
//! Sets up logging, layers configuration, runs the blocking import on the
//! tokio blocking pool and reports the outcome.

use crate::cli::args::{
    Args, Commands, DdlArgs, DescribeArgs, ExecArgs, ExportArgs, ExportFormat, ImportArgs,
};
use crate::config::{ImportConfig, unescape_delimiter};
use crate::destination::{
    BulkSink, DefinitionFileProbe, ParquetSink, SchemaProbe, SqliteDestination,
};
use crate::error::{LoaderError, Result};
use crate::export::{
    DdlOptions, MergeOptions, create_table_ddl, merge_sql, table_definition,
    table_name_from_path, write_csv_file, write_table_definition,
};
use crate::models::ImportState;
use crate::processor::{CancellationFlag, Importer, read_header_columns, split_column_list};
use crate::tokenizer::Tokenizer;
use colored::*;
use indicatif::HumanDuration;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How a command finished, mapped to the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    /// At least one batch failed to commit
    PartialFailure,
    /// Stopped early on Ctrl+C
    Cancelled,
}

impl CommandOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            CommandOutcome::Success => 0,
            CommandOutcome::PartialFailure => 2,
            CommandOutcome::Cancelled => 130,
        }
    }

    pub fn from_state(state: &ImportState) -> Self {
        if state.cancelled {
            CommandOutcome::Cancelled
        } else if state.has_errors() {
            CommandOutcome::PartialFailure
        } else {
            CommandOutcome::Success
        }
    }
}

/// Main command runner
pub async fn run(args: Args, cancellation: CancellationFlag) -> Result<CommandOutcome> {
    setup_logging(&args)?;
    debug!("Command line arguments: {:?}", args);

    match &args.command {
        Commands::Import(import) => run_import(import, args.show_progress(), cancellation).await,
        Commands::Describe(describe) => run_describe(describe).map(|_| CommandOutcome::Success),
        Commands::Ddl(ddl) => run_ddl(ddl).map(|_| CommandOutcome::Success),
        Commands::Export(export) => run_export(export).map(|_| CommandOutcome::Success),
        Commands::Exec(exec) => run_exec(exec).map(|_| CommandOutcome::Success),
    }
}

/// Set up structured logging based on CLI arguments
fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("csv_batch_loader={}", log_level)));

    let result = if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    result.map_err(|e| LoaderError::configuration(format!("Failed to initialise logging: {}", e)))?;
    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Layer configuration: defaults, then the JSON config file, then CLI flags
pub fn load_configuration(args: &ImportArgs) -> Result<ImportConfig> {
    args.validate()?;

    let config_file = match &args.config_file {
        Some(path) => Some(path.clone()),
        None => ImportConfig::default_config_path()
            .ok()
            .filter(|path| path.exists()),
    };

    let mut config = match &config_file {
        Some(path) => {
            info!("Using config file: {}", path.display());
            ImportConfig::from_json_file(path)?
        }
        None => {
            debug!("No config file found, using defaults");
            ImportConfig::default()
        }
    };

    args.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

pub async fn run_import(
    args: &ImportArgs,
    show_progress: bool,
    cancellation: CancellationFlag,
) -> Result<CommandOutcome> {
    let config = load_configuration(args)?;
    let start_time = Instant::now();

    let state = if let Some(db_path) = &args.sqlite {
        info!("Importing into SQLite database {}", db_path.display());
        let destination = SqliteDestination::new(db_path);
        run_importer(
            config.clone(),
            destination.clone(),
            destination,
            show_progress,
            cancellation,
        )
        .await?
    } else {
        let (Some(output_dir), Some(definition)) = (&args.parquet_dir, &args.definition) else {
            return Err(LoaderError::configuration(
                "Either --sqlite or --parquet-dir with --definition is required",
            ));
        };
        info!("Writing Parquet part files to {}", output_dir.display());
        let sink = ParquetSink::new(output_dir).with_compression(args.compression);
        run_importer(
            config.clone(),
            DefinitionFileProbe::new(definition),
            sink,
            show_progress,
            cancellation,
        )
        .await?
    };

    print_import_summary(&config, &state, start_time.elapsed());
    Ok(CommandOutcome::from_state(&state))
}

/// Run the importer on the blocking pool; file reads and commits block
async fn run_importer<P, S>(
    config: ImportConfig,
    probe: P,
    sink: S,
    show_progress: bool,
    cancellation: CancellationFlag,
) -> Result<ImportState>
where
    P: SchemaProbe + Send + 'static,
    S: BulkSink + Send + 'static,
{
    let mut importer = Importer::new(config, probe, sink)
        .with_progress(show_progress)
        .with_cancellation(cancellation);

    tokio::task::spawn_blocking(move || importer.run())
        .await
        .map_err(|e| LoaderError::interrupted(format!("import task failed: {}", e)))?
}

/// Print the final import report
fn print_import_summary(config: &ImportConfig, state: &ImportState, elapsed: Duration) {
    let headline = if state.cancelled {
        "Import cancelled".yellow().bold()
    } else if state.has_errors() {
        "Import finished with failed batches".red().bold()
    } else {
        "Import complete".green().bold()
    };

    println!();
    println!("{}", headline);
    println!("   Source:        {}", config.file_path.display());
    println!("   Destination:   {}", config.destination.bright_cyan());
    println!("   Data rows:     {}", state.total_data_rows);
    println!("   Rows attempted: {}", state.rows_attempted);
    println!(
        "   Rows written:  {} ({:.1}%)",
        state.rows_written.to_string().bright_green(),
        state.success_rate()
    );
    println!("   Batches:       {}", state.batch_count);
    if state.rows_skipped > 0 {
        println!(
            "   Rows skipped:  {}",
            state.rows_skipped.to_string().yellow()
        );
    }
    println!("   Elapsed:       {}", HumanDuration(elapsed));

    if state.has_errors() {
        println!();
        println!("{}", "Failed batches:".red());
        for error in &state.errors {
            println!("   batch {}: {}", error.batch_number, error.message);
        }
    }
    println!();
}

pub fn run_describe(args: &DescribeArgs) -> Result<()> {
    let destination = SqliteDestination::new(&args.sqlite);
    let schema = destination.fetch_schema(&args.table, &args.column_names())?;
    match &args.output {
        Some(path) => write_table_definition(path, &args.table, &schema)?,
        None => print!("{}", table_definition(&args.table, &schema)),
    }
    info!("Described {} columns of {}", schema.len(), args.table);
    Ok(())
}

pub fn run_ddl(args: &DdlArgs) -> Result<()> {
    let tokenizer = Tokenizer::new(unescape_delimiter(&args.delimiter))?;
    let options = DdlOptions {
        schema_name: args.schema.clone(),
        sql_type: args.sql_type.clone(),
    };

    let files = collect_input_files(&args.paths, &args.extension)?;
    if files.is_empty() {
        return Err(LoaderError::configuration(format!(
            "No .{} files found",
            args.extension
        )));
    }

    let mut ddl = String::new();
    for file in &files {
        let table = table_name_from_path(file).ok_or_else(|| {
            LoaderError::configuration(format!("Cannot derive a table name from {}", file.display()))
        })?;
        let columns = read_header_columns(file, &tokenizer)?;
        ddl.push_str(&create_table_ddl(&table, &columns, &options)?);
        debug!("Built DDL for {} with {} columns", table, columns.len());
    }

    write_output(args.output.as_deref(), &ddl)?;
    info!("Generated DDL for {} tables", files.len());
    Ok(())
}

pub fn run_export(args: &ExportArgs) -> Result<()> {
    let destination = SqliteDestination::new(&args.sqlite);
    let (source, schema, rows) = match (&args.query, &args.table) {
        (Some(query), _) => {
            let (schema, rows) = destination.query_rows(query)?;
            ("query".to_string(), schema, rows)
        }
        (None, Some(table)) => {
            let schema = destination.table_schema(table)?;
            if schema.is_empty() {
                return Err(LoaderError::schema_fetch(
                    table,
                    "table does not exist or has no columns",
                ));
            }
            let rows = destination.read_rows(table, &schema)?;
            (table.clone(), schema, rows)
        }
        (None, None) => {
            return Err(LoaderError::configuration("export needs --table or --query"));
        }
    };

    match args.format {
        ExportFormat::Csv => {
            write_csv_file(&args.output, &schema, &rows, &unescape_delimiter(&args.delimiter))?
        }
        ExportFormat::Merge => {
            let table = args.table.as_deref().ok_or_else(|| {
                LoaderError::configuration("MERGE export needs --table as the target table")
            })?;
            let mut options = MergeOptions::new(
                args.match_columns
                    .as_deref()
                    .map(split_column_list)
                    .unwrap_or_default(),
            );
            options.schema_name = args.schema.clone();
            options.identity_column = args.identity_column.clone();
            options.include_identity = args.include_identity;

            let sql = merge_sql(table, &schema, &rows, &options)?;
            write_output(Some(args.output.as_path()), &sql)?;
        }
    }

    info!(
        "Exported {} rows of {} to {}",
        rows.len(),
        source,
        args.output.display()
    );
    Ok(())
}

/// Run a SQL script against the SQLite database
pub fn run_exec(args: &ExecArgs) -> Result<()> {
    if !args.script.exists() {
        return Err(LoaderError::FileNotFound {
            path: args.script.clone(),
        });
    }
    let sql = std::fs::read_to_string(&args.script)?;
    SqliteDestination::new(&args.sqlite).execute_sql(&sql)?;
    info!(
        "Executed {} against {}",
        args.script.display(),
        args.sqlite.display()
    );
    Ok(())
}

/// Expand directories into their files with `extension`, sorted by name
pub fn collect_input_files(paths: &[PathBuf], extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            for entry in std::fs::read_dir(path)? {
                let entry_path = entry?.path();
                if entry_path.is_file()
                    && entry_path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
                {
                    found.push(entry_path);
                }
            }
            found.sort();
            if found.is_empty() {
                warn!("No .{} files in {}", extension, path.display());
            }
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            return Err(LoaderError::FileNotFound { path: path.clone() });
        }
    }

    Ok(files)
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, text)?;
            info!("Wrote {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}
