//! Application constants for the CSV batch loader
//!
//! Default values for the import configuration plus the fixed vocabularies
//! used by value coercion.

// =============================================================================
// Import Defaults
// =============================================================================

/// Rows committed per transaction
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Per-batch commit timeout in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Header lines discarded before data begins
pub const DEFAULT_HEADER_ROW_COUNT: usize = 1;

/// Field delimiter
pub const DEFAULT_DELIMITER: &str = ",";

/// Delimiter used when splitting an explicit column list
pub const COLUMN_LIST_DELIMITER: &str = ",";

// =============================================================================
// Coercion Vocabulary
// =============================================================================

/// Case-insensitive tokens that always coerce to null
pub const NULL_TOKENS: &[&str] = &["null", "(null)"];

/// Case-insensitive tokens recognised as boolean true
pub const TRUE_TOKENS: &[&str] = &["true", "yes", "1"];

/// Case-insensitive tokens recognised as boolean false
pub const FALSE_TOKENS: &[&str] = &["false", "no", "0"];

/// Date-and-time layouts tried before the date-only fallback
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

/// Date-only layouts applied after non-date characters are stripped
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y"];

/// Layout used when a datetime is written back out as text
pub const DATETIME_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Export Defaults
// =============================================================================

/// SQL schema used for generated DDL and MERGE statements
pub const DEFAULT_SQL_SCHEMA: &str = "dbo";

/// Column type used for generated DDL
pub const DEFAULT_SQL_TYPE: &str = "nvarchar(255)";

/// Name of the default config file under the user config directory
pub const CONFIG_DIR_NAME: &str = "csv-loader";
pub const CONFIG_FILE_NAME: &str = "config.json";
