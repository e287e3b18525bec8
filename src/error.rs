//! Custom error types for sheetqa.
//!
//! Run-level failures live in [`SheetQaError`]. Per-question failures are
//! a separate type, [`crate::client::Fault`], and never surface here: a
//! question that cannot be answered still produces an output row.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum SheetQaError {
    /// Failed to read the input file.
    #[error("failed to read input file '{path}': {source}")]
    InputFileRead {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the output file.
    #[error("failed to write output file '{path}': {source}")]
    OutputFileWrite {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The workbook could not be opened or parsed.
    #[error("failed to parse spreadsheet '{path}': {message}")]
    SpreadsheetParse {
        /// Path to the workbook.
        path: PathBuf,
        /// Reader error description.
        message: String,
    },

    /// The workbook could not be serialized.
    #[error("failed to write spreadsheet '{path}': {message}")]
    SpreadsheetWrite {
        /// Path to the workbook.
        path: PathBuf,
        /// Writer error description.
        message: String,
    },

    /// CSV encoding or decoding failed.
    #[error("CSV error in '{path}': {source}")]
    Csv {
        /// Path to the CSV file.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// The input has no header row, so there is no question column.
    #[error("input '{path}' has no columns - the first column must hold the questions")]
    NoColumns {
        /// Path to the offending file.
        path: PathBuf,
    },

    /// The file extension is not a supported tabular format.
    #[error("unsupported file format '{path}' (expected .xlsx, .xls, .ods or .csv)")]
    UnsupportedFormat {
        /// Path to the offending file.
        path: PathBuf,
    },

    /// Failed to parse the JSON configuration file.
    #[error("failed to parse config file '{path}': {source}")]
    ConfigParse {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to build the HTTP client.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// No API credential was provided.
    #[error("no API key configured - set OPENAI_API_KEY")]
    MissingApiKey,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Statistics were requested over zero durations.
    #[error("cannot summarize an empty set of durations")]
    EmptyInput,
}

/// Result type alias for sheetqa operations.
pub type Result<T> = std::result::Result<T, SheetQaError>;
