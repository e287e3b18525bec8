//! # sheetqa
//!
//! Answer a spreadsheet of questions with a chat-completions model.
//!
//! sheetqa reads a table whose first column holds one question per row, asks
//! the model each question, and writes the table back with two columns
//! appended: `Answers` and `Processing Time (seconds)`.
//!
//! ## Features
//!
//! - **Bounded concurrency**: questions run in fixed-size batches; at most
//!   one batch is in flight
//! - **Automatic retries**: exponential backoff with jitter for transient faults,
//!   no retries once the account is out of quota
//! - **Order preserving**: output row N always belongs to input row N
//! - **Partial failure tolerant**: a failed question becomes a readable error
//!   answer instead of aborting the run
//! - **Timing statistics**: total, average, max and min processing time
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheetqa::{Config, OpenAiClient, Pipeline, ProgressMode};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::default();
//!     config.api.api_key = Some("your-api-key".to_string());
//!
//!     let client = Arc::new(OpenAiClient::new(&config.api)?);
//!     let pipeline = Pipeline::new(&config, client);
//!     let result = pipeline
//!         .process_file(
//!             Path::new("questions.xlsx"),
//!             Path::new("processed_results.xlsx"),
//!             ProgressMode::Bar,
//!         )
//!         .await?;
//!
//!     result.print_summary();
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! sheetqa supports configuration via:
//! - Command-line arguments
//! - Environment variables (prefixed with `SHEETQA_`, plus `OPENAI_API_KEY`)
//! - JSON configuration files
//!
//! See [`Config`] for all available options.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod stats;
pub mod table;

// Re-exports for convenience
pub use client::{Completion, CompletionClient, Fault, OpenAiClient};
pub use config::{ApiConfig, Args, BatchConfig, Config, RetryConfig};
pub use error::{Result, SheetQaError};
pub use pipeline::{AnswerResult, AnsweredRow, Pipeline, PipelineOutput, ProcessingResult, ProgressMode};
pub use progress::{BarReporter, LogReporter, NoopReporter, ProgressEvent, ProgressReporter};
pub use retry::{Attempted, RetryPolicy};
pub use scheduler::{BatchScheduler, plan_batches};
pub use stats::RunStatistics;
pub use table::{Cell, QuestionRow, Table, TableFormat};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
