//! Pipeline driver: rows in, answered rows and statistics out.
//!
//! This is where per-question outcomes are collapsed into display strings
//! and where run-level errors (unreadable input, unwritable output) are
//! returned to the caller.

use crate::client::{CompletionClient, Fault};
use crate::config::Config;
use crate::error::Result;
use crate::progress::{BarReporter, LogReporter, NoopReporter, ProgressReporter};
use crate::retry::{Attempted, RetryPolicy};
use crate::scheduler::BatchScheduler;
use crate::stats::RunStatistics;
use crate::table::{Cell, QuestionRow, Table, TableFormat};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Header of the appended answer column.
pub const ANSWERS_COLUMN: &str = "Answers";

/// Header of the appended timing column.
pub const TIME_COLUMN: &str = "Processing Time (seconds)";

/// Answer shown when the account has no quota left.
pub const QUOTA_EXCEEDED_ANSWER: &str = "Error: OpenAI API quota exceeded. Please check your billing status and plan details at https://platform.openai.com/account/billing/overview";

/// What ends up in a row's answer cells. Never absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    /// Model reply, or a readable error message.
    pub answer: String,
    /// Seconds spent on the successful call; 0 on failure.
    pub duration_seconds: f64,
}

impl From<&Attempted> for AnswerResult {
    fn from(attempted: &Attempted) -> Self {
        match &attempted.result {
            Ok(completion) => Self {
                answer: completion.text.clone(),
                duration_seconds: completion.duration.as_secs_f64(),
            },
            Err(Fault::QuotaExhausted(_)) => Self {
                answer: QUOTA_EXCEEDED_ANSWER.to_string(),
                duration_seconds: 0.0,
            },
            Err(fault) => Self {
                answer: format!("Error generating response: {fault}"),
                duration_seconds: 0.0,
            },
        }
    }
}

/// An input row merged with its answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredRow {
    /// The original row.
    pub row: QuestionRow,
    /// Its answer.
    pub answer: AnswerResult,
    /// Calls made for this question.
    pub attempts: u32,
    /// Whether the call succeeded.
    pub success: bool,
}

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// One entry per input row, in input order.
    pub rows: Vec<AnsweredRow>,
    /// `None` when there were no questions.
    pub statistics: Option<RunStatistics>,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

impl PipelineOutput {
    /// Number of questions that got a genuine answer.
    pub fn success_count(&self) -> usize {
        self.rows.iter().filter(|r| r.success).count()
    }

    /// Number of questions that ended in an error answer.
    pub fn failure_count(&self) -> usize {
        self.rows.len() - self.success_count()
    }

    /// Build the output table: input columns plus answer and timing columns.
    pub fn to_table(&self, headers: &[String]) -> Table {
        let width = headers.len();
        let mut out_headers = headers.to_vec();
        out_headers.push(ANSWERS_COLUMN.to_string());
        out_headers.push(TIME_COLUMN.to_string());

        let rows = self
            .rows
            .iter()
            .map(|answered| {
                let mut cells = answered.row.cells.clone();
                if cells.len() > width {
                    warn!(
                        row = answered.row.index,
                        cells = cells.len(),
                        columns = width,
                        "Dropping cells beyond the header width"
                    );
                }
                cells.resize(width, Cell::Empty);
                cells.push(Cell::Text(answered.answer.answer.clone()));
                cells.push(Cell::Seconds(answered.answer.duration_seconds));
                cells
            })
            .collect();

        Table::new(out_headers, rows)
    }
}

/// How progress should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Terminal progress bar.
    Bar,
    /// One log line per batch.
    Log,
    /// Nothing.
    Silent,
}

/// Orchestrates a run.
pub struct Pipeline {
    scheduler: BatchScheduler,
}

impl Pipeline {
    /// Create a pipeline around an injected completion client.
    pub fn new(config: &Config, client: Arc<dyn CompletionClient>) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            scheduler: BatchScheduler::new(client, retry, config.batch.batch_size),
        }
    }

    /// Answer every row and compute statistics.
    pub async fn run(
        &self,
        rows: Vec<QuestionRow>,
        reporter: &dyn ProgressReporter,
    ) -> PipelineOutput {
        let start = Instant::now();
        let questions: Vec<String> = rows.iter().map(|r| r.question.clone()).collect();

        let outcomes = self.scheduler.run_all(&questions, reporter).await;

        let rows: Vec<AnsweredRow> = rows
            .into_iter()
            .zip(outcomes.iter())
            .map(|(row, attempted)| AnsweredRow {
                answer: AnswerResult::from(attempted),
                attempts: attempted.attempts,
                success: attempted.is_success(),
                row,
            })
            .collect();

        let elapsed = start.elapsed();
        let statistics = if rows.is_empty() {
            warn!("No questions to answer");
            None
        } else {
            let durations: Vec<f64> = rows.iter().map(|r| r.answer.duration_seconds).collect();
            RunStatistics::summarize(&durations)
                .ok()
                .map(|s| s.with_wall_clock(elapsed))
        };

        PipelineOutput {
            rows,
            statistics,
            elapsed,
        }
    }

    /// Read `input`, answer every question, and write the result to `output`.
    pub async fn process_file(
        &self,
        input: &Path,
        output: &Path,
        progress: ProgressMode,
    ) -> Result<ProcessingResult> {
        // Fail before any API call if the result could not be saved.
        TableFormat::writable(output)?;
        let table = Table::read(input)?;
        let rows = table.question_rows();
        let total = rows.len();

        info!(
            total_questions = total,
            batch_size = self.scheduler.batch_size(),
            "Loaded questions from file"
        );

        let reporter: Box<dyn ProgressReporter> = match progress {
            ProgressMode::Bar => Box::new(BarReporter::new(total)),
            ProgressMode::Log => Box::new(LogReporter),
            ProgressMode::Silent => Box::new(NoopReporter),
        };

        let result = self.run(rows, reporter.as_ref()).await;

        result.to_table(&table.headers).write(output)?;
        info!(output = %output.display(), "Wrote results");

        Ok(ProcessingResult {
            headers: table.headers,
            output: result,
        })
    }
}

/// Result of processing one file.
#[derive(Debug)]
pub struct ProcessingResult {
    /// Input header row.
    pub headers: Vec<String>,
    /// Answered rows and statistics.
    pub output: PipelineOutput,
}

impl ProcessingResult {
    /// Print a summary of the results.
    pub fn print_summary(&self) {
        let output = &self.output;
        println!("\n{}", "═".repeat(60));
        println!("                    PROCESSING COMPLETE");
        println!("{}", "═".repeat(60));

        match &output.statistics {
            Some(stats) => {
                println!("  Total Questions:        {}", stats.question_count);
                println!("  Answered:               {}", output.success_count());
                println!("  Failed:                 {}", output.failure_count());
                println!("  Total Processing Time:  {:.2}s", stats.total_seconds);
                println!("  Avg Processing Time:    {:.2}s", stats.average_seconds);
                println!("  Max Processing Time:    {:.2}s", stats.max_seconds);
                println!("  Min Processing Time:    {:.2}s", stats.min_seconds);
                println!("  Wall Clock:             {:.2}s", stats.wall_clock.as_secs_f64());
            }
            None => println!("  No data: the input has no questions."),
        }
        println!("{}", "═".repeat(60));
    }

    /// Print the first `limit` answered rows.
    pub fn print_preview(&self, limit: usize) {
        if limit == 0 || self.output.rows.is_empty() {
            return;
        }

        println!("\nPreview of results:");
        for answered in self.output.rows.iter().take(limit) {
            println!(
                "  {:>3}. {}\n       → {} ({:.2}s)",
                answered.row.index + 1,
                preview(&answered.row.question),
                preview(&answered.answer.answer),
                answered.answer.duration_seconds
            );
        }
        if self.output.rows.len() > limit {
            println!("  ... {} more", self.output.rows.len() - limit);
        }
    }
}

/// First line of `text`, shortened to 80 characters.
fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(80).collect::<String>())
    } else {
        line.to_string()
    }
}
