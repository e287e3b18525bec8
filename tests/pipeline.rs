//! End-to-end tests for the batch pipeline with stub completion clients.

use async_trait::async_trait;
use proptest::prelude::*;
use sheetqa::{
    Cell, Completion, CompletionClient, Config, Fault, Pipeline, ProgressEvent, ProgressMode,
    ProgressReporter, QuestionRow, RetryConfig, SheetQaError, Table,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers deterministically; duration depends only on the question.
struct Deterministic;

#[async_trait]
impl CompletionClient for Deterministic {
    async fn complete(&self, question: &str) -> Result<Completion, Fault> {
        tokio::task::yield_now().await;
        Ok(Completion::new(
            format!("Answer to: {question}"),
            Duration::from_millis(100 + question.len() as u64),
        ))
    }
}

/// Always fails with the given fault and counts calls per question.
struct AlwaysFails {
    fault: Fault,
    calls: Mutex<HashMap<String, usize>>,
}

impl AlwaysFails {
    fn new(fault: Fault) -> Self {
        Self {
            fault,
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls_for(&self, question: &str) -> usize {
        self.calls.lock().unwrap().get(question).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CompletionClient for AlwaysFails {
    async fn complete(&self, question: &str) -> Result<Completion, Fault> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(question.to_string())
            .or_default() += 1;
        Err(self.fault.clone())
    }
}

/// Tracks the peak number of concurrent calls.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl CompletionClient for InFlight {
    async fn complete(&self, question: &str) -> Result<Completion, Fault> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(Completion::new(question, Duration::from_millis(5)))
    }
}

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<ProgressEvent>>,
    finished: AtomicUsize,
}

impl ProgressReporter for Recording {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn config(batch_size: usize, max_attempts: u32) -> Config {
    let mut config = Config::default();
    config.batch.batch_size = batch_size;
    config.retry = RetryConfig::immediate(max_attempts);
    config
}

fn rows(n: usize) -> Vec<QuestionRow> {
    (0..n)
        .map(|index| {
            let question = format!("Question {index}?");
            QuestionRow {
                index,
                cells: vec![Cell::Text(question.clone()), Cell::Number(index as f64)],
                question,
            }
        })
        .collect()
}

#[tokio::test]
async fn seven_rows_in_batches_of_five() {
    let pipeline = Pipeline::new(&config(5, 3), Arc::new(Deterministic));
    let reporter = Recording::default();

    let output = pipeline.run(rows(7), &reporter).await;

    assert_eq!(output.rows.len(), 7);
    let events = reporter.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            ProgressEvent { completed: 0, total: 7, batch_size: 5 },
            ProgressEvent { completed: 5, total: 7, batch_size: 5 },
        ]
    );
    assert_eq!(reporter.finished.load(Ordering::SeqCst), 1);

    for (i, answered) in output.rows.iter().enumerate() {
        assert_eq!(answered.row.index, i);
        assert_eq!(answered.answer.answer, format!("Answer to: Question {i}?"));
    }

    let stats = output.statistics.expect("statistics for non-empty run");
    assert_eq!(stats.question_count, 7);
    assert!(stats.min_seconds > 0.0);
}

#[tokio::test]
async fn concurrency_never_exceeds_batch_size() {
    let client = Arc::new(InFlight::default());
    let pipeline = Pipeline::new(&config(3, 1), client.clone());

    let output = pipeline.run(rows(10), &Recording::default()).await;

    assert_eq!(output.rows.len(), 10);
    assert_eq!(client.peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn transient_failures_are_retried_exactly_max_attempts() {
    let client = Arc::new(AlwaysFails::new(Fault::Transient("HTTP 503".into())));
    let pipeline = Pipeline::new(&config(5, 3), client.clone());

    let output = pipeline.run(rows(4), &Recording::default()).await;

    assert_eq!(output.rows.len(), 4);
    for answered in &output.rows {
        assert_eq!(client.calls_for(&answered.row.question), 3);
        assert_eq!(answered.attempts, 3);
        assert!(!answered.success);
        assert_eq!(answered.answer.answer, "Error generating response: HTTP 503");
        assert_eq!(answered.answer.duration_seconds, 0.0);
    }
    assert_eq!(output.failure_count(), 4);

    let stats = output.statistics.unwrap();
    assert_eq!(stats.total_seconds, 0.0);
    assert_eq!(stats.question_count, 4);
}

#[tokio::test]
async fn quota_exhaustion_is_attempted_once() {
    let client = Arc::new(AlwaysFails::new(Fault::QuotaExhausted(
        "insufficient_quota".into(),
    )));
    let pipeline = Pipeline::new(&config(5, 3), client.clone());

    let output = pipeline.run(rows(2), &Recording::default()).await;

    for answered in &output.rows {
        assert_eq!(client.calls_for(&answered.row.question), 1);
        assert!(answered.answer.answer.contains("quota exceeded"));
        assert_eq!(answered.answer.duration_seconds, 0.0);
    }
}

#[tokio::test]
async fn empty_input_has_no_statistics() {
    let pipeline = Pipeline::new(&config(5, 3), Arc::new(Deterministic));
    let reporter = Recording::default();

    let output = pipeline.run(Vec::new(), &reporter).await;

    assert!(output.rows.is_empty());
    assert!(output.statistics.is_none());
    assert!(reporter.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn output_is_byte_identical_across_runs() {
    let pipeline = Pipeline::new(&config(4, 3), Arc::new(Deterministic));
    let headers = vec!["Questions".to_string(), "Id".to_string()];

    let first = pipeline.run(rows(9), &Recording::default()).await;
    let second = pipeline.run(rows(9), &Recording::default()).await;

    let a = first.to_table(&headers).to_csv_bytes().unwrap();
    let b = second.to_table(&headers).to_csv_bytes().unwrap();
    assert_eq!(a, b);

    let text = String::from_utf8(a).unwrap();
    assert!(text.starts_with("Questions,Id,Answers,Processing Time (seconds)\n"));
    assert!(text.contains("Question 0?,0,Answer to: Question 0?,0.111\n"));
}

#[tokio::test]
async fn process_file_round_trip_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("questions.csv");
    let output = dir.path().join("answers.csv");
    std::fs::write(&input, "Questions,Owner\nWhat is Rust?,alice\n,bob\nWhy tokio?,\n").unwrap();

    let pipeline = Pipeline::new(&config(2, 3), Arc::new(Deterministic));
    let result = pipeline
        .process_file(&input, &output, ProgressMode::Silent)
        .await
        .unwrap();

    assert_eq!(result.output.rows.len(), 3);

    let table = Table::read(&output).unwrap();
    assert_eq!(
        table.headers,
        vec!["Questions", "Owner", "Answers", "Processing Time (seconds)"]
    );
    assert_eq!(table.rows[0][1], Cell::Text("alice".into()));
    assert_eq!(table.rows[0][2], Cell::Text("Answer to: What is Rust?".into()));
    assert_eq!(table.rows[1][2], Cell::Text("Answer to: ".into()));
    assert_eq!(table.rows[2][0], Cell::Text("Why tokio?".into()));
    assert_eq!(table.rows[1][3], Cell::Text("0.100".into()));
    assert_eq!(table.rows[2][3], Cell::Text("0.110".into()));
}

#[tokio::test]
async fn process_file_header_only_writes_header() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("questions.csv");
    let output = dir.path().join("answers.xlsx");
    std::fs::write(&input, "Questions\n").unwrap();

    let pipeline = Pipeline::new(&config(5, 3), Arc::new(Deterministic));
    let result = pipeline
        .process_file(&input, &output, ProgressMode::Silent)
        .await
        .unwrap();

    assert!(result.output.statistics.is_none());
    let table = Table::read(&output).unwrap();
    assert_eq!(
        table.headers,
        vec!["Questions", "Answers", "Processing Time (seconds)"]
    );
    assert!(table.rows.is_empty());
}

#[tokio::test]
async fn unwritable_output_fails_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("questions.csv");
    std::fs::write(&input, "Questions\na?\nb?\nc?\n").unwrap();

    let client = Arc::new(AlwaysFails::new(Fault::Transient("unused".into())));
    let pipeline = Pipeline::new(&config(5, 3), client.clone());

    for name in ["out.xls", "out.txt"] {
        let output = dir.path().join(name);
        let result = pipeline
            .process_file(&input, &output, ProgressMode::Silent)
            .await;

        assert!(matches!(
            result,
            Err(SheetQaError::UnsupportedFormat { .. })
        ));
        assert!(!output.exists());
    }
    assert_eq!(client.calls.lock().unwrap().values().sum::<usize>(), 0);
}

#[tokio::test]
async fn zero_duration_renders_with_three_decimals() {
    let client = Arc::new(AlwaysFails::new(Fault::Other("HTTP 400".into())));
    let pipeline = Pipeline::new(&config(5, 3), client);

    let output = pipeline.run(rows(1), &Recording::default()).await;
    let csv = output
        .to_table(&["Questions".to_string(), "Id".to_string()])
        .to_csv_bytes()
        .unwrap();

    assert_eq!(
        String::from_utf8(csv).unwrap(),
        "Questions,Id,Answers,Processing Time (seconds)\n\
         Question 0?,0,Error generating response: HTTP 400,0.000\n"
    );
}

#[tokio::test]
async fn process_file_rejects_unreadable_input() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(&config(5, 3), Arc::new(Deterministic));

    let missing = pipeline
        .process_file(
            &dir.path().join("missing.xlsx"),
            &dir.path().join("out.xlsx"),
            ProgressMode::Silent,
        )
        .await;
    assert!(missing.is_err());
    assert!(!dir.path().join("out.xlsx").exists());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn output_matches_input_order(count in 0usize..40, batch_size in 1usize..12) {
        let pipeline = Pipeline::new(&config(batch_size, 2), Arc::new(Deterministic));
        let output = tokio_test::block_on(pipeline.run(rows(count), &Recording::default()));

        prop_assert_eq!(output.rows.len(), count);
        for (i, answered) in output.rows.iter().enumerate() {
            prop_assert_eq!(answered.row.index, i);
            prop_assert_eq!(&answered.answer.answer, &format!("Answer to: Question {i}?"));
        }
    }
}
