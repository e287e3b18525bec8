//! sheetqa CLI - answer a spreadsheet of questions.
//!
//! Run `sheetqa --help` for usage information.

use anyhow::Result;
use console::style;
use sheetqa::{Args, Config, OpenAiClient, Pipeline, ProgressMode, Table, TableFormat};
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse_args();

    // Setup logging
    setup_logging(&args);

    // Print banner
    if !args.json_logs {
        print_banner();
    }

    // Load configuration
    let config = match Config::from_args(&args) {
        Ok(c) => c,
        Err(e) => fail("Configuration error", &e),
    };

    // Dry run mode
    if args.dry_run {
        let table = match Table::read(&args.input) {
            Ok(t) => t,
            Err(e) => fail("Input error", &e),
        };
        if let Err(e) = TableFormat::writable(&args.output) {
            fail("Output error", &e);
        }
        println!("\n{}", style("DRY RUN MODE").yellow().bold());
        println!(
            "Configuration validated; {} question(s) found in column '{}'.\n",
            table.rows.len(),
            table.headers[0]
        );
        print_config_summary(&args, &config);
        return Ok(());
    }

    if args.verbose && !args.json_logs {
        print_config_summary(&args, &config);
    }

    let client = match OpenAiClient::new(&config.api) {
        Ok(c) => Arc::new(c),
        Err(e) => fail("Configuration error", &e),
    };
    let pipeline = Pipeline::new(&config, client);

    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        "Starting processing"
    );

    let progress = if args.json_logs {
        ProgressMode::Log
    } else if args.no_progress {
        ProgressMode::Silent
    } else {
        ProgressMode::Bar
    };

    let result = match pipeline
        .process_file(&args.input, &args.output, progress)
        .await
    {
        Ok(r) => r,
        Err(e) => fail("Processing failed", &e),
    };

    if args.json_logs {
        // JSON output for programmatic consumption
        let json_result = serde_json::json!({
            "status": "complete",
            "finished_at": chrono::Utc::now().to_rfc3339(),
            "output": args.output.display().to_string(),
            "success_count": result.output.success_count(),
            "failure_count": result.output.failure_count(),
            "statistics": result.output.statistics,
        });
        println!("{}", serde_json::to_string(&json_result)?);
    } else {
        result.print_summary();
        result.print_preview(args.preview);
        println!(
            "\n{} Results saved to: {}",
            style("✓").green().bold(),
            args.output.display()
        );
        if result.output.failure_count() > 0 {
            println!(
                "{} {} question(s) could not be answered; see the Answers column",
                style("⚠").yellow().bold(),
                result.output.failure_count()
            );
        }
    }

    Ok(())
}

fn fail(context: &str, err: &sheetqa::SheetQaError) -> ! {
    error!("{}: {}", context, err);
    eprintln!("{} {}", style(format!("{context}:")).red().bold(), err);
    std::process::exit(1);
}

fn setup_logging(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sheetqa={level}")));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .compact(),
            )
            .init();
    }
}

fn print_banner() {
    println!();
    println!("    {}", style("sheetqa").cyan().bold());
    println!(
        "    {}",
        style("Spreadsheet Question Answerer").white().dim()
    );
    println!(
        "    {}",
        style(format!("v{}", sheetqa::VERSION)).white().dim()
    );
    println!();
}

fn print_config_summary(args: &Args, config: &Config) {
    println!("{}", style("Configuration:").bold());
    println!("  Input:       {}", args.input.display());
    println!("  Output:      {}", args.output.display());
    println!("  Endpoint:    {}", config.api.base_url);
    println!("  Model:       {}", config.api.model);
    println!("  Max Tokens:  {}", config.api.max_tokens);
    println!("  Timeout:     {:?}", config.api.timeout);
    println!("  Batch Size:  {}", config.batch.batch_size);
    println!("  Attempts:    {}", config.retry.max_attempts);
    println!(
        "  API Key:     {}",
        if config.api.api_key.is_some() { "set" } else { "missing" }
    );
    println!();
}
