//! Generate a spreadsheet of sample questions for trying out sheetqa.

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use rand::seq::IndexedRandom;
use sheetqa::{Cell, Table};
use std::path::PathBuf;

const TEMPLATES: &[&str] = &[
    "What is {}?",
    "How does {} work?",
    "Why is {} important?",
    "Can you explain {}?",
    "What are the benefits of {}?",
    "How to {}?",
    "What are the main components of {}?",
    "What is the difference between {} and {}?",
    "What are the best practices for {}?",
    "How has {} evolved over time?",
];

const TOPICS: &[&str] = &[
    "artificial intelligence", "machine learning", "data science", "cloud computing",
    "cybersecurity", "blockchain", "internet of things", "5G technology",
    "quantum computing", "virtual reality", "augmented reality", "robotics",
    "sustainable energy", "climate change", "renewable resources", "space exploration",
    "genetic engineering", "biotechnology", "nanotechnology", "3D printing",
    "digital marketing", "social media", "content creation", "e-commerce",
    "project management", "leadership", "team building", "communication skills",
    "time management", "productivity", "work-life balance", "stress management",
    "personal finance", "investment strategies", "stock market", "cryptocurrency",
    "healthy eating", "exercise", "mental health", "sleep hygiene",
    "programming", "software development", "web design", "mobile apps",
    "photography", "video editing", "graphic design", "music production",
    "languages", "cultural diversity", "globalization", "international relations",
    "education", "online learning", "skill development", "career growth",
    "sports", "fitness", "nutrition", "wellness",
    "travel", "tourism", "adventure", "exploration",
];

/// Generate random sample questions into a spreadsheet.
#[derive(Parser, Debug)]
#[command(name = "sheetqa-generate", version)]
struct Args {
    /// Number of questions to generate
    #[arg(short, long, default_value = "50")]
    count: usize,

    /// Output file (.xlsx or .csv); defaults to test_questions_<count>.xlsx
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn generate_question(rng: &mut impl Rng) -> String {
    let template = TEMPLATES.choose(rng).copied().unwrap_or(TEMPLATES[0]);
    let first = TOPICS.choose(rng).copied().unwrap_or(TOPICS[0]);

    if template.matches("{}").count() == 2 {
        let others: Vec<&str> = TOPICS.iter().copied().filter(|t| *t != first).collect();
        let second = others.choose(rng).copied().unwrap_or(TOPICS[1]);
        template.replacen("{}", first, 1).replacen("{}", second, 1)
    } else {
        template.replacen("{}", first, 1)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("test_questions_{}.xlsx", args.count)));

    let mut rng = rand::rng();
    let rows = (0..args.count)
        .map(|_| vec![Cell::Text(generate_question(&mut rng))])
        .collect();

    Table::new(vec!["Questions".to_string()], rows)
        .write(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "Generated {} questions and saved to {}",
        args.count,
        output.display()
    );
    Ok(())
}
