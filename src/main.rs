//! # Story2Test CLI (`s2t`)
//!
//! ## Usage
//!
//! ```bash
//! s2t --config ./config/s2t.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `s2t generate` | Index SRS documents and generate test cases for one story |
//! | `s2t chat` | Interactive session; each line on stdin is a story or follow-up |
//! | `s2t parse <file>` | Extract and package test cases from a saved answer |
//! | `s2t serve` | Start the HTTP API |
//! | `s2t config` | Print the effective configuration |
//!
//! ## Examples
//!
//! ```bash
//! # Three test cases for one story
//! s2t generate --doc srs.pdf --story "As a shopper I want to check out" --count 3
//!
//! # Several documents, scripts executed after generation
//! s2t generate --doc srs.pdf --doc addendum.txt --story-file story.txt --run-scripts
//!
//! # Re-package an answer saved earlier
//! s2t parse answer.md --story "As a shopper I want to check out"
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use story2test::cases::parse_test_cases;
use story2test::config::{self, Config};
use story2test::extract::media_type_for_path;
use story2test::logging;
use story2test::models::UploadedDocument;
use story2test::package::package_records;
use story2test::pipeline::{GenerationReport, Pipeline};
use story2test::runner::ScriptOutcome;
use story2test::server;

/// Story2Test CLI: turn an SRS document and a user story into test cases
/// with Selenium scripts.
///
/// Settings are read from the `--config` TOML file when it exists;
/// otherwise built-in defaults apply. API keys come from `OPENAI_API_KEY`.
#[derive(Parser)]
#[command(
    name = "s2t",
    about = "Story2Test — generate test cases and Selenium scripts from an SRS and a user story",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/s2t.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index SRS documents and generate test cases for a single user story.
    Generate {
        /// SRS document (PDF or TXT). Repeat for several documents.
        #[arg(long = "doc", required = true)]
        docs: Vec<PathBuf>,

        /// The user story text.
        #[arg(long, conflicts_with = "story_file")]
        story: Option<String>,

        /// Read the user story from a file.
        #[arg(long)]
        story_file: Option<PathBuf>,

        /// Number of test cases to request (1-5). Omit to ask for all possible.
        #[arg(long)]
        count: Option<u8>,

        /// Run each generated script after packaging.
        #[arg(long)]
        run_scripts: bool,

        /// Print the full report as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Interactive session over stdin. History carries across questions.
    ///
    /// Type a story or follow-up per line; `exit` or end of input quits.
    Chat {
        /// SRS document (PDF or TXT). Repeat for several documents.
        #[arg(long = "doc", required = true)]
        docs: Vec<PathBuf>,

        /// Number of test cases to request per question (1-5).
        #[arg(long)]
        count: Option<u8>,
    },

    /// Extract and package test cases from a saved oracle answer.
    ///
    /// No network access; useful for re-packaging or checking the parser.
    Parse {
        /// File holding the answer text.
        answer: PathBuf,

        /// User story to put at the top of the combined text.
        #[arg(long, default_value = "")]
        story: String,

        /// Sequence number for the output sub-directory.
        #[arg(long, default_value_t = 1)]
        seq: u64,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Generate {
            docs,
            story,
            story_file,
            count,
            run_scripts,
            json,
        } => {
            let story = match (story, story_file) {
                (Some(s), _) => s,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read story file: {}", path.display()))?,
                (None, None) => bail!("either --story or --story-file is required"),
            };
            run_generate(cfg, &docs, &story, count, run_scripts, json).await?;
        }
        Commands::Chat { docs, count } => {
            run_chat(cfg, &docs, count).await?;
        }
        Commands::Parse { answer, story, seq } => {
            run_parse(&cfg, &answer, &story, seq)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&cfg)?);
        }
    }

    Ok(())
}

fn read_documents(paths: &[PathBuf]) -> Result<Vec<UploadedDocument>> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read document: {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(UploadedDocument::new(name, media_type_for_path(path), bytes))
        })
        .collect()
}

async fn index(cfg: Config, docs: &[PathBuf]) -> Result<Pipeline> {
    let uploads = read_documents(docs)?;
    let mut pipeline = Pipeline::from_config(cfg)?;
    let summary = pipeline.index_documents(&uploads).await?;
    eprintln!(
        "Indexed {} document(s): {} chunks, {} dims ({})",
        summary.documents, summary.chunks, summary.dims, summary.model
    );
    Ok(pipeline)
}

async fn run_generate(
    cfg: Config,
    docs: &[PathBuf],
    story: &str,
    count: Option<u8>,
    run_scripts: bool,
    json: bool,
) -> Result<()> {
    let mut pipeline = index(cfg, docs).await?;
    if run_scripts {
        pipeline.set_run_scripts(true);
    }
    let report = pipeline.generate(story, count).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

async fn run_chat(cfg: Config, docs: &[PathBuf], count: Option<u8>) -> Result<()> {
    let mut pipeline = index(cfg, docs).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("Enter a user story (or `exit`):");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        match pipeline.generate(line, count).await {
            Ok(report) => print_report(&report),
            Err(e) => eprintln!("Error: {}", e),
        }
        eprintln!();
    }
    Ok(())
}

fn run_parse(cfg: &Config, answer: &Path, story: &str, seq: u64) -> Result<()> {
    let text = std::fs::read_to_string(answer)
        .with_context(|| format!("Failed to read answer file: {}", answer.display()))?;
    let cases = parse_test_cases(&text, cfg.extraction.require_script);
    if cases.is_empty() {
        println!("No test cases found.");
        return Ok(());
    }
    let package = package_records(story, &cases, &cfg.output, seq);
    for case in &cases {
        println!("Test Case {}: {}", case.id, first_line(&case.body));
    }
    println!();
    println!("Wrote {} script(s) to {}", package.scripts.len(), package.dir.display());
    for warning in &package.warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}

fn print_report(report: &GenerationReport) {
    if report.cases.is_empty() {
        println!("No test cases found in the answer:\n");
        println!("{}", report.answer);
        return;
    }

    println!("Generated Test Cases:");
    for case in &report.cases {
        println!("  Test Case {}: {}", case.id, first_line(&case.body));
    }

    if let Some(package) = &report.package {
        println!();
        println!("Output directory: {}", package.dir.display());
        if let Some(archive) = &package.archive {
            println!("Archive:          {}", archive.display());
        }
        if let Some(text) = &package.text_path {
            println!("Combined text:    {}", text.display());
        }
        for warning in &package.warnings {
            println!("  warning: {}", warning);
        }
    }

    if !report.runs.is_empty() {
        println!();
        println!("Script runs:");
        for run in &report.runs {
            let status = match &run.outcome {
                ScriptOutcome::Passed => "passed".to_string(),
                ScriptOutcome::Failed { code: Some(code) } => format!("failed (exit {})", code),
                ScriptOutcome::Failed { code: None } => "failed (killed)".to_string(),
                ScriptOutcome::TimedOut => "timed out".to_string(),
                ScriptOutcome::SpawnError { message } => format!("not started: {}", message),
            };
            println!("  test_case_code_{}.py  {}", run.id, status);
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
