//! annodb CLI
//!
//! Command-line interface for annodb - import, export and maintain a store of
//! annotated text documents.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use annodb_core::{Config, Engine, ExportOptions};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "annodb")]
#[command(about = "annodb - import and export annotated text documents")]
#[command(version)]
struct Cli {
    /// Store to open: a file path, or :memory: for a store that is never saved
    #[arg(value_name = "DATABASE")]
    database: Option<String>,

    /// Import documents (json, jsonl, xml, csv, txt); repeatable
    #[arg(long, value_name = "FILE")]
    import_docs: Vec<PathBuf>,

    /// Import labels (json, jsonl, xml, csv); repeatable
    #[arg(long, value_name = "FILE")]
    import_labels: Vec<PathBuf>,

    /// Export documents; the format follows the extension
    #[arg(long, value_name = "FILE")]
    export_docs: Option<PathBuf>,

    /// Export labels; the format follows the extension
    #[arg(long, value_name = "FILE")]
    export_labels: Option<PathBuf>,

    /// Only export documents that have at least one annotation
    #[arg(long)]
    labelled_only: bool,

    /// Leave document text and titles out of the export
    #[arg(long)]
    no_text: bool,

    /// Leave annotations out of the export
    #[arg(long)]
    no_annotations: bool,

    /// Repack the store file and exit (all other operations are skipped)
    #[arg(long)]
    vacuum: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Quiet mode - only report failures
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn export_options(&self) -> ExportOptions {
        ExportOptions {
            labelled_only: self.labelled_only,
            no_text: self.no_text,
            no_annotations: self.no_annotations,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    match run(&cli, &output) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            let hint = e
                .downcast_ref::<annodb_core::Error>()
                .and_then(|e| e.recovery_suggestion());
            output.error(&format!("{:#}", e), hint);
            ExitCode::FAILURE
        }
    }
}

/// Run the requested operations; `Ok(false)` when any of them failed
fn run(cli: &Cli, output: &Output) -> Result<bool> {
    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config.log_level);

    let target = config.resolve_target(cli.database.as_deref())?;
    let mut engine =
        Engine::open(&target).with_context(|| format!("Failed to open store {}", target))?;

    if cli.vacuum {
        commands::maintenance::vacuum(&engine, output)?;
        return Ok(true);
    }

    let mut ok = true;
    if !cli.import_labels.is_empty() {
        ok &= commands::import::labels(&mut engine, &cli.import_labels, output);
    }
    if !cli.import_docs.is_empty() {
        ok &= commands::import::documents(&mut engine, &cli.import_docs, output);
    }
    if let Some(path) = &cli.export_labels {
        ok &= commands::export::labels(&engine, path, output);
    }
    if let Some(path) = &cli.export_docs {
        ok &= commands::export::documents(&engine, path, &cli.export_options(), output);
    }
    Ok(ok)
}

/// Log to stderr; `RUST_LOG` overrides the configured level
fn init_logging(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("annodb_core={},annodb_cli={}", log_level, log_level))
    });

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
