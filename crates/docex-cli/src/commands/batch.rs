//! Batch command - extract data from many documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use docex_core::models::config::AiProvider;
use docex_core::models::document::ExtractedDocument;
use docex_core::store::{DocumentStore, JsonDirStore};
use docex_core::{ExtractOptions, Extractor};

use super::config::load_config;
use super::extract::{SpinnerObserver, apply_overrides};

const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "gif", "webp"];

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern of input files (quote it to stop shell expansion)
    #[arg(required = true)]
    input: String,

    /// Write one JSON file per document into this directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Model provider; overrides the config
    #[arg(short, long)]
    provider: Option<AiProvider>,

    /// Skip OCR before prompting the local model
    #[arg(long)]
    no_ocr: bool,

    /// Save every result to the document store
    #[arg(long)]
    save: bool,

    /// Keep going when a document fails
    #[arg(long)]
    continue_on_error: bool,
}

/// Result of one document.
struct BatchResult {
    path: PathBuf,
    outcome: Result<ExtractedDocument, String>,
    processing_time_ms: u64,
}

/// Files matched by `pattern` with a supported extension, sorted.
fn matching_files(pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = glob(pattern)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .collect();
    files.sort();
    Ok(files)
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    // Streaming is pointless when several spinners share the terminal.
    let config = apply_overrides(load_config(config_path)?, args.provider, true, args.no_ocr);

    let files = matching_files(&args.input)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process with {}",
        style("ℹ").blue(),
        files.len(),
        config.ai_provider
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }
    let store = if args.save {
        Some(JsonDirStore::open(&config.store.dir)?)
    } else {
        None
    };

    let extractor = Extractor::from_config(config)?;

    let multi_progress = MultiProgress::new();
    let overall_pb = multi_progress.add(ProgressBar::new(files.len() as u64));
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut results = Vec::with_capacity(files.len());

    for path in files {
        let file_start = Instant::now();
        let file_pb = multi_progress.add(ProgressBar::new_spinner());
        file_pb.set_style(ProgressStyle::default_spinner().template("  {spinner:.green} {prefix} {msg}")?);
        file_pb.set_prefix(display_name(&path));
        let observer = SpinnerObserver::new(file_pb.clone(), false);

        let outcome = extractor
            .extract_document(&path, ExtractOptions::with_observer(&observer))
            .await;
        file_pb.finish_and_clear();
        let processing_time_ms = file_start.elapsed().as_millis() as u64;

        match outcome {
            Ok(document) => {
                if let Some(output_dir) = &args.output_dir {
                    write_output(output_dir, &path, &document)?;
                }
                if let Some(store) = &store {
                    store.save(&document, &path)?;
                }
                results.push(BatchResult {
                    path,
                    outcome: Ok(document),
                    processing_time_ms,
                });
            }
            Err(e) => {
                let error_msg = e.to_string();
                if args.continue_on_error {
                    warn!("Failed to process {}: {}", path.display(), error_msg);
                    results.push(BatchResult {
                        path,
                        outcome: Err(error_msg),
                        processing_time_ms,
                    });
                } else {
                    overall_pb.abandon();
                    error!("Failed to process {}: {}", path.display(), error_msg);
                    anyhow::bail!("Processing {} failed: {}", path.display(), error_msg);
                }
            }
        }

        overall_pb.inc(1);
    }

    overall_pb.finish_with_message("Complete");
    print_summary(&results, start);

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `a.pdf` becomes `a.pdf.json`, so `a.pdf` and `a.png` do not collide.
fn output_name(source: &Path) -> String {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    format!("{}.json", name)
}

fn write_output(output_dir: &Path, source: &Path, document: &ExtractedDocument) -> anyhow::Result<()> {
    let output_path = output_dir.join(output_name(source));
    fs::write(&output_path, serde_json::to_string_pretty(document)?)?;
    debug!("Wrote output to {}", output_path.display());
    Ok(())
}

fn print_summary(results: &[BatchResult], start: Instant) {
    let failed: Vec<_> = results.iter().filter(|r| r.outcome.is_err()).collect();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} succeeded, {} failed",
        results.len() - failed.len(),
        failed.len()
    );
    println!();

    for result in results {
        match &result.outcome {
            Ok(document) => println!(
                "  {} {:<30} {} ({}ms)",
                style("✓").green(),
                display_name(&result.path),
                document.summary(),
                result.processing_time_ms
            ),
            Err(e) => println!(
                "  {} {:<30} {}",
                style("✗").red(),
                display_name(&result.path),
                e
            ),
        }
    }
}
