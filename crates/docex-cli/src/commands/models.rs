//! Models command - download and inspect the OCR models.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use console::style;
use futures_util::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use docex_core::models::config::OcrConfig;

use super::config::load_config;

/// Where the PaddleOCR ONNX exports used by `pure-onnx-ocr` are published.
const DEFAULT_MODELS_URL: &str = "https://github.com/jakubmatias/incr/raw/main/models/mobile";

/// Arguments for the models command.
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    command: ModelsCommand,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// Download the OCR models into the configured model directory
    Download(DownloadArgs),

    /// Check which model files are present
    Status,
}

#[derive(Args)]
struct DownloadArgs {
    /// Output directory (default: ocr.model_dir from the config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Base URL the model files are fetched from
    #[arg(long, default_value = DEFAULT_MODELS_URL)]
    base_url: String,

    /// Force re-download even if files exist
    #[arg(long)]
    force: bool,
}

/// A model file and its approximate size, used to spot truncated downloads.
struct ModelFile {
    filename: String,
    size_bytes: u64,
    description: &'static str,
}

fn model_files(ocr: &OcrConfig) -> Vec<ModelFile> {
    vec![
        ModelFile {
            filename: ocr.detection_model.clone(),
            size_bytes: 4_700_000,
            description: "text detection",
        },
        ModelFile {
            filename: ocr.recognition_model.clone(),
            size_bytes: 7_800_000,
            description: "text recognition",
        },
        ModelFile {
            filename: ocr.dictionary.clone(),
            size_bytes: 1_000,
            description: "character dictionary",
        },
    ]
}

/// Present and at least half the expected size.
fn looks_complete(path: &Path, model: &ModelFile) -> Option<u64> {
    let size = fs::metadata(path).ok()?.len();
    (size > model.size_bytes / 2).then_some(size)
}

pub async fn run(args: ModelsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    match args.command {
        ModelsCommand::Download(download_args) => download_models(download_args, &config.ocr).await,
        ModelsCommand::Status => check_status(&config.ocr),
    }
}

async fn download_models(args: DownloadArgs, ocr: &OcrConfig) -> anyhow::Result<()> {
    let output_dir = args.output.clone().unwrap_or_else(|| ocr.model_dir.clone());
    fs::create_dir_all(&output_dir)?;

    println!(
        "{} Downloading OCR models to {}",
        style("ℹ").blue(),
        output_dir.display()
    );
    println!();

    let client = reqwest::Client::builder()
        .user_agent(concat!("docex/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(300))
        .build()?;

    let multi_progress = MultiProgress::new();
    let mut success_count = 0;
    let mut skip_count = 0;
    let mut error_count = 0;

    for model in model_files(ocr) {
        let path = output_dir.join(&model.filename);

        if !args.force {
            if let Some(size) = looks_complete(&path, &model) {
                println!(
                    "  {} {} (already exists, {})",
                    style("✓").green(),
                    model.filename,
                    format_size(size)
                );
                skip_count += 1;
                continue;
            }
        }

        let url = format!("{}/{}", args.base_url.trim_end_matches('/'), model.filename);

        let pb = multi_progress.add(ProgressBar::new(model.size_bytes));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} {msg:<30} [{bar:25.cyan/blue}] {bytes}/{total_bytes}")?
                .progress_chars("=>-"),
        );
        pb.set_message(model.filename.clone());

        match download_file(&client, &url, &path, &pb).await {
            Ok(()) => {
                pb.finish_with_message(format!("{} {}", style("✓").green(), model.filename));
                success_count += 1;
            }
            Err(e) => {
                pb.finish_with_message(format!("{} {} - {}", style("✗").red(), model.filename, e));
                error_count += 1;
            }
        }
    }

    println!();

    if error_count == 0 {
        println!("{} OCR models ready!", style("✓").green().bold());
        if skip_count > 0 {
            println!(
                "   {} downloaded, {} already present",
                success_count, skip_count
            );
        }
        if output_dir != ocr.model_dir {
            println!();
            println!(
                "{} To use them, run: docex config set ocr.model_dir {}",
                style("ℹ").blue(),
                output_dir.display()
            );
        }
    } else {
        println!(
            "{} Download completed with errors",
            style("⚠").yellow().bold()
        );
        println!(
            "   {} downloaded, {} skipped, {} failed",
            success_count, skip_count, error_count
        );
        println!();
        println!("Retry with: docex models download --force");
        anyhow::bail!("{} model downloads failed", error_count);
    }

    Ok(())
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    pb: &ProgressBar,
) -> anyhow::Result<()> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP {}", response.status());
    }

    if let Some(content_length) = response.content_length() {
        pb.set_length(content_length);
    }

    // Write to a temp file so an interrupted download never looks complete.
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    Ok(())
}

fn check_status(ocr: &OcrConfig) -> anyhow::Result<()> {
    println!("{}", style("OCR Model Status").bold());
    println!("Model directory: {}", ocr.model_dir.display());
    println!(
        "OCR enabled: {}",
        if ocr.enabled {
            style("yes").green()
        } else {
            style("no").yellow()
        }
    );
    println!();

    let mut all_present = true;
    let mut total_size: u64 = 0;

    for model in model_files(ocr) {
        let path = ocr.model_dir.join(&model.filename);
        let (status, size_str) = match (path.exists(), looks_complete(&path, &model)) {
            (_, Some(size)) => {
                total_size += size;
                (style("✓").green(), format_size(size))
            }
            (true, None) => {
                all_present = false;
                let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                (style("⚠").yellow(), format!("{} (incomplete?)", format_size(size)))
            }
            (false, None) => {
                all_present = false;
                (style("✗").red(), "missing".to_string())
            }
        };

        println!(
            "    {} {:<25} {:<22} {:>10}",
            status, model.filename, model.description, size_str
        );
    }

    println!();
    if all_present {
        println!(
            "    {} Ready ({} total)",
            style("✓").green(),
            format_size(total_size)
        );
    } else {
        println!(
            "    {} Run 'docex models download' to download. Extraction still works without OCR.",
            style("⚠").yellow()
        );
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1}GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.1}MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1}KB", bytes as f64 / 1_000.0)
    } else {
        format!("{}B", bytes)
    }
}
