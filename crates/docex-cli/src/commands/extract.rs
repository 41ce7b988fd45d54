//! Extract command - extract data from a single document.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use docex_core::models::config::{AiProvider, DocexConfig};
use docex_core::models::document::ExtractedDocument;
use docex_core::models::event::{ExtractionObserver, RecordingObserver, StreamEvent};
use docex_core::store::{DocumentStore, JsonDirStore};
use docex_core::{ExtractOptions, Extractor};

use super::config::load_config;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Model provider (gemini, ollama, openai); overrides the config
    #[arg(short, long)]
    provider: Option<AiProvider>,

    /// Disable streaming of the local model's response
    #[arg(long)]
    no_stream: bool,

    /// Skip OCR before prompting the local model
    #[arg(long)]
    no_ocr: bool,

    /// Save the result to the document store
    #[arg(long)]
    save: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

/// Shows extraction progress on a spinner and keeps the event trace so the
/// last prompt can be printed on failure.
pub struct SpinnerObserver {
    spinner: ProgressBar,
    echo_response: bool,
    recording: RecordingObserver,
}

impl SpinnerObserver {
    pub fn new(spinner: ProgressBar, echo_response: bool) -> Self {
        Self {
            spinner,
            echo_response,
            recording: RecordingObserver::new(),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.recording.last_prompt()
    }
}

impl ExtractionObserver for SpinnerObserver {
    fn on_event(&self, event: StreamEvent) {
        match &event {
            StreamEvent::Log { message, .. } => self.spinner.set_message(message.clone()),
            StreamEvent::Prompt { .. } => self.spinner.set_message("Waiting for model..."),
            StreamEvent::Response { fragment } => {
                if self.echo_response {
                    self.spinner.suspend(|| eprint!("{}", fragment));
                }
            }
        }
        self.recording.on_event(event);
    }
}

pub fn spinner() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

/// Apply command-line overrides on top of the loaded config.
pub fn apply_overrides(
    mut config: DocexConfig,
    provider: Option<AiProvider>,
    no_stream: bool,
    no_ocr: bool,
) -> DocexConfig {
    if let Some(provider) = provider {
        config.ai_provider = provider;
    }
    if no_stream {
        config.ollama.stream = false;
    }
    if no_ocr {
        config.ocr.enabled = false;
    }
    config
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>, verbose: u8) -> anyhow::Result<()> {
    let start = Instant::now();

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let config = apply_overrides(
        load_config(config_path)?,
        args.provider,
        args.no_stream,
        args.no_ocr,
    );
    let store_dir = config.store.dir.clone();
    info!("Extracting {} with {}", args.input.display(), config.ai_provider);

    let extractor = Extractor::from_config(config)?;
    let pb = spinner()?;
    let observer = SpinnerObserver::new(pb.clone(), verbose > 0);

    let result = extractor
        .extract_document(&args.input, ExtractOptions::with_observer(&observer))
        .await;

    let document = match result {
        Ok(document) => {
            pb.finish_and_clear();
            document
        }
        Err(e) => {
            pb.finish_and_clear();
            if let Some(prompt) = observer.last_prompt() {
                report_last_prompt(&prompt);
            }
            return Err(e.into());
        }
    };

    let output = format_document(&document, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.save {
        save_document(&store_dir, &document, &args.input)?;
    }

    debug!("Total extraction time: {:?}", start.elapsed());
    Ok(())
}

/// Show the prompt that led to a failure. The error itself is printed by `main`.
fn report_last_prompt(prompt: &str) {
    eprintln!("{}", style("Last prompt sent:").yellow());
    eprintln!("{}", prompt);
    eprintln!();
}

pub fn save_document(
    store_dir: &Path,
    document: &ExtractedDocument,
    source: &Path,
) -> anyhow::Result<()> {
    let store = JsonDirStore::open(store_dir)?;
    let record = store.save(document, source)?;
    eprintln!(
        "{} Saved {} ({})",
        style("✓").green(),
        document.id,
        record.status
    );
    Ok(())
}

pub fn format_document(document: &ExtractedDocument, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(document)?),
        OutputFormat::Text => Ok(format_text(document)),
    }
}

fn format_text(document: &ExtractedDocument) -> String {
    let fields = &document.fields;
    let mut lines = vec![
        format!("Document:  {}", document.filename),
        format!("ID:        {}", document.id),
        format!("Type:      {}", fields.doc_type),
    ];

    if let Some(vendor) = &fields.vendor {
        lines.push(format!("Vendor:    {}", vendor));
    }
    if let Some(amount) = fields.amount {
        lines.push(format!("Amount:    {}", amount));
    }
    match (&fields.date, &fields.date_raw) {
        (Some(date), _) => lines.push(format!("Date:      {}", date)),
        (None, Some(raw)) => lines.push(format!("Date:      {} (unparsed)", raw)),
        (None, None) => {}
    }

    if let Some(items) = fields.items.as_ref().filter(|items| !items.is_empty()) {
        lines.push(String::new());
        lines.push("Items:".to_string());
        for item in items {
            let quantity = item
                .quantity
                .map(|q| format!("{} x ", q))
                .unwrap_or_default();
            let total = item.total.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string());
            lines.push(format!("  {}{:<40} {:>12}", quantity, item.description, total));
        }
    }

    lines.join("\n")
}
