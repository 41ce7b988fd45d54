//! CLI application for financial document extraction.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, config, documents, extract, models};

/// docex - Extract structured data from invoices, receipts and bank statements
#[derive(Parser)]
#[command(name = "docex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract data from a single document
    Extract(extract::ExtractArgs),

    /// Extract data from multiple documents
    Batch(batch::BatchArgs),

    /// List saved documents
    List(documents::ListArgs),

    /// Show a saved document
    Show(documents::ShowArgs),

    /// Manage OCR models
    Models(models::ModelsArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Extract(args) => extract::run(args, config_path, cli.verbose).await,
        Commands::Batch(args) => batch::run(args, config_path).await,
        Commands::List(args) => documents::list(args, config_path),
        Commands::Show(args) => documents::show(args, config_path),
        Commands::Models(args) => models::run(args, config_path).await,
        Commands::Config(args) => config::run(args).await,
    }
}
