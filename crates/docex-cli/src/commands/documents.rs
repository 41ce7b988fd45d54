//! List and show commands - read the document store.

use clap::Args;
use console::style;

use docex_core::store::{DocumentStore, JsonDirStore};

use super::config::load_config;
use super::extract::{OutputFormat, format_document};

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Only show documents of this type (invoice, receipt, bank_statement, other)
    #[arg(short = 't', long = "type")]
    doc_type: Option<String>,
}

/// Arguments for the show command.
#[derive(Args)]
pub struct ShowArgs {
    /// Document id or store key
    id: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

fn open_store(config_path: Option<&str>) -> anyhow::Result<JsonDirStore> {
    let config = load_config(config_path)?;
    Ok(JsonDirStore::open(&config.store.dir)?)
}

pub fn list(args: ListArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(config_path)?;
    let wanted = args
        .doc_type
        .as_deref()
        .map(docex_core::DocumentType::from_label);

    let records: Vec<_> = store
        .list()?
        .into_iter()
        .filter(|r| wanted.is_none_or(|t| r.document.doc_type() == t))
        .collect();

    if records.is_empty() {
        println!(
            "{} No documents in {}",
            style("ℹ").blue(),
            store.dir().display()
        );
        return Ok(());
    }

    println!(
        "{:<36}  {:<14}  {:<24}  {:>12}  {:<10}  {}",
        "ID", "TYPE", "VENDOR", "AMOUNT", "DATE", "FILE"
    );
    for record in &records {
        let fields = &record.document.fields;
        println!(
            "{:<36}  {:<14}  {:<24}  {:>12}  {:<10}  {}",
            record.document.id,
            fields.doc_type,
            truncate(fields.vendor.as_deref().unwrap_or("-"), 24),
            fields.amount.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
            fields.date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            record.document.filename
        );
    }
    println!();
    println!("{} documents", records.len());

    Ok(())
}

pub fn show(args: ShowArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(config_path)?;
    let record = store
        .get(&args.id)?
        .ok_or_else(|| anyhow::anyhow!("Document not found: {}", args.id))?;

    println!("{}", format_document(&record.document, args.format)?);
    eprintln!(
        "{} {} saved {} from {}",
        style("ℹ").blue(),
        record.status,
        record.saved_at.format("%Y-%m-%d %H:%M"),
        record.source_path
    );
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
        short.push('…');
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("ACME", 24), "ACME");
        assert_eq!(truncate("Corner Shop", 6), "Corne…");
    }
}
