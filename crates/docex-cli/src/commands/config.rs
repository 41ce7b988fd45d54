//! Config command - manage configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;

use docex_core::models::config::DocexConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration (secrets masked)
    Show,

    /// Initialize a new configuration file
    Init(InitArgs),

    /// Get a specific configuration value
    Get {
        /// Dotted key (e.g., "ollama.model")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Dotted key (e.g., "ai_provider")
        key: String,
        /// New value; parsed as JSON when possible, otherwise a string
        value: String,
    },

    /// Show configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(),
        ConfigCommand::Init(init_args) => init_config(init_args),
        ConfigCommand::Get { key } => get_config(&key),
        ConfigCommand::Set { key, value } => set_config(&key, &value),
        ConfigCommand::Path => show_path(),
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docex")
        .join("config.json")
}

/// Load the configuration used by the extraction commands.
///
/// An explicit `--config` path must exist. Otherwise the default location is
/// used when present. Environment overrides apply last.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<DocexConfig> {
    let config = match config_path {
        Some(path) => DocexConfig::from_file(Path::new(path))
            .with_context(|| format!("failed to read config file {}", path))?,
        None => read_default_or_builtin()?,
    };
    Ok(config.with_env_overrides())
}

/// The saved configuration file, without environment overrides.
fn read_default_or_builtin() -> anyhow::Result<DocexConfig> {
    let path = default_config_path();
    if path.exists() {
        DocexConfig::from_file(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))
    } else {
        Ok(DocexConfig::default())
    }
}

fn show_config() -> anyhow::Result<()> {
    if !default_config_path().exists() {
        println!(
            "{} No config file found, showing defaults.",
            style("ℹ").blue()
        );
    }

    let mut json = serde_json::to_value(read_default_or_builtin()?)?;
    if let Some(key) = json.pointer_mut("/gemini/api_key") {
        *key = Value::String("********".to_string());
    }
    println!("{}", serde_json::to_string_pretty(&json)?);

    Ok(())
}

fn init_config(args: InitArgs) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or_else(default_config_path);

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    DocexConfig::default().save(&output_path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );

    Ok(())
}

fn get_config(key: &str) -> anyhow::Result<()> {
    let json = serde_json::to_value(read_default_or_builtin()?)?;
    let value = lookup_key(&json, key)
        .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;

    match value {
        Value::String(s) => println!("{}", s),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }

    Ok(())
}

fn set_config(key: &str, value: &str) -> anyhow::Result<()> {
    let config_path = default_config_path();
    let config = read_default_or_builtin()?;

    let parsed_value: Value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));

    let mut json = serde_json::to_value(&config)?;
    assign_key(&mut json, key, parsed_value.clone())?;

    // Round-trip through the typed config so bad values are rejected.
    let config: DocexConfig = serde_json::from_value(json)
        .with_context(|| format!("invalid value for {}", key))?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    config.save(&config_path)?;

    println!(
        "{} Set {} = {}",
        style("✓").green(),
        key,
        serde_json::to_string(&parsed_value)?
    );

    Ok(())
}

fn show_path() -> anyhow::Result<()> {
    let config_path = default_config_path();

    println!("Configuration file: {}", config_path.display());

    if config_path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'docex config init' to create a configuration file.");
    }

    Ok(())
}

fn lookup_key<'a>(json: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(json, |current, part| current.get(part))
}

/// Set a dotted key. Intermediate objects must exist; the last segment may be
/// new (optional fields are omitted when unset).
fn assign_key(json: &mut Value, key: &str, value: Value) -> anyhow::Result<()> {
    let (parent_path, last) = match key.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, key),
    };

    let mut parent = json;
    if let Some(path) = parent_path {
        for part in path.split('.') {
            parent = parent
                .get_mut(part)
                .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
        }
    }

    let object = parent
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("Cannot set value at non-object path: {}", key))?;
    object.insert(last.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_key() {
        let json = serde_json::to_value(DocexConfig::default()).unwrap();
        assert_eq!(lookup_key(&json, "ollama.model"), Some(&json!("llama3.2-vision")));
        assert_eq!(lookup_key(&json, "ai_provider"), Some(&json!("ollama")));
        assert!(lookup_key(&json, "ollama.nope").is_none());
    }

    #[test]
    fn test_assign_optional_key() {
        let mut json = serde_json::to_value(DocexConfig::default()).unwrap();
        assign_key(&mut json, "gemini.api_key", json!("k")).unwrap();
        assign_key(&mut json, "ai_provider", json!("gemini")).unwrap();
        let config: DocexConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.gemini.api_key.as_deref(), Some("k"));
        assert_eq!(config.ai_provider.as_str(), "gemini");
    }

    #[test]
    fn test_assign_rejects_missing_path() {
        let mut json = serde_json::to_value(DocexConfig::default()).unwrap();
        assert!(assign_key(&mut json, "nothing.here", json!(1)).is_err());
        assert!(assign_key(&mut json, "ai_provider.x", json!(1)).is_err());
    }
}
