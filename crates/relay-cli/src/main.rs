use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use relay_core::{CancellationToken, Orchestrator, RelayConfig, ResultSchema};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay", version, about = "Structured answers from a prioritized list of LLM providers")]
struct Cli {
    /// Path to config file (defaults to ~/.relay/config.toml)
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the providers for a structured answer
    Answer {
        /// Prompt text
        #[arg(long, conflicts_with = "prompt_file")]
        prompt: Option<String>,

        /// Read the prompt from a file; JSON content is sent as a structured prompt
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// JSON file describing the expected result
        #[arg(long)]
        schema: PathBuf,
    },
    /// Generate an image and print its URL
    Image {
        #[arg(long)]
        prompt: String,

        /// Rewrite restricted terms before submitting
        #[arg(long)]
        sanitize: bool,
    },
    /// Print text after applying the sanitizer rules
    Sanitize {
        #[arg(long)]
        text: String,
    },
    /// List configured providers in priority order
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let orchestrator = Orchestrator::from_config(&config).context("Failed to build orchestrator")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::Answer {
            prompt,
            prompt_file,
            schema,
        } => cmd_answer(&orchestrator, prompt, prompt_file, &schema, &cancel).await,
        Commands::Image { prompt, sanitize } => {
            let prompt = if sanitize {
                orchestrator.sanitize(&prompt)
            } else {
                prompt
            };
            let locator = orchestrator.generate_artifact(&prompt, &cancel).await?;
            println!("{locator}");
            Ok(())
        }
        Commands::Sanitize { text } => {
            println!("{}", orchestrator.sanitize(&text));
            Ok(())
        }
        Commands::Providers => cmd_providers(&orchestrator),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<RelayConfig> {
    if let Some(path) = explicit {
        return RelayConfig::load(path);
    }
    match dirs::home_dir() {
        Some(home) => RelayConfig::load_or_default(&home.join(".relay").join("config.toml")),
        None => {
            debug!("No home directory, using default config");
            Ok(RelayConfig::default())
        }
    }
}

async fn cmd_answer(
    orchestrator: &Orchestrator,
    prompt: Option<String>,
    prompt_file: Option<PathBuf>,
    schema_path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let schema_text = std::fs::read_to_string(schema_path)
        .with_context(|| format!("Failed to read schema {}", schema_path.display()))?;
    let schema: ResultSchema = serde_json::from_str(&schema_text)
        .with_context(|| format!("Invalid schema {}", schema_path.display()))?;

    let value = match (prompt, prompt_file) {
        (Some(text), _) => orchestrator.answer(text, &schema, cancel).await?,
        (None, Some(path)) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt {}", path.display()))?;
            match serde_json::from_str::<serde_json::Value>(&content) {
                Ok(structured) if structured.is_object() || structured.is_array() => {
                    orchestrator.answer(structured, &schema, cancel).await?
                }
                _ => orchestrator.answer(content, &schema, cancel).await?,
            }
        }
        (None, None) => bail!("Either --prompt or --prompt-file is required"),
    };

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn cmd_providers(orchestrator: &Orchestrator) -> Result<()> {
    let statuses = orchestrator.providers();
    if statuses.is_empty() {
        println!("No providers configured.");
        return Ok(());
    }

    println!("{:<4} {:<12} {:<10} {:<28} STATUS", "PRIO", "NAME", "KIND", "MODEL");
    for status in statuses {
        println!(
            "{:<4} {:<12} {:<10} {:<28} {}",
            status.priority,
            status.name,
            status.provider,
            status.model,
            if status.available { "ready" } else { "no credentials" }
        );
    }
    Ok(())
}
