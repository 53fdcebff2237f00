//! bifrost: command-line front end for the gateway.
//!
//! Loads configuration, builds a [`Gateway`](bifrost::Gateway), runs a
//! single command and prints the result as JSON.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use bifrost::{AnalysisOptions, Bifrost, CompletionOptions, Config, HealthData};

/// Bifrost completion gateway
#[derive(Parser)]
#[command(name = "bifrost")]
#[command(version = bifrost::PKG_VERSION)]
#[command(about = "Resilient completion gateway with fallback and caching")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "BIFROST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Complete a prompt
    Complete {
        /// Prompt text (or omit to read from stdin)
        prompt: Option<String>,
        /// Preferred backend
        #[arg(short, long)]
        provider: Option<String>,
        /// Model to request
        #[arg(short, long)]
        model: Option<String>,
        /// System prompt
        #[arg(short, long)]
        system: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Analyze health data given as JSON
    Analyze {
        /// JSON document (or omit to read from stdin)
        json: Option<String>,
        /// Preferred backend
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Show last known backend status
    Status,

    /// Probe every backend now
    HealthCheck,

    /// Show request metrics
    Metrics,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: bifrost=info; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bifrost=info")),
        )
        .init();

    let args = Args::parse();

    let config = match args.config.as_deref() {
        Some(path) => Config::load(Some(path))?,
        None => Config::load(None).unwrap_or_else(|e| {
            debug!(error = %e, "no usable config file, using defaults");
            Config::default()
        }),
    };
    let gateway = Bifrost::from_config(&config)?;

    let outcome = match args.command {
        Command::Complete {
            prompt,
            provider,
            model,
            system,
            temperature,
            max_tokens,
            no_cache,
        } => {
            let prompt = resolve_text(prompt, "complete")?;
            let mut options = CompletionOptions::default().use_cache(!no_cache);
            options.provider = provider;
            options.model = model;
            options.system_prompt = system;
            options.temperature = temperature;
            options.max_tokens = max_tokens;
            gateway
                .complete(&prompt, &options)
                .await
                .map_err(Into::into)
                .and_then(|r| to_json(&r))
        }
        Command::Analyze { json, provider } => {
            let text = resolve_text(json, "analyze")?;
            let data: HealthData = serde_json::from_str(&text)?;
            let mut options = AnalysisOptions::default();
            options.provider = provider;
            gateway
                .analyze_health_data(&data, &options)
                .await
                .map_err(Into::into)
                .and_then(|r| to_json(&r))
        }
        Command::Status => to_json(&gateway.backend_status()),
        Command::HealthCheck => gateway
            .run_health_check_now()
            .await
            .map_err(Into::into)
            .and_then(|r| to_json(&r)),
        Command::Metrics => to_json(&gateway.metrics()),
    };

    gateway.shutdown();
    println!("{}", outcome?);
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, Box<dyn std::error::Error>> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass it as argument or via stdin)").into())
        }
    }
}
