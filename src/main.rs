//! Polyglot Runtime CLI entry point.
//!
//! Runs a guest module once and prints the outcome as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polyglot_runtime_common::ConfigFile;
use polyglot_runtime_core::{ExecutionRequest, ExecutionResult, Executor};

#[derive(Debug, Parser)]
#[command(name = "polyglot-runtime", version, about)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a guest module once.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Guest WebAssembly module.
    #[arg(long)]
    bytecode: PathBuf,

    /// File holding the current guest state.
    #[arg(long)]
    state: Option<PathBuf>,

    /// Call payload, base64.
    #[arg(long, default_value = "")]
    payload: String,

    /// Caller identity, base64.
    #[arg(long, default_value = "")]
    actor: String,

    /// TOML configuration file.
    #[arg(long, env = "POLYGLOT_RUNTIME_CONFIG")]
    config: Option<PathBuf>,

    /// Provider WebAssembly module, compiled if no cached artifact exists.
    #[arg(long)]
    provider: Option<PathBuf>,

    /// Compute budget, overriding the config.
    #[arg(long)]
    max_fuel: Option<u64>,

    /// Wall-clock deadline in milliseconds, overriding the config.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Memory ceiling in bytes, overriding the config.
    #[arg(long)]
    max_memory: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunOutput {
    fuel_consumed: u64,
    time_taken_ms: u128,
    updated_state: Option<String>,
    stderr: String,
    result: String,
}

impl From<ExecutionResult> for RunOutput {
    fn from(outcome: ExecutionResult) -> Self {
        Self {
            fuel_consumed: outcome.fuel_consumed,
            time_taken_ms: outcome.time_taken.as_millis(),
            updated_state: outcome.updated_state.map(|s| STANDARD.encode(s)),
            stderr: STANDARD.encode(outcome.stderr),
            result: STANDARD.encode(outcome.result),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_json);

    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,polyglot_runtime=debug".into());

    // Logs go to stderr; stdout carries the result.
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConfigFile::default(),
    };

    let provider_path = args
        .provider
        .clone()
        .or_else(|| config.provider.path.as_ref().map(PathBuf::from));
    let cache_path = config.runtime.engine.provider_cache_path()?;
    let provider_wasm = match provider_path {
        Some(path) if !cache_path.exists() => Some(read(&path)?),
        _ => None,
    };

    info!(cache_path = %cache_path.display(), "Configuration loaded");

    let executor = Arc::new(Executor::from_config(&config.runtime, provider_wasm)?);

    let mut request = ExecutionRequest::from_config(&config.runtime.execution, read(&args.bytecode)?)
        .with_payload(decode("payload", &args.payload)?)
        .with_actor(decode("actor", &args.actor)?);
    if let Some(state) = &args.state {
        request = request.with_current_state(read(state)?);
    }
    if let Some(max_fuel) = args.max_fuel {
        request = request.with_max_fuel(max_fuel);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        request = request.with_max_time(Duration::from_millis(timeout_ms));
    }
    if let Some(max_memory) = args.max_memory {
        request = request.with_max_memory(max_memory);
    }

    let outcome = executor.execute_async(request).await?;

    println!("{}", serde_json::to_string_pretty(&RunOutput::from(outcome))?);
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn decode(name: &str, value: &str) -> anyhow::Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .with_context(|| format!("--{name} is not valid base64"))
}
