use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use asga::cli::{Cli, Command};
use asga::config::AsgaConfig;
use asga::contracts::FeatureRequest;
use asga::gateway;
use asga::git::{RepoSync, plan_changes};
use asga::provider::{OpenRouterClient, ReasoningProvider};
use asga::ui::RunProgress;
use asga::validation::{DirSchemaStore, EnvelopeValidator};
use asga::workflow::WorkflowEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AsgaConfig::load_from(cli.config.as_deref())?;
    if let Some(max_attempts) = cli.max_attempts {
        config.max_attempts = max_attempts;
    }
    init_tracing(cli.verbose, config.log_json);

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            let engine = build_engine(&config)?;
            gateway::serve(&config, Arc::new(engine)).await
        }
        Command::Run { user_story } => run(&config, user_story).await,
        Command::Validate { schema, file } => validate(&config, &schema, &file),
        Command::Sync { repo_url, dest } => {
            tokio::task::spawn_blocking(move || sync(&repo_url, &dest))
                .await
                .context("sync worker panicked")?
        }
    }
}

/// Logs go to stderr so `run` output stays pipeable.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(env_filter)
            .boxed()
    };
    tracing_subscriber::registry().with(layer).init();
}

/// Schemas from `schema_dir` when present, else the ones built into the binary.
fn build_validator(config: &AsgaConfig) -> Result<EnvelopeValidator> {
    if config.schema_dir.is_dir() {
        debug!(dir = %config.schema_dir.display(), "loading schemas from directory");
        Ok(EnvelopeValidator::new(Arc::new(DirSchemaStore::new(
            config.schema_dir.clone(),
        ))))
    } else {
        debug!("using built-in schemas");
        Ok(EnvelopeValidator::builtin()?)
    }
}

fn build_engine(config: &AsgaConfig) -> Result<WorkflowEngine> {
    let provider: Option<Arc<dyn ReasoningProvider>> = if config.has_api_key() {
        let client = OpenRouterClient::from_config(config)
            .context("failed to create OpenRouter client")?;
        info!(model = client.model(), "using OpenRouter spec extraction");
        Some(Arc::new(client))
    } else {
        info!("no API key configured, using keyword spec extraction");
        None
    };
    Ok(WorkflowEngine::standard(
        config,
        build_validator(config)?,
        provider,
    )?)
}

async fn run(config: &AsgaConfig, user_story: String) -> Result<()> {
    let engine = build_engine(config)?;
    let progress = RunProgress::start(&user_story, engine.policy().max_attempts);

    // Stages block (the provider bridges into the runtime), so keep them off
    // the reactor.
    let (progress, result) = tokio::task::spawn_blocking(move || {
        let result = engine.run_with(FeatureRequest::new(user_story), |event| {
            progress.stage(&event)
        });
        (progress, result)
    })
    .await
    .context("workflow worker panicked")?;

    match result {
        Ok(run) => {
            progress.complete(run.outcome);
            progress.print_record(&run.record);
            Ok(())
        }
        Err(err) => {
            progress.fail(&err);
            Err(err.into())
        }
    }
}

fn validate(config: &AsgaConfig, schema: &str, file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    build_validator(config)?.validate(&payload, schema)?;
    println!("{} is a valid `{schema}` payload", file.display());
    Ok(())
}

fn sync(repo_url: &str, dest: &Path) -> Result<()> {
    let repo = RepoSync::clone_or_pull(repo_url, dest)?;
    info!(
        branch = %repo.current_branch()?,
        head = %repo.head_id()?,
        "repository in sync"
    );
    print!("{}", plan_changes(dest));
    Ok(())
}
