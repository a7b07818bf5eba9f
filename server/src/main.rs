//! Server entrypoint for crossmind
//!
//! Wires all layers together with dependency injection: configuration and
//! model catalog loading, credential resolution, provider registry, cache
//! and analytics backends, the consensus engine, and the axum router.
//!
//! Exit codes: 0 normal, 1 configuration error, 2 fatal dependency failure
//! during startup.

use anyhow::Result;
use clap::Parser;
use crossmind_application::{Analytics, ConsensusCache, RunBatchUseCase, RunConsensusUseCase};
use crossmind_domain::ModelCatalog;
use crossmind_infrastructure::{
    build_provider_registry, cache_from_backend_url, shared_http_client, AnalyticsHub,
    CredentialStore, HashingEmbedder, ModelsFile, RateLimiter, Settings, Severity,
};
use crossmind_server::{build_router, AppState};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const EXIT_CONFIG: i32 = 1;
const EXIT_DEPENDENCY: i32 = 2;

#[derive(Parser)]
#[command(name = "crossmind-server", about = "Multi-LLM consensus service")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the model descriptor file (overrides configuration)
    #[arg(long)]
    models_file: Option<PathBuf>,

    /// Bind address (overrides configuration)
    #[arg(long)]
    bind: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for the operation log file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Disable the file log layer
    #[arg(long)]
    no_log_file: bool,
}

/// Initialize multi-layer logging (console + optional file).
fn init_logging(verbose: u8, log_dir: Option<&Path>, no_log_file: bool) -> Option<WorkerGuard> {
    let console_filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    if no_log_file {
        tracing_subscriber::registry().with(console_layer).init();
        return None;
    }

    let log_dir = log_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("logs"));
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "Warning: could not create log directory {}: {e}",
            log_dir.display()
        );
        tracing_subscriber::registry().with(console_layer).init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, "crossmind-server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_filter = match verbose {
        0..=2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(non_blocking)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_dir.as_deref(), cli.no_log_file);

    // === Configuration ===
    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };
    if let Some(models_file) = cli.models_file {
        settings.models_file = models_file;
    }
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }

    let issues = settings.validate();
    for issue in &issues {
        match issue.severity {
            Severity::Warning => eprintln!("Warning: {}", issue.message),
            Severity::Error => eprintln!("Error: {}", issue.message),
        }
    }
    if Settings::has_errors(&issues) {
        std::process::exit(EXIT_CONFIG);
    }

    // === Model catalog & credentials ===
    let models_file = match ModelsFile::load(&settings.models_file) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };
    let credentials = Arc::new(CredentialStore::from_env(models_file.credential_refs()));
    let (descriptors, default_models) = models_file.into_catalog_parts(&credentials);
    let catalog = match ModelCatalog::new(descriptors, default_models) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("Error: invalid model catalog: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    info!("Starting crossmind-server");

    // === Dependency injection ===
    let client = match shared_http_client() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: cannot build HTTP client: {e}");
            std::process::exit(EXIT_DEPENDENCY);
        }
    };
    let registry = Arc::new(build_provider_registry(client, Arc::clone(&credentials)));
    let provider_count = registry.len();

    let cache: Arc<dyn ConsensusCache> = cache_from_backend_url(&settings.cache_backend_url);
    let analytics: Arc<dyn Analytics> = AnalyticsHub::spawn(
        settings.analytics_dir.clone(),
        settings.analytics_max_backlog,
        settings.analytics_retention(),
    );

    let engine = Arc::new(RunConsensusUseCase::new(
        Arc::clone(&registry),
        Arc::new(HashingEmbedder::default()),
        Arc::clone(&cache),
        Arc::clone(&analytics),
        Arc::clone(&catalog),
        settings.engine_config(),
    ));
    let batch = Arc::new(RunBatchUseCase::new(Arc::clone(&engine)));

    let shutdown = CancellationToken::new();
    let state = AppState {
        engine,
        batch,
        catalog,
        analytics,
        cache,
        credentials,
        api_keys: Arc::new(settings.api_keys().into_iter().collect::<HashSet<_>>()),
        rate_limiter: Arc::new(RateLimiter::new(settings.rate_limit_config())),
        inflight: Arc::new(Semaphore::new(settings.max_inflight_requests)),
        shutdown: shutdown.clone(),
        provider_count,
    };

    // Ctrl+C triggers a graceful drain.
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted. Shutting down gracefully...");
            signal_token.cancel();
        }
    });

    let router = build_router(state, &settings.origins());
    let listener = match tokio::net::TcpListener::bind(&settings.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error: cannot bind {}: {e}", settings.bind_addr);
            std::process::exit(EXIT_DEPENDENCY);
        }
    };
    info!("Listening on {}", settings.bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Shutdown complete");
    Ok(())
}
