//! Validator Monitor CLI
//!
//! Entry point for the monitor binary. Provides subcommands for:
//! - `run` - Start the collection engine
//! - `check-config` - Load and validate configuration, then exit
//! - `version` - Show version information
//!
//! Exit code is 0 on clean shutdown; startup failures and unclean
//! shutdowns exit non-zero.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::WrapErr;
use tracing::{error, info};

use validator_monitor::collector::{CollectionEngine, SnapshotExecutor, WorkerPool};
use validator_monitor::config::Settings;
use validator_monitor::health::HealthChecker;
use validator_monitor::metrics::MetricsRegistry;
use validator_monitor::ports::broadcast::EventBroadcaster;
use validator_monitor::ports::cache::SnapshotCache;
use validator_monitor::ports::store::SnapshotStore;
use validator_monitor::ports::validators::StaticValidatorRepository;
use validator_monitor::shutdown::ShutdownManager;
use validator_monitor::store::{BroadcastHub, MemoryStore, MokaSnapshotCache};

/// Beacon-chain validator monitor
#[derive(Parser, Debug)]
#[command(name = "validator-monitor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Environment name (selects config/{environment}.toml)
    #[arg(short, long, default_value = "development")]
    environment: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the collection engine until SIGINT/SIGTERM
    Run,

    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    // Environment files are optional; absence is not an error.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let settings = match Settings::load(&cli.environment) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&settings);

    if let Err(errors) = settings.validate() {
        for message in &errors {
            error!(%message, "Invalid configuration");
        }
        return ExitCode::FAILURE;
    }

    match cli.command {
        Commands::Run => match run(settings) {
            Ok(clean) if clean => ExitCode::SUCCESS,
            Ok(_) => {
                error!("Shutdown did not complete cleanly");
                ExitCode::FAILURE
            }
            Err(e) => {
                error!(error = ?e, "Startup failed");
                ExitCode::FAILURE
            }
        },
        Commands::CheckConfig => {
            info!(environment = %cli.environment, "Configuration is valid");
            ExitCode::SUCCESS
        }
        Commands::Version => {
            println!("validator-monitor {}", validator_monitor::VERSION);
            ExitCode::SUCCESS
        }
    }
}

/// Initialise the tracing subscriber from logging settings.
fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.logging.level.clone()));

    if settings.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Build the engine and run until a shutdown signal.
///
/// Returns whether the shutdown sequence completed cleanly.
fn run(settings: Settings) -> eyre::Result<bool> {
    let runtime = tokio::runtime::Runtime::new().wrap_err("failed to start tokio runtime")?;

    runtime.block_on(async {
        info!(
            version = validator_monitor::VERSION,
            beacon = %settings.beacon.url,
            validators = settings.collector.validators.len(),
            "Starting validator monitor"
        );

        let manager = ShutdownManager::new(settings.shutdown.deadline());

        let beacon = Arc::new(
            beacon_api::BeaconClient::with_config(
                settings.beacon.url.clone(),
                settings.beacon.client_config(),
            )
            .wrap_err("failed to create beacon client")?
            .with_cancellation(manager.root_token().child_token()),
        );

        // Bundled single-process sinks; durable backends implement the
        // same ports.
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MokaSnapshotCache::new(settings.cache.max_capacity));
        let hub = Arc::new(BroadcastHub::default());
        let metrics = Arc::new(MetricsRegistry::new());

        let pool = WorkerPool::with_cancellation(
            settings.pool.pool_config(),
            SnapshotExecutor::new(Arc::clone(&beacon)),
            manager.root_token(),
        );

        let engine = Arc::new(
            CollectionEngine::new(
                settings.collector.collector_config(&settings.cache),
                pool,
                Arc::clone(&beacon),
                Arc::new(StaticValidatorRepository::new(
                    settings.collector.validators.clone(),
                )),
                Arc::clone(&store) as Arc<dyn SnapshotStore>,
                Arc::clone(&metrics),
            )
            .with_cache(Arc::clone(&cache) as Arc<dyn SnapshotCache>)
            .with_broadcaster(Arc::clone(&hub) as Arc<dyn EventBroadcaster>)
            .with_cancellation(&manager.root_token()),
        );

        Arc::clone(&engine).start().await.wrap_err("engine startup failed")?;
        manager.spawn_signal_listener();

        let health = HealthChecker::new(settings.health.thresholds());
        let reporter = {
            let engine = Arc::clone(&engine);
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
                // The interval's immediate first tick would race engine
                // startup; consume it.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = manager.triggered() => return,
                        _ = ticker.tick() => {}
                    }
                    let report = health.check(&engine.stats());
                    if report.healthy {
                        info!(
                            validators = report.validators_monitored,
                            queue_depth = report.queue_depth,
                            "Health check passed"
                        );
                    } else {
                        error!(issues = ?report.issues, "Health check failed");
                    }
                }
            })
        };

        manager.triggered().await;
        let clean = manager
            .run_phases(
                engine.as_ref(),
                store.as_ref(),
                Some(cache.as_ref() as &dyn SnapshotCache),
            )
            .await;
        reporter.abort();

        let summary = metrics.snapshot();
        info!(
            collections = summary.collections_total,
            snapshots = summary.snapshots_stored,
            uptime_secs = summary.uptime.as_secs(),
            "Monitor exiting"
        );

        Ok(clean)
    })
}
