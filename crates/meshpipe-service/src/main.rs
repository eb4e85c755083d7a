mod config;
mod http;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meshpipe_crypto::Decryptor;
use meshpipe_domain::{
    InMemoryNodeStore, NodeFilter, NodeStateCache, NodeStore, PipelineStats,
};
use meshpipe_ingest::{liveness::run_liveness, ConnectionManager, Pipeline};
use meshpipe_postgres::{PostgresClient, PostgresNodeStore};

use config::ServiceConfig;
use http::{AppState, ConfigEcho};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("starting meshpipe");

    if let Err(e) = run(config).await {
        error!("meshpipe exiting with error: {e:#}");
        std::process::exit(1);
    }
    info!("meshpipe exiting normally");
}

async fn run(config: ServiceConfig) -> Result<()> {
    // Configuration-time failures are the only fatal ones.
    let keyring = config.keyring()?;
    let filter = NodeFilter::new(&config.shortname_pattern)?;

    let store = build_store(&config).await;
    let stats = Arc::new(PipelineStats::new());
    let cache = NodeStateCache::new(store);

    let pipeline = Arc::new(Pipeline::new(
        Decryptor::new(keyring),
        filter,
        cache,
        Arc::clone(&stats),
        config.pipeline_config(),
    ));
    pipeline.load_existing().await;

    let mut manager = ConnectionManager::new(config.connection_config(), pipeline.clone());
    manager.start();
    let link = manager.status();

    let shutdown = CancellationToken::new();

    let liveness_task = tokio::spawn(run_liveness(
        link.clone(),
        Arc::clone(&stats),
        config.heartbeat_interval(),
        shutdown.clone(),
    ));

    let app_state = AppState {
        link,
        pipeline,
        config_echo: ConfigEcho {
            mqtt_broker: format!("{}:{}", config.mqtt_broker_host, config.mqtt_broker_port),
            mqtt_topic: config.mqtt_topic.clone(),
            shortname_pattern: config.shortname_pattern.clone(),
            min_storage_voltage: config.min_storage_voltage,
            postgres_enabled: config.postgres_enabled,
        },
    };
    let http_task = tokio::spawn(http::serve(
        config.http_port,
        app_state,
        shutdown.clone(),
    ));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    shutdown.cancel();

    // Bounded teardown: the connection task finishes its in-flight
    // message, the side tasks observe the token.
    manager.stop().await;
    let teardown = async {
        if let Err(e) = liveness_task.await {
            warn!("liveness task join error: {e}");
        }
        match http_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("status surface error: {e}"),
            Err(e) => warn!("status surface join error: {e}"),
        }
    };
    if tokio::time::timeout(Duration::from_secs(10), teardown)
        .await
        .is_err()
    {
        warn!("teardown timed out");
    }

    Ok(())
}

/// Pick the durable store. A configured-but-unreachable database
/// degrades to the in-memory store: decryption and filtering keep
/// working, state is lost on restart.
async fn build_store(config: &ServiceConfig) -> Arc<dyn NodeStore> {
    if !config.postgres_enabled {
        info!("postgres disabled, running cache-only");
        return Arc::new(InMemoryNodeStore::new());
    }

    let postgres = config.postgres_config();
    let store = match PostgresClient::new(&postgres) {
        Ok(client) => PostgresNodeStore::new(client),
        Err(e) => {
            warn!("postgres client init failed, running cache-only: {e}");
            return Arc::new(InMemoryNodeStore::new());
        }
    };
    if let Err(e) = store.ensure_schema().await {
        warn!("postgres unreachable, running cache-only: {e}");
        return Arc::new(InMemoryNodeStore::new());
    }
    info!(
        host = %postgres.host,
        database = %postgres.database,
        "using postgres node store"
    );
    Arc::new(store)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("error installing ctrl-c handler: {e}");
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("error installing SIGTERM handler: {e}");
                ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
