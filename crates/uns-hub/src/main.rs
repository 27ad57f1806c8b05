// SPDX-License-Identifier: Apache-2.0

mod errors;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use broadcast_bus::BroadcastBus;
use broker_supervisor::BrokerSupervisor;
use clap::Parser;
use errors::HubError;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uns_config::HubConfig;
use uns_model::rules::VersionedRuleSet;

/// The Unified Namespace ingestion hub: MQTT broker supervision, decode,
/// persistence, sandboxed transforms and alerts (§1).
#[derive(Parser, Debug)]
#[command(name = "uns-hub", version)]
struct Args {
    /// Path to the JSON config file layered over the built-in defaults.
    #[arg(long, env = "UNS_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the config file's `log_level` (e.g. "debug", "uns_hub=trace,info").
    #[arg(long, env = "UNS_LOG_LEVEL")]
    log_level: Option<String>,
}

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

fn main() {
    let args = Args::parse();
    let config = match HubConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(args.log_level.as_deref().unwrap_or(&config.log_level));

    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    match runtime.block_on(run(config)) {
        Ok(clean) => {
            if clean {
                std::process::exit(0);
            } else {
                tracing::error!("shutdown grace period exceeded, exiting");
                std::process::exit(2);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "fatal startup error");
            std::process::exit(1);
        }
    }
}

fn init_tracing(directive: &str) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directive);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

/// Returns `Ok(true)` on a clean shutdown, `Ok(false)` if the grace period
/// was exceeded and components were abandoned mid-drain.
async fn run(config: HubConfig) -> Result<bool, HubError> {
    let bus = BroadcastBus::new();
    let store = store::Store::open(&config.store_path)?;
    let supervisor = Arc::new(BrokerSupervisor::new(bus.clone()));

    let rule_set = load_rule_set(config.transform_rules_path.as_deref())?;
    let transform_engine =
        transform_engine::TransformEngine::new(rule_set, Some(store.clone()), supervisor.clone(), bus.clone());

    let alert_engine = alert_engine::AlertEngine::new(store.clone(), bus.clone(), config.llm_api_key.is_some());
    alert_engine.reload_rules().await?;

    let persistence = persistence::PersistenceQueue::new(
        store.clone(),
        Arc::new(transform_engine.clone()),
        persistence::PersistenceConfig {
            batch_size: config.batch_size,
            batch_interval_ms: config.batch_interval_ms,
            ..Default::default()
        },
    );
    persistence.spawn().await;

    let handler = Arc::new(message_handler::MessageHandler::new(
        persistence.clone(),
        transform_engine,
        alert_engine,
        bus.clone(),
        config.sparkplug_enabled,
    ));
    let throttle_reset = handler.spawn_throttle_reset();

    store.spawn_maintenance_loop(
        bus.clone(),
        Duration::from_millis(config.checkpoint_interval_ms),
        config.max_store_size_mb,
        config.prune_chunk_size,
    );

    for broker in &config.brokers {
        let broker_id = broker.id.clone();
        let mut inbound = supervisor.add_broker(broker.clone()).await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                handler.handle(&message.broker_id, &message.topic, message.payload).await;
            }
            tracing::warn!(broker_id, "inbound relay closed");
        });
    }

    tracing::info!(brokers = config.brokers.len(), "uns-hub started");
    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");

    throttle_reset.abort();
    let drain = async {
        persistence.shutdown().await;
        supervisor.shutdown().await;
    };
    let clean = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, drain).await.is_ok();
    Ok(clean)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn load_rule_set(path: Option<&str>) -> Result<VersionedRuleSet, HubError> {
    let Some(path) = path else {
        return Ok(VersionedRuleSet::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| HubError::RulesFileRead {
        path: path.to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| HubError::RulesFileParse {
        path: path.to_string(),
        source,
    })
}
