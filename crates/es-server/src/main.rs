//! Emergency Stop monitor
//!
//! Usage: `emergency-stop [CONFIG] [STATES]`
//!
//! `CONFIG` is the integration YAML (default `emergency_stop.yaml`, or
//! `EMERGENCY_STOP_CONFIG`). `STATES` optionally seeds the state store from a
//! YAML map of entity id to raw state.

use anyhow::{Context, Result};
use es_coordinator::{Coordinator, IntegrationConfig, TracingNotifier};
use es_core::SystemClock;
use es_state_store::StateStore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG_PATH: &str = "emergency_stop.yaml";

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("EMERGENCY_STOP_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

fn seed_states(store: &StateStore, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read states file {}", path.display()))?;
    let states: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse states file {}", path.display()))?;
    for (entity_id, value) in states {
        let raw = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(true) => "on".to_string(),
            serde_yaml::Value::Bool(false) => "off".to_string(),
            other => {
                warn!("Skipping non-scalar state for {}: {:?}", entity_id, other);
                continue;
            }
        };
        store.set(entity_id, raw);
    }
    info!("Seeded {} entity state(s)", store.entity_count());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Emergency Stop monitor");

    let path = config_path();
    let config = IntegrationConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    let store = Arc::new(StateStore::new());
    if let Some(states_path) = std::env::args().nth(2) {
        seed_states(&store, &PathBuf::from(states_path))?;
    }

    let coordinator = Coordinator::from_config(
        &config,
        store.clone(),
        Arc::new(TracingNotifier),
        Arc::new(SystemClock::new()),
    );
    info!(
        "Loaded {} rule(s) from {}",
        coordinator.rules().await.len(),
        path.display()
    );

    coordinator.start().await;
    info!("Emergency Stop monitor is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    coordinator.stop();

    Ok(())
}
