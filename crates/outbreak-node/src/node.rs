//! Outbreak Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - One propagation engine shared by the HTTP API and the notification dispatcher
//! - Periodic expiry sweep

use crate::api;
use crate::error::Result;
use crate::storage::RocksStore;
use outbreak_engine::{EngineConfig, EventDispatcher, Notification, PropagationEngine};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Configuration for a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Deadline for one seed operation
    pub handler_timeout: Duration,

    /// Interval between expiry sweeps
    pub sweep_interval: Duration,

    /// Notification queue capacity
    pub queue_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./outbreak-data"),
            api_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            handler_timeout: outbreak_engine::DEFAULT_HANDLER_TIMEOUT,
            sweep_interval: Duration::from_secs(60),
            queue_capacity: 1024,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(var = name, value = %raw, "invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_dir = std::env::var("OUTBREAK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let api_addr = env_or("OUTBREAK_API_ADDR", defaults.api_addr);

        let handler_timeout = Duration::from_millis(env_or(
            "OUTBREAK_HANDLER_TIMEOUT_MS",
            defaults.handler_timeout.as_millis() as u64,
        ));

        let sweep_interval = Duration::from_secs(env_or(
            "OUTBREAK_SWEEP_INTERVAL_SECS",
            defaults.sweep_interval.as_secs(),
        ));

        let queue_capacity = env_or("OUTBREAK_QUEUE_CAPACITY", defaults.queue_capacity);

        Self {
            data_dir,
            api_addr,
            handler_timeout,
            sweep_interval,
            queue_capacity,
        }
    }

    /// Engine configuration derived from this node config.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if !self.handler_timeout.is_zero() {
            config.handler_timeout = self.handler_timeout;
        }
        config
    }
}

/// Remembers which expired seeds were already reported by the sweep.
#[derive(Debug, Default)]
struct ExpiryLog {
    reported: HashSet<String>,
}

impl ExpiryLog {
    /// Ids in `expired` not seen on the previous sweep.
    fn newly_expired(&mut self, expired: Vec<String>) -> Vec<String> {
        let current: HashSet<String> = expired.into_iter().collect();
        let mut fresh: Vec<String> = current.difference(&self.reported).cloned().collect();
        fresh.sort();
        self.reported = current;
        fresh
    }
}

/// Shared state for the node handlers.
pub struct NodeState {
    pub engine: Arc<PropagationEngine>,
    pub store: Arc<RocksStore>,
    pub notifications: mpsc::Sender<Notification>,
}

/// An Outbreak node instance.
pub struct Node {
    state: Arc<NodeState>,
    dispatcher: EventDispatcher,
    config: NodeConfig,
}

impl Node {
    /// Create a new node.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let store = Arc::new(RocksStore::open(config.data_dir.join("db"))?);
        let engine = Arc::new(PropagationEngine::new(
            store.clone(),
            store.clone(),
            config.engine_config(),
        )?);
        let (notifications, dispatcher) =
            EventDispatcher::channel(engine.clone(), config.queue_capacity);

        let state = Arc::new(NodeState {
            engine,
            store,
            notifications,
        });

        Ok(Self {
            state,
            dispatcher,
            config,
        })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts dispatcher, expiry sweep and HTTP server).
    pub async fn run(self) -> Result<()> {
        info!("Outbreak node starting");
        info!("  API: http://{}", self.config.api_addr);
        info!("  Data: {:?}", self.config.data_dir);
        info!("  Handler timeout: {:?}", self.config.handler_timeout);

        let dispatcher = self.dispatcher;
        tokio::spawn(async move {
            let stats = dispatcher.run().await;
            info!(?stats, "dispatcher finished");
        });

        let engine = self.state.engine.clone();
        let period = self.config.sweep_interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut log = ExpiryLog::default();
            loop {
                ticker.tick().await;
                match engine.sweep_expired(engine.now()) {
                    Ok(expired) => {
                        let total = expired.len();
                        let fresh = log.newly_expired(expired);
                        if !fresh.is_empty() {
                            info!(count = fresh.len(), total, seeds = ?fresh, "seeds expired");
                        }
                    }
                    Err(e) => warn!("Expiry sweep failed: {}", e),
                }
            }
        });

        // Build HTTP API
        let app = api::build_router(self.state.clone());

        // Start HTTP server
        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_garbage() {
        std::env::set_var("OUTBREAK_TEST_BAD_NUMBER", "twelve");
        assert_eq!(env_or("OUTBREAK_TEST_BAD_NUMBER", 7u64), 7);
        std::env::set_var("OUTBREAK_TEST_GOOD_NUMBER", " 12 ");
        assert_eq!(env_or("OUTBREAK_TEST_GOOD_NUMBER", 7u64), 12);
        assert_eq!(env_or("OUTBREAK_TEST_UNSET", 3usize), 3);
    }

    #[test]
    fn defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.api_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.handler_timeout, Duration::from_secs(5));
        assert_eq!(config.engine_config().handler_timeout, Duration::from_secs(5));
    }

    #[test]
    fn sweep_reports_each_expiry_once() {
        let mut log = ExpiryLog::default();
        assert_eq!(log.newly_expired(vec!["a".into()]), vec!["a"]);
        assert!(log.newly_expired(vec!["a".into()]).is_empty());
        assert_eq!(log.newly_expired(vec!["b".into(), "a".into()]), vec!["b"]);
        assert!(log.newly_expired(vec!["a".into(), "b".into()]).is_empty());
    }

    #[tokio::test]
    async fn node_opens_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let node = Node::new(config).await.unwrap();
        assert_eq!(node.state().engine.ladder().len(), 4);
    }
}
