//! A single-shard history node over the in-memory store.

use std::sync::Arc;

use anyhow::Context;
use history_engine::{HistoryEngine, ShardContext, ShardStores, SystemTimeSource, TimeSource};
use history_metrics::MetricsClient;
use history_persistence::{
    InMemoryStore, MeteredExecutionManager, MeteredHistoryManager, MeteredShardManager,
};
use history_types::ShardId;
use prometheus::{Registry, TextEncoder};
use tracing::{debug, info};

use crate::clients::{LoggingMatchingClient, LoopbackHistoryClient};
use crate::config::DaemonConfig;

pub struct HistoryNode {
    engine: Arc<HistoryEngine>,
    matching: Arc<LoggingMatchingClient>,
    store: InMemoryStore,
    registry: Registry,
}

impl HistoryNode {
    /// Acquire the configured shard and start its queue processors.
    pub async fn start(config: &DaemonConfig) -> anyhow::Result<Self> {
        Self::start_with(config, InMemoryStore::new(), Arc::new(SystemTimeSource)).await
    }

    pub async fn start_with(
        config: &DaemonConfig,
        store: InMemoryStore,
        time_source: Arc<dyn TimeSource>,
    ) -> anyhow::Result<Self> {
        let registry = Registry::new();
        let metrics = MetricsClient::new(&registry).context("registering metrics")?;
        let shard_id = ShardId(config.shard_id);

        let stores = ShardStores {
            shards: Arc::new(MeteredShardManager::new(
                Arc::new(store.clone()),
                metrics.clone(),
            )),
            executions: Arc::new(MeteredExecutionManager::new(
                Arc::new(store.execution_manager(shard_id)),
                metrics.clone(),
            )),
            history: Arc::new(MeteredHistoryManager::new(
                Arc::new(store.clone()),
                metrics.clone(),
            )),
        };
        let shard = ShardContext::acquire(
            shard_id,
            &config.owner,
            &config.history,
            stores,
            metrics,
            time_source,
        )
        .await
        .with_context(|| format!("acquiring shard {}", shard_id))?;

        let matching = Arc::new(LoggingMatchingClient::default());
        let loopback = Arc::new(LoopbackHistoryClient::default());
        let engine = HistoryEngine::new(shard, &config.history, matching.clone(), loopback.clone());
        loopback.bind(&engine);
        engine.start();

        info!(
            shard_id = %shard_id,
            owner = %config.owner,
            range_id = engine.shard().current_range_id(),
            "History node started"
        );

        Ok(Self {
            engine,
            matching,
            store,
            registry,
        })
    }

    pub fn engine(&self) -> &Arc<HistoryEngine> {
        &self.engine
    }

    pub fn matching(&self) -> &LoggingMatchingClient {
        &self.matching
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render_metrics(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }

    /// Stop the processors, then release the shard.
    pub async fn shutdown(self) {
        self.engine.stop().await;
        self.engine.shard().close_shard();
        debug!(metrics = %self.render_metrics(), "Final metrics");
        info!(shard_id = %self.engine.shard().shard_id(), "History node stopped");
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
