//! Explicit dependency wiring
//!
//! Everything the pipeline needs is constructed once at process start and
//! passed down from here. No component reaches for a global; tests build
//! their own `Deps` against an in-memory database.

use std::sync::Arc;

use tokio::sync::watch;

use verdure_core::LineageRepository;
use verdure_infra::{DatabaseManager, MeridianBus, SharedMemory, SqliteLineageStore};
use verdure_types::Result;

use crate::agents::{
    AgentRegistry, CommunityBinderAgent, DemandAssessmentAgent, EmotionAlignmentAgent,
    EmotionWatcherAgent, InfluenceNetworkAgent, PainScannerAgent, PainpointValueAgent,
    SceneDiscoverAgent, TrendHunterAgent, TrendValueAgent, TrustBuilderAgent, ViralEngineAgent,
};

/// Service aggregate injected into the orchestrator, scheduler, evolution
/// engine, and lifecycle agent
pub struct Deps {
    pub shared_memory: Arc<SharedMemory>,
    pub lineage: Arc<dyn LineageRepository>,
    pub registry: Arc<AgentRegistry>,
    pub bus: Arc<MeridianBus>,
    shutdown_tx: watch::Sender<bool>,
}

impl Deps {
    /// Build the full dependency graph over the given database URL and
    /// register every agent
    pub async fn bootstrap(database_url: &str) -> Result<Self> {
        let database = DatabaseManager::new(database_url).await?;
        database.initialize_schema().await?;
        let lineage: Arc<dyn LineageRepository> =
            Arc::new(SqliteLineageStore::new(database.pool().clone()));

        let shared_memory = Arc::new(SharedMemory::new());
        let registry = Arc::new(AgentRegistry::new());
        register_all(&registry)?;

        let bus = Arc::new(MeridianBus::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Background maintenance: expiry sweeps and time-sync broadcasts
        let _sweeper = Arc::clone(&shared_memory).spawn_sweeper(shutdown_rx.clone());
        let _time_sync = bus.temporal.start(shutdown_rx);

        Ok(Self {
            shared_memory,
            lineage,
            registry,
            bus,
            shutdown_tx,
        })
    }

    /// In-memory variant for tests
    pub async fn bootstrap_in_memory() -> Result<Self> {
        Self::bootstrap("sqlite::memory:").await
    }

    /// Handle observed by the background tasks spawned at bootstrap
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Signal every background task to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Register all twelve layer agents into the registry.
///
/// Called once at startup; replaces any side-effect registration scheme
/// with one explicit wiring point.
pub fn register_all(registry: &AgentRegistry) -> Result<()> {
    registry.register(Arc::new(PainScannerAgent::new()))?;
    registry.register(Arc::new(EmotionWatcherAgent::new()))?;
    registry.register(Arc::new(TrendHunterAgent::new()))?;
    registry.register(Arc::new(SceneDiscoverAgent::new()))?;
    registry.register(Arc::new(PainpointValueAgent::new()))?;
    registry.register(Arc::new(EmotionAlignmentAgent::new()))?;
    registry.register(Arc::new(TrendValueAgent::new()))?;
    registry.register(Arc::new(DemandAssessmentAgent::new()))?;
    registry.register(Arc::new(TrustBuilderAgent::new()))?;
    registry.register(Arc::new(CommunityBinderAgent::new()))?;
    registry.register(Arc::new(ViralEngineAgent::new()))?;
    registry.register(Arc::new(InfluenceNetworkAgent::new()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_registers_all_agents() {
        let deps = Deps::bootstrap_in_memory().await.unwrap();
        assert_eq!(deps.registry.len().unwrap(), 12);
        deps.shutdown();
    }
}
