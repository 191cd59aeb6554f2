//! Typed registry mapping the fixed `AgentId` enum to agent implementations

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use verdure_types::{AgentId, Layer, Result, VerdureError};

use crate::agents::traits::LayerAgent;

/// Static agent table, populated once at startup by `register_all`
pub struct AgentRegistry {
    agents: RwLock<HashMap<AgentId, Arc<dyn LayerAgent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, agent: Arc<dyn LayerAgent>) -> Result<()> {
        let id = agent.id();
        let mut agents = self
            .agents
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        agents.insert(id, agent);
        Ok(())
    }

    pub fn get(&self, id: AgentId) -> Result<Arc<dyn LayerAgent>> {
        let agents = self
            .agents
            .read()
            .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
        agents
            .get(&id)
            .cloned()
            .ok_or_else(|| VerdureError::UnknownAgent(id.to_string()))
    }

    /// Registered agents belonging to a layer, in enum declaration order
    pub fn agents_for_layer(&self, layer: Layer) -> Result<Vec<Arc<dyn LayerAgent>>> {
        let agents = self
            .agents
            .read()
            .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
        let ids: &[AgentId] = match layer {
            Layer::P0 => &AgentId::P0_AGENTS,
            Layer::P1 => &AgentId::P1_AGENTS,
            Layer::P2 => &AgentId::P2_AGENTS,
            _ => &[],
        };
        Ok(ids.iter().filter_map(|id| agents.get(id).cloned()).collect())
    }

    pub fn len(&self) -> Result<usize> {
        let agents = self
            .agents
            .read()
            .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
        Ok(agents.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::perception::PainScannerAgent;

    #[test]
    fn unknown_agent_errors() {
        let registry = AgentRegistry::new();
        assert!(matches!(
            registry.get(AgentId::Q1P0),
            Err(VerdureError::UnknownAgent(_))
        ));
    }

    #[test]
    fn registered_agent_resolves() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(PainScannerAgent::new())).unwrap();
        let agent = registry.get(AgentId::Q1P0).unwrap();
        assert_eq!(agent.id(), AgentId::Q1P0);
        assert_eq!(registry.agents_for_layer(Layer::P0).unwrap().len(), 1);
        assert!(registry.agents_for_layer(Layer::P1).unwrap().is_empty());
    }
}
