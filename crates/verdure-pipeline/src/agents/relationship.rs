//! P2 relationship agents: turning judged signals into outreach plans
//!
//! Each agent consumes the cross-quadrant signals routed to it and emits a
//! concrete action plan for its quadrant's relationship strategy.

use async_trait::async_trait;

use verdure_core::CrossQuadrantSignal;
use verdure_types::{AgentId, Quadrant, Result};

use crate::agents::traits::{
    AgentConfig, AgentInput, AgentPayload, LayerAgent, MemorySnapshot, RelationshipPlan,
};

fn plan_impact(signals: &[&CrossQuadrantSignal]) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }
    signals.iter().map(|s| s.confidence).sum::<f64>() / signals.len() as f64
}

fn signal_ids(signals: &[&CrossQuadrantSignal]) -> Vec<String> {
    signals.iter().map(|s| s.signal_id.clone()).collect()
}

/// Q1P2 TrustBuilder: convert solved painpoints into durable trust
pub struct TrustBuilderAgent;

impl TrustBuilderAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TrustBuilderAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for TrustBuilderAgent {
    fn id(&self) -> AgentId {
        AgentId::Q1P2
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[
            ("trust_threshold", 3.0),
            ("offer_timing_days", 7.0),
            ("content_depth", 4.0),
        ])
    }

    async fn invoke(
        &self,
        input: &AgentInput,
        snapshot: &MemorySnapshot,
        config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let routed = snapshot.cross_signals_targeting(AgentId::Q1P1);
        let depth = config.get("content_depth", 4.0) as usize;
        let offer_day = config.get("offer_timing_days", 7.0) as i64;

        let mut actions: Vec<String> = routed
            .iter()
            .take(depth.max(1))
            .map(|s| format!("Publish a solution walkthrough addressing '{}'", s.title))
            .collect();
        if actions.is_empty() {
            actions.push("Maintain the educational cadence; no urgent painpoints routed".to_string());
        } else {
            actions.push(format!(
                "Follow up with a soft offer on day {} after the walkthrough series",
                offer_day
            ));
        }

        Ok(AgentPayload::Plan {
            plan: RelationshipPlan {
                plan_id: format!("Q1P2-{}", input.session_id),
                quadrant: Quadrant::Q1,
                objective: "Convert urgent painpoints into demonstrated competence".to_string(),
                actions,
                target_segment: "users reporting unresolved painpoints".to_string(),
                expected_impact: plan_impact(&routed),
                source_signals: signal_ids(&routed),
            },
        })
    }
}

/// Q2P2 CommunityBinder: bind emotionally-engaged users into community
pub struct CommunityBinderAgent;

impl CommunityBinderAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CommunityBinderAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for CommunityBinderAgent {
    fn id(&self) -> AgentId {
        AgentId::Q2P2
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[("ritual_cadence_days", 7.0)])
    }

    async fn invoke(
        &self,
        input: &AgentInput,
        snapshot: &MemorySnapshot,
        config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let routed = snapshot.cross_signals_targeting(AgentId::Q2P1);
        let cadence = config.get("ritual_cadence_days", 7.0) as i64;

        let mut actions: Vec<String> = routed
            .iter()
            .map(|s| format!("Host a shared-experience thread around '{}'", s.title))
            .collect();
        actions.push(format!(
            "Run the community ritual on a {}-day cadence",
            cadence
        ));

        Ok(AgentPayload::Plan {
            plan: RelationshipPlan {
                plan_id: format!("Q2P2-{}", input.session_id),
                quadrant: Quadrant::Q2,
                objective: "Turn emotional resonance into belonging".to_string(),
                actions,
                target_segment: "emotionally engaged commenters".to_string(),
                expected_impact: plan_impact(&routed),
                source_signals: signal_ids(&routed),
            },
        })
    }
}

/// Q3P2 ViralEngine: amplify trend-aligned content
pub struct ViralEngineAgent;

impl ViralEngineAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ViralEngineAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for ViralEngineAgent {
    fn id(&self) -> AgentId {
        AgentId::Q3P2
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[("amplification_budget", 3.0)])
    }

    async fn invoke(
        &self,
        input: &AgentInput,
        snapshot: &MemorySnapshot,
        config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let routed = snapshot.cross_signals_targeting(AgentId::Q3P1);
        let budget = config.get("amplification_budget", 3.0) as usize;

        let mut actions: Vec<String> = routed
            .iter()
            .take(budget.max(1))
            .map(|s| format!("Cross-post and boost the response to '{}'", s.title))
            .collect();
        if actions.is_empty() {
            actions.push("Hold amplification budget; no trend-aligned signals routed".to_string());
        }

        Ok(AgentPayload::Plan {
            plan: RelationshipPlan {
                plan_id: format!("Q3P2-{}", input.session_id),
                quadrant: Quadrant::Q3,
                objective: "Maximize reach while the trend window is open".to_string(),
                actions,
                target_segment: "trend-following audiences".to_string(),
                expected_impact: plan_impact(&routed),
                source_signals: signal_ids(&routed),
            },
        })
    }
}

/// Q4P2 InfluenceNetwork: grow scene-specific influence partnerships
pub struct InfluenceNetworkAgent;

impl InfluenceNetworkAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InfluenceNetworkAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for InfluenceNetworkAgent {
    fn id(&self) -> AgentId {
        AgentId::Q4P2
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[("outreach_limit", 5.0)])
    }

    async fn invoke(
        &self,
        input: &AgentInput,
        snapshot: &MemorySnapshot,
        config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let routed = snapshot.cross_signals_targeting(AgentId::Q4P1);
        let limit = config.get("outreach_limit", 5.0) as usize;

        let mut actions: Vec<String> = routed
            .iter()
            .take(limit.max(1))
            .map(|s| format!("Pitch scene-native collaborators on '{}'", s.title))
            .collect();
        if actions.is_empty() {
            actions.push("Nurture existing partnerships; no new scenes routed".to_string());
        }

        Ok(AgentPayload::Plan {
            plan: RelationshipPlan {
                plan_id: format!("Q4P2-{}", input.session_id),
                quadrant: Quadrant::Q4,
                objective: "Own the scenarios where the audience already lives".to_string(),
                actions,
                target_segment: "scene-specific communities and creators".to_string(),
                expected_impact: plan_impact(&routed),
                source_signals: signal_ids(&routed),
            },
        })
    }
}
