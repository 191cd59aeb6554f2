//! Core trait and data structures for the twelve layer agents

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use verdure_core::{CrossQuadrantSignal, LearningState, Signal};
use verdure_types::{AgentId, Quadrant, Result, SignalPriority, SourceType};

/// A piece of observed social content handed to perception agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub text: String,
    pub source: String,
    pub source_type: SourceType,
    pub published_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source: "manual".to_string(),
            source_type: SourceType::Manual,
            published_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>, source_type: SourceType) -> Self {
        self.source = source.into();
        self.source_type = source_type;
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = published_at;
        self
    }
}

/// Input to one agent invocation.
///
/// `reference_time` anchors every recency computation so an invocation is
/// reproducible: identical input, snapshot, and config produce identical
/// output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    pub session_id: String,
    pub items: Vec<ContentItem>,
    pub reference_time: DateTime<Utc>,
}

impl AgentInput {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            items: Vec::new(),
            reference_time: Utc::now(),
        }
    }

    pub fn with_items(mut self, items: Vec<ContentItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = reference_time;
        self
    }
}

/// Read-only view of shared memory captured before a phase.
///
/// Agents receive this snapshot instead of the store itself; persisting
/// anything they produce is the orchestrator's job.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    /// Cross-quadrant signals currently live in shared memory
    pub cross_signals: Vec<CrossQuadrantSignal>,
    /// Raw perception signals from the current session, by quadrant
    pub perception_signals: Vec<Signal>,
    /// Committed learning state at snapshot time
    pub learning_state: LearningState,
}

impl MemorySnapshot {
    pub fn signals_for(&self, quadrant: Quadrant) -> Vec<&Signal> {
        self.perception_signals
            .iter()
            .filter(|s| s.quadrant == quadrant)
            .collect()
    }

    pub fn cross_signals_targeting(&self, agent: AgentId) -> Vec<&CrossQuadrantSignal> {
        self.cross_signals
            .iter()
            .filter(|s| s.target_agents.contains(&agent))
            .collect()
    }
}

/// Numeric agent parameters, injected at invocation time.
///
/// Defaults come from the agent; the orchestrator layers learned
/// thresholds and deployed evolution overrides on top before invoking.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    pub parameters: HashMap<String, f64>,
}

impl AgentConfig {
    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        Self {
            parameters: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    pub fn get(&self, key: &str, default: f64) -> f64 {
        self.parameters.get(key).copied().unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.parameters.insert(key.into(), value);
    }

    /// Overlay another parameter set on top of this one
    pub fn merged_with(&self, overrides: &HashMap<String, f64>) -> Self {
        let mut merged = self.clone();
        for (key, value) in overrides {
            merged.parameters.insert(key.clone(), *value);
        }
        merged
    }
}

/// A judgment-layer value assessment with per-dimension scores in [0, 1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueAssessment {
    pub quadrant: Quadrant,
    /// Weighted composite of the dimension scores
    pub overall_score: f64,
    pub dimension_scores: HashMap<String, f64>,
    pub priority: SignalPriority,
    pub recommended_action: String,
    pub signals_considered: usize,
}

/// A relationship-layer action plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipPlan {
    pub plan_id: String,
    pub quadrant: Quadrant,
    pub objective: String,
    pub actions: Vec<String>,
    pub target_segment: String,
    /// Expected impact, 0-1, derived from source signal confidence
    pub expected_impact: f64,
    pub source_signals: Vec<String>,
}

/// Typed output of an agent invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentPayload {
    Signals { signals: Vec<Signal> },
    Assessment { assessment: ValueAssessment },
    Plan { plan: RelationshipPlan },
}

impl AgentPayload {
    pub fn signal_count(&self) -> usize {
        match self {
            AgentPayload::Signals { signals } => signals.len(),
            _ => 0,
        }
    }
}

/// Terminal status of one agent invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    Failed,
    TimedOut,
}

/// What the orchestrator records for each invoked agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent: AgentId,
    pub status: ReportStatus,
    pub payload: Option<AgentPayload>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub generated_at: DateTime<Utc>,
}

impl AgentReport {
    pub fn success(agent: AgentId, payload: AgentPayload, duration_ms: u64) -> Self {
        Self {
            agent,
            status: ReportStatus::Success,
            payload: Some(payload),
            error: None,
            duration_ms,
            generated_at: Utc::now(),
        }
    }

    pub fn failure(agent: AgentId, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            agent,
            status: ReportStatus::Failed,
            payload: None,
            error: Some(error.into()),
            duration_ms,
            generated_at: Utc::now(),
        }
    }

    pub fn timed_out(agent: AgentId, timeout_secs: u64) -> Self {
        Self {
            agent,
            status: ReportStatus::TimedOut,
            payload: None,
            error: Some(format!("agent exceeded {}s timeout", timeout_secs)),
            duration_ms: timeout_secs * 1000,
            generated_at: Utc::now(),
        }
    }

    pub fn signals(&self) -> &[Signal] {
        match &self.payload {
            Some(AgentPayload::Signals { signals }) => signals,
            _ => &[],
        }
    }
}

/// Common capability of all twelve layer agents.
///
/// Implementations must be pure given `(input, snapshot, config)`: no
/// interior mutability, no clock reads outside `input.reference_time`,
/// and no writes to shared state.
#[async_trait]
pub trait LayerAgent: Send + Sync {
    fn id(&self) -> AgentId;

    fn default_config(&self) -> AgentConfig;

    async fn invoke(
        &self,
        input: &AgentInput,
        snapshot: &MemorySnapshot,
        config: &AgentConfig,
    ) -> Result<AgentPayload>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_merge_overlays() {
        let base = AgentConfig::from_pairs(&[("a", 1.0), ("b", 2.0)]);
        let mut overrides = HashMap::new();
        overrides.insert("b".to_string(), 5.0);
        overrides.insert("c".to_string(), 9.0);

        let merged = base.merged_with(&overrides);
        assert_eq!(merged.get("a", 0.0), 1.0);
        assert_eq!(merged.get("b", 0.0), 5.0);
        assert_eq!(merged.get("c", 0.0), 9.0);
    }

    #[test]
    fn report_accessors() {
        let report = AgentReport::timed_out(AgentId::Q1P0, 30);
        assert_eq!(report.status, ReportStatus::TimedOut);
        assert!(report.signals().is_empty());
    }
}
