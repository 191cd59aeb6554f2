//! Common enums and identifiers shared across Verdure crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp alias used throughout the workspace
pub type Timestamp = DateTime<Utc>;

/// The four problem-space quadrants perceived by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [Quadrant::Q1, Quadrant::Q2, Quadrant::Q3, Quadrant::Q4];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quadrant::Q1 => "Q1",
            Quadrant::Q2 => "Q2",
            Quadrant::Q3 => "Q3",
            Quadrant::Q4 => "Q4",
        }
    }
}

impl std::fmt::Display for Quadrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five pipeline layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// Perception
    P0,
    /// Judgment
    P1,
    /// Relationship
    P2,
    /// Evolution
    P3,
    /// Data lifecycle
    P4,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::P0 => "P0",
            Layer::P1 => "P1",
            Layer::P2 => "P2",
            Layer::P3 => "P3",
            Layer::P4 => "P4",
        }
    }
}

/// Fixed identifiers for the twelve layer agents (Q1-Q4 x P0/P1/P2).
///
/// The registry is keyed by this enum rather than by strings so an unknown
/// agent is unrepresentable once parsing succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    Q1P0,
    Q2P0,
    Q3P0,
    Q4P0,
    Q1P1,
    Q2P1,
    Q3P1,
    Q4P1,
    Q1P2,
    Q2P2,
    Q3P2,
    Q4P2,
}

impl AgentId {
    pub const P0_AGENTS: [AgentId; 4] = [AgentId::Q1P0, AgentId::Q2P0, AgentId::Q3P0, AgentId::Q4P0];
    pub const P1_AGENTS: [AgentId; 4] = [AgentId::Q1P1, AgentId::Q2P1, AgentId::Q3P1, AgentId::Q4P1];
    pub const P2_AGENTS: [AgentId; 4] = [AgentId::Q1P2, AgentId::Q2P2, AgentId::Q3P2, AgentId::Q4P2];

    pub fn quadrant(&self) -> Quadrant {
        match self {
            AgentId::Q1P0 | AgentId::Q1P1 | AgentId::Q1P2 => Quadrant::Q1,
            AgentId::Q2P0 | AgentId::Q2P1 | AgentId::Q2P2 => Quadrant::Q2,
            AgentId::Q3P0 | AgentId::Q3P1 | AgentId::Q3P2 => Quadrant::Q3,
            AgentId::Q4P0 | AgentId::Q4P1 | AgentId::Q4P2 => Quadrant::Q4,
        }
    }

    pub fn layer(&self) -> Layer {
        match self {
            AgentId::Q1P0 | AgentId::Q2P0 | AgentId::Q3P0 | AgentId::Q4P0 => Layer::P0,
            AgentId::Q1P1 | AgentId::Q2P1 | AgentId::Q3P1 | AgentId::Q4P1 => Layer::P1,
            AgentId::Q1P2 | AgentId::Q2P2 | AgentId::Q3P2 | AgentId::Q4P2 => Layer::P2,
        }
    }

    /// Stable snake_case name, also the evolution strategy kind for this agent
    pub fn kind(&self) -> &'static str {
        match self {
            AgentId::Q1P0 => "pain_scanner",
            AgentId::Q2P0 => "emotion_watcher",
            AgentId::Q3P0 => "trend_hunter",
            AgentId::Q4P0 => "scene_discover",
            AgentId::Q1P1 => "painpoint_value",
            AgentId::Q2P1 => "emotion_alignment",
            AgentId::Q3P1 => "trend_value",
            AgentId::Q4P1 => "demand_assessment",
            AgentId::Q1P2 => "trust_builder",
            AgentId::Q2P2 => "community_binder",
            AgentId::Q3P2 => "viral_engine",
            AgentId::Q4P2 => "influence_network",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Q1P0 => "Q1P0",
            AgentId::Q2P0 => "Q2P0",
            AgentId::Q3P0 => "Q3P0",
            AgentId::Q4P0 => "Q4P0",
            AgentId::Q1P1 => "Q1P1",
            AgentId::Q2P1 => "Q2P1",
            AgentId::Q3P1 => "Q3P1",
            AgentId::Q4P1 => "Q4P1",
            AgentId::Q1P2 => "Q1P2",
            AgentId::Q2P2 => "Q2P2",
            AgentId::Q3P2 => "Q3P2",
            AgentId::Q4P2 => "Q4P2",
        }
    }

    pub fn parse(value: &str) -> Option<AgentId> {
        match value {
            "Q1P0" => Some(AgentId::Q1P0),
            "Q2P0" => Some(AgentId::Q2P0),
            "Q3P0" => Some(AgentId::Q3P0),
            "Q4P0" => Some(AgentId::Q4P0),
            "Q1P1" => Some(AgentId::Q1P1),
            "Q2P1" => Some(AgentId::Q2P1),
            "Q3P1" => Some(AgentId::Q3P1),
            "Q4P1" => Some(AgentId::Q4P1),
            "Q1P2" => Some(AgentId::Q1P2),
            "Q2P2" => Some(AgentId::Q2P2),
            "Q3P2" => Some(AgentId::Q3P2),
            "Q4P2" => Some(AgentId::Q4P2),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a perception signal observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Pain,
    Emotion,
    Trend,
    Scene,
}

/// Priority levels for signals routed between layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl SignalPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalPriority::Critical => "critical",
            SignalPriority::High => "high",
            SignalPriority::Medium => "medium",
            SignalPriority::Low => "low",
        }
    }
}

/// Storage class of a data item, driven by last-access age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataTier {
    Hot,
    Warm,
    Cold,
    Frozen,
}

impl DataTier {
    /// The next colder tier under normal aging, if any
    pub fn next_colder(&self) -> Option<DataTier> {
        match self {
            DataTier::Hot => Some(DataTier::Warm),
            DataTier::Warm => Some(DataTier::Cold),
            DataTier::Cold => Some(DataTier::Frozen),
            DataTier::Frozen => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataTier::Hot => "hot",
            DataTier::Warm => "warm",
            DataTier::Cold => "cold",
            DataTier::Frozen => "frozen",
        }
    }

    pub fn parse(value: &str) -> Option<DataTier> {
        match value {
            "hot" => Some(DataTier::Hot),
            "warm" => Some(DataTier::Warm),
            "cold" => Some(DataTier::Cold),
            "frozen" => Some(DataTier::Frozen),
            _ => None,
        }
    }
}

/// Source category of a produced data item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Sensor,
    Processor,
    Event,
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Sensor => "sensor",
            SourceType::Processor => "processor",
            SourceType::Event => "event",
            SourceType::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<SourceType> {
        match value {
            "sensor" => Some(SourceType::Sensor),
            "processor" => Some(SourceType::Processor),
            "event" => Some(SourceType::Event),
            "manual" => Some(SourceType::Manual),
            _ => None,
        }
    }
}

/// Status of one scheduled execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerStatus {
    Pending,
    Running,
    Success,
    Failed,
    Retrying,
}

impl TriggerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerStatus::Pending => "pending",
            TriggerStatus::Running => "running",
            TriggerStatus::Success => "success",
            TriggerStatus::Failed => "failed",
            TriggerStatus::Retrying => "retrying",
        }
    }
}

/// Scheduler job health derived from the last successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Stopped,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Stopped => "stopped",
            HealthStatus::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_roundtrip() {
        for id in AgentId::P0_AGENTS
            .iter()
            .chain(AgentId::P1_AGENTS.iter())
            .chain(AgentId::P2_AGENTS.iter())
        {
            assert_eq!(AgentId::parse(id.as_str()), Some(*id));
        }
        assert_eq!(AgentId::parse("Q5P0"), None);
    }

    #[test]
    fn tier_ordering() {
        assert_eq!(DataTier::Hot.next_colder(), Some(DataTier::Warm));
        assert_eq!(DataTier::Warm.next_colder(), Some(DataTier::Cold));
        assert_eq!(DataTier::Cold.next_colder(), Some(DataTier::Frozen));
        assert_eq!(DataTier::Frozen.next_colder(), None);
    }

    #[test]
    fn agent_metadata() {
        assert_eq!(AgentId::Q3P0.quadrant(), Quadrant::Q3);
        assert_eq!(AgentId::Q3P0.layer(), Layer::P0);
        assert_eq!(AgentId::Q3P0.kind(), "trend_hunter");
        assert_eq!(AgentId::Q2P1.layer(), Layer::P1);
    }
}
