//! Perception signals, synthesized cross-quadrant signals, and sync sessions

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use verdure_types::{AgentId, Quadrant, SignalKind, SignalPriority};

/// A single perception-layer observation produced by a P0 agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal identifier
    pub signal_id: String,

    /// Quadrant that produced the observation
    pub quadrant: Quadrant,

    /// What the signal observes
    pub kind: SignalKind,

    /// Matched keywords, deduplicated
    pub keywords: Vec<String>,

    /// Urgency/intensity score, 0-100
    pub score: f64,

    /// Observed text excerpt
    pub text: String,

    /// When the observation was made
    pub timestamp: DateTime<Utc>,

    /// Arbitrary structured payload (topic, triggers, scene context, ...)
    pub payload: HashMap<String, serde_json::Value>,
}

impl Signal {
    pub fn new(signal_id: String, quadrant: Quadrant, kind: SignalKind) -> Self {
        Self {
            signal_id,
            quadrant,
            kind,
            keywords: Vec::new(),
            score: 0.0,
            text: String::new(),
            timestamp: Utc::now(),
            payload: HashMap::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score.clamp(0.0, 100.0);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// The cross-quadrant pattern a synthesized signal represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossSignalType {
    #[serde(rename = "pain+trend")]
    PainTrend,
    #[serde(rename = "emotion+scene")]
    EmotionScene,
    #[serde(rename = "pain+emotion")]
    PainEmotion,
}

impl CrossSignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossSignalType::PainTrend => "pain+trend",
            CrossSignalType::EmotionScene => "emotion+scene",
            CrossSignalType::PainEmotion => "pain+emotion",
        }
    }
}

/// A multi-source opportunity synthesized from two quadrants' signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossQuadrantSignal {
    pub signal_id: String,

    /// At least two source quadrants
    pub source_quadrants: Vec<Quadrant>,

    pub signal_type: CrossSignalType,

    pub title: String,

    pub description: String,

    pub priority: SignalPriority,

    /// Synthesis confidence, 0-1; always at or above the learning threshold
    pub confidence: f64,

    /// Ids of the component signals this was synthesized from
    pub raw_signals: Vec<String>,

    pub recommended_action: String,

    /// Downstream agents that should consume this signal
    pub target_agents: Vec<AgentId>,

    pub created_at: DateTime<Utc>,
}

/// Status of a sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

/// Outcome of invoking one downstream (P1/P2) agent during a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamResult {
    pub agent: AgentId,
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// One full orchestration cycle: P0 fan-out, synthesis, P1/P2 fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    pub session_id: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    pub status: SessionStatus,

    /// Per-agent structured reports, keyed by agent id; failed agents
    /// appear here with their error captured
    pub agent_reports: HashMap<AgentId, serde_json::Value>,

    pub synthesized_signals: Vec<CrossQuadrantSignal>,

    /// Human-readable observations derived from the reports
    pub insights: Vec<String>,

    pub p1_trigger_results: Vec<DownstreamResult>,

    pub p2_trigger_results: Vec<DownstreamResult>,

    pub error_message: Option<String>,
}

impl SyncSession {
    pub fn begin(session_id: String) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            completed_at: None,
            status: SessionStatus::Running,
            agent_reports: HashMap::new(),
            synthesized_signals: Vec::new(),
            insights: Vec::new(),
            p1_trigger_results: Vec::new(),
            p2_trigger_results: Vec::new(),
            error_message: None,
        }
    }

    /// Advance `running -> completed`; status never moves backwards
    pub fn complete(&mut self) {
        if self.status == SessionStatus::Running {
            self.status = SessionStatus::Completed;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Advance `running -> failed`, capturing the error
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status == SessionStatus::Running {
            self.status = SessionStatus::Failed;
            self.error_message = Some(error.into());
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn critical_signal_count(&self) -> usize {
        self.synthesized_signals
            .iter()
            .filter(|s| s.priority == SignalPriority::Critical)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_only_advances() {
        let mut session = SyncSession::begin("sync-test".to_string());
        session.complete();
        assert_eq!(session.status, SessionStatus::Completed);
        let completed_at = session.completed_at;

        // A later fail must not regress a completed session
        session.fail("too late");
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.completed_at, completed_at);
        assert!(session.completed_at.unwrap() >= session.started_at);
    }

    #[test]
    fn signal_score_clamped() {
        let signal = Signal::new("s1".to_string(), Quadrant::Q1, SignalKind::Pain).with_score(150.0);
        assert_eq!(signal.score, 100.0);
    }

    #[test]
    fn cross_signal_type_serializes_with_plus() {
        let json = serde_json::to_string(&CrossSignalType::PainTrend).unwrap();
        assert_eq!(json, "\"pain+trend\"");
    }
}
