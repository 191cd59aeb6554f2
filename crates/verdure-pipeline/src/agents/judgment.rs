//! P1 judgment agents: value assessment and prioritization
//!
//! Each agent scores its quadrant's current signals along named dimensions
//! in [0, 1], composes them with the learned per-quadrant weights, and
//! recommends an action. Weights come from the LearningState snapshot, so
//! the learning loop tunes these assessments between cycles.

use std::collections::HashMap;

use async_trait::async_trait;

use verdure_core::{CrossQuadrantSignal, CrossSignalType, Signal};
use verdure_types::{AgentId, Quadrant, Result, SignalPriority};

use crate::agents::traits::{
    AgentConfig, AgentInput, AgentPayload, LayerAgent, MemorySnapshot, ValueAssessment,
};

fn avg_score(signals: &[&Signal]) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }
    signals.iter().map(|s| s.score).sum::<f64>() / signals.len() as f64
}

fn avg_confidence(signals: &[&CrossQuadrantSignal], default: f64) -> f64 {
    if signals.is_empty() {
        return default;
    }
    signals.iter().map(|s| s.confidence).sum::<f64>() / signals.len() as f64
}

/// Share of signals satisfying a predicate
fn share_where(signals: &[&Signal], predicate: impl Fn(&Signal) -> bool) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }
    signals.iter().filter(|s| predicate(s)).count() as f64 / signals.len() as f64
}

/// Weighted composite of dimension scores, clamped into [0, 1]
fn composite(weights: &HashMap<String, f64>, scores: &HashMap<String, f64>) -> f64 {
    scores
        .iter()
        .map(|(name, score)| weights.get(name).copied().unwrap_or(0.0) * score)
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

fn priority_for(overall: f64) -> SignalPriority {
    if overall >= 0.8 {
        SignalPriority::Critical
    } else if overall >= 0.6 {
        SignalPriority::High
    } else if overall >= 0.4 {
        SignalPriority::Medium
    } else {
        SignalPriority::Low
    }
}

fn quadrant_weights(snapshot: &MemorySnapshot, quadrant: Quadrant) -> HashMap<String, f64> {
    snapshot
        .learning_state
        .p1_weights
        .get(&quadrant)
        .cloned()
        .unwrap_or_default()
}

fn assessment(
    quadrant: Quadrant,
    snapshot: &MemorySnapshot,
    scores: HashMap<String, f64>,
    signals_considered: usize,
    actions: [&str; 4],
) -> ValueAssessment {
    let weights = quadrant_weights(snapshot, quadrant);
    let overall = composite(&weights, &scores);
    let priority = priority_for(overall);
    let recommended_action = match priority {
        SignalPriority::Critical => actions[0],
        SignalPriority::High => actions[1],
        SignalPriority::Medium => actions[2],
        SignalPriority::Low => actions[3],
    };

    ValueAssessment {
        quadrant,
        overall_score: overall,
        dimension_scores: scores,
        priority,
        recommended_action: recommended_action.to_string(),
        signals_considered,
    }
}

/// Q1P1 PainpointValue: is the detected pain commercially worth acting on
pub struct PainpointValueAgent;

impl PainpointValueAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PainpointValueAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for PainpointValueAgent {
    fn id(&self) -> AgentId {
        AgentId::Q1P1
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[("min_overall_score", 0.4)])
    }

    async fn invoke(
        &self,
        _input: &AgentInput,
        snapshot: &MemorySnapshot,
        _config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let pain = snapshot.signals_for(Quadrant::Q1);
        let cross: Vec<&CrossQuadrantSignal> = snapshot
            .cross_signals
            .iter()
            .filter(|s| {
                matches!(
                    s.signal_type,
                    CrossSignalType::PainTrend | CrossSignalType::PainEmotion
                )
            })
            .collect();

        let mut scores = HashMap::new();
        scores.insert("commercial".to_string(), avg_score(&pain) / 100.0);
        scores.insert("audience".to_string(), (pain.len() as f64 / 10.0).min(1.0));
        scores.insert(
            "competition".to_string(),
            1.0 - (pain.len() as f64 / 20.0).min(1.0),
        );
        scores.insert("alignment".to_string(), avg_confidence(&cross, 0.5));

        let considered = pain.len() + cross.len();
        Ok(AgentPayload::Assessment {
            assessment: assessment(
                Quadrant::Q1,
                snapshot,
                scores,
                considered,
                [
                    "Ship an immediate fix-announcement and capture the painpoint demand",
                    "Prioritize solution content for the top painpoints this week",
                    "Queue painpoint topics into the regular content backlog",
                    "Keep monitoring; painpoint volume is below the action bar",
                ],
            ),
        })
    }
}

/// Q2P1 EmotionAlignment: does current emotion fit the brand voice
pub struct EmotionAlignmentAgent;

impl EmotionAlignmentAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EmotionAlignmentAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for EmotionAlignmentAgent {
    fn id(&self) -> AgentId {
        AgentId::Q2P1
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[("min_intensity", 60.0)])
    }

    async fn invoke(
        &self,
        _input: &AgentInput,
        snapshot: &MemorySnapshot,
        _config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let emotion = snapshot.signals_for(Quadrant::Q2);
        let cross: Vec<&CrossQuadrantSignal> = snapshot
            .cross_signals
            .iter()
            .filter(|s| s.signal_type == CrossSignalType::PainEmotion)
            .collect();

        let joy_share = share_where(&emotion, |s| {
            s.payload.get("emotion").and_then(|v| v.as_str()) == Some("joy")
        });

        let mut scores = HashMap::new();
        scores.insert("authenticity".to_string(), avg_score(&emotion) / 100.0);
        scores.insert("audience".to_string(), (emotion.len() as f64 / 8.0).min(1.0));
        scores.insert(
            "shareability".to_string(),
            share_where(&emotion, |s| s.score > 75.0),
        );
        scores.insert("brand".to_string(), 0.5 + 0.5 * joy_share);
        scores.insert("conversion".to_string(), avg_confidence(&cross, 0.4));

        let considered = emotion.len() + cross.len();
        Ok(AgentPayload::Assessment {
            assessment: assessment(
                Quadrant::Q2,
                snapshot,
                scores,
                considered,
                [
                    "Lead with validation content for the dominant emotion today",
                    "Schedule resonance content matched to the detected emotions",
                    "Fold emotional angles into planned content",
                    "Emotional temperature is low; no dedicated response needed",
                ],
            ),
        })
    }
}

/// Q3P1 TrendValue: is the trend worth the cost of riding it
pub struct TrendValueAgent;

impl TrendValueAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TrendValueAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for TrendValueAgent {
    fn id(&self) -> AgentId {
        AgentId::Q3P1
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[("min_velocity", 70.0)])
    }

    async fn invoke(
        &self,
        _input: &AgentInput,
        snapshot: &MemorySnapshot,
        _config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let trend = snapshot.signals_for(Quadrant::Q3);
        let pain = snapshot.signals_for(Quadrant::Q1);

        // A trend is relevant when it shares vocabulary with observed pain
        let relevance = share_where(&trend, |t| {
            pain.iter()
                .any(|p| t.keywords.iter().any(|k| p.keywords.contains(k)))
        });

        let mut scores = HashMap::new();
        scores.insert("lifecycle".to_string(), avg_score(&trend) / 100.0);
        scores.insert("relevance".to_string(), relevance);
        scores.insert(
            "sustainability".to_string(),
            0.3 + 0.7 * (1.0 - (trend.len() as f64 / 15.0).min(1.0)),
        );
        scores.insert("cost".to_string(), 1.0 - avg_score(&trend) / 200.0);
        scores.insert("viral".to_string(), share_where(&trend, |s| s.score > 85.0));

        Ok(AgentPayload::Assessment {
            assessment: assessment(
                Quadrant::Q3,
                snapshot,
                scores,
                trend.len() + pain.len(),
                [
                    "Ride the top trend now with a same-day response piece",
                    "Produce trend commentary within 48 hours",
                    "Track the trend and prepare an evergreen angle",
                    "Trends are weak or saturated; skip this cycle",
                ],
            ),
        })
    }
}

/// Q4P1 DemandAssessment: how ready is the audience in detected scenes
pub struct DemandAssessmentAgent;

impl DemandAssessmentAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DemandAssessmentAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for DemandAssessmentAgent {
    fn id(&self) -> AgentId {
        AgentId::Q4P1
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[("min_specificity", 55.0)])
    }

    async fn invoke(
        &self,
        _input: &AgentInput,
        snapshot: &MemorySnapshot,
        _config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let scene = snapshot.signals_for(Quadrant::Q4);
        let cross: Vec<&CrossQuadrantSignal> = snapshot
            .cross_signals
            .iter()
            .filter(|s| s.signal_type == CrossSignalType::EmotionScene)
            .collect();

        let mut scores = HashMap::new();
        scores.insert("readiness".to_string(), avg_score(&scene) / 100.0);
        scores.insert("fit".to_string(), (scene.len() as f64 / 6.0).min(1.0));
        scores.insert(
            "education".to_string(),
            0.5 + 0.1 * (scene.len() as f64).min(5.0) / 5.0,
        );
        scores.insert("timing".to_string(), avg_confidence(&cross, 0.5));
        scores.insert("gap".to_string(), 1.0 - (scene.len() as f64 / 10.0).min(1.0));

        let considered = scene.len() + cross.len();
        Ok(AgentPayload::Assessment {
            assessment: assessment(
                Quadrant::Q4,
                snapshot,
                scores,
                considered,
                [
                    "Launch scenario-specific content for the strongest scene now",
                    "Build scene-anchored content for the top scenarios",
                    "Add scenario framing to upcoming content",
                    "Scene signals are thin; revisit next sync",
                ],
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdure_core::Signal;
    use verdure_types::SignalKind;

    fn snapshot_with_pain(count: usize, score: f64) -> MemorySnapshot {
        let mut snapshot = MemorySnapshot::default();
        snapshot.perception_signals = (0..count)
            .map(|i| {
                Signal::new(format!("p{}", i), Quadrant::Q1, SignalKind::Pain)
                    .with_score(score)
                    .with_keywords(vec!["login".to_string()])
            })
            .collect();
        snapshot
    }

    #[tokio::test]
    async fn painpoint_value_scores_stay_in_unit_range() {
        let agent = PainpointValueAgent::new();
        let snapshot = snapshot_with_pain(25, 95.0);
        let input = AgentInput::new("sync-test");

        let payload = agent
            .invoke(&input, &snapshot, &agent.default_config())
            .await
            .unwrap();
        let AgentPayload::Assessment { assessment } = payload else {
            panic!("expected assessment");
        };
        for (name, score) in &assessment.dimension_scores {
            assert!(
                (0.0..=1.0).contains(score),
                "dimension {} out of range: {}",
                name,
                score
            );
        }
        assert!((0.0..=1.0).contains(&assessment.overall_score));
        assert_eq!(assessment.quadrant, Quadrant::Q1);
    }

    #[tokio::test]
    async fn empty_snapshot_yields_low_priority() {
        let agent = TrendValueAgent::new();
        let payload = agent
            .invoke(
                &AgentInput::new("sync-test"),
                &MemorySnapshot::default(),
                &agent.default_config(),
            )
            .await
            .unwrap();
        let AgentPayload::Assessment { assessment } = payload else {
            panic!("expected assessment");
        };
        assert!(matches!(
            assessment.priority,
            SignalPriority::Low | SignalPriority::Medium
        ));
        assert_eq!(assessment.signals_considered, 0);
    }

    #[tokio::test]
    async fn assessments_are_deterministic() {
        let agent = DemandAssessmentAgent::new();
        let snapshot = snapshot_with_pain(3, 70.0);
        let input = AgentInput::new("sync-test");
        let config = agent.default_config();

        let a = agent.invoke(&input, &snapshot, &config).await.unwrap();
        let b = agent.invoke(&input, &snapshot, &config).await.unwrap();
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }
}
