//! Feedback records, learning insights, and the tunable learning state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use verdure_types::Quadrant;

/// Kinds of feedback collected from executed plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    /// Quantitative content metrics
    Performance,
    /// Comments, sentiment
    Qualitative,
    /// Business results
    Outcome,
    /// System/agent effectiveness
    Meta,
}

/// Outcome of one executed plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub feedback_id: String,
    pub source_plan_id: String,
    pub source_quadrant: Quadrant,
    pub kind: FeedbackKind,
    pub metrics: HashMap<String, serde_json::Value>,
    pub qualitative_data: Vec<String>,
    /// Business value of the outcome (revenue, leads, ...)
    pub outcome_value: f64,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Numeric metric accessor; non-numeric values read as absent
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(|v| v.as_f64())
    }
}

/// Actions a learning insight can recommend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningAction {
    AdjustThreshold { metric: String, new_threshold: f64 },
    UpdateWeights { quadrant: Quadrant, weight_adjustment: f64 },
}

/// An insight generated from analyzing accumulated feedback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningInsight {
    pub insight_id: String,
    pub insight_type: String,
    pub description: String,
    /// 0-1; insights at or above 0.7 get applied
    pub confidence: f64,
    /// Supporting feedback ids
    pub evidence: Vec<String>,
    pub recommended_action: LearningAction,
    pub generated_at: DateTime<Utc>,
}

/// A recorded execution pattern, kept for future learning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    pub quadrant: Quadrant,
    pub metrics: HashMap<String, serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
    pub state_version: u64,
}

/// Maximum weight any single P1 dimension may carry after adjustment
pub const WEIGHT_CAP: f64 = 0.5;

/// How many success/failure patterns the state retains
pub const PATTERN_HISTORY_LIMIT: usize = 100;

/// Versioned tunable configuration read by agents on every cycle.
///
/// Single-writer: only the learning engine mutates this; everyone else
/// reads committed snapshots from shared memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningState {
    pub version: u64,
    pub last_updated: DateTime<Utc>,
    /// P0 detection thresholds, e.g. `min_urgency_score`
    pub p0_thresholds: HashMap<String, f64>,
    /// Per-quadrant named scoring weights for the P1 layer
    pub p1_weights: HashMap<Quadrant, HashMap<String, f64>>,
    pub successful_patterns: Vec<PatternRecord>,
    pub failed_patterns: Vec<PatternRecord>,
    /// Insight ids already applied; re-applying one is a no-op
    pub applied_insights: Vec<String>,
}

impl LearningState {
    pub fn min_confidence_threshold(&self) -> f64 {
        self.p0_thresholds
            .get("min_confidence_threshold")
            .copied()
            .unwrap_or(0.7)
    }

    /// Multiply a quadrant's weights, clamping each into `[0, WEIGHT_CAP]`
    pub fn scale_weights(&mut self, quadrant: Quadrant, factor: f64) {
        if let Some(weights) = self.p1_weights.get_mut(&quadrant) {
            for value in weights.values_mut() {
                *value = (*value * factor).clamp(0.0, WEIGHT_CAP);
            }
        }
    }

    pub fn record_pattern(&mut self, pattern: PatternRecord, successful: bool) {
        let bucket = if successful {
            &mut self.successful_patterns
        } else {
            &mut self.failed_patterns
        };
        bucket.push(pattern);
        if bucket.len() > PATTERN_HISTORY_LIMIT {
            let excess = bucket.len() - PATTERN_HISTORY_LIMIT;
            bucket.drain(..excess);
        }
    }

    pub fn mark_applied(&mut self, insight_id: &str) {
        self.applied_insights.push(insight_id.to_string());
        if self.applied_insights.len() > PATTERN_HISTORY_LIMIT {
            let excess = self.applied_insights.len() - PATTERN_HISTORY_LIMIT;
            self.applied_insights.drain(..excess);
        }
    }

    pub fn was_applied(&self, insight_id: &str) -> bool {
        self.applied_insights.iter().any(|id| id == insight_id)
    }
}

impl Default for LearningState {
    fn default() -> Self {
        let mut p0_thresholds = HashMap::new();
        p0_thresholds.insert("min_urgency_score".to_string(), 60.0);
        p0_thresholds.insert("min_emotion_intensity".to_string(), 60.0);
        p0_thresholds.insert("min_confidence_threshold".to_string(), 0.7);

        let mut p1_weights = HashMap::new();
        p1_weights.insert(
            Quadrant::Q1,
            named_weights(&[
                ("commercial", 0.40),
                ("audience", 0.25),
                ("competition", 0.15),
                ("alignment", 0.20),
            ]),
        );
        p1_weights.insert(
            Quadrant::Q2,
            named_weights(&[
                ("authenticity", 0.30),
                ("audience", 0.25),
                ("shareability", 0.20),
                ("brand", 0.15),
                ("conversion", 0.10),
            ]),
        );
        p1_weights.insert(
            Quadrant::Q3,
            named_weights(&[
                ("lifecycle", 0.30),
                ("relevance", 0.25),
                ("sustainability", 0.20),
                ("cost", 0.15),
                ("viral", 0.10),
            ]),
        );
        p1_weights.insert(
            Quadrant::Q4,
            named_weights(&[
                ("readiness", 0.30),
                ("fit", 0.25),
                ("education", 0.20),
                ("timing", 0.15),
                ("gap", 0.10),
            ]),
        );

        Self {
            version: 1,
            last_updated: Utc::now(),
            p0_thresholds,
            p1_weights,
            successful_patterns: Vec::new(),
            failed_patterns: Vec::new(),
            applied_insights: Vec::new(),
        }
    }
}

fn named_weights(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_clamped_after_scaling() {
        let mut state = LearningState::default();
        // Repeated upscaling must never push any weight past the cap
        for _ in 0..10 {
            state.scale_weights(Quadrant::Q1, 1.2);
        }
        for value in state.p1_weights[&Quadrant::Q1].values() {
            assert!(*value >= 0.0 && *value <= WEIGHT_CAP);
        }
    }

    #[test]
    fn pattern_history_bounded() {
        let mut state = LearningState::default();
        for i in 0..150 {
            state.record_pattern(
                PatternRecord {
                    quadrant: Quadrant::Q1,
                    metrics: HashMap::new(),
                    recorded_at: Utc::now(),
                    state_version: i,
                },
                true,
            );
        }
        assert_eq!(state.successful_patterns.len(), PATTERN_HISTORY_LIMIT);
        // Oldest entries evicted first
        assert_eq!(state.successful_patterns[0].state_version, 50);
    }

    #[test]
    fn applied_insights_tracked() {
        let mut state = LearningState::default();
        assert!(!state.was_applied("insight_a"));
        state.mark_applied("insight_a");
        assert!(state.was_applied("insight_a"));
    }
}
