//! Closed-loop learning: feedback collection, pattern analysis, and
//! threshold/weight updates
//!
//! Execution outcomes flow in as feedback records; every tenth record the
//! engine analyzes recent history, generates insights, and applies those
//! with confidence at or above 0.7 to the committed learning state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{Duration, Utc};
use tracing::{info, warn};

use verdure_core::{
    FeedbackKind, FeedbackRecord, LearningAction, LearningInsight, LearningState, PatternRecord,
};
use verdure_infra::SharedMemory;
use verdure_types::{Quadrant, Result, VerdureError};

use crate::orchestrator::LEARNING_STATE_KEY;

/// TTL for feedback records and the learning state snapshot
const FEEDBACK_TTL_DAYS: i64 = 30;

/// In-memory feedback history bound
const FEEDBACK_HISTORY_LIMIT: usize = 1000;

/// The engine analyzes after every N new records
const LEARNING_BATCH_SIZE: usize = 10;

/// Insights below this confidence are generated but never applied
pub const APPLY_CONFIDENCE: f64 = 0.7;

/// An outcome above this value counts as a success
const SUCCESS_OUTCOME_VALUE: f64 = 100.0;

/// Collects and classifies feedback from executed plans
pub struct FeedbackCollector {
    shared_memory: Arc<SharedMemory>,
    history: RwLock<Vec<FeedbackRecord>>,
}

impl FeedbackCollector {
    pub fn new(shared_memory: Arc<SharedMemory>) -> Self {
        Self {
            shared_memory,
            history: RwLock::new(Vec::new()),
        }
    }

    /// Classify and store one feedback record.
    ///
    /// Kind is inferred from the metric keys: conversion/revenue mark an
    /// outcome, sentiment/comments mark qualitative, anything else is
    /// performance.
    pub fn collect(
        &self,
        plan_id: &str,
        quadrant: Quadrant,
        metrics: HashMap<String, serde_json::Value>,
        qualitative_data: Vec<String>,
        outcome_value: f64,
    ) -> Result<FeedbackRecord> {
        let kind = if metrics.contains_key("conversion_rate") || metrics.contains_key("revenue") {
            FeedbackKind::Outcome
        } else if metrics.contains_key("sentiment") || metrics.contains_key("comments") {
            FeedbackKind::Qualitative
        } else {
            FeedbackKind::Performance
        };

        let record = FeedbackRecord {
            feedback_id: format!("fb_{}_{}", Utc::now().format("%Y%m%d%H%M%S"), plan_id),
            source_plan_id: plan_id.to_string(),
            source_quadrant: quadrant,
            kind,
            metrics,
            qualitative_data,
            outcome_value,
            timestamp: Utc::now(),
        };

        self.shared_memory.store_json(
            &format!("feedback:{}", record.feedback_id),
            &record,
            Some(Duration::days(FEEDBACK_TTL_DAYS)),
        )?;

        let mut history = self
            .history
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        history.push(record.clone());
        if history.len() > FEEDBACK_HISTORY_LIMIT {
            let excess = history.len() - FEEDBACK_HISTORY_LIMIT;
            history.drain(..excess);
        }

        info!(plan_id, kind = ?record.kind, "collected feedback");
        Ok(record)
    }

    pub fn recent(&self, window: Duration, quadrant: Option<Quadrant>) -> Vec<FeedbackRecord> {
        let cutoff = Utc::now() - window;
        self.history
            .read()
            .map(|history| {
                history
                    .iter()
                    .filter(|r| r.timestamp > cutoff)
                    .filter(|r| quadrant.map_or(true, |q| r.source_quadrant == q))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn total_collected(&self) -> usize {
        self.history.read().map(|h| h.len()).unwrap_or(0)
    }

    /// Overall success rate: outcome above the bar or engagement above 5%
    pub fn success_rate(&self) -> f64 {
        let history = match self.history.read() {
            Ok(history) => history,
            Err(_) => return 0.0,
        };
        if history.is_empty() {
            return 0.0;
        }
        let successful = history
            .iter()
            .filter(|r| r.outcome_value > 0.0 || r.metric("engagement_rate").unwrap_or(0.0) > 0.05)
            .count();
        successful as f64 / history.len() as f64
    }
}

/// Success rate per quadrant over a set of records
fn success_by_quadrant(records: &[FeedbackRecord]) -> HashMap<Quadrant, f64> {
    let mut rates = HashMap::new();
    for quadrant in Quadrant::ALL {
        let relevant: Vec<&FeedbackRecord> = records
            .iter()
            .filter(|r| r.source_quadrant == quadrant)
            .collect();
        let rate = if relevant.is_empty() {
            0.0
        } else {
            relevant
                .iter()
                .filter(|r| r.outcome_value > SUCCESS_OUTCOME_VALUE)
                .count() as f64
                / relevant.len() as f64
        };
        rates.insert(quadrant, rate);
    }
    rates
}

/// Generate the canonical insights from recent feedback.
///
/// Two rules: a quadrant clearly outperforming the rest earns a weight
/// boost, and a high share of high-engagement feedback moves the urgency
/// threshold.
pub fn generate_insights(records: &[FeedbackRecord]) -> Vec<LearningInsight> {
    let mut insights = Vec::new();
    if records.is_empty() {
        return insights;
    }

    let rates = success_by_quadrant(records);
    let best = rates.iter().max_by(|a, b| a.1.total_cmp(b.1));
    let worst = rates.iter().min_by(|a, b| a.1.total_cmp(b.1));
    if let (Some((best_q, best_rate)), Some((_, worst_rate))) = (best, worst) {
        if *best_rate > 0.5 && best_rate - worst_rate >= 0.2 {
            insights.push(LearningInsight {
                insight_id: format!("insight_q_perf_{}", Utc::now().format("%Y%m%d")),
                insight_type: "quadrant_optimization".to_string(),
                description: format!(
                    "{} quadrant showing highest success rate ({:.0}%). Increasing its signal weights.",
                    best_q,
                    best_rate * 100.0
                ),
                confidence: 0.75,
                evidence: records
                    .iter()
                    .filter(|r| r.source_quadrant == *best_q)
                    .take(5)
                    .map(|r| r.feedback_id.clone())
                    .collect(),
                recommended_action: LearningAction::UpdateWeights {
                    quadrant: *best_q,
                    weight_adjustment: 1.2,
                },
                generated_at: Utc::now(),
            });
        }
    }

    let high_engagement: Vec<&FeedbackRecord> = records
        .iter()
        .filter(|r| r.metric("engagement_rate").unwrap_or(0.0) > 0.08)
        .collect();
    if high_engagement.len() as f64 > records.len() as f64 * 0.3 {
        insights.push(LearningInsight {
            insight_id: format!("insight_engagement_{}", Utc::now().format("%Y%m%d")),
            insight_type: "engagement_pattern".to_string(),
            description: "High-engagement content (>8%) correlates with better outcomes. \
                          Prioritizing high-engagement signal types."
                .to_string(),
            confidence: 0.7,
            evidence: high_engagement
                .iter()
                .take(5)
                .map(|r| r.feedback_id.clone())
                .collect(),
            recommended_action: LearningAction::AdjustThreshold {
                metric: "min_urgency_score".to_string(),
                new_threshold: 0.08,
            },
            generated_at: Utc::now(),
        });
    }

    insights
}

/// Single writer of the committed learning state
pub struct LearningEngine {
    shared_memory: Arc<SharedMemory>,
    state: RwLock<LearningState>,
}

impl LearningEngine {
    /// Load the committed state from shared memory, or start from defaults
    pub fn new(shared_memory: Arc<SharedMemory>) -> Self {
        let state = shared_memory
            .get_json::<LearningState>(LEARNING_STATE_KEY)
            .unwrap_or_default();
        Self {
            shared_memory,
            state: RwLock::new(state),
        }
    }

    /// Consistent snapshot of the current state
    pub fn snapshot(&self) -> LearningState {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Apply an insight, replacing the committed state atomically.
    ///
    /// Re-applying an insight id that was already applied is a no-op, so
    /// applying the same insight twice is idempotent. Returns whether the
    /// state changed.
    pub fn apply_insight(&self, insight: &LearningInsight) -> Result<bool> {
        let mut state = self
            .state
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;

        if state.was_applied(&insight.insight_id) {
            return Ok(false);
        }

        match &insight.recommended_action {
            LearningAction::AdjustThreshold { metric, new_threshold } => {
                state.p0_thresholds.insert(metric.clone(), *new_threshold);
                info!(metric, new_threshold, "adjusted learned threshold");
            }
            LearningAction::UpdateWeights { quadrant, weight_adjustment } => {
                state.scale_weights(*quadrant, *weight_adjustment);
                info!(quadrant = %quadrant, weight_adjustment, "scaled quadrant weights");
            }
        }

        state.mark_applied(&insight.insight_id);
        state.version += 1;
        state.last_updated = Utc::now();
        self.persist(&state)
    }

    /// Record an execution pattern into the bounded success/failure lists
    pub fn record_pattern(
        &self,
        quadrant: Quadrant,
        metrics: HashMap<String, serde_json::Value>,
        successful: bool,
    ) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        let version = state.version;
        state.record_pattern(
            PatternRecord {
                quadrant,
                metrics,
                recorded_at: Utc::now(),
                state_version: version,
            },
            successful,
        );
        self.persist(&state)?;
        Ok(())
    }

    fn persist(&self, state: &LearningState) -> Result<bool> {
        self.shared_memory.store_json(
            LEARNING_STATE_KEY,
            state,
            Some(Duration::days(FEEDBACK_TTL_DAYS)),
        )?;
        Ok(true)
    }
}

/// Wires the collector and engine into one feedback loop
pub struct FeedbackLoop {
    pub collector: FeedbackCollector,
    pub engine: LearningEngine,
}

impl FeedbackLoop {
    pub fn new(shared_memory: Arc<SharedMemory>) -> Self {
        Self {
            collector: FeedbackCollector::new(Arc::clone(&shared_memory)),
            engine: LearningEngine::new(shared_memory),
        }
    }

    /// Collect one record and, every `LEARNING_BATCH_SIZE` records, run the
    /// analysis pass and apply qualifying insights. Returns the applied
    /// insight, if any.
    pub fn collect_and_learn(
        &self,
        plan_id: &str,
        quadrant: Quadrant,
        metrics: HashMap<String, serde_json::Value>,
        qualitative_data: Vec<String>,
        outcome_value: f64,
    ) -> Result<Option<LearningInsight>> {
        self.collector
            .collect(plan_id, quadrant, metrics.clone(), qualitative_data, outcome_value)?;
        self.engine
            .record_pattern(quadrant, metrics, outcome_value > SUCCESS_OUTCOME_VALUE)?;

        if self.collector.total_collected() % LEARNING_BATCH_SIZE != 0 {
            return Ok(None);
        }

        let recent = self.collector.recent(Duration::hours(168), None);
        let mut applied = None;
        for insight in generate_insights(&recent) {
            if insight.confidence >= APPLY_CONFIDENCE {
                match self.engine.apply_insight(&insight) {
                    Ok(true) => {
                        info!(insight = %insight.insight_id, "applied learning insight");
                        applied = Some(insight);
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "failed to apply insight"),
                }
            }
        }
        Ok(applied)
    }
}
