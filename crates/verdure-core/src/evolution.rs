//! Evolvable strategy genes, populations' member type, and evolution reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use verdure_types::Quadrant;

/// A single configurable strategy parameter under evolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyGene {
    pub gene_id: String,
    /// Name of the agent parameter this gene controls
    pub parameter: String,
    pub value: f64,
    /// Bounds on one mutation step, scaled by mutation intensity
    pub mutation_range: (f64, f64),
    pub fitness_score: f64,
    pub generation: u32,
}

impl StrategyGene {
    pub fn new(gene_id: impl Into<String>, parameter: impl Into<String>, value: f64, mutation_range: (f64, f64)) -> Self {
        Self {
            gene_id: gene_id.into(),
            parameter: parameter.into(),
            value,
            mutation_range,
            fitness_score: 0.0,
            generation: 0,
        }
    }
}

/// A complete strategy for one agent kind: a set of genes plus its record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStrategy {
    pub strategy_id: String,
    /// Agent kind this strategy parameterizes, e.g. `pain_scanner`
    pub agent_type: String,
    pub quadrant: Quadrant,
    pub genes: Vec<StrategyGene>,
    pub fitness_score: f64,
    pub success_count: u32,
    pub failure_count: u32,
    pub parent_strategy_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AgentStrategy {
    pub fn total_trials(&self) -> u32 {
        self.success_count + self.failure_count
    }

    /// Parameter map suitable for deployment into shared memory
    pub fn parameters(&self) -> serde_json::Map<String, serde_json::Value> {
        self.genes
            .iter()
            .map(|g| (g.parameter.clone(), serde_json::json!(g.value)))
            .collect()
    }
}

/// Deployment confidence band derived from fitness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployConfidence {
    High,
    Medium,
}

impl DeployConfidence {
    pub fn from_fitness(fitness: f64) -> Self {
        if fitness > 0.8 {
            DeployConfidence::High
        } else {
            DeployConfidence::Medium
        }
    }
}

/// A strategy proposed for deployment after an evolution cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecommendation {
    /// Population key, e.g. `pain_scanner_Q1`
    pub agent: String,
    pub strategy_id: String,
    pub fitness: f64,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub confidence: DeployConfidence,
}

/// Record of one meta-learning adjustment between cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaLearningRecord {
    pub record_id: String,
    pub iteration: u32,
    pub target_metric: String,
    pub before_value: f64,
    pub after_value: f64,
    pub improvement_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// Report generated by one evolution cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionReport {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    pub generation: u32,
    pub strategies_evaluated: usize,
    pub strategies_selected: usize,
    pub fitness_improvement: f64,
    /// Population-key / best-strategy summaries for this cycle
    pub key_mutations: Vec<String>,
    pub deployment_recommendations: Vec<DeploymentRecommendation>,
    pub meta_learnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_bands() {
        assert_eq!(DeployConfidence::from_fitness(0.85), DeployConfidence::High);
        assert_eq!(DeployConfidence::from_fitness(0.8), DeployConfidence::Medium);
        assert_eq!(DeployConfidence::from_fitness(0.65), DeployConfidence::Medium);
    }

    #[test]
    fn strategy_parameters_map() {
        let strategy = AgentStrategy {
            strategy_id: "s1".to_string(),
            agent_type: "pain_scanner".to_string(),
            quadrant: Quadrant::Q1,
            genes: vec![StrategyGene::new("g1", "urgency_threshold", 60.0, (-10.0, 10.0))],
            fitness_score: 0.0,
            success_count: 0,
            failure_count: 0,
            parent_strategy_id: None,
            created_at: Utc::now(),
        };
        let params = strategy.parameters();
        assert_eq!(params["urgency_threshold"], serde_json::json!(60.0));
    }
}
