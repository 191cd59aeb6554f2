//! P3 strategy evolution
//!
//! Maintains one population per evolvable agent kind, runs genetic cycles
//! against feedback-derived fitness, and deploys the winners into shared
//! memory where the orchestrator merges them into agent configs.

pub mod population;

pub use population::{gene_templates, StrategyPopulation};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use verdure_core::{DeployConfidence, DeploymentRecommendation, EvolutionReport};
use verdure_infra::SharedMemory;
use verdure_types::{EvolutionConfig, Quadrant, Result};

use crate::orchestrator::DeployedConfig;

/// Fitness floor for any deployment recommendation
const RECOMMEND_FITNESS: f64 = 0.6;

/// TTL for deployed configs
const DEPLOY_TTL_DAYS: i64 = 30;

/// TTL for stored evolution reports
const REPORT_TTL_DAYS: i64 = 90;

/// The evolvable agent kinds and their quadrants
const EVOLVABLE_AGENTS: [(&str, Quadrant); 8] = [
    ("pain_scanner", Quadrant::Q1),
    ("emotion_watcher", Quadrant::Q2),
    ("trend_hunter", Quadrant::Q3),
    ("scene_discover", Quadrant::Q4),
    ("trust_builder", Quadrant::Q1),
    ("community_binder", Quadrant::Q2),
    ("viral_engine", Quadrant::Q3),
    ("influence_network", Quadrant::Q4),
];

/// Owns every strategy population; external readers only ever see the
/// deployed snapshots under `p3:deployed_config:*`
pub struct EvolutionEngine {
    config: EvolutionConfig,
    shared_memory: Arc<SharedMemory>,
    populations: HashMap<String, StrategyPopulation>,
    generation: u32,
    rng: StdRng,
}

impl EvolutionEngine {
    pub fn new(config: EvolutionConfig, shared_memory: Arc<SharedMemory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shared_memory,
            populations: HashMap::new(),
            generation: 0,
            rng: StdRng::from_entropy(),
        })
    }

    /// Deterministic RNG variant for tests
    pub fn with_seed(config: EvolutionConfig, shared_memory: Arc<SharedMemory>, seed: u64) -> Result<Self> {
        let mut engine = Self::new(config, shared_memory)?;
        engine.rng = StdRng::seed_from_u64(seed);
        Ok(engine)
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Seed populations for every evolvable agent kind
    pub fn initialize_populations(&mut self) {
        for (agent_type, quadrant) in EVOLVABLE_AGENTS {
            let mut population =
                StrategyPopulation::new(agent_type, quadrant, self.config.population_size);
            population.initialize(&mut self.rng);
            self.populations.insert(population.key(), population);
        }
        info!(count = self.populations.len(), "initialized strategy populations");
    }

    pub fn population(&self, key: &str) -> Option<&StrategyPopulation> {
        self.populations.get(key)
    }

    pub fn population_mut(&mut self, key: &str) -> Option<&mut StrategyPopulation> {
        self.populations.get_mut(key)
    }

    /// Run one evolution cycle: evaluate, evolve one generation per
    /// population, store the report, and auto-deploy qualifying winners.
    pub fn run_cycle(&mut self, base_success_rate: f64) -> Result<EvolutionReport> {
        self.generation += 1;
        let started_at = Utc::now();

        let fitness_before = self.average_best_fitness();
        let mut strategies_evaluated = 0;
        let mut key_mutations = Vec::new();

        let mut keys: Vec<String> = self.populations.keys().cloned().collect();
        keys.sort();
        for key in &keys {
            let Some(population) = self.populations.get_mut(key) else {
                continue;
            };
            population.evaluate_fitness(base_success_rate, &mut self.rng);
            strategies_evaluated += population.strategies.len();
            population.evolve_generation(self.config.mutation_rate, &mut self.rng);

            if let Some(best) = population.best_strategy() {
                if best.fitness_score > RECOMMEND_FITNESS {
                    key_mutations.push(format!(
                        "{}: {} (fitness {:.2})",
                        key, best.strategy_id, best.fitness_score
                    ));
                }
            }
        }

        let recommendations = self.deployment_recommendations();
        let strategies_selected = recommendations.len();
        let fitness_after = self.average_best_fitness();

        let report = EvolutionReport {
            report_id: format!("evo_{}", started_at.format("%Y%m%d%H%M%S")),
            generated_at: started_at,
            generation: self.generation,
            strategies_evaluated,
            strategies_selected,
            fitness_improvement: fitness_after - fitness_before,
            key_mutations,
            deployment_recommendations: recommendations,
            meta_learnings: vec![format!(
                "base success rate fed into fitness: {:.2}",
                base_success_rate
            )],
        };

        self.shared_memory.store_json(
            &format!("p3:evolution_report:{}", report.report_id),
            &report,
            Some(Duration::days(REPORT_TTL_DAYS)),
        )?;

        let deployed = self.deploy(&report)?;
        info!(
            generation = self.generation,
            evaluated = strategies_evaluated,
            deployed,
            "completed evolution cycle"
        );
        Ok(report)
    }

    fn average_best_fitness(&self) -> f64 {
        if self.populations.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .populations
            .values()
            .filter_map(|p| p.best_strategy().map(|s| s.fitness_score))
            .sum();
        total / self.populations.len() as f64
    }

    /// Strategies above the recommendation floor, strongest first
    pub fn deployment_recommendations(&self) -> Vec<DeploymentRecommendation> {
        let mut recommendations: Vec<DeploymentRecommendation> = self
            .populations
            .values()
            .filter_map(|population| {
                population.best_strategy().and_then(|best| {
                    if best.fitness_score > RECOMMEND_FITNESS {
                        Some(DeploymentRecommendation {
                            agent: population.key(),
                            strategy_id: best.strategy_id.clone(),
                            fitness: best.fitness_score,
                            parameters: best.parameters(),
                            confidence: DeployConfidence::from_fitness(best.fitness_score),
                        })
                    } else {
                        None
                    }
                })
            })
            .collect();
        recommendations.sort_by(|a, b| {
            b.fitness
                .total_cmp(&a.fitness)
                .then_with(|| a.agent.cmp(&b.agent))
        });
        recommendations
    }

    /// Deploy qualifying strategies to shared memory.
    ///
    /// High-confidence winners deploy automatically; medium ones only when
    /// auto-deploy is enabled and they clear the configured fitness floor.
    /// Everything else waits for `deploy_candidate`.
    fn deploy(&self, report: &EvolutionReport) -> Result<usize> {
        let mut deployed = 0;
        for rec in &report.deployment_recommendations {
            let auto = match rec.confidence {
                DeployConfidence::High => true,
                DeployConfidence::Medium => {
                    self.config.enable_auto_deploy
                        && rec.fitness >= self.config.min_fitness_for_deploy
                }
            };
            if auto {
                self.deploy_recommendation(rec)?;
                deployed += 1;
            }
        }
        Ok(deployed)
    }

    /// Operator confirmation path for medium-confidence strategies
    pub fn deploy_candidate(&self, agent_key: &str) -> Result<DeploymentRecommendation> {
        let rec = self
            .deployment_recommendations()
            .into_iter()
            .find(|r| r.agent == agent_key)
            .ok_or_else(|| {
                verdure_types::VerdureError::NotFound(format!(
                    "no deployable strategy for {}",
                    agent_key
                ))
            })?;
        self.deploy_recommendation(&rec)?;
        Ok(rec)
    }

    fn deploy_recommendation(&self, rec: &DeploymentRecommendation) -> Result<()> {
        let config = DeployedConfig {
            parameters: rec.parameters.clone(),
            strategy_id: rec.strategy_id.clone(),
            fitness: rec.fitness,
            deployed_at: Utc::now(),
        };
        self.shared_memory.store_json(
            &format!("p3:deployed_config:{}", rec.agent),
            &config,
            Some(Duration::days(DEPLOY_TTL_DAYS)),
        )?;
        info!(agent = %rec.agent, strategy = %rec.strategy_id, "deployed evolved strategy");
        Ok(())
    }

    /// Stored report lookup for the manual API
    pub fn report(&self, report_id: &str) -> Result<EvolutionReport> {
        self.shared_memory
            .get_json(&format!("p3:evolution_report:{}", report_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EvolutionEngine {
        let mut engine = EvolutionEngine::with_seed(
            EvolutionConfig::default(),
            Arc::new(SharedMemory::new()),
            42,
        )
        .unwrap();
        engine.initialize_populations();
        engine
    }

    #[test]
    fn populations_cover_all_evolvable_agents() {
        let engine = engine();
        assert_eq!(engine.populations.len(), 8);
        assert!(engine.population("pain_scanner_Q1").is_some());
        assert!(engine.population("influence_network_Q4").is_some());
        for population in engine.populations.values() {
            assert_eq!(population.strategies.len(), 10);
        }
    }

    #[test]
    fn cycle_increments_generation_and_stores_report() {
        let mut engine = engine();
        let report = engine.run_cycle(0.9).unwrap();

        assert_eq!(report.generation, 1);
        assert_eq!(report.strategies_evaluated, 80);
        assert_eq!(engine.generation(), 1);

        let stored = engine.report(&report.report_id).unwrap();
        assert_eq!(stored.generation, 1);
    }

    #[test]
    fn high_fitness_strategies_auto_deploy() {
        let mut engine = engine();
        // Give one population a proven winner
        {
            let population = engine.population_mut("pain_scanner_Q1").unwrap();
            population.strategies[0].success_count = 10;
            population.strategies[0].failure_count = 0;
        }
        engine.run_cycle(0.95).unwrap();

        // Fitness 0.95 > 0.8, so the deployment landed in shared memory
        let deployed: DeployedConfig = engine
            .shared_memory
            .get_json("p3:deployed_config:pain_scanner_Q1")
            .unwrap();
        assert!(deployed.fitness > 0.8);
        assert!(deployed.parameters.contains_key("urgency_threshold"));
    }

    #[test]
    fn medium_fitness_needs_manual_confirmation() {
        let mut config = EvolutionConfig::default();
        config.enable_auto_deploy = false;
        let mut engine =
            EvolutionEngine::with_seed(config, Arc::new(SharedMemory::new()), 42).unwrap();
        engine.initialize_populations();
        {
            let population = engine.population_mut("trend_hunter_Q3").unwrap();
            // 7/10 at base 1.0 gives fitness 0.7: medium confidence
            population.strategies[0].success_count = 7;
            population.strategies[0].failure_count = 3;
            for strategy in &mut population.strategies[1..] {
                strategy.success_count = 1;
                strategy.failure_count = 9;
            }
        }
        engine.run_cycle(1.0).unwrap();

        // Not auto-deployed
        assert!(engine
            .shared_memory
            .get_json::<DeployedConfig>("p3:deployed_config:trend_hunter_Q3")
            .is_err());

        // Manual confirmation deploys it
        let rec = engine.deploy_candidate("trend_hunter_Q3").unwrap();
        assert_eq!(rec.confidence, DeployConfidence::Medium);
        assert!(engine
            .shared_memory
            .get_json::<DeployedConfig>("p3:deployed_config:trend_hunter_Q3")
            .is_ok());
    }
}
