//! Strategy populations and the genetic step
//!
//! Each evolvable agent kind owns a fixed-size population of parameter
//! strategies. A generation evaluates fitness, carries the top two over
//! unchanged, and fills the rest with mutated offspring of
//! tournament-selected parents.

use chrono::Utc;
use rand::Rng;
use tracing::info;

use verdure_core::{AgentStrategy, StrategyGene};
use verdure_types::Quadrant;

/// Elite strategies carried over unchanged each generation
const ELITE_COUNT: usize = 2;

/// Tournament size for parent selection
const TOURNAMENT_SIZE: usize = 3;

/// Scale applied to a gene's mutation range per step
const MUTATION_INTENSITY: f64 = 0.1;

/// Jitter applied to gene values when seeding a population
const INIT_JITTER: f64 = 0.1;

/// Declarative gene templates per agent kind
pub fn gene_templates(agent_type: &str) -> Vec<StrategyGene> {
    match agent_type {
        "pain_scanner" => vec![
            StrategyGene::new("urgency_threshold", "urgency_threshold", 60.0, (-10.0, 10.0)),
            StrategyGene::new("emotion_weight", "emotion_weight", 0.3, (-0.1, 0.1)),
            StrategyGene::new("recency_decay", "recency_decay", 24.0, (-6.0, 6.0)),
        ],
        "trend_hunter" => vec![
            StrategyGene::new("velocity_threshold", "velocity_threshold", 70.0, (-15.0, 15.0)),
            StrategyGene::new("novelty_weight", "novelty_weight", 0.4, (-0.15, 0.15)),
            StrategyGene::new("window_size", "window_size", 48.0, (-12.0, 12.0)),
        ],
        "trust_builder" => vec![
            StrategyGene::new("trust_threshold", "trust_threshold", 3.0, (-1.0, 1.0)),
            StrategyGene::new("offer_timing", "offer_timing_days", 7.0, (-2.0, 2.0)),
            StrategyGene::new("content_depth", "content_depth", 4.0, (-1.0, 1.0)),
        ],
        _ => vec![
            StrategyGene::new("sensitivity", "detection_sensitivity", 0.7, (-0.2, 0.2)),
            StrategyGene::new("priority_weight", "priority_score_weight", 0.5, (-0.15, 0.15)),
        ],
    }
}

/// Create a mutated copy of a gene
fn mutate_gene<R: Rng>(gene: &StrategyGene, rng: &mut R) -> StrategyGene {
    let (low, high) = gene.mutation_range;
    let delta = rng.gen_range((low * MUTATION_INTENSITY)..=(high * MUTATION_INTENSITY));
    StrategyGene {
        gene_id: format!("{}_gen{}", gene.gene_id, gene.generation + 1),
        parameter: gene.parameter.clone(),
        value: gene.value + delta,
        mutation_range: gene.mutation_range,
        fitness_score: 0.0,
        generation: gene.generation + 1,
    }
}

/// Create a mutated variant of a strategy; each gene mutates independently
/// with probability `mutation_rate`
fn mutate_strategy<R: Rng>(
    parent: &AgentStrategy,
    strategy_id: String,
    mutation_rate: f64,
    rng: &mut R,
) -> AgentStrategy {
    let genes = parent
        .genes
        .iter()
        .map(|gene| {
            if rng.gen::<f64>() < mutation_rate {
                mutate_gene(gene, rng)
            } else {
                gene.clone()
            }
        })
        .collect();

    AgentStrategy {
        strategy_id,
        agent_type: parent.agent_type.clone(),
        quadrant: parent.quadrant,
        genes,
        fitness_score: 0.0,
        success_count: 0,
        failure_count: 0,
        parent_strategy_id: Some(parent.strategy_id.clone()),
        created_at: Utc::now(),
    }
}

/// A fixed-size population of strategies for one agent kind
pub struct StrategyPopulation {
    pub agent_type: String,
    pub quadrant: Quadrant,
    pub population_size: usize,
    pub strategies: Vec<AgentStrategy>,
    pub generation: u32,
}

impl StrategyPopulation {
    pub fn new(agent_type: &str, quadrant: Quadrant, population_size: usize) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            quadrant,
            population_size,
            strategies: Vec::new(),
            generation: 0,
        }
    }

    /// Population key used for deployment, e.g. `pain_scanner_Q1`
    pub fn key(&self) -> String {
        format!("{}_{}", self.agent_type, self.quadrant)
    }

    /// Seed the initial population by jittering the gene templates
    pub fn initialize<R: Rng>(&mut self, rng: &mut R) {
        let templates = gene_templates(&self.agent_type);
        self.strategies = (0..self.population_size)
            .map(|i| {
                let genes = templates
                    .iter()
                    .map(|template| StrategyGene {
                        gene_id: format!("gene_{}_{}", i, template.parameter),
                        parameter: template.parameter.clone(),
                        value: template.value + rng.gen_range(-INIT_JITTER..=INIT_JITTER),
                        mutation_range: template.mutation_range,
                        fitness_score: 0.0,
                        generation: 0,
                    })
                    .collect();
                AgentStrategy {
                    strategy_id: format!("strategy_{}_gen0_{}", self.key(), i),
                    agent_type: self.agent_type.clone(),
                    quadrant: self.quadrant,
                    genes,
                    fitness_score: 0.0,
                    success_count: 0,
                    failure_count: 0,
                    parent_strategy_id: None,
                    created_at: Utc::now(),
                }
            })
            .collect();
        info!(
            population = %self.key(),
            size = self.population_size,
            "initialized strategy population"
        );
    }

    /// Fitness is the success ratio scaled by the system-wide base success
    /// rate; untried strategies get the base rate with exploration noise
    pub fn evaluate_fitness<R: Rng>(&mut self, base_success_rate: f64, rng: &mut R) {
        for strategy in &mut self.strategies {
            let total = strategy.total_trials();
            strategy.fitness_score = if total > 0 {
                (strategy.success_count as f64 / total as f64) * base_success_rate
            } else {
                base_success_rate * rng.gen_range(0.8..=1.2)
            };
            for gene in &mut strategy.genes {
                gene.fitness_score = strategy.fitness_score;
            }
        }
    }

    fn sorted_by_fitness(&self) -> Vec<&AgentStrategy> {
        let mut sorted: Vec<&AgentStrategy> = self.strategies.iter().collect();
        sorted.sort_by(|a, b| {
            b.fitness_score
                .total_cmp(&a.fitness_score)
                .then_with(|| a.strategy_id.cmp(&b.strategy_id))
        });
        sorted
    }

    fn tournament_select<'a, R: Rng>(&'a self, rng: &mut R) -> &'a AgentStrategy {
        let mut best: Option<&AgentStrategy> = None;
        for _ in 0..TOURNAMENT_SIZE {
            let candidate = &self.strategies[rng.gen_range(0..self.strategies.len())];
            best = match best {
                Some(current) if current.fitness_score >= candidate.fitness_score => Some(current),
                _ => Some(candidate),
            };
        }
        best.unwrap_or(&self.strategies[0])
    }

    /// Advance one generation: top-two elitism plus tournament offspring
    pub fn evolve_generation<R: Rng>(&mut self, mutation_rate: f64, rng: &mut R) {
        if self.strategies.is_empty() {
            return;
        }

        let next_generation = self.generation + 1;
        let mut new_strategies: Vec<AgentStrategy> = self
            .sorted_by_fitness()
            .into_iter()
            .take(ELITE_COUNT)
            .cloned()
            .collect();

        let mut offspring_index = 0;
        while new_strategies.len() < self.population_size {
            let parent = self.tournament_select(rng);
            let strategy_id = format!(
                "strategy_{}_gen{}_{}",
                self.key(),
                next_generation,
                offspring_index
            );
            new_strategies.push(mutate_strategy(parent, strategy_id, mutation_rate, rng));
            offspring_index += 1;
        }

        self.strategies = new_strategies;
        self.generation = next_generation;
        info!(population = %self.key(), generation = self.generation, "evolved generation");
    }

    pub fn best_strategy(&self) -> Option<&AgentStrategy> {
        self.sorted_by_fitness().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn population_with_fitness() -> (StrategyPopulation, StdRng) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut population = StrategyPopulation::new("pain_scanner", Quadrant::Q1, 10);
        population.initialize(&mut rng);
        // Deterministic per-strategy trial history
        for (i, strategy) in population.strategies.iter_mut().enumerate() {
            strategy.success_count = i as u32;
            strategy.failure_count = 10 - i as u32;
        }
        population.evaluate_fitness(1.0, &mut rng);
        (population, rng)
    }

    #[test]
    fn fitness_follows_success_ratio() {
        let (population, _) = population_with_fitness();
        for (i, strategy) in population.strategies.iter().enumerate() {
            let expected = i as f64 / 10.0;
            assert!((strategy.fitness_score - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_mutation_rate_copies_parents_and_keeps_elite() {
        let (mut population, mut rng) = population_with_fitness();
        let previous: Vec<AgentStrategy> = population.strategies.clone();
        let elite_ids: Vec<String> = {
            let mut sorted = previous.clone();
            sorted.sort_by(|a, b| b.fitness_score.total_cmp(&a.fitness_score));
            sorted.iter().take(2).map(|s| s.strategy_id.clone()).collect()
        };

        population.evolve_generation(0.0, &mut rng);

        assert_eq!(population.generation, 1);
        assert_eq!(population.strategies.len(), 10);

        // Top two carried over unchanged
        assert_eq!(population.strategies[0].strategy_id, elite_ids[0]);
        assert_eq!(population.strategies[1].strategy_id, elite_ids[1]);

        // The remaining eight are exact gene copies of some previous parent
        for offspring in &population.strategies[2..] {
            let parent_id = offspring.parent_strategy_id.as_ref().expect("offspring has parent");
            let parent = previous
                .iter()
                .find(|s| &s.strategy_id == parent_id)
                .expect("parent exists in previous generation");
            for (child_gene, parent_gene) in offspring.genes.iter().zip(parent.genes.iter()) {
                assert_eq!(child_gene.value, parent_gene.value);
                assert_eq!(child_gene.parameter, parent_gene.parameter);
            }
        }
    }

    #[test]
    fn mutation_stays_within_scaled_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let gene = StrategyGene::new("g", "urgency_threshold", 60.0, (-10.0, 10.0));
        for _ in 0..100 {
            let mutated = mutate_gene(&gene, &mut rng);
            assert!((mutated.value - gene.value).abs() <= 10.0 * MUTATION_INTENSITY + 1e-9);
            assert_eq!(mutated.generation, 1);
        }
    }

    #[test]
    fn untried_strategies_get_exploration_fitness() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut population = StrategyPopulation::new("viral_engine", Quadrant::Q3, 5);
        population.initialize(&mut rng);
        population.evaluate_fitness(0.5, &mut rng);
        for strategy in &population.strategies {
            assert!(strategy.fitness_score >= 0.5 * 0.8 - 1e-9);
            assert!(strategy.fitness_score <= 0.5 * 1.2 + 1e-9);
        }
    }

    #[test]
    fn generic_agent_kinds_fall_back_to_default_genes() {
        let genes = gene_templates("community_binder");
        assert_eq!(genes.len(), 2);
        assert_eq!(genes[0].parameter, "detection_sensitivity");
    }
}
