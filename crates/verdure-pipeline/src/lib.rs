//! Verdure pipeline: the agent orchestration kernel
//!
//! Houses the five-layer cognitive pipeline: perception, judgment, and
//! relationship agents, cross-quadrant synthesis, the feedback/learning
//! loop, strategy evolution, the data-lifecycle tier manager, and the cron
//! scheduler that drives them.

pub mod agents;
pub mod deps;
pub mod evolution;
pub mod learning;
pub mod lifecycle;
pub mod orchestrator;
pub mod scheduler;

pub use agents::{AgentRegistry, LayerAgent};
pub use deps::{register_all, Deps};
pub use evolution::EvolutionEngine;
pub use learning::{FeedbackCollector, FeedbackLoop, LearningEngine};
pub use lifecycle::DataLifecycleAgent;
pub use orchestrator::Orchestrator;
pub use scheduler::{JobFactory, Scheduler};
