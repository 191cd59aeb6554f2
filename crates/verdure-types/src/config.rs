//! Configuration types for the Verdure pipeline
//!
//! All tunables are enumerated here and validated at configuration time;
//! malformed values fail fast with `InvalidConfig` before anything runs.

use serde::{Deserialize, Serialize};

use crate::common::AgentId;
use crate::error::{Result, VerdureError};

/// Top-level configuration aggregate
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerdureConfig {
    pub orchestrator: OrchestratorConfig,
    pub scheduler: SchedulerJobConfig,
    pub evolution: EvolutionConfig,
    pub lifecycle: LifecycleConfig,
}

impl VerdureConfig {
    pub fn validate(&self) -> Result<()> {
        self.orchestrator.validate()?;
        self.scheduler.validate()?;
        self.evolution.validate()?;
        self.lifecycle.validate()?;
        Ok(())
    }
}

/// Daily sync orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Which P0 agents to fan out to (default: all four)
    pub agents_to_run: Vec<AgentId>,

    /// Enable cross-quadrant signal synthesis
    pub enable_cross_synthesis: bool,

    /// Signal retention in SharedMemory, hours (1-168)
    pub signal_ttl_hours: u32,

    /// Minimum confidence for synthesized signals (0-1)
    pub min_confidence_threshold: f64,

    /// Trigger the P1 judgment layer after synthesis
    pub enable_p1_trigger: bool,

    /// P1 agents to trigger
    pub p1_agents_to_trigger: Vec<AgentId>,

    /// Trigger the P2 relationship layer after P1
    pub enable_p2_trigger: bool,

    /// P2 agents to trigger
    pub p2_agents_to_trigger: Vec<AgentId>,

    /// Per-agent invocation timeout, seconds
    pub agent_timeout_secs: u64,

    /// How many completed sessions to retain in history
    pub session_history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agents_to_run: AgentId::P0_AGENTS.to_vec(),
            enable_cross_synthesis: true,
            signal_ttl_hours: 48,
            min_confidence_threshold: 0.7,
            enable_p1_trigger: true,
            p1_agents_to_trigger: AgentId::P1_AGENTS.to_vec(),
            enable_p2_trigger: true,
            p2_agents_to_trigger: AgentId::P2_AGENTS.to_vec(),
            agent_timeout_secs: 30,
            session_history_limit: 50,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=168).contains(&self.signal_ttl_hours) {
            return Err(VerdureError::InvalidConfig(format!(
                "signal_ttl_hours must be within 1-168, got {}",
                self.signal_ttl_hours
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence_threshold) {
            return Err(VerdureError::InvalidConfig(format!(
                "min_confidence_threshold must be within 0-1, got {}",
                self.min_confidence_threshold
            )));
        }
        if self.agent_timeout_secs == 0 {
            return Err(VerdureError::InvalidConfig(
                "agent_timeout_secs must be positive".to_string(),
            ));
        }
        for id in &self.agents_to_run {
            if id.layer() != crate::common::Layer::P0 {
                return Err(VerdureError::InvalidConfig(format!(
                    "agents_to_run accepts P0 agents only, got {}",
                    id
                )));
            }
        }
        Ok(())
    }
}

/// Per-job scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerJobConfig {
    /// 5-field cron expression: minute hour day-of-month month day-of-week
    pub cron_expression: String,

    /// IANA timezone name; currently informational, fires computed in UTC
    pub timezone: String,

    /// Retry attempts after a failed run
    pub max_retries: u32,

    /// Fixed delay between retries, minutes
    pub retry_delay_minutes: u64,

    /// Per-run timeout, minutes
    pub timeout_minutes: u64,
}

impl Default for SchedulerJobConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 6 * * *".to_string(),
            timezone: "UTC".to_string(),
            max_retries: 3,
            retry_delay_minutes: 30,
            timeout_minutes: 30,
        }
    }
}

impl SchedulerJobConfig {
    pub fn validate(&self) -> Result<()> {
        validate_cron_fields(&self.cron_expression)?;
        if self.timeout_minutes == 0 {
            return Err(VerdureError::InvalidConfig(
                "timeout_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validate that a cron expression uses exactly five fields.
///
/// Six-field (seconds-first) expressions are rejected; the scheduler owns
/// the seconds field internally.
pub fn validate_cron_fields(expression: &str) -> Result<()> {
    let fields = expression.split_whitespace().count();
    if fields != 5 {
        return Err(VerdureError::InvalidConfig(format!(
            "cron expression must have 5 fields (minute hour dom month dow), got {}: '{}'",
            fields, expression
        )));
    }
    Ok(())
}

/// When the evolution engine runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionScheduleType {
    Daily,
    Weekly,
    Feedback,
    Manual,
}

/// Strategy evolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    pub schedule_type: EvolutionScheduleType,

    /// Run after this many new feedback records (feedback-driven mode)
    pub feedback_threshold: usize,

    /// Generations evolved per scheduled run
    pub max_generations_per_run: u32,

    /// Deploy medium-confidence strategies without operator confirmation
    pub enable_auto_deploy: bool,

    /// Minimum fitness considered for any deployment
    pub min_fitness_for_deploy: f64,

    /// Strategies per population
    pub population_size: usize,

    /// Per-gene mutation probability
    pub mutation_rate: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            schedule_type: EvolutionScheduleType::Weekly,
            feedback_threshold: 50,
            max_generations_per_run: 5,
            enable_auto_deploy: false,
            min_fitness_for_deploy: 0.7,
            population_size: 10,
            mutation_rate: 0.2,
        }
    }
}

impl EvolutionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.population_size < 3 {
            return Err(VerdureError::InvalidConfig(format!(
                "population_size must be at least 3, got {}",
                self.population_size
            )));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(VerdureError::InvalidConfig(format!(
                "mutation_rate must be within 0-1, got {}",
                self.mutation_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.min_fitness_for_deploy) {
            return Err(VerdureError::InvalidConfig(format!(
                "min_fitness_for_deploy must be within 0-1, got {}",
                self.min_fitness_for_deploy
            )));
        }
        Ok(())
    }
}

/// Data lifecycle tiering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Days without access before HOT demotes to WARM
    pub retention_hot_days: i64,

    /// Days without access before WARM demotes to COLD
    pub retention_warm_days: i64,

    /// Days without access before COLD demotes to FROZEN
    pub retention_cold_days: i64,

    /// Global retention horizon; records older are purged
    pub retention_horizon_days: i64,

    /// Compression codec label applied on HOT -> WARM
    pub compression_warm: String,

    /// Compression codec label applied on WARM -> COLD
    pub compression_cold: String,

    /// Meridian queue depth triggering a backpressure alert
    pub backpressure_threshold: u64,

    /// Meridian error rate (fraction) triggering an alert
    pub error_rate_threshold: f64,

    /// Meridian latency in milliseconds triggering an alert
    pub latency_threshold_ms: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retention_hot_days: 7,
            retention_warm_days: 30,
            retention_cold_days: 365,
            retention_horizon_days: 2555,
            compression_warm: "lz4".to_string(),
            compression_cold: "zstd".to_string(),
            backpressure_threshold: 1000,
            error_rate_threshold: 0.01,
            latency_threshold_ms: 1000.0,
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retention_hot_days >= self.retention_warm_days
            || self.retention_warm_days >= self.retention_cold_days
            || self.retention_cold_days >= self.retention_horizon_days
        {
            return Err(VerdureError::InvalidConfig(
                "retention durations must be strictly increasing hot < warm < cold < horizon"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(VerdureConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_six_field_cron() {
        let mut cfg = SchedulerJobConfig::default();
        cfg.cron_expression = "0 0 6 * * *".to_string();
        assert!(matches!(
            cfg.validate(),
            Err(VerdureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_ttl() {
        let mut cfg = OrchestratorConfig::default();
        cfg.signal_ttl_hours = 200;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_p0_agents_to_run() {
        let mut cfg = OrchestratorConfig::default();
        cfg.agents_to_run = vec![AgentId::Q1P1];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_retention() {
        let mut cfg = LifecycleConfig::default();
        cfg.retention_warm_days = 3;
        assert!(cfg.validate().is_err());
    }
}
