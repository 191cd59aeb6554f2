//! Data lineage, tier metadata, and the repository trait backing them

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use verdure_types::{DataTier, Result, SourceType, TriggerStatus};

/// Provenance and tier metadata of a single produced data item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLineage {
    pub data_id: String,
    /// Producer id that generated the item
    pub source: String,
    pub source_type: SourceType,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub current_tier: DataTier,
    /// Ids of items this one was derived from
    pub dependencies: Vec<String>,
    /// Ids of items derived from this one
    pub consumers: Vec<String>,
    pub quality_score: Option<f64>,
    pub schema_version: String,
}

impl DataLineage {
    pub fn new(data_id: impl Into<String>, source: impl Into<String>, source_type: SourceType) -> Self {
        let now = Utc::now();
        Self {
            data_id: data_id.into(),
            source: source.into(),
            source_type,
            created_at: now,
            last_accessed: now,
            current_tier: DataTier::Hot,
            dependencies: Vec::new(),
            consumers: Vec::new(),
            quality_score: None,
            schema_version: "default".to_string(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }
}

/// Point-in-time metrics snapshot for one meridian
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeridianMetrics {
    pub meridian_id: String,
    pub timestamp: DateTime<Utc>,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub queue_size: u64,
    pub blockages: u64,
    pub throughput_per_sec: f64,
    pub latency_ms: f64,
    /// Fraction of deliveries that errored, 0-1
    pub error_rate: f64,
}

/// One scheduled execution of a trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub execution_id: String,
    pub trigger_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: TriggerStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    pub outcome_summary: Option<serde_json::Value>,
}

impl TriggerRecord {
    pub fn scheduled(execution_id: impl Into<String>, trigger_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            trigger_id: trigger_id.into(),
            scheduled_time: Utc::now(),
            started_at: None,
            completed_at: None,
            status: TriggerStatus::Pending,
            retry_count: 0,
            error: None,
            outcome_summary: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// One failed quality rule for a data item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub rule: String,
    pub score: f64,
    pub threshold: f64,
    pub auto_repairable: bool,
}

/// Quality assessment of a data item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub data_id: String,
    pub overall_score: f64,
    pub checks: Vec<(String, f64)>,
    pub issues: Vec<QualityIssue>,
    pub timestamp: DateTime<Utc>,
}

/// Persistent state of one pipeline cell (scheduled unit of work)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellState {
    pub skill_id: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: i64,
    pub success_count: i64,
    pub fail_count: i64,
    pub avg_duration_ms: Option<f64>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub config: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// Persistent state of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub name: String,
    pub status: String,
    pub energy_level: f64,
    pub stress_level: f64,
    pub tasks_completed: i64,
    pub tasks_failed: i64,
    pub avg_response_time_ms: Option<f64>,
    pub last_executed: Option<DateTime<Utc>>,
    pub skill_states: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Counts used by the `/data/health` surface
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LineageHealth {
    pub tier_distribution: Vec<(DataTier, i64)>,
    pub cell_state_counts: Vec<(String, i64)>,
    pub agent_status_counts: Vec<(String, i64)>,
    pub recent_trigger_success: i64,
    pub recent_trigger_failure: i64,
}

/// Repository abstraction over the relational store.
///
/// Implementations must be transactional per record; repeated application
/// of the same transition is harmless (idempotent retries are expected
/// during cleanup).
#[async_trait::async_trait]
pub trait LineageRepository: Send + Sync {
    async fn register(&self, lineage: &DataLineage) -> Result<()>;

    async fn get(&self, data_id: &str) -> Result<Option<DataLineage>>;

    /// Records in `tier` whose last access is older than `older_than`
    async fn find_stale(&self, tier: DataTier, older_than: Duration) -> Result<Vec<DataLineage>>;

    /// Move a record to a new tier, refreshing its last-access time
    async fn update_tier(&self, data_id: &str, new_tier: DataTier) -> Result<()>;

    /// Refresh last-access on read
    async fn touch(&self, data_id: &str) -> Result<()>;

    /// Hard-delete records past the retention horizon; returns purge count
    async fn cleanup_expired(&self, retention: Duration) -> Result<u64>;

    /// Most recently created records, newest first
    async fn recent(&self, limit: i64) -> Result<Vec<DataLineage>>;

    async fn record_meridian_metrics(&self, metrics: &MeridianMetrics) -> Result<()>;

    async fn latest_meridian_metrics(&self, meridian_id: &str) -> Result<Option<MeridianMetrics>>;

    async fn record_trigger(&self, record: &TriggerRecord) -> Result<()>;

    async fn upsert_cell_state(&self, state: &CellState) -> Result<()>;

    async fn upsert_agent_state(&self, state: &AgentState) -> Result<()>;

    async fn health(&self) -> Result<LineageHealth>;
}
