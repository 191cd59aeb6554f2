//! Database infrastructure
//!
//! Connection management and schema bootstrap for the relational store.

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use verdure_types::{Result, VerdureError};

/// Database connection manager
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Create a new database manager with SQLite
    pub async fn new(database_url: &str) -> Result<Self> {
        // An in-memory database exists per connection, so it must be
        // pinned to a single pooled connection to stay coherent
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new().max_connections(1)
        } else {
            SqlitePoolOptions::new()
        };
        let pool = options
            .connect(database_url)
            .await
            .map_err(|e| VerdureError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

        Ok(Self { pool })
    }

    /// Create a new in-memory database for testing
    pub async fn new_in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Create a new file-based database
    pub async fn new_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let database_url = format!("sqlite:{}", path.as_ref().display());
        Self::new(&database_url).await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize database schema
    pub async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cell_states (
                skill_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_run TEXT,
                next_run TEXT,
                run_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                fail_count INTEGER NOT NULL DEFAULT 0,
                avg_duration_ms REAL,
                last_error TEXT,
                last_error_at TEXT,
                config TEXT NOT NULL DEFAULT '{}',
                metadata TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VerdureError::DatabaseError(format!("Failed to create cell_states table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_states (
                agent_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                energy_level REAL NOT NULL DEFAULT 1.0,
                stress_level REAL NOT NULL DEFAULT 0.0,
                tasks_completed INTEGER NOT NULL DEFAULT 0,
                tasks_failed INTEGER NOT NULL DEFAULT 0,
                avg_response_time_ms REAL,
                last_executed TEXT,
                skill_states TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VerdureError::DatabaseError(format!("Failed to create agent_states table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meridian_metrics (
                meridian_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                packets_sent INTEGER NOT NULL DEFAULT 0,
                packets_received INTEGER NOT NULL DEFAULT 0,
                packets_dropped INTEGER NOT NULL DEFAULT 0,
                queue_size INTEGER NOT NULL DEFAULT 0,
                blockages INTEGER NOT NULL DEFAULT 0,
                throughput_per_sec REAL NOT NULL DEFAULT 0,
                latency_ms REAL NOT NULL DEFAULT 0,
                error_rate REAL NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VerdureError::DatabaseError(format!("Failed to create meridian_metrics table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_meridian_metrics_id_ts ON meridian_metrics (meridian_id, timestamp DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VerdureError::DatabaseError(format!("Failed to index meridian_metrics: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trigger_records (
                id TEXT PRIMARY KEY,
                trigger_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                success INTEGER NOT NULL,
                data TEXT,
                error TEXT,
                processing_time_ms INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VerdureError::DatabaseError(format!("Failed to create trigger_records table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_trigger_records_id_ts ON trigger_records (trigger_id, timestamp DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VerdureError::DatabaseError(format!("Failed to index trigger_records: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS data_lineage (
                data_id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                source_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                dependencies TEXT NOT NULL DEFAULT '[]',
                consumers TEXT NOT NULL DEFAULT '[]',
                schema_version TEXT NOT NULL DEFAULT 'default',
                quality_score REAL,
                current_tier TEXT NOT NULL DEFAULT 'hot',
                last_accessed TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VerdureError::DatabaseError(format!("Failed to create data_lineage table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_data_lineage_tier ON data_lineage (current_tier, last_accessed)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VerdureError::DatabaseError(format!("Failed to index data_lineage: {}", e)))?;

        Ok(())
    }
}
