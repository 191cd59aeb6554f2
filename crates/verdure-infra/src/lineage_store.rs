//! SQLite-backed lineage store
//!
//! Implements the `LineageRepository` trait over the relational schema
//! bootstrapped by `DatabaseManager`. Every operation is transactional per
//! record; re-applying a transition is harmless.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use verdure_core::{
    AgentState, CellState, DataLineage, LineageHealth, LineageRepository, MeridianMetrics,
    TriggerRecord,
};
use verdure_types::{DataTier, Result, SourceType, TriggerStatus, VerdureError};

/// Lineage CRUD plus metric/trigger persistence over SQLite
pub struct SqliteLineageStore {
    pool: SqlitePool,
}

impl SqliteLineageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn db_err(context: &str, e: sqlx::Error) -> VerdureError {
        VerdureError::DatabaseError(format!("{}: {}", context, e))
    }

    fn row_to_lineage(row: &sqlx::sqlite::SqliteRow) -> Result<DataLineage> {
        let source_type: String = row.get("source_type");
        let tier: String = row.get("current_tier");
        let dependencies: String = row.get("dependencies");
        let consumers: String = row.get("consumers");
        let created_at: String = row.get("created_at");
        let last_accessed: String = row.get("last_accessed");

        Ok(DataLineage {
            data_id: row.get("data_id"),
            source: row.get("source"),
            source_type: SourceType::parse(&source_type)
                .ok_or_else(|| VerdureError::Fatal(format!("bad source_type '{}'", source_type)))?,
            created_at: parse_timestamp(&created_at)?,
            last_accessed: parse_timestamp(&last_accessed)?,
            current_tier: DataTier::parse(&tier)
                .ok_or_else(|| VerdureError::Fatal(format!("bad tier '{}'", tier)))?,
            dependencies: serde_json::from_str(&dependencies)?,
            consumers: serde_json::from_str(&consumers)?,
            quality_score: row.get("quality_score"),
            schema_version: row.get("schema_version"),
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VerdureError::Fatal(format!("bad timestamp '{}': {}", value, e)))
}

#[async_trait::async_trait]
impl LineageRepository for SqliteLineageStore {
    async fn register(&self, lineage: &DataLineage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO data_lineage (
                data_id, source, source_type, created_at, dependencies,
                consumers, schema_version, quality_score, current_tier, last_accessed
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(data_id) DO UPDATE SET
                source = excluded.source,
                source_type = excluded.source_type,
                dependencies = excluded.dependencies,
                consumers = excluded.consumers,
                schema_version = excluded.schema_version,
                quality_score = excluded.quality_score,
                current_tier = excluded.current_tier,
                last_accessed = excluded.last_accessed
            "#,
        )
        .bind(&lineage.data_id)
        .bind(&lineage.source)
        .bind(lineage.source_type.as_str())
        .bind(lineage.created_at.to_rfc3339())
        .bind(serde_json::to_string(&lineage.dependencies)?)
        .bind(serde_json::to_string(&lineage.consumers)?)
        .bind(&lineage.schema_version)
        .bind(lineage.quality_score)
        .bind(lineage.current_tier.as_str())
        .bind(lineage.last_accessed.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("register lineage", e))?;

        debug!(data_id = %lineage.data_id, "registered data lineage");
        Ok(())
    }

    async fn get(&self, data_id: &str) -> Result<Option<DataLineage>> {
        let row = sqlx::query("SELECT * FROM data_lineage WHERE data_id = ?")
            .bind(data_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_err("get lineage", e))?;

        row.as_ref().map(Self::row_to_lineage).transpose()
    }

    async fn find_stale(&self, tier: DataTier, older_than: Duration) -> Result<Vec<DataLineage>> {
        let cutoff = (Utc::now() - older_than).to_rfc3339();
        let rows = sqlx::query(
            "SELECT * FROM data_lineage WHERE current_tier = ? AND last_accessed < ? ORDER BY last_accessed",
        )
        .bind(tier.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("find stale lineage", e))?;

        rows.iter().map(Self::row_to_lineage).collect()
    }

    async fn update_tier(&self, data_id: &str, new_tier: DataTier) -> Result<()> {
        let result = sqlx::query(
            "UPDATE data_lineage SET current_tier = ?, last_accessed = ? WHERE data_id = ?",
        )
        .bind(new_tier.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(data_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("update tier", e))?;

        if result.rows_affected() == 0 {
            return Err(VerdureError::NotFound(format!("lineage {}", data_id)));
        }
        Ok(())
    }

    async fn touch(&self, data_id: &str) -> Result<()> {
        sqlx::query("UPDATE data_lineage SET last_accessed = ? WHERE data_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(data_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::db_err("touch lineage", e))?;
        Ok(())
    }

    async fn cleanup_expired(&self, retention: Duration) -> Result<u64> {
        let cutoff = (Utc::now() - retention).to_rfc3339();
        let result = sqlx::query("DELETE FROM data_lineage WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::db_err("cleanup expired lineage", e))?;
        Ok(result.rows_affected())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<DataLineage>> {
        let rows = sqlx::query("SELECT * FROM data_lineage ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_err("recent lineage", e))?;
        rows.iter().map(Self::row_to_lineage).collect()
    }

    async fn record_meridian_metrics(&self, metrics: &MeridianMetrics) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO meridian_metrics (
                meridian_id, timestamp, packets_sent, packets_received, packets_dropped,
                queue_size, blockages, throughput_per_sec, latency_ms, error_rate
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metrics.meridian_id)
        .bind(metrics.timestamp.to_rfc3339())
        .bind(metrics.packets_sent as i64)
        .bind(metrics.packets_received as i64)
        .bind(metrics.packets_dropped as i64)
        .bind(metrics.queue_size as i64)
        .bind(metrics.blockages as i64)
        .bind(metrics.throughput_per_sec)
        .bind(metrics.latency_ms)
        .bind(metrics.error_rate)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("record meridian metrics", e))?;
        Ok(())
    }

    async fn latest_meridian_metrics(&self, meridian_id: &str) -> Result<Option<MeridianMetrics>> {
        let row = sqlx::query(
            "SELECT * FROM meridian_metrics WHERE meridian_id = ? ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(meridian_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::db_err("latest meridian metrics", e))?;

        row.map(|row| {
            let timestamp: String = row.get("timestamp");
            Ok(MeridianMetrics {
                meridian_id: row.get("meridian_id"),
                timestamp: parse_timestamp(&timestamp)?,
                packets_sent: row.get::<i64, _>("packets_sent") as u64,
                packets_received: row.get::<i64, _>("packets_received") as u64,
                packets_dropped: row.get::<i64, _>("packets_dropped") as u64,
                queue_size: row.get::<i64, _>("queue_size") as u64,
                blockages: row.get::<i64, _>("blockages") as u64,
                throughput_per_sec: row.get("throughput_per_sec"),
                latency_ms: row.get("latency_ms"),
                error_rate: row.get("error_rate"),
            })
        })
        .transpose()
    }

    async fn record_trigger(&self, record: &TriggerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trigger_records (id, trigger_id, timestamp, success, data, error, processing_time_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                success = excluded.success,
                data = excluded.data,
                error = excluded.error,
                processing_time_ms = excluded.processing_time_ms
            "#,
        )
        .bind(&record.execution_id)
        .bind(&record.trigger_id)
        .bind(record.scheduled_time.to_rfc3339())
        .bind(record.status == TriggerStatus::Success)
        .bind(record.outcome_summary.as_ref().map(|v| v.to_string()))
        .bind(&record.error)
        .bind(record.duration_ms())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("record trigger", e))?;
        Ok(())
    }

    async fn upsert_cell_state(&self, state: &CellState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cell_states (
                skill_id, state, created_at, updated_at, last_run, next_run,
                run_count, success_count, fail_count, avg_duration_ms,
                last_error, last_error_at, config, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(skill_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at,
                last_run = excluded.last_run,
                next_run = excluded.next_run,
                run_count = excluded.run_count,
                success_count = excluded.success_count,
                fail_count = excluded.fail_count,
                avg_duration_ms = excluded.avg_duration_ms,
                last_error = excluded.last_error,
                last_error_at = excluded.last_error_at,
                config = excluded.config,
                metadata = excluded.metadata
            "#,
        )
        .bind(&state.skill_id)
        .bind(&state.state)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .bind(state.last_run.map(|t| t.to_rfc3339()))
        .bind(state.next_run.map(|t| t.to_rfc3339()))
        .bind(state.run_count)
        .bind(state.success_count)
        .bind(state.fail_count)
        .bind(state.avg_duration_ms)
        .bind(&state.last_error)
        .bind(state.last_error_at.map(|t| t.to_rfc3339()))
        .bind(state.config.to_string())
        .bind(state.metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("upsert cell state", e))?;
        Ok(())
    }

    async fn upsert_agent_state(&self, state: &AgentState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_states (
                agent_id, name, status, energy_level, stress_level,
                tasks_completed, tasks_failed, avg_response_time_ms,
                last_executed, skill_states, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(agent_id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                energy_level = excluded.energy_level,
                stress_level = excluded.stress_level,
                tasks_completed = excluded.tasks_completed,
                tasks_failed = excluded.tasks_failed,
                avg_response_time_ms = excluded.avg_response_time_ms,
                last_executed = excluded.last_executed,
                skill_states = excluded.skill_states,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.agent_id)
        .bind(&state.name)
        .bind(&state.status)
        .bind(state.energy_level)
        .bind(state.stress_level)
        .bind(state.tasks_completed)
        .bind(state.tasks_failed)
        .bind(state.avg_response_time_ms)
        .bind(state.last_executed.map(|t| t.to_rfc3339()))
        .bind(state.skill_states.to_string())
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("upsert agent state", e))?;
        Ok(())
    }

    async fn health(&self) -> Result<LineageHealth> {
        let mut health = LineageHealth::default();

        let tier_rows =
            sqlx::query("SELECT current_tier, COUNT(*) AS n FROM data_lineage GROUP BY current_tier")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Self::db_err("tier distribution", e))?;
        for row in tier_rows {
            let tier: String = row.get("current_tier");
            if let Some(tier) = DataTier::parse(&tier) {
                health.tier_distribution.push((tier, row.get("n")));
            }
        }

        let cell_rows = sqlx::query("SELECT state, COUNT(*) AS n FROM cell_states GROUP BY state")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_err("cell state counts", e))?;
        for row in cell_rows {
            health.cell_state_counts.push((row.get("state"), row.get("n")));
        }

        let agent_rows = sqlx::query("SELECT status, COUNT(*) AS n FROM agent_states GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_err("agent status counts", e))?;
        for row in agent_rows {
            health.agent_status_counts.push((row.get("status"), row.get("n")));
        }

        let cutoff = (Utc::now() - Duration::hours(24)).to_rfc3339();
        let trigger_row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN success THEN 1 ELSE 0 END), 0) AS ok,
                COALESCE(SUM(CASE WHEN success THEN 0 ELSE 1 END), 0) AS failed
            FROM trigger_records WHERE timestamp > ?
            "#,
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::db_err("trigger counts", e))?;
        health.recent_trigger_success = trigger_row.get("ok");
        health.recent_trigger_failure = trigger_row.get("failed");

        Ok(health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;

    async fn store() -> SqliteLineageStore {
        let manager = DatabaseManager::new_in_memory().await.unwrap();
        manager.initialize_schema().await.unwrap();
        SqliteLineageStore::new(manager.pool().clone())
    }

    #[tokio::test]
    async fn register_and_get_roundtrip() {
        let store = store().await;
        let lineage = DataLineage::new("item-1", "pain_scanner", SourceType::Processor)
            .with_dependencies(vec!["upstream-1".to_string()]);
        store.register(&lineage).await.unwrap();

        let loaded = store.get("item-1").await.unwrap().unwrap();
        assert_eq!(loaded.source, "pain_scanner");
        assert_eq!(loaded.current_tier, DataTier::Hot);
        assert_eq!(loaded.dependencies, vec!["upstream-1".to_string()]);
    }

    #[tokio::test]
    async fn find_stale_respects_tier_and_age() {
        let store = store().await;
        let mut old = DataLineage::new("old", "src", SourceType::Sensor);
        old.last_accessed = Utc::now() - Duration::days(8);
        store.register(&old).await.unwrap();

        let fresh = DataLineage::new("fresh", "src", SourceType::Sensor);
        store.register(&fresh).await.unwrap();

        let stale = store.find_stale(DataTier::Hot, Duration::days(7)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].data_id, "old");
    }

    #[tokio::test]
    async fn update_tier_bumps_last_access() {
        let store = store().await;
        let mut lineage = DataLineage::new("item", "src", SourceType::Event);
        lineage.last_accessed = Utc::now() - Duration::days(10);
        store.register(&lineage).await.unwrap();

        store.update_tier("item", DataTier::Warm).await.unwrap();
        let loaded = store.get("item").await.unwrap().unwrap();
        assert_eq!(loaded.current_tier, DataTier::Warm);
        assert!(loaded.last_accessed > Utc::now() - Duration::minutes(1));
    }

    #[tokio::test]
    async fn update_tier_missing_is_not_found() {
        let store = store().await;
        assert!(matches!(
            store.update_tier("ghost", DataTier::Warm).await,
            Err(VerdureError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn cleanup_purges_beyond_horizon() {
        let store = store().await;
        let mut ancient = DataLineage::new("ancient", "src", SourceType::Manual);
        ancient.created_at = Utc::now() - Duration::days(3000);
        store.register(&ancient).await.unwrap();
        store
            .register(&DataLineage::new("recent", "src", SourceType::Manual))
            .await
            .unwrap();

        let purged = store.cleanup_expired(Duration::days(2555)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get("ancient").await.unwrap().is_none());
        assert!(store.get("recent").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn meridian_metrics_roundtrip() {
        let store = store().await;
        let metrics = MeridianMetrics {
            meridian_id: "data-main".to_string(),
            timestamp: Utc::now(),
            packets_sent: 10,
            packets_received: 9,
            packets_dropped: 1,
            queue_size: 5,
            blockages: 0,
            throughput_per_sec: 2.5,
            latency_ms: 12.0,
            error_rate: 0.0,
        };
        store.record_meridian_metrics(&metrics).await.unwrap();
        let latest = store.latest_meridian_metrics("data-main").await.unwrap().unwrap();
        assert_eq!(latest.packets_sent, 10);
        assert_eq!(latest.packets_dropped, 1);
    }
}
