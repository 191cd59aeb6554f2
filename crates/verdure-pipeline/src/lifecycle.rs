//! P4 data lifecycle management
//!
//! Ages data through hot -> warm -> cold -> frozen tiers, purges records
//! past the retention horizon, runs rule-based quality checks over recent
//! items, and watches meridian metrics for backpressure, error-rate, and
//! latency alerts. A failed transition is logged and skipped; a lifecycle
//! pass never aborts on a single record.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use verdure_core::{
    DataLineage, LineageRepository, MeridianMetrics, QualityIssue, QualityReport,
};
use verdure_types::{DataTier, LifecycleConfig, Result};

/// Alerts retained in memory
const ALERT_LIMIT: usize = 100;

/// Items examined per quality sweep
const QUALITY_SWEEP_LIMIT: i64 = 50;

/// Counts from one lifecycle transition pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionSummary {
    pub hot_to_warm: u64,
    pub warm_to_cold: u64,
    pub cold_to_frozen: u64,
    pub destroyed: u64,
    pub errors: u64,
}

/// A monitoring alert raised by the lifecycle agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleAlert {
    pub alert_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The P4 agent: tier transitions, quality checks, and flow monitoring
pub struct DataLifecycleAgent {
    repository: Arc<dyn LineageRepository>,
    config: LifecycleConfig,
    alerts: RwLock<Vec<LifecycleAlert>>,
}

impl DataLifecycleAgent {
    pub fn new(repository: Arc<dyn LineageRepository>, config: LifecycleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            repository,
            config,
            alerts: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Run the four ordered passes of the daily transition.
    ///
    /// Tier ordering is preserved: a record only ever moves to the next
    /// colder tier, and purging happens last.
    pub async fn run_lifecycle_transition(&self) -> Result<TransitionSummary> {
        info!("starting lifecycle transition");
        let mut summary = TransitionSummary::default();

        let passes = [
            (
                DataTier::Hot,
                self.config.retention_hot_days,
                Some(self.config.compression_warm.as_str()),
            ),
            (
                DataTier::Warm,
                self.config.retention_warm_days,
                Some(self.config.compression_cold.as_str()),
            ),
            (DataTier::Cold, self.config.retention_cold_days, None),
        ];

        for (tier, days, compression) in passes {
            let Some(target) = tier.next_colder() else {
                continue;
            };
            let stale = match self.repository.find_stale(tier, Duration::days(days)).await {
                Ok(stale) => stale,
                Err(e) => {
                    error!(tier = tier.as_str(), error = %e, "stale query failed, pass skipped");
                    summary.errors += 1;
                    continue;
                }
            };

            for lineage in stale {
                if let Some(codec) = compression {
                    debug!(
                        data_id = %lineage.data_id,
                        codec,
                        "compressing during tier transition"
                    );
                }
                match self.repository.update_tier(&lineage.data_id, target).await {
                    Ok(()) => match tier {
                        DataTier::Hot => summary.hot_to_warm += 1,
                        DataTier::Warm => summary.warm_to_cold += 1,
                        DataTier::Cold => summary.cold_to_frozen += 1,
                        DataTier::Frozen => {}
                    },
                    Err(e) => {
                        warn!(data_id = %lineage.data_id, error = %e, "tier transition failed");
                        summary.errors += 1;
                    }
                }
                // Long passes stay cooperative
                tokio::task::yield_now().await;
            }
        }

        match self
            .repository
            .cleanup_expired(Duration::days(self.config.retention_horizon_days))
            .await
        {
            Ok(count) => summary.destroyed = count,
            Err(e) => {
                error!(error = %e, "retention cleanup failed");
                summary.errors += 1;
            }
        }

        info!(?summary, "lifecycle transition complete");
        Ok(summary)
    }

    /// Record generation of a new data item; it enters the HOT tier
    pub async fn record_generation(
        &self,
        source: &str,
        source_type: verdure_types::SourceType,
        data_id: &str,
        dependencies: Vec<String>,
    ) -> Result<DataLineage> {
        let lineage =
            DataLineage::new(data_id, source, source_type).with_dependencies(dependencies);
        self.repository.register(&lineage).await?;
        debug!(data_id, source, "recorded data generation");
        Ok(lineage)
    }

    /// Record a read of a data item, refreshing its access heat
    pub async fn record_access(&self, data_id: &str) -> Result<()> {
        self.repository.touch(data_id).await
    }

    /// Rule-based quality check of a single item
    pub async fn check_quality(&self, data_id: &str) -> Result<QualityReport> {
        let Some(lineage) = self.repository.get(data_id).await? else {
            return Ok(QualityReport {
                data_id: data_id.to_string(),
                overall_score: 0.0,
                checks: Vec::new(),
                issues: vec![QualityIssue {
                    rule: "existence".to_string(),
                    score: 0.0,
                    threshold: 1.0,
                    auto_repairable: false,
                }],
                timestamp: Utc::now(),
            });
        };

        let completeness = if !lineage.source.is_empty() { 1.0 } else { 0.0 };
        let timeliness = timeliness_score(&lineage);
        let consistency = if lineage.dependencies.iter().all(|d| !d.is_empty()) {
            1.0
        } else {
            0.0
        };

        let rules = [
            ("completeness", completeness, 0.99, true),
            ("timeliness", timeliness, 0.98, false),
            ("consistency", consistency, 0.95, true),
        ];

        let mut checks = Vec::new();
        let mut issues = Vec::new();
        for (rule, score, threshold, auto_repairable) in rules {
            checks.push((rule.to_string(), score));
            if score < threshold {
                issues.push(QualityIssue {
                    rule: rule.to_string(),
                    score,
                    threshold,
                    auto_repairable,
                });
            }
        }

        let overall = checks.iter().map(|(_, s)| s).sum::<f64>() / checks.len() as f64;
        Ok(QualityReport {
            data_id: data_id.to_string(),
            overall_score: overall,
            checks,
            issues,
            timestamp: Utc::now(),
        })
    }

    /// Hourly sweep over the most recent items; non-repairable issues
    /// surface as alerts
    pub async fn run_quality_sweep(&self) -> Result<Vec<QualityReport>> {
        let recent = self.repository.recent(QUALITY_SWEEP_LIMIT).await?;
        let mut reports = Vec::new();
        for lineage in recent {
            let report = self.check_quality(&lineage.data_id).await?;
            for issue in &report.issues {
                if issue.auto_repairable {
                    debug!(data_id = %lineage.data_id, rule = %issue.rule, "flagged for auto-repair");
                } else {
                    self.raise_alert(
                        "quality",
                        format!(
                            "item {} failed {} ({:.2} < {:.2})",
                            lineage.data_id, issue.rule, issue.score, issue.threshold
                        ),
                    );
                }
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Record a meridian metrics sample and raise threshold alerts
    pub async fn observe_metrics(&self, metrics: &MeridianMetrics) -> Result<()> {
        self.repository.record_meridian_metrics(metrics).await?;

        if metrics.queue_size > self.config.backpressure_threshold {
            self.raise_alert(
                "backpressure",
                format!(
                    "meridian {} queue depth {} exceeds {}",
                    metrics.meridian_id, metrics.queue_size, self.config.backpressure_threshold
                ),
            );
        }
        if metrics.error_rate > self.config.error_rate_threshold {
            self.raise_alert(
                "high_error_rate",
                format!(
                    "meridian {} error rate {:.2}%",
                    metrics.meridian_id,
                    metrics.error_rate * 100.0
                ),
            );
        }
        if metrics.latency_ms > self.config.latency_threshold_ms {
            self.raise_alert(
                "high_latency",
                format!(
                    "meridian {} latency {:.0}ms",
                    metrics.meridian_id, metrics.latency_ms
                ),
            );
        }
        Ok(())
    }

    fn raise_alert(&self, alert_type: &str, message: String) {
        warn!(alert_type, message = %message, "lifecycle alert");
        if let Ok(mut alerts) = self.alerts.write() {
            alerts.push(LifecycleAlert {
                alert_type: alert_type.to_string(),
                message,
                timestamp: Utc::now(),
            });
            if alerts.len() > ALERT_LIMIT {
                let excess = alerts.len() - ALERT_LIMIT;
                alerts.drain(..excess);
            }
        }
    }

    pub fn recent_alerts(&self, count: usize) -> Vec<LifecycleAlert> {
        self.alerts
            .read()
            .map(|alerts| alerts.iter().rev().take(count).rev().cloned().collect())
            .unwrap_or_default()
    }
}

fn timeliness_score(lineage: &DataLineage) -> f64 {
    let age = lineage.age();
    if age < Duration::hours(1) {
        1.0
    } else if age < Duration::days(1) {
        0.8
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdure_infra::{DatabaseManager, SqliteLineageStore};
    use verdure_types::SourceType;

    async fn agent() -> DataLifecycleAgent {
        let manager = DatabaseManager::new_in_memory().await.unwrap();
        manager.initialize_schema().await.unwrap();
        let store = Arc::new(SqliteLineageStore::new(manager.pool().clone()));
        DataLifecycleAgent::new(store, LifecycleConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn stale_hot_item_demotes_to_warm() {
        let agent = agent().await;
        let mut lineage = DataLineage::new("stale-item", "pain_scanner", SourceType::Processor);
        lineage.last_accessed = Utc::now() - Duration::days(8);
        agent.repository.register(&lineage).await.unwrap();

        let summary = agent.run_lifecycle_transition().await.unwrap();
        assert_eq!(summary.hot_to_warm, 1);
        assert_eq!(summary.errors, 0);

        let updated = agent.repository.get("stale-item").await.unwrap().unwrap();
        assert_eq!(updated.current_tier, DataTier::Warm);
        assert!(updated.last_accessed > Utc::now() - Duration::minutes(1));
    }

    #[tokio::test]
    async fn recorded_access_keeps_item_hot() {
        let agent = agent().await;
        let mut lineage = agent
            .record_generation("trend_hunter", SourceType::Sensor, "busy-item", vec![])
            .await
            .unwrap();
        assert_eq!(lineage.current_tier, DataTier::Hot);

        // Age it, then record an access; the refreshed heat blocks demotion
        lineage.last_accessed = Utc::now() - Duration::days(8);
        agent.repository.register(&lineage).await.unwrap();
        agent.record_access("busy-item").await.unwrap();

        let summary = agent.run_lifecycle_transition().await.unwrap();
        assert_eq!(summary.hot_to_warm, 0);
    }

    #[tokio::test]
    async fn fresh_items_stay_hot() {
        let agent = agent().await;
        agent
            .repository
            .register(&DataLineage::new("fresh", "src", SourceType::Sensor))
            .await
            .unwrap();

        let summary = agent.run_lifecycle_transition().await.unwrap();
        assert_eq!(summary, TransitionSummary::default());
    }

    #[tokio::test]
    async fn tiers_never_skip() {
        let agent = agent().await;
        // Warm item stale enough for the cold pass, but not beyond
        let mut lineage = DataLineage::new("aging", "src", SourceType::Sensor);
        lineage.current_tier = DataTier::Warm;
        lineage.last_accessed = Utc::now() - Duration::days(31);
        agent.repository.register(&lineage).await.unwrap();

        agent.run_lifecycle_transition().await.unwrap();
        let updated = agent.repository.get("aging").await.unwrap().unwrap();
        // One pass moves warm to cold, never straight to frozen
        assert_eq!(updated.current_tier, DataTier::Cold);
    }

    #[tokio::test]
    async fn backpressure_alert_fires_without_panic() {
        let agent = agent().await;
        let metrics = MeridianMetrics {
            meridian_id: "data-main".to_string(),
            timestamp: Utc::now(),
            packets_sent: 100,
            packets_received: 90,
            packets_dropped: 10,
            queue_size: 1500,
            blockages: 0,
            throughput_per_sec: 1.0,
            latency_ms: 10.0,
            error_rate: 0.0,
        };
        agent.observe_metrics(&metrics).await.unwrap();

        let alerts = agent.recent_alerts(10);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "backpressure");
    }

    #[tokio::test]
    async fn quality_check_flags_missing_item() {
        let agent = agent().await;
        let report = agent.check_quality("ghost").await.unwrap();
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.issues[0].rule, "existence");
    }

    #[tokio::test]
    async fn quality_check_scores_fresh_item_high() {
        let agent = agent().await;
        agent
            .repository
            .register(&DataLineage::new("good", "src", SourceType::Sensor))
            .await
            .unwrap();

        let report = agent.check_quality("good").await.unwrap();
        assert!(report.overall_score > 0.9);
        // Timeliness threshold 0.98 is unmet only for aged items
        assert!(report.issues.is_empty());
    }
}
