//! End-to-end pipeline scenarios: sync sessions feeding the learning loop,
//! evolution deploying configs the orchestrator picks up, and the lifecycle
//! tier manager working against the same store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use verdure_core::{DataLineage, LearningState, LineageRepository, SessionStatus, SyncSession};
use verdure_pipeline::agents::ContentItem;
use verdure_pipeline::lifecycle::DataLifecycleAgent;
use verdure_pipeline::orchestrator::{Orchestrator, LEARNING_STATE_KEY};
use verdure_pipeline::{Deps, EvolutionEngine, FeedbackLoop};
use verdure_types::{
    AgentId, DataTier, EvolutionConfig, LifecycleConfig, OrchestratorConfig, Quadrant, SourceType,
};

fn sample_items() -> Vec<ContentItem> {
    let now = Utc::now();
    vec![
        ContentItem::new(
            "post-1",
            "login is so slow it keeps failing, the crash makes me struggle every day",
        )
        .with_source("scraper", SourceType::Sensor)
        .with_published_at(now - Duration::hours(3)),
        ContentItem::new(
            "post-2",
            "the new login overhaul is trending, everyone in the community is talking",
        )
        .with_source("scraper", SourceType::Sensor)
        .with_published_at(now - Duration::hours(2)),
        ContentItem::new(
            "post-3",
            "I am furious about this broken update, I hate losing work",
        )
        .with_source("scraper", SourceType::Event)
        .with_published_at(now - Duration::hours(1)),
        ContentItem::new(
            "post-4",
            "during my commute I want a summary I can finish before my morning meeting",
        )
        .with_source("scraper", SourceType::Processor)
        .with_published_at(now - Duration::hours(4)),
    ]
}

#[tokio::test]
async fn full_sync_session_flows_signals_downstream() {
    let deps = Deps::bootstrap_in_memory().await.unwrap();
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::clone(&deps.registry),
        Arc::clone(&deps.shared_memory),
    )
    .unwrap()
    .with_recorder(Arc::clone(&deps.lineage));

    let session = orchestrator.run_sync(sample_items()).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.completed_at.unwrap() >= session.started_at);

    // Every enabled agent reported
    for id in AgentId::P0_AGENTS
        .iter()
        .chain(AgentId::P1_AGENTS.iter())
        .chain(AgentId::P2_AGENTS.iter())
    {
        assert!(
            session.agent_reports.contains_key(id),
            "missing report for {}",
            id
        );
    }

    // Pain + trend share the "login" keyword, so synthesis fired
    assert!(!session.synthesized_signals.is_empty());

    // Every synthesized signal clears the learning threshold
    let state: LearningState = deps
        .shared_memory
        .get_json(LEARNING_STATE_KEY)
        .unwrap_or_default();
    let threshold = state
        .p0_thresholds
        .get("min_confidence_threshold")
        .copied()
        .unwrap_or(0.7);
    for signal in &session.synthesized_signals {
        assert!(signal.confidence >= threshold);
        assert!(signal.source_quadrants.len() >= 2);
    }

    // The committed session snapshot matches
    let latest: SyncSession = deps.shared_memory.get_json("p0:latest_session").unwrap();
    assert_eq!(latest.session_id, session.session_id);

    // Per-agent execution state was mirrored into the relational store
    let health = deps.lineage.health().await.unwrap();
    let active: i64 = health
        .agent_status_counts
        .iter()
        .filter(|(status, _)| status == "active")
        .map(|(_, n)| *n)
        .sum();
    assert_eq!(active, 12);
    deps.shutdown();
}

#[tokio::test]
async fn learning_loop_tunes_next_session_threshold() {
    let deps = Deps::bootstrap_in_memory().await.unwrap();
    let feedback_loop = FeedbackLoop::new(Arc::clone(&deps.shared_memory));

    // Seed scenario: 15 strong records then 5 weak ones
    for i in 0..15 {
        let mut metrics = HashMap::new();
        metrics.insert("engagement_rate".to_string(), json!(0.1));
        feedback_loop
            .collect_and_learn(&format!("plan-{}", i), Quadrant::Q1, metrics, vec![], 150.0)
            .unwrap();
    }
    for i in 0..5 {
        let mut metrics = HashMap::new();
        metrics.insert("engagement_rate".to_string(), json!(0.01));
        feedback_loop
            .collect_and_learn(&format!("weak-{}", i), Quadrant::Q2, metrics, vec![], 40.0)
            .unwrap();
    }

    let state: LearningState = deps.shared_memory.get_json(LEARNING_STATE_KEY).unwrap();
    assert_eq!(state.p0_thresholds["min_urgency_score"], 0.08);

    // The next orchestrator cycle reads the tuned state without error
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::clone(&deps.registry),
        Arc::clone(&deps.shared_memory),
    )
    .unwrap();
    let session = orchestrator.run_sync(sample_items()).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    deps.shutdown();
}

#[tokio::test]
async fn evolution_deployment_reaches_agent_configs() {
    let deps = Deps::bootstrap_in_memory().await.unwrap();

    let mut engine = EvolutionEngine::with_seed(
        EvolutionConfig::default(),
        Arc::clone(&deps.shared_memory),
        99,
    )
    .unwrap();
    engine.initialize_populations();

    // Make the pain scanner population a proven winner
    {
        let population = engine.population_mut("pain_scanner_Q1").unwrap();
        population.strategies[0].success_count = 10;
    }
    let report = engine.run_cycle(0.95).unwrap();
    assert!(report
        .deployment_recommendations
        .iter()
        .any(|r| r.agent == "pain_scanner_Q1"));

    // Deployed parameters are visible under the key the orchestrator reads
    assert!(deps
        .shared_memory
        .get("p3:deployed_config:pain_scanner_Q1")
        .is_ok());

    // And the next sync still completes with the override applied
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::clone(&deps.registry),
        Arc::clone(&deps.shared_memory),
    )
    .unwrap();
    let session = orchestrator.run_sync(sample_items()).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    deps.shutdown();
}

#[tokio::test]
async fn lifecycle_ages_session_artifacts() {
    let deps = Deps::bootstrap_in_memory().await.unwrap();
    let lifecycle =
        DataLifecycleAgent::new(Arc::clone(&deps.lineage), LifecycleConfig::default()).unwrap();

    // Seed scenario: a HOT item last touched eight days ago
    let mut lineage = DataLineage::new("session-artifact", "p0_orchestrator", SourceType::Processor);
    lineage.last_accessed = Utc::now() - Duration::days(8);
    deps.lineage.register(&lineage).await.unwrap();

    let summary = lifecycle.run_lifecycle_transition().await.unwrap();
    assert_eq!(summary.hot_to_warm, 1);

    let aged = deps.lineage.get("session-artifact").await.unwrap().unwrap();
    assert_eq!(aged.current_tier, DataTier::Warm);
    deps.shutdown();
}

#[tokio::test]
async fn bus_metrics_feed_lifecycle_alerts() {
    let deps = Deps::bootstrap_in_memory().await.unwrap();
    let lifecycle =
        DataLifecycleAgent::new(Arc::clone(&deps.lineage), LifecycleConfig::default()).unwrap();

    let mut rx = deps.bus.data.subscribe("consumer", "signals").unwrap();
    deps.bus
        .data
        .publish("orchestrator", "signals", json!({"signal": "s1"}), 5)
        .await
        .unwrap();
    assert!(rx.recv().await.is_some());

    // Simulated saturation raises exactly one backpressure alert
    let mut metrics = deps.bus.data.metrics().unwrap();
    metrics.queue_size = 1500;
    lifecycle.observe_metrics(&metrics).await.unwrap();

    let alerts = lifecycle.recent_alerts(5);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, "backpressure");

    // The sample also landed in the time-series table
    let stored = deps
        .lineage
        .latest_meridian_metrics("data-main")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.queue_size, 1500);
    deps.shutdown();
}
