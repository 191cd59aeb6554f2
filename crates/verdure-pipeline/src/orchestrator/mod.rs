//! Daily sync orchestration
//!
//! The orchestrator drives one sync session through its totally-ordered
//! phases: P0 fan-out, synthesis, insights, persistence, then the P1 and
//! P2 fan-outs. Within a phase agents run concurrently and may not observe
//! each other's outputs; an individual agent failure is recorded and the
//! phase proceeds. Only persistence errors fail the session.

pub mod synthesis;

pub use synthesis::{synthesize, SynthesisInput};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use verdure_core::{
    AgentState, CrossQuadrantSignal, DownstreamResult, LearningState, LineageRepository, Signal,
    SyncSession,
};
use verdure_infra::SharedMemory;
use verdure_types::{AgentId, OrchestratorConfig, Result, VerdureError};

use crate::agents::{
    AgentConfig, AgentInput, AgentRegistry, AgentReport, ContentItem, MemorySnapshot, ReportStatus,
};

/// Key of the committed learning state in shared memory
pub const LEARNING_STATE_KEY: &str = "learning:current_state";

/// A deployed evolution override as stored under `p3:deployed_config:*`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedConfig {
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub strategy_id: String,
    pub fitness: f64,
    pub deployed_at: chrono::DateTime<Utc>,
}

/// Coordinates the P0-P2 layers through the daily sync protocol
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<AgentRegistry>,
    shared_memory: Arc<SharedMemory>,
    /// Held for the whole session; enforces one in-flight sync
    run_guard: AsyncMutex<()>,
    history: std::sync::Mutex<VecDeque<SyncSession>>,
    /// Optional relational mirror for per-agent execution state
    recorder: Option<Arc<dyn LineageRepository>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<AgentRegistry>,
        shared_memory: Arc<SharedMemory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            shared_memory,
            run_guard: AsyncMutex::new(()),
            history: std::sync::Mutex::new(VecDeque::new()),
            recorder: None,
        })
    }

    /// Mirror per-agent execution state into the relational store
    pub fn with_recorder(mut self, recorder: Arc<dyn LineageRepository>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Execute one complete sync session over the given content items.
    ///
    /// Returns the session in its terminal state; agent-level failures are
    /// data inside it, not errors. Errors are returned only when no
    /// session could run at all (one already in flight, lock poisoned).
    pub async fn run_sync(&self, items: Vec<ContentItem>) -> Result<SyncSession> {
        let _guard = self.run_guard.try_lock().map_err(|_| {
            VerdureError::SessionInFlight("a sync session is already running".to_string())
        })?;

        let session_id = format!("sync-{}", Utc::now().format("%Y%m%d%H%M%S"));
        let mut session = SyncSession::begin(session_id.clone());
        info!(session_id, "starting daily sync session");

        let learning_state: LearningState = self
            .shared_memory
            .get_json(LEARNING_STATE_KEY)
            .unwrap_or_default();
        let threshold = learning_state
            .p0_thresholds
            .get("min_confidence_threshold")
            .copied()
            .unwrap_or(self.config.min_confidence_threshold);

        let input = Arc::new(
            AgentInput::new(session_id.clone())
                .with_items(items)
                .with_reference_time(session.started_at),
        );

        // Phase P0: parallel perception fan-out
        let p0_snapshot = Arc::new(MemorySnapshot {
            learning_state: learning_state.clone(),
            ..Default::default()
        });
        let p0_reports = self
            .run_phase(&self.config.agents_to_run, &input, &p0_snapshot)
            .await;
        let mut all_reports: Vec<AgentReport> = p0_reports.values().cloned().collect();
        for (id, report) in &p0_reports {
            session
                .agent_reports
                .insert(*id, serde_json::to_value(report)?);
        }

        // Phase Synthesis
        let perception_signals = collect_signals(&p0_reports);
        let cross_signals = if self.config.enable_cross_synthesis {
            let synthesis_input = SynthesisInput {
                pain: signals_of(&p0_reports, AgentId::Q1P0),
                emotion: signals_of(&p0_reports, AgentId::Q2P0),
                trend: signals_of(&p0_reports, AgentId::Q3P0),
                scene: signals_of(&p0_reports, AgentId::Q4P0),
            };
            synthesize(&session_id, &synthesis_input, threshold)
        } else {
            Vec::new()
        };
        session.synthesized_signals = cross_signals.clone();
        info!(
            session_id,
            count = cross_signals.len(),
            "synthesized cross-quadrant signals"
        );

        // Phase Insights
        session.insights = self.derive_insights(&p0_reports, &cross_signals);

        // Phase Persist; a real store failure fails the session
        if let Err(e) = self.persist(&session, &perception_signals, &cross_signals) {
            warn!(session_id, error = %e, "persistence failed, session aborted");
            session.fail(e.to_string());
            self.push_history(session.clone());
            return Ok(session);
        }

        // Phases P1 and P2 read the committed snapshot from this session
        let downstream_snapshot = Arc::new(MemorySnapshot {
            cross_signals,
            perception_signals,
            learning_state,
        });

        if self.config.enable_p1_trigger {
            let p1_reports = self
                .run_phase(&self.config.p1_agents_to_trigger, &input, &downstream_snapshot)
                .await;
            session.p1_trigger_results = downstream_results(&p1_reports)?;
            all_reports.extend(p1_reports.values().cloned());
            for (id, report) in &p1_reports {
                session
                    .agent_reports
                    .insert(*id, serde_json::to_value(report)?);
            }
        }

        if self.config.enable_p2_trigger {
            let p2_reports = self
                .run_phase(&self.config.p2_agents_to_trigger, &input, &downstream_snapshot)
                .await;
            session.p2_trigger_results = downstream_results(&p2_reports)?;
            all_reports.extend(p2_reports.values().cloned());
            for (id, report) in &p2_reports {
                session
                    .agent_reports
                    .insert(*id, serde_json::to_value(report)?);
            }
        }

        session.complete();
        self.record_agent_states(&all_reports).await;

        // Re-persist the terminal session state; best effort aside from
        // flagging the failure
        if let Err(e) = self.persist_session(&session) {
            session.fail(format!("failed to persist completed session: {}", e));
        }

        self.push_history(session.clone());
        info!(
            session_id,
            signals = session.synthesized_signals.len(),
            status = ?session.status,
            "daily sync finished"
        );
        Ok(session)
    }

    /// Invoke a set of agents concurrently, each bounded by the agent
    /// timeout. Missing registrations and timeouts become failed reports.
    async fn run_phase(
        &self,
        agents: &[AgentId],
        input: &Arc<AgentInput>,
        snapshot: &Arc<MemorySnapshot>,
    ) -> HashMap<AgentId, AgentReport> {
        let timeout = StdDuration::from_secs(self.config.agent_timeout_secs);

        let futures = agents.iter().map(|id| {
            let id = *id;
            let input = Arc::clone(input);
            let snapshot = Arc::clone(snapshot);
            let agent = self.registry.get(id);
            let config = self.config_for(id, &snapshot.learning_state);
            async move {
                let agent = match agent {
                    Ok(agent) => agent,
                    Err(e) => return (id, AgentReport::failure(id, e.to_string(), 0)),
                };
                let started = std::time::Instant::now();
                match tokio::time::timeout(timeout, agent.invoke(&input, &snapshot, &config)).await
                {
                    Ok(Ok(payload)) => (
                        id,
                        AgentReport::success(id, payload, started.elapsed().as_millis() as u64),
                    ),
                    Ok(Err(e)) => (
                        id,
                        AgentReport::failure(id, e.to_string(), started.elapsed().as_millis() as u64),
                    ),
                    Err(_) => {
                        warn!(agent = %id, "agent invocation timed out");
                        (id, AgentReport::timed_out(id, timeout.as_secs()))
                    }
                }
            }
        });

        join_all(futures).await.into_iter().collect()
    }

    /// Mirror each agent's execution outcome into `agent_states`;
    /// best-effort, a store hiccup never fails a finished session
    async fn record_agent_states(&self, reports: &[AgentReport]) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let now = Utc::now();
        for report in reports {
            let succeeded = report.status == ReportStatus::Success;
            let state = AgentState {
                agent_id: report.agent.as_str().to_string(),
                name: report.agent.kind().to_string(),
                status: if succeeded { "active" } else { "degraded" }.to_string(),
                energy_level: 1.0,
                stress_level: if succeeded { 0.0 } else { 0.5 },
                tasks_completed: succeeded as i64,
                tasks_failed: (!succeeded) as i64,
                avg_response_time_ms: Some(report.duration_ms as f64),
                last_executed: Some(report.generated_at),
                skill_states: serde_json::json!({}),
                created_at: now,
                updated_at: now,
            };
            if let Err(e) = recorder.upsert_agent_state(&state).await {
                warn!(agent = %report.agent, error = %e, "failed to persist agent state");
            }
        }
    }

    /// Effective config for an agent: defaults, then learned thresholds,
    /// then any deployed evolution override
    fn config_for(&self, id: AgentId, state: &LearningState) -> AgentConfig {
        let mut config = match self.registry.get(id) {
            Ok(agent) => agent.default_config(),
            Err(_) => AgentConfig::default(),
        };

        match id {
            AgentId::Q1P0 => {
                if let Some(v) = state.p0_thresholds.get("min_urgency_score") {
                    config.set("urgency_threshold", *v);
                }
            }
            AgentId::Q2P0 => {
                if let Some(v) = state.p0_thresholds.get("min_emotion_intensity") {
                    config.set("intensity_threshold", *v);
                }
            }
            _ => {}
        }

        let key = format!("p3:deployed_config:{}_{}", id.kind(), id.quadrant());
        if let Ok(deployed) = self.shared_memory.get_json::<DeployedConfig>(&key) {
            let overrides: HashMap<String, f64> = deployed
                .parameters
                .iter()
                .filter_map(|(k, v)| v.as_f64().map(|v| (k.clone(), v)))
                .collect();
            config = config.merged_with(&overrides);
        }

        config
    }

    fn derive_insights(
        &self,
        p0_reports: &HashMap<AgentId, AgentReport>,
        cross_signals: &[CrossQuadrantSignal],
    ) -> Vec<String> {
        let mut insights = Vec::new();

        let counts: Vec<(AgentId, usize)> = AgentId::P0_AGENTS
            .iter()
            .filter_map(|id| p0_reports.get(id).map(|r| (*id, r.signals().len())))
            .collect();

        if let Some((agent, count)) = counts.iter().max_by_key(|(_, c)| *c) {
            if *count > 5 {
                insights.push(format!(
                    "{} is highly active with {} signals. Consider allocating more resources to this quadrant today.",
                    agent, count
                ));
            }
        }

        let critical = cross_signals
            .iter()
            .filter(|s| s.priority == verdure_types::SignalPriority::Critical)
            .count();
        if critical > 0 {
            insights.push(format!(
                "Detected {} critical cross-quadrant opportunities. These should be acted on immediately.",
                critical
            ));
        }

        let pain_count = counts
            .iter()
            .find(|(id, _)| *id == AgentId::Q1P0)
            .map(|(_, c)| *c)
            .unwrap_or(0);
        let trend_count = counts
            .iter()
            .find(|(id, _)| *id == AgentId::Q3P0)
            .map(|(_, c)| *c)
            .unwrap_or(0);
        if pain_count > 10 && trend_count > 5 {
            insights.push(
                "High painpoint volume plus active trends suggests a volatile market day. \
                 Opportunity for timely intervention content."
                    .to_string(),
            );
        }

        insights
    }

    /// Store this session's signals and snapshots.
    ///
    /// Duplicate signal ids within the session were already merged
    /// last-writer-wins; an id still live from an earlier phase or session
    /// is refused and kept, which is logged but not fatal.
    fn persist(
        &self,
        session: &SyncSession,
        perception_signals: &[Signal],
        cross_signals: &[CrossQuadrantSignal],
    ) -> Result<()> {
        let ttl = Duration::hours(self.config.signal_ttl_hours as i64);

        for signal in perception_signals {
            let key = format!("signal:{}", signal.signal_id);
            match self
                .shared_memory
                .store_unique(&key, serde_json::to_value(signal)?, Some(ttl))
            {
                Ok(()) => {}
                Err(VerdureError::InvalidInput(_)) => {
                    warn!(key, "refusing cross-phase signal overwrite");
                }
                Err(e) => return Err(e),
            }
        }

        for signal in cross_signals {
            let key = format!("signal:{}", signal.signal_id);
            match self
                .shared_memory
                .store_unique(&key, serde_json::to_value(signal)?, Some(ttl))
            {
                Ok(()) => {}
                Err(VerdureError::InvalidInput(_)) => {
                    warn!(key, "refusing cross-phase signal overwrite");
                }
                Err(e) => return Err(e),
            }
        }

        self.shared_memory
            .store_json("p0:latest_signals", &cross_signals, None)?;
        self.persist_session(session)
    }

    fn persist_session(&self, session: &SyncSession) -> Result<()> {
        let ttl = Duration::hours(self.config.signal_ttl_hours as i64);
        self.shared_memory.store_json(
            &format!("session:{}", session.session_id),
            session,
            Some(ttl),
        )?;
        self.shared_memory.store_json("p0:latest_session", session, None)
    }

    fn push_history(&self, session: SyncSession) {
        if let Ok(mut history) = self.history.lock() {
            history.push_back(session);
            while history.len() > self.config.session_history_limit {
                history.pop_front();
            }
        }
    }

    /// Most recent sessions, oldest first
    pub fn recent_sessions(&self, count: usize) -> Vec<SyncSession> {
        self.history
            .lock()
            .map(|history| history.iter().rev().take(count).rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Markdown summary of a session, for human review
    pub fn format_session_report(session: &SyncSession) -> String {
        let mut lines = vec![
            "# P0 Daily Sync Report".to_string(),
            String::new(),
            format!("**Session:** {}", session.session_id),
            format!("**Status:** {:?}", session.status),
            format!("**Started:** {}", session.started_at.format("%Y-%m-%d %H:%M:%S")),
            String::new(),
            "## Cross-Quadrant Signals".to_string(),
            String::new(),
        ];

        if session.synthesized_signals.is_empty() {
            lines.push("No cross-quadrant signals detected in this sync.".to_string());
        } else {
            for (i, signal) in session.synthesized_signals.iter().take(10).enumerate() {
                lines.push(format!(
                    "{}. [{}] {} (confidence {:.0}%) -> {}",
                    i + 1,
                    signal.priority.as_str(),
                    signal.title,
                    signal.confidence * 100.0,
                    signal.recommended_action
                ));
            }
        }

        lines.push(String::new());
        lines.push("## Insights".to_string());
        lines.push(String::new());
        if session.insights.is_empty() {
            lines.push("No high-level insights generated.".to_string());
        } else {
            for insight in &session.insights {
                lines.push(format!("- {}", insight));
            }
        }

        lines.join("\n")
    }
}

/// Merge all P0 signals, deduplicating ids last-writer-wins within the phase
fn collect_signals(reports: &HashMap<AgentId, AgentReport>) -> Vec<Signal> {
    let mut by_id: HashMap<String, Signal> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for id in AgentId::P0_AGENTS {
        if let Some(report) = reports.get(&id) {
            for signal in report.signals() {
                if !by_id.contains_key(&signal.signal_id) {
                    order.push(signal.signal_id.clone());
                }
                by_id.insert(signal.signal_id.clone(), signal.clone());
            }
        }
    }
    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

fn signals_of(reports: &HashMap<AgentId, AgentReport>, id: AgentId) -> Vec<Signal> {
    reports
        .get(&id)
        .map(|r| r.signals().to_vec())
        .unwrap_or_default()
}

fn downstream_results(reports: &HashMap<AgentId, AgentReport>) -> Result<Vec<DownstreamResult>> {
    let mut results = Vec::new();
    for (id, report) in reports {
        results.push(DownstreamResult {
            agent: *id,
            success: report.status == ReportStatus::Success,
            output: report
                .payload
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
            error: report.error.clone(),
        });
    }
    results.sort_by_key(|r| r.agent.as_str());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use verdure_core::SessionStatus;
    use verdure_types::SourceType;

    use crate::agents::{AgentPayload, LayerAgent};
    use crate::deps::register_all;

    fn orchestrator(config: OrchestratorConfig) -> Orchestrator {
        let registry = Arc::new(AgentRegistry::new());
        register_all(&registry).unwrap();
        Orchestrator::new(config, registry, Arc::new(SharedMemory::new())).unwrap()
    }

    fn items() -> Vec<ContentItem> {
        let now = Utc::now();
        vec![
            ContentItem::new("a", "login keeps failing, so slow it crashes, what a struggle")
                .with_source("feed", SourceType::Sensor)
                .with_published_at(now - Duration::hours(2)),
            ContentItem::new("b", "everyone says the new login overhaul is trending")
                .with_source("feed", SourceType::Sensor)
                .with_published_at(now - Duration::hours(1)),
        ]
    }

    #[tokio::test]
    async fn empty_p0_phase_still_completes() {
        let orch = orchestrator(OrchestratorConfig::default());
        let session = orch.run_sync(Vec::new()).await.unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.synthesized_signals.is_empty());
        assert!(session.completed_at.unwrap() >= session.started_at);
        // All enabled agents reported
        for id in AgentId::P0_AGENTS {
            assert!(session.agent_reports.contains_key(&id));
        }
    }

    #[tokio::test]
    async fn full_sync_produces_cross_signals_and_persists() {
        let orch = orchestrator(OrchestratorConfig::default());
        let session = orch.run_sync(items()).await.unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert!(!session.synthesized_signals.is_empty());
        // Pain and trend share the "login" keyword
        assert!(session
            .synthesized_signals
            .iter()
            .any(|s| s.signal_type == verdure_core::CrossSignalType::PainTrend));

        // Persisted snapshots are readable
        let latest: SyncSession = orch.shared_memory.get_json("p0:latest_session").unwrap();
        assert_eq!(latest.session_id, session.session_id);

        let stored_key = format!("signal:{}", session.synthesized_signals[0].signal_id);
        assert!(orch.shared_memory.get(&stored_key).is_ok());

        // P1 and P2 fan-outs ran
        assert_eq!(session.p1_trigger_results.len(), 4);
        assert_eq!(session.p2_trigger_results.len(), 4);
        assert!(session.p1_trigger_results.iter().all(|r| r.success));
    }

    struct StallingAgent;

    #[async_trait]
    impl LayerAgent for StallingAgent {
        fn id(&self) -> AgentId {
            AgentId::Q1P0
        }

        fn default_config(&self) -> AgentConfig {
            AgentConfig::default()
        }

        async fn invoke(
            &self,
            _input: &AgentInput,
            _snapshot: &MemorySnapshot,
            _config: &AgentConfig,
        ) -> Result<AgentPayload> {
            tokio::time::sleep(StdDuration::from_secs(10)).await;
            Ok(AgentPayload::Signals { signals: vec![] })
        }
    }

    #[tokio::test]
    async fn agent_timeout_is_isolated() {
        let registry = Arc::new(AgentRegistry::new());
        register_all(&registry).unwrap();
        registry.register(Arc::new(StallingAgent)).unwrap();

        let mut config = OrchestratorConfig::default();
        config.agent_timeout_secs = 1;
        let orch =
            Orchestrator::new(config, registry, Arc::new(SharedMemory::new())).unwrap();

        let session = orch.run_sync(items()).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);

        let q1_report: AgentReport =
            serde_json::from_value(session.agent_reports[&AgentId::Q1P0].clone()).unwrap();
        assert_eq!(q1_report.status, ReportStatus::TimedOut);

        // The other P0 agents were unaffected
        let q3_report: AgentReport =
            serde_json::from_value(session.agent_reports[&AgentId::Q3P0].clone()).unwrap();
        assert_eq!(q3_report.status, ReportStatus::Success);
    }

    #[tokio::test]
    async fn only_one_session_runs_at_a_time() {
        let registry = Arc::new(AgentRegistry::new());
        register_all(&registry).unwrap();
        registry.register(Arc::new(StallingAgent)).unwrap();

        let mut config = OrchestratorConfig::default();
        config.agent_timeout_secs = 2;
        let orch = Arc::new(
            Orchestrator::new(config, registry, Arc::new(SharedMemory::new())).unwrap(),
        );

        let first = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.run_sync(Vec::new()).await })
        };
        // Give the first session time to take the guard
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        assert!(matches!(
            orch.run_sync(Vec::new()).await,
            Err(VerdureError::SessionInFlight(_))
        ));
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn session_report_renders_signals_and_insights() {
        let orch = orchestrator(OrchestratorConfig::default());
        let session = orch.run_sync(items()).await.unwrap();

        let report = Orchestrator::format_session_report(&session);
        assert!(report.contains(&session.session_id));
        assert!(report.contains("Cross-Quadrant Signals"));
        for signal in session.synthesized_signals.iter().take(10) {
            assert!(report.contains(&signal.title));
        }
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let mut config = OrchestratorConfig::default();
        config.session_history_limit = 2;
        config.enable_p1_trigger = false;
        config.enable_p2_trigger = false;
        let orch = orchestrator(config);

        for _ in 0..4 {
            orch.run_sync(Vec::new()).await.unwrap();
        }
        assert_eq!(orch.recent_sessions(10).len(), 2);
    }
}
