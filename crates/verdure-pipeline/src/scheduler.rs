//! Cron-driven job scheduling
//!
//! Jobs are installed as named callables resolved through a `JobFactory`,
//! so the scheduler never holds component objects directly. Per job the
//! execution contract is: coalesce missed fires into one catch-up run, at
//! most one concurrent instance, bounded retries with a fixed delay, a
//! per-run timeout, bounded history, and a derived health status.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use verdure_core::{CellState, LineageRepository, TriggerRecord};
use verdure_types::{
    validate_cron_fields, HealthStatus, Result, SchedulerJobConfig, TriggerStatus, VerdureError,
};

/// Trigger records retained per job
const HISTORY_LIMIT: usize = 100;

/// Grace added to the expected interval before health degrades
const HEALTH_BUFFER_HOURS: i64 = 2;

/// Window in which a scheduled fire coalesces with a just-finished run
const COALESCE_WINDOW_SECS: i64 = 60;

pub type JobFuture = BoxFuture<'static, Result<serde_json::Value>>;
pub type JobCallable = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Resolves job names to callables at install time, keeping the scheduler
/// free of direct references to the components it drives
#[derive(Default)]
pub struct JobFactory {
    callables: HashMap<String, JobCallable>,
}

impl JobFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, callable: JobCallable) {
        self.callables.insert(name.to_string(), callable);
    }

    pub fn resolve(&self, name: &str) -> Result<JobCallable> {
        self.callables
            .get(name)
            .cloned()
            .ok_or_else(|| VerdureError::NotFound(format!("job callable '{}'", name)))
    }
}

/// A validated 5-field cron schedule.
///
/// The underlying parser wants a seconds field; it is owned here and
/// pinned to zero, so callers only ever see 5-field expressions.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        validate_cron_fields(expression)?;
        let with_seconds = format!("0 {}", expression);
        let schedule = cron::Schedule::from_str(&with_seconds).map_err(|e| {
            VerdureError::InvalidConfig(format!("invalid cron expression '{}': {}", expression, e))
        })?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire strictly after the given instant
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Interval between consecutive fires, falling back to a day when the
    /// schedule cannot produce two upcoming fires
    pub fn expected_interval(&self) -> Duration {
        let mut upcoming = self.schedule.upcoming(Utc);
        match (upcoming.next(), upcoming.next()) {
            (Some(a), Some(b)) => b - a,
            _ => Duration::hours(24),
        }
    }
}

#[derive(Debug, Default)]
struct JobRuntime {
    history: VecDeque<TriggerRecord>,
    last_successful: Option<DateTime<Utc>>,
    last_execution_start: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    current_status: Option<TriggerStatus>,
}

struct Job {
    id: String,
    config: SchedulerJobConfig,
    schedule: RwLock<CronSchedule>,
    callable: JobCallable,
    runtime: Mutex<JobRuntime>,
    /// Enforces max one concurrent instance
    run_lock: AsyncMutex<()>,
}

/// Status snapshot exposed through the REST surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub scheduler_running: bool,
    pub cron_expression: String,
    pub next_run: Option<DateTime<Utc>>,
    pub last_execution: Option<TriggerRecord>,
    pub current_status: Option<TriggerStatus>,
    pub health_status: HealthStatus,
    pub success_rate_percent: f64,
    pub average_duration_ms: f64,
    pub history_count: usize,
    pub last_successful: Option<DateTime<Utc>>,
}

/// Cron-driven trigger engine for the orchestrator, evolution, and
/// lifecycle jobs
pub struct Scheduler {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    recorder: Option<Arc<dyn LineageRepository>>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            jobs: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
            handles: Mutex::new(Vec::new()),
            recorder: None,
        }
    }

    /// Mirror every trigger record into the relational store
    pub fn with_recorder(mut self, recorder: Arc<dyn LineageRepository>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Install (or replace) a job. The expression must be 5-field cron.
    pub fn install_job(
        &self,
        job_id: &str,
        config: SchedulerJobConfig,
        callable: JobCallable,
    ) -> Result<()> {
        config.validate()?;
        let schedule = CronSchedule::parse(&config.cron_expression)?;
        let job = Arc::new(Job {
            id: job_id.to_string(),
            config,
            schedule: RwLock::new(schedule),
            callable,
            runtime: Mutex::new(JobRuntime::default()),
            run_lock: AsyncMutex::new(()),
        });
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        jobs.insert(job_id.to_string(), job);
        info!(job_id, "installed scheduled job");
        Ok(())
    }

    /// Install a job by factory name
    pub fn install_from_factory(
        &self,
        job_id: &str,
        config: SchedulerJobConfig,
        factory: &JobFactory,
    ) -> Result<()> {
        let callable = factory.resolve(job_id)?;
        self.install_job(job_id, config, callable)
    }

    /// Seed the last-success mark, e.g. from persisted state after a
    /// restart; drives catch-up of fires missed while down
    pub fn set_last_success(&self, job_id: &str, at: DateTime<Utc>) -> Result<()> {
        let job = self.job(job_id)?;
        let mut runtime = job
            .runtime
            .lock()
            .map_err(|_| VerdureError::LockError("Failed to acquire job lock".to_string()))?;
        runtime.last_successful = Some(at);
        Ok(())
    }

    fn job(&self, job_id: &str) -> Result<Arc<Job>> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| VerdureError::NotFound(format!("job {}", job_id)))
    }

    /// Spawn the fire loops for every installed job
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let jobs: Vec<Arc<Job>> = {
            let jobs = self
                .jobs
                .read()
                .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
            jobs.values().cloned().collect()
        };
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| VerdureError::LockError("Failed to acquire handle lock".to_string()))?;
        for job in jobs {
            let shutdown = self.shutdown_rx.clone();
            let recorder = self.recorder.clone();
            handles.push(tokio::spawn(job_loop(job, shutdown, recorder)));
        }
        info!("scheduler started");
        Ok(())
    }

    /// Graceful shutdown: stop accepting fires and let in-flight runs end
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Manually trigger a job right now. Returns the execution id, or an
    /// error when the job is already running.
    pub async fn trigger_now(&self, job_id: &str) -> Result<String> {
        let job = self.job(job_id)?;
        match execute_job(&job, self.recorder.clone(), true).await {
            Some(execution_id) => Ok(execution_id),
            None => Err(VerdureError::SchedulerError(format!(
                "job {} is already running",
                job_id
            ))),
        }
    }

    /// Swap a job's schedule without dropping its history
    pub fn update_schedule(&self, job_id: &str, cron_expression: &str) -> Result<()> {
        let job = self.job(job_id)?;
        let schedule = CronSchedule::parse(cron_expression)?;
        let mut guard = job
            .schedule
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        *guard = schedule;
        info!(job_id, cron_expression, "updated job schedule");
        Ok(())
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatus> {
        let job = self.job(job_id)?;
        let schedule = job
            .schedule
            .read()
            .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?
            .clone();
        let runtime = job
            .runtime
            .lock()
            .map_err(|_| VerdureError::LockError("Failed to acquire job lock".to_string()))?;

        let total = runtime.history.len();
        let successes = runtime
            .history
            .iter()
            .filter(|r| r.status == TriggerStatus::Success)
            .count();
        let durations: Vec<i64> = runtime
            .history
            .iter()
            .filter_map(|r| r.duration_ms())
            .collect();
        let average_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        let health_status = self.health_of(&schedule, runtime.last_successful);

        Ok(JobStatus {
            job_id: job.id.clone(),
            scheduler_running: self.is_running(),
            cron_expression: schedule.expression().to_string(),
            next_run: runtime.next_run,
            last_execution: runtime.history.back().cloned(),
            current_status: runtime.current_status,
            health_status,
            success_rate_percent: if total > 0 {
                successes as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            average_duration_ms,
            history_count: total,
            last_successful: runtime.last_successful,
        })
    }

    pub fn history(&self, job_id: &str, limit: usize) -> Result<Vec<TriggerRecord>> {
        let job = self.job(job_id)?;
        let runtime = job
            .runtime
            .lock()
            .map_err(|_| VerdureError::LockError("Failed to acquire job lock".to_string()))?;
        Ok(runtime.history.iter().rev().take(limit).cloned().collect())
    }

    fn health_of(
        &self,
        schedule: &CronSchedule,
        last_successful: Option<DateTime<Utc>>,
    ) -> HealthStatus {
        if !self.is_running() {
            return HealthStatus::Stopped;
        }
        let Some(last) = last_successful else {
            return HealthStatus::Unknown;
        };
        let expected = schedule.expected_interval() + Duration::hours(HEALTH_BUFFER_HOURS);
        let elapsed = Utc::now() - last;
        if elapsed <= expected {
            HealthStatus::Healthy
        } else if elapsed <= expected * 2 {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn job_loop(
    job: Arc<Job>,
    mut shutdown: watch::Receiver<bool>,
    recorder: Option<Arc<dyn LineageRepository>>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let now = Utc::now();
        let schedule = match job.schedule.read() {
            Ok(schedule) => schedule.clone(),
            Err(_) => break,
        };

        // Coalesce fires missed while the process was down: at most one
        // catch-up run regardless of how many were missed
        let anchor = {
            match job.runtime.lock() {
                Ok(runtime) => runtime.last_execution_start.or(runtime.last_successful),
                Err(_) => break,
            }
        };
        let missed = anchor
            .and_then(|a| schedule.next_after(a))
            .map(|t| t <= now)
            .unwrap_or(false);
        if missed {
            info!(job_id = %job.id, "catching up one missed fire");
            execute_job(&job, recorder.clone(), false).await;
            continue;
        }

        let Some(next) = schedule.next_after(now) else {
            warn!(job_id = %job.id, "schedule yields no future fires, loop ending");
            break;
        };
        if let Ok(mut runtime) = job.runtime.lock() {
            runtime.next_run = Some(next);
        }

        let wait = (next - now).to_std().unwrap_or(StdDuration::ZERO);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                // A manual trigger inside the coalesce window replaces
                // this fire
                let recently_ran = {
                    match job.runtime.lock() {
                        Ok(runtime) => runtime
                            .last_execution_start
                            .map(|t| t >= next - Duration::seconds(COALESCE_WINDOW_SECS))
                            .unwrap_or(false),
                        Err(_) => false,
                    }
                };
                if !recently_ran {
                    execute_job(&job, recorder.clone(), false).await;
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Run one job execution with the retry/timeout contract. Returns the
/// execution id, or None when another instance already holds the run lock.
async fn execute_job(
    job: &Arc<Job>,
    recorder: Option<Arc<dyn LineageRepository>>,
    manual: bool,
) -> Option<String> {
    let _guard = job.run_lock.try_lock().ok()?;

    let prefix = if manual { "manual" } else { "run" };
    let execution_id = format!(
        "{}-{}-{}",
        prefix,
        job.id,
        Utc::now().format("%Y%m%d%H%M%S%3f")
    );
    let mut record = TriggerRecord::scheduled(execution_id.clone(), job.id.clone());

    if let Ok(mut runtime) = job.runtime.lock() {
        runtime.last_execution_start = Some(Utc::now());
        runtime.current_status = Some(TriggerStatus::Running);
    }

    let timeout = StdDuration::from_secs(job.config.timeout_minutes * 60);
    let retry_delay = StdDuration::from_secs(job.config.retry_delay_minutes * 60);

    record.started_at = Some(Utc::now());
    for attempt in 0..=job.config.max_retries {
        record.retry_count = attempt;
        if attempt > 0 {
            record.status = TriggerStatus::Retrying;
            if let Ok(mut runtime) = job.runtime.lock() {
                runtime.current_status = Some(TriggerStatus::Retrying);
            }
            info!(job_id = %job.id, attempt, "retrying job");
            tokio::time::sleep(retry_delay).await;
        }

        record.status = TriggerStatus::Running;
        match tokio::time::timeout(timeout, (job.callable)()).await {
            Ok(Ok(outcome)) => {
                record.status = TriggerStatus::Success;
                record.outcome_summary = Some(outcome);
                record.error = None;
                break;
            }
            Ok(Err(e)) => {
                warn!(job_id = %job.id, attempt, error = %e, "job attempt failed");
                record.error = Some(e.to_string());
                record.status = TriggerStatus::Failed;
            }
            Err(_) => {
                warn!(job_id = %job.id, attempt, "job attempt timed out");
                record.error = Some(format!(
                    "job exceeded {} minute timeout",
                    job.config.timeout_minutes
                ));
                record.status = TriggerStatus::Failed;
            }
        }
    }
    record.completed_at = Some(Utc::now());

    if let Ok(mut runtime) = job.runtime.lock() {
        if record.status == TriggerStatus::Success {
            runtime.last_successful = record.completed_at;
        }
        runtime.current_status = Some(record.status);
        runtime.history.push_back(record.clone());
        while runtime.history.len() > HISTORY_LIMIT {
            runtime.history.pop_front();
        }
    }

    if let Some(recorder) = recorder {
        if let Err(e) = recorder.record_trigger(&record).await {
            error!(job_id = %job.id, error = %e, "failed to persist trigger record");
        }
        let cell_state = cell_state_snapshot(job);
        if let Err(e) = recorder.upsert_cell_state(&cell_state).await {
            error!(job_id = %job.id, error = %e, "failed to persist cell state");
        }
    }

    Some(execution_id)
}

/// Persistent view of a job's runtime counters
fn cell_state_snapshot(job: &Arc<Job>) -> CellState {
    let now = Utc::now();
    let (runs, successes, failures, avg_duration, last_run, next_run, last_error, last_error_at, state) =
        match job.runtime.lock() {
            Ok(runtime) => {
                let durations: Vec<i64> =
                    runtime.history.iter().filter_map(|r| r.duration_ms()).collect();
                let avg = if durations.is_empty() {
                    None
                } else {
                    Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
                };
                let last_failed = runtime
                    .history
                    .iter()
                    .rev()
                    .find(|r| r.status == TriggerStatus::Failed);
                (
                    runtime.history.len() as i64,
                    runtime
                        .history
                        .iter()
                        .filter(|r| r.status == TriggerStatus::Success)
                        .count() as i64,
                    runtime
                        .history
                        .iter()
                        .filter(|r| r.status == TriggerStatus::Failed)
                        .count() as i64,
                    avg,
                    runtime.last_execution_start,
                    runtime.next_run,
                    last_failed.and_then(|r| r.error.clone()),
                    last_failed.and_then(|r| r.completed_at),
                    runtime
                        .current_status
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_else(|| "idle".to_string()),
                )
            }
            Err(_) => (0, 0, 0, None, None, None, None, None, "unknown".to_string()),
        };

    CellState {
        skill_id: job.id.clone(),
        state,
        created_at: now,
        updated_at: now,
        last_run,
        next_run,
        run_count: runs,
        success_count: successes,
        fail_count: failures,
        avg_duration_ms: avg_duration,
        last_error,
        last_error_at,
        config: serde_json::json!({
            "cron_expression": job.config.cron_expression,
            "max_retries": job.config.max_retries,
            "timeout_minutes": job.config.timeout_minutes,
        }),
        metadata: serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use chrono::TimeZone;

    fn fast_config(cron: &str) -> SchedulerJobConfig {
        SchedulerJobConfig {
            cron_expression: cron.to_string(),
            timezone: "UTC".to_string(),
            max_retries: 1,
            retry_delay_minutes: 0,
            timeout_minutes: 1,
        }
    }

    fn counting_callable(counter: Arc<AtomicUsize>) -> JobCallable {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({"ok": true}))
            })
        })
    }

    #[test]
    fn five_field_cron_parses_and_six_field_rejected() {
        assert!(CronSchedule::parse("0 6 * * *").is_ok());
        assert!(matches!(
            CronSchedule::parse("0 0 6 * * *"),
            Err(VerdureError::InvalidConfig(_))
        ));
        assert!(CronSchedule::parse("not a cron").is_err());
    }

    #[test]
    fn daily_six_am_fires_next_morning() {
        let schedule = CronSchedule::parse("0 6 * * *").unwrap();
        let yesterday_six = Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();
        let next = schedule.next_after(yesterday_six).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 6, 0, 0).unwrap());
        assert_eq!(schedule.expected_interval(), Duration::hours(24));
    }

    #[tokio::test]
    async fn missed_fire_coalesces_to_one_catch_up() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .install_job("p0_daily_sync", fast_config("0 6 * * *"), counting_callable(Arc::clone(&counter)))
            .unwrap();
        // Last success 28 hours ago: exactly one daily fire was missed
        scheduler
            .set_last_success("p0_daily_sync", Utc::now() - Duration::hours(28))
            .unwrap();

        scheduler.start().unwrap();
        tokio::time::sleep(StdDuration::from_millis(300)).await;
        scheduler.stop().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let status = scheduler.status("p0_daily_sync").unwrap();
        assert!(status.last_successful.unwrap() > Utc::now() - Duration::minutes(1));
        assert_eq!(status.history_count, 1);
    }

    #[tokio::test]
    async fn trigger_now_runs_once_and_records() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .install_job("p3_evolution", fast_config("0 2 * * 0"), counting_callable(Arc::clone(&counter)))
            .unwrap();

        let execution_id = scheduler.trigger_now("p3_evolution").await.unwrap();
        assert!(execution_id.starts_with("manual-p3_evolution"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let history = scheduler.history("p3_evolution", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TriggerStatus::Success);
        assert!(history[0].outcome_summary.is_some());
    }

    #[tokio::test]
    async fn failing_job_retries_then_fails() {
        let scheduler = Scheduler::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let callable: JobCallable = {
            let attempts = Arc::clone(&attempts);
            Arc::new(move || {
                let attempts = Arc::clone(&attempts);
                Box::pin(async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(VerdureError::Transient("downstream blip".to_string()))
                })
            })
        };
        scheduler
            .install_job("data_lifecycle", fast_config("0 2 * * *"), callable)
            .unwrap();

        scheduler.trigger_now("data_lifecycle").await.unwrap();

        // Initial attempt plus one retry
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let history = scheduler.history("data_lifecycle", 1).unwrap();
        assert_eq!(history[0].status, TriggerStatus::Failed);
        assert_eq!(history[0].retry_count, 1);
        assert!(history[0].error.as_deref().unwrap().contains("downstream blip"));
    }

    #[tokio::test]
    async fn health_progression() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .install_job("p0_daily_sync", fast_config("0 6 * * *"), counting_callable(counter))
            .unwrap();

        // Not started yet
        assert_eq!(
            scheduler.status("p0_daily_sync").unwrap().health_status,
            HealthStatus::Stopped
        );

        scheduler.start().unwrap();
        assert_eq!(
            scheduler.status("p0_daily_sync").unwrap().health_status,
            HealthStatus::Unknown
        );

        // Fresh success: healthy
        scheduler
            .set_last_success("p0_daily_sync", Utc::now() - Duration::hours(1))
            .unwrap();
        assert_eq!(
            scheduler.status("p0_daily_sync").unwrap().health_status,
            HealthStatus::Healthy
        );

        // Beyond interval + buffer: warning
        scheduler
            .set_last_success("p0_daily_sync", Utc::now() - Duration::hours(30))
            .unwrap();
        assert_eq!(
            scheduler.status("p0_daily_sync").unwrap().health_status,
            HealthStatus::Warning
        );

        // Beyond twice that: critical
        scheduler
            .set_last_success("p0_daily_sync", Utc::now() - Duration::hours(80))
            .unwrap();
        assert_eq!(
            scheduler.status("p0_daily_sync").unwrap().health_status,
            HealthStatus::Critical
        );

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn update_schedule_keeps_history() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .install_job("p0_daily_sync", fast_config("0 6 * * *"), counting_callable(counter))
            .unwrap();
        scheduler.trigger_now("p0_daily_sync").await.unwrap();

        scheduler.update_schedule("p0_daily_sync", "30 7 * * *").unwrap();
        let status = scheduler.status("p0_daily_sync").unwrap();
        assert_eq!(status.cron_expression, "30 7 * * *");
        assert_eq!(status.history_count, 1);

        // Malformed updates are rejected
        assert!(scheduler.update_schedule("p0_daily_sync", "0 0 6 * * *").is_err());
    }

    #[test]
    fn factory_resolves_registered_callables() {
        let mut factory = JobFactory::new();
        factory.register("p0_daily_sync", Arc::new(|| Box::pin(async { Ok(serde_json::json!({})) })));
        assert!(factory.resolve("p0_daily_sync").is_ok());
        assert!(matches!(
            factory.resolve("unknown_job"),
            Err(VerdureError::NotFound(_))
        ));
    }
}
