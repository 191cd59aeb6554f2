//! Process-internal REST surface
//!
//! Thin request translation onto the pipeline services: scheduler control
//! for the daily sync, manual evolution cycles, and the data-health
//! summary. No auth, no rendering; external collaborators consume this
//! from inside the deployment boundary.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use verdure_core::LineageRepository;
use verdure_pipeline::{DataLifecycleAgent, Deps, EvolutionEngine, FeedbackLoop, Scheduler};
use verdure_types::{Result, SchedulerJobConfig, VerdureError};

/// Identifier of the daily sync job
pub const P0_JOB_ID: &str = "p0_daily_sync";

/// Shared handle bundle behind every route
pub struct AppState {
    pub deps: Arc<Deps>,
    pub scheduler: Arc<Scheduler>,
    pub evolution: Arc<tokio::sync::Mutex<EvolutionEngine>>,
    pub lifecycle: Arc<DataLifecycleAgent>,
    pub feedback: Arc<FeedbackLoop>,
}

/// Build the router over a prepared application state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/scheduler/p0/start", post(start_p0_schedule))
        .route("/scheduler/p0/trigger", post(trigger_p0))
        .route("/scheduler/p0/status", get(p0_status))
        .route("/evolution/trigger", post(trigger_evolution))
        .route("/evolution/report/:id", get(evolution_report))
        .route("/data/health", get(data_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

struct ApiError(VerdureError);

impl From<VerdureError> for ApiError {
    fn from(error: VerdureError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            VerdureError::NotFound(_) | VerdureError::UnknownAgent(_) => StatusCode::NOT_FOUND,
            VerdureError::InvalidConfig(_) | VerdureError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            VerdureError::SessionInFlight(_) | VerdureError::SchedulerError(_) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct StartScheduleRequest {
    /// Daily time as "HH:MM"; mutually exclusive with `cron`
    sync_time: Option<String>,
    /// 5-field cron expression
    cron: Option<String>,
}

#[derive(Debug, Serialize)]
struct StartScheduleResponse {
    job_id: String,
    cron_expression: String,
    running: bool,
}

/// Translate a "HH:MM" daily time into a 5-field cron expression
fn cron_from_sync_time(sync_time: &str) -> Result<String> {
    let (hour, minute) = sync_time
        .split_once(':')
        .ok_or_else(|| VerdureError::InvalidInput(format!("bad sync_time '{}'", sync_time)))?;
    let hour: u8 = hour
        .parse()
        .map_err(|_| VerdureError::InvalidInput(format!("bad hour in '{}'", sync_time)))?;
    let minute: u8 = minute
        .parse()
        .map_err(|_| VerdureError::InvalidInput(format!("bad minute in '{}'", sync_time)))?;
    if hour > 23 || minute > 59 {
        return Err(VerdureError::InvalidInput(format!(
            "sync_time '{}' out of range",
            sync_time
        )));
    }
    Ok(format!("{} {} * * *", minute, hour))
}

/// Idempotent: reinstalling the same schedule keeps job history
async fn start_p0_schedule(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartScheduleRequest>,
) -> std::result::Result<Json<StartScheduleResponse>, ApiError> {
    let cron_expression = match (&request.cron, &request.sync_time) {
        (Some(cron), _) => cron.clone(),
        (None, Some(sync_time)) => cron_from_sync_time(sync_time)?,
        (None, None) => SchedulerJobConfig::default().cron_expression,
    };

    if state.scheduler.status(P0_JOB_ID).is_ok() {
        state.scheduler.update_schedule(P0_JOB_ID, &cron_expression)?;
    } else {
        return Err(ApiError(VerdureError::SchedulerError(format!(
            "job {} is not installed",
            P0_JOB_ID
        ))));
    }
    state.scheduler.start()?;

    info!(cron_expression, "p0 schedule started");
    Ok(Json(StartScheduleResponse {
        job_id: P0_JOB_ID.to_string(),
        cron_expression,
        running: state.scheduler.is_running(),
    }))
}

async fn trigger_p0(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let execution_id = state.scheduler.trigger_now(P0_JOB_ID).await?;
    Ok(Json(serde_json::json!({ "execution_id": execution_id })))
}

async fn p0_status(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let status = state.scheduler.status(P0_JOB_ID)?;
    Ok(Json(serde_json::to_value(status).map_err(VerdureError::from)?))
}

async fn trigger_evolution(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let base_success_rate = state.feedback.collector.success_rate();
    let mut engine = state.evolution.lock().await;
    let report = engine.run_cycle(base_success_rate)?;
    Ok(Json(serde_json::to_value(report).map_err(VerdureError::from)?))
}

async fn evolution_report(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let engine = state.evolution.lock().await;
    let report = engine.report(&report_id)?;
    Ok(Json(serde_json::to_value(report).map_err(VerdureError::from)?))
}

async fn data_health(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let health = state.deps.lineage.health().await?;
    let alerts = state.lifecycle.recent_alerts(5);
    let p0_health = state
        .scheduler
        .status(P0_JOB_ID)
        .map(|s| s.health_status)
        .unwrap_or(verdure_types::HealthStatus::Unknown);

    Ok(Json(serde_json::json!({
        "tier_distribution": health.tier_distribution,
        "cell_states": health.cell_state_counts,
        "agent_status": health.agent_status_counts,
        "recent_triggers": {
            "success": health.recent_trigger_success,
            "failure": health.recent_trigger_failure,
        },
        "p0_health": p0_health,
        "alerts": alerts,
        "shared_memory_entries": state.deps.shared_memory.len().unwrap_or(0),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_time_translates_to_cron() {
        assert_eq!(cron_from_sync_time("06:00").unwrap(), "0 6 * * *");
        assert_eq!(cron_from_sync_time("23:59").unwrap(), "59 23 * * *");
        assert!(cron_from_sync_time("24:00").is_err());
        assert!(cron_from_sync_time("six").is_err());
    }
}
