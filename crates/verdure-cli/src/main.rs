//! Verdure daemon entry point
//!
//! Wires the dependency graph, installs the default scheduled jobs, and
//! serves the process-internal REST surface until shutdown.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use verdure_api::{router, AppState, P0_JOB_ID};
use verdure_pipeline::{
    DataLifecycleAgent, Deps, EvolutionEngine, FeedbackLoop, JobFactory, Orchestrator, Scheduler,
};
use verdure_types::{
    EvolutionConfig, LifecycleConfig, OrchestratorConfig, SchedulerJobConfig, VerdureConfig,
};

#[derive(Parser, Debug)]
#[command(name = "verdure", about = "Organic growth orchestration daemon")]
struct Args {
    /// SQLite database URL for the relational store
    #[arg(long, default_value = "sqlite:verdure.db?mode=rwc")]
    database_url: String,

    /// Address for the process-internal REST surface
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Cron expression for the daily sync (5-field)
    #[arg(long, default_value = "0 6 * * *")]
    sync_cron: String,

    /// Cron expression for the weekly evolution cycle (5-field)
    #[arg(long, default_value = "0 2 * * 0")]
    evolution_cron: String,

    /// Cron expression for the nightly lifecycle pass (5-field)
    #[arg(long, default_value = "0 2 * * *")]
    lifecycle_cron: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = VerdureConfig::default();
    config.scheduler.cron_expression = args.sync_cron.clone();
    config.validate()?;

    let deps = Arc::new(Deps::bootstrap(&args.database_url).await?);
    info!(database = %args.database_url, "dependency graph ready");

    let orchestrator = Arc::new(
        Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::clone(&deps.registry),
            Arc::clone(&deps.shared_memory),
        )?
        .with_recorder(Arc::clone(&deps.lineage)),
    );
    let feedback = Arc::new(FeedbackLoop::new(Arc::clone(&deps.shared_memory)));
    let mut evolution_engine =
        EvolutionEngine::new(EvolutionConfig::default(), Arc::clone(&deps.shared_memory))?;
    evolution_engine.initialize_populations();
    let evolution = Arc::new(tokio::sync::Mutex::new(evolution_engine));
    let lifecycle = Arc::new(DataLifecycleAgent::new(
        Arc::clone(&deps.lineage),
        LifecycleConfig::default(),
    )?);

    // Jobs are resolved by name; the scheduler never holds the components
    let mut factory = JobFactory::new();
    {
        let orchestrator = Arc::clone(&orchestrator);
        factory.register(
            P0_JOB_ID,
            Arc::new(move || {
                let orchestrator = Arc::clone(&orchestrator);
                Box::pin(async move {
                    // Content acquisition is a platform-driver concern;
                    // the scheduled sync runs over whatever was ingested
                    let session = orchestrator.run_sync(Vec::new()).await?;
                    Ok(serde_json::json!({
                        "session_id": session.session_id,
                        "status": session.status,
                        "signals": session.synthesized_signals.len(),
                    }))
                })
            }),
        );
    }
    {
        let evolution = Arc::clone(&evolution);
        let feedback = Arc::clone(&feedback);
        factory.register(
            "p3_evolution",
            Arc::new(move || {
                let evolution = Arc::clone(&evolution);
                let feedback = Arc::clone(&feedback);
                Box::pin(async move {
                    let base = feedback.collector.success_rate();
                    let report = evolution.lock().await.run_cycle(base)?;
                    Ok(serde_json::json!({
                        "report_id": report.report_id,
                        "generation": report.generation,
                        "deployed": report.strategies_selected,
                    }))
                })
            }),
        );
    }
    {
        let lifecycle = Arc::clone(&lifecycle);
        factory.register(
            "data_lifecycle",
            Arc::new(move || {
                let lifecycle = Arc::clone(&lifecycle);
                Box::pin(async move {
                    let summary = lifecycle.run_lifecycle_transition().await?;
                    Ok(serde_json::to_value(summary)?)
                })
            }),
        );
    }
    {
        let lifecycle = Arc::clone(&lifecycle);
        factory.register(
            "quality_check",
            Arc::new(move || {
                let lifecycle = Arc::clone(&lifecycle);
                Box::pin(async move {
                    let reports = lifecycle.run_quality_sweep().await?;
                    Ok(serde_json::json!({ "items_checked": reports.len() }))
                })
            }),
        );
    }

    let scheduler = Arc::new(Scheduler::new().with_recorder(Arc::clone(&deps.lineage)));
    let job = |cron: &str| SchedulerJobConfig {
        cron_expression: cron.to_string(),
        ..SchedulerJobConfig::default()
    };
    scheduler.install_from_factory(P0_JOB_ID, job(&args.sync_cron), &factory)?;
    scheduler.install_from_factory("p3_evolution", job(&args.evolution_cron), &factory)?;
    scheduler.install_from_factory("data_lifecycle", job(&args.lifecycle_cron), &factory)?;
    scheduler.install_from_factory("quality_check", job("0 * * * *"), &factory)?;
    scheduler.start()?;

    let state = Arc::new(AppState {
        deps: Arc::clone(&deps),
        scheduler: Arc::clone(&scheduler),
        evolution,
        lifecycle,
        feedback,
    });

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!(listen = %args.listen, "serving REST surface");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // Current fires finish, background tasks drain
    scheduler.stop().await;
    deps.shutdown();
    info!("verdure stopped");
    Ok(())
}
