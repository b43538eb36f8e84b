use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use scene_queue::{
    InMemorySceneHost, LoadMode, OperationKind, OperationOutcome, OrchestratorConfig,
    OrchestratorError, SceneOrchestrator,
};

const SCENES: [&str; 5] = ["Loading", "Menu", "Level1", "Level2", "Boss"];

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    if let Err(e) = run().await {
        error!("Scene queue demo failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), OrchestratorError> {
    // An optional JSON config path as the only argument
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            OrchestratorConfig::from_json_file(path)?
        }
        None => OrchestratorConfig::default(),
    };

    let host = Arc::new(
        InMemorySceneHost::new(SCENES)
            .with_jitter(Duration::from_millis(40), 7),
    );
    let orchestrator = SceneOrchestrator::spawn(host.clone(), config)?;
    orchestrator.register_transition_scene("Loading")?;
    orchestrator.set_error_handler(|failure| warn!("Dispatch failed: {}", failure));

    // Log every operation as it settles
    let mut reports = orchestrator.subscribe_reports();
    let reporter = tokio::spawn(async move {
        while let Ok(report) = reports.recv().await {
            info!(
                "{} {} -> {:?} at {}",
                report.id, report.descriptor, report.outcome, report.settled_at
            );
        }
    });

    orchestrator.load("Menu");
    orchestrator.await_drain().await?;
    info!("Loaded scenes: {:?}", host.loaded_scenes());

    let level = orchestrator.enqueue_tracked(
        "Scenes/Level1",
        OperationKind::Load,
        LoadMode::Additive,
        true,
    );
    let boss =
        orchestrator.enqueue_tracked("Boss", OperationKind::Load, LoadMode::Additive, false);
    orchestrator.unload("Menu");
    orchestrator.enqueue("", OperationKind::Load, LoadMode::Additive, true);

    let outcomes = futures::future::join_all([level, boss]).await;
    for outcome in outcomes {
        match outcome {
            Ok(OperationOutcome::Completed) => {}
            Ok(other) => warn!("Operation did not complete: {:?}", other),
            Err(_) => warn!("Operation ticket dropped"),
        }
    }
    orchestrator.await_drain().await?;
    info!("Loaded scenes: {:?}", host.loaded_scenes());

    orchestrator.enqueue("Level2", OperationKind::Load, LoadMode::Exclusive, false);
    orchestrator.await_drain().await?;
    info!("Loaded scenes: {:?}", host.loaded_scenes());

    let status = orchestrator.status();
    info!(
        "Session {} finished: {} completed, {} failed, {} rejected, {} orphaned events",
        orchestrator.session(),
        status.stats.completed,
        status.stats.failed,
        status.stats.rejected,
        status.stats.orphaned_events
    );

    orchestrator.shutdown().await?;
    drop(orchestrator);
    if let Err(e) = reporter.await {
        error!("Report logger ended abnormally: {:?}", e);
    }
    Ok(())
}
