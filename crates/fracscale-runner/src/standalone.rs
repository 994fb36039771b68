//! Single-process mode: engine, parameter store, worker pool, load
//! generator, and control loop wired together from one configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fracscale_control::{ScalingPolicy, build_controller};
use fracscale_core::FracscaleConfig;
use fracscale_queue::{MemoryParams, MemoryQueue};
use fracscale_worker::{
    FileProbe, ShutdownLatch, SleepHandler, TerminationWatcher, WorkerSettings,
};

use crate::control_loop::{Orchestrator, RunSummary, RunnerSettings};
use crate::loadgen::{LoadGenerator, read_deltas};
use crate::pool::LocalPoolScaler;
use crate::scaler::{CommandScaler, Scaler};
use crate::writer::ResultWriter;

/// Run one experiment to completion (or until `cancel` fires).
///
/// Without a load file the loop runs open-ended until cancelled.
pub async fn run_standalone(
    config: FracscaleConfig,
    cancel: CancellationToken,
) -> anyhow::Result<RunSummary> {
    config.validate().context("invalid configuration")?;

    let controller = build_controller(&config.controller, config.runner.period())?;
    let policy = ScalingPolicy::new(&config.policy)?;

    let params = MemoryParams::new();
    let engine = MemoryQueue::new(config.queue.heartbeat_timeout()).with_params(params.clone());
    let engine = Arc::new(engine);
    let params = Arc::new(params);

    let (scaler, pool): (Arc<dyn Scaler>, Option<Arc<LocalPoolScaler>>) =
        match &config.runner.scale_command {
            Some(template) => (
                Arc::new(
                    CommandScaler::new(template.clone())
                        .with_timeout(config.runner.scale_timeout()),
                ) as Arc<dyn Scaler>,
                None,
            ),
            None => {
                let pool = Arc::new(LocalPoolScaler::new(
                    engine.clone(),
                    params.clone(),
                    Arc::new(SleepHandler::new(config.worker.processing_time())),
                    WorkerSettings::from(&config.worker),
                ));
                (pool.clone() as Arc<dyn Scaler>, Some(pool))
            }
        };
    info!(scaler = scaler.name(), controller = controller.name(), "standalone run starting");

    let deltas = match &config.load.deltas_file {
        Some(path) => read_deltas(path)?,
        None => {
            warn!("no load file configured, running until cancelled");
            Vec::new()
        }
    };
    let generator = LoadGenerator::new(
        engine.clone(),
        params.clone(),
        deltas,
        config.load.payload_bytes,
    )
    .with_poll(config.runner.registration_poll());
    let total = generator.total();

    let writer = ResultWriter::create(&config.runner.results_dir, controller.name(), &config)?;
    let mut orchestrator = Orchestrator::new(
        controller,
        policy,
        scaler,
        engine,
        params,
        RunnerSettings::from(&config),
    )
    .with_writer(writer);
    if config.load.deltas_file.is_some() {
        orchestrator = orchestrator.with_total(total);
    }

    let monitors = CancellationToken::new();
    let marker_tasks = match &config.worker.termination_marker {
        Some(marker) => watch_marker(marker, config.worker.termination_poll(), &cancel, &monitors),
        None => Vec::new(),
    };

    let load_cancel = cancel.child_token();
    let load = tokio::spawn(generator.run(load_cancel.clone()));

    let summary = orchestrator.run(cancel).await;

    monitors.cancel();
    for task in marker_tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "marker watcher task panicked");
        }
    }

    load_cancel.cancel();
    match load.await {
        Ok(Ok(report)) => info!(sent = report.sent, retries = report.retries, "load generator stopped"),
        Ok(Err(e)) => warn!(error = %e, "load generator failed"),
        Err(e) => warn!(error = %e, "load generator task panicked"),
    }
    if let Some(pool) = pool {
        let report = pool.shutdown().await;
        info!(
            workers = report.workers,
            handled = report.total_handled(),
            failed = report.failed,
            "pool report"
        );
    }

    let summary = summary?;
    info!(
        controller = summary.controller,
        ticks = summary.ticks,
        received = summary.completed,
        total = ?summary.total,
        "run finished"
    );
    Ok(summary)
}

/// Cancel `run` once `marker` appears; every worker then drains. Both
/// tasks exit when `stop` fires and must be joined by the caller.
fn watch_marker(
    marker: &Path,
    every: Duration,
    run: &CancellationToken,
    stop: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    info!(marker = ?marker, "watching termination marker");
    let latch = ShutdownLatch::new();
    let watcher = TerminationWatcher::new(
        "fracscaled",
        Arc::new(FileProbe::new(marker)),
        latch.clone(),
        every,
    );
    let watch = tokio::spawn(watcher.run(stop.clone()));

    let run = run.clone();
    let stop = stop.clone();
    let relay = tokio::spawn(async move {
        tokio::select! {
            _ = latch.triggered() => {
                info!("termination marker found, stopping run");
                run.cancel();
            }
            _ = stop.cancelled() => {}
        }
    });
    vec![watch, relay]
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn join_all(tasks: Vec<JoinHandle<()>>) {
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(2), task)
                .await
                .expect("marker task should exit")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn marker_tasks_exit_when_stopped() {
        let tmp = tempfile::tempdir().unwrap();
        let run = CancellationToken::new();
        let stop = CancellationToken::new();
        let tasks = watch_marker(
            &tmp.path().join("terminate"),
            Duration::from_millis(10),
            &run,
            &stop,
        );
        assert_eq!(tasks.len(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.cancel();
        join_all(tasks).await;
        assert!(!run.is_cancelled());
    }

    #[tokio::test]
    async fn marker_cancels_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("terminate");
        let run = CancellationToken::new();
        let stop = CancellationToken::new();
        let tasks = watch_marker(&marker, Duration::from_millis(10), &run, &stop);

        std::fs::write(&marker, "").unwrap();
        tokio::time::timeout(Duration::from_secs(2), run.cancelled())
            .await
            .expect("marker should cancel the run");
        stop.cancel();
        join_all(tasks).await;
    }
}
