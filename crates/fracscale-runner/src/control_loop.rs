//! Control-loop orchestrator.
//!
//! One tick every `period`:
//!
//! ```text
//! drain completions → status read → snapshot → controller (once)
//!   → policy → scaler (integer part) + param store (fraction)
//!   → append trace + status records → sleep(period − elapsed, ≥ 0)
//! ```
//!
//! The loop ends once every expected query has completed and that
//! reading has held for `stabilization_ticks` consecutive ticks, or when
//! cancelled.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fracscale_control::{Controller, PolicyDecision, ScalingPolicy};
use fracscale_core::clock::epoch_secs_f64;
use fracscale_core::{ControllerAction, FracscaleConfig, FractionalParameters, QueueStatus};
use fracscale_metrics::{LatencySummary, SnapshotBuilder};
use fracscale_queue::params::{LOAD_GATE, WORKER_GATE};
use fracscale_queue::{ParamStore, QueueEngine};

use crate::error::ScaleError;
use crate::scaler::Scaler;
use crate::writer::ResultWriter;

/// Timing and termination knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub period: Duration,
    /// Replicas requested before the first tick; the loop waits until
    /// this many queues are registered.
    pub start_replicas: u32,
    /// Consecutive fully-complete ticks required before stopping.
    pub stabilization_ticks: u32,
    pub registration_poll: Duration,
    /// Delay published with every fractional probability.
    pub fractional_delay: Duration,
}

impl From<&FracscaleConfig> for RunnerSettings {
    fn from(config: &FracscaleConfig) -> Self {
        Self {
            period: config.runner.period(),
            start_replicas: config.runner.start_replicas,
            stabilization_ticks: config.runner.stabilization_ticks,
            registration_poll: config.runner.registration_poll(),
            fractional_delay: config.load.fractional_delay(),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&FracscaleConfig::default())
    }
}

// ── Completion tracking ───────────────────────────────────────────

/// Counts completions against the expected workload size.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    total: Option<u64>,
    completed: u64,
    window: u32,
    streak: u32,
}

impl CompletionTracker {
    /// `total` is the expected workload size; `None` never settles.
    pub fn new(total: Option<u64>, window: u32) -> Self {
        Self {
            total,
            completed: 0,
            window: window.max(1),
            streak: 0,
        }
    }

    /// Record one tick's completions.
    pub fn record(&mut self, completions: usize) {
        self.completed += completions as u64;
        if self.total.is_some_and(|t| self.completed >= t) {
            self.streak += 1;
        } else {
            self.streak = 0;
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(100.0),
            Some(t) => Some(self.completed as f64 * 100.0 / t as f64),
            None => None,
        }
    }

    /// Whether the workload has read complete for the whole window.
    pub fn is_settled(&self) -> bool {
        self.streak >= self.window
    }
}

// ── Tick records ──────────────────────────────────────────────────

/// What happened to this tick's scaling decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickOutcome {
    /// The scaler accepted the new integer target.
    Applied { replicas: u32 },
    /// Integer target equal to the last applied one; scaler not called.
    Unchanged,
    /// The controller delegated scaling.
    Skipped,
    /// The scaler refused or clamped the target.
    Rejected { reason: String },
    /// The engine or scaler was unreachable; retried next tick.
    Failed { error: String },
}

/// One line of `status.jsonl`.
#[derive(Debug, Clone, Serialize)]
pub struct TickRecord {
    pub tick: u64,
    pub ts: f64,
    pub controller: &'static str,
    /// Replica count the decision started from.
    pub ctl_from: f64,
    pub ctl_action: Option<ControllerAction>,
    /// Integer target sent (or due) to the scaler.
    pub ctl_final_decision: Option<u32>,
    /// Published fractional probability after this tick.
    pub fraction: f64,
    pub outcome: TickOutcome,
    pub completed: u64,
    pub total: Option<u64>,
    pub latency: Option<LatencySummary>,
    #[serde(flatten)]
    pub status: QueueStatus,
}

/// Final totals, written to `result.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub controller: &'static str,
    pub ticks: u64,
    #[serde(rename = "num_queries_received")]
    pub completed: u64,
    #[serde(rename = "num_queries_total")]
    pub total: Option<u64>,
    pub cancelled: bool,
}

// ── Orchestrator ──────────────────────────────────────────────────

pub struct Orchestrator {
    controller: Box<dyn Controller>,
    policy: ScalingPolicy,
    scaler: Arc<dyn Scaler>,
    engine: Arc<dyn QueueEngine>,
    params: Arc<dyn ParamStore>,
    settings: RunnerSettings,
    builder: SnapshotBuilder,
    tracker: CompletionTracker,
    writer: Option<ResultWriter>,
    fraction: f64,
    ticks: u64,
}

impl Orchestrator {
    pub fn new(
        controller: Box<dyn Controller>,
        policy: ScalingPolicy,
        scaler: Arc<dyn Scaler>,
        engine: Arc<dyn QueueEngine>,
        params: Arc<dyn ParamStore>,
        settings: RunnerSettings,
    ) -> Self {
        let tracker = CompletionTracker::new(None, settings.stabilization_ticks);
        Self {
            controller,
            policy,
            scaler,
            engine,
            params,
            settings,
            builder: SnapshotBuilder::default(),
            tracker,
            writer: None,
            fraction: 0.0,
            ticks: 0,
        }
    }

    /// Expected number of queries; the loop stops once all completed.
    pub fn with_total(mut self, total: u64) -> Self {
        self.tracker = CompletionTracker::new(Some(total), self.settings.stabilization_ticks);
        self
    }

    pub fn with_writer(mut self, writer: ResultWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_snapshot_builder(mut self, builder: SnapshotBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }

    /// Fractional probability currently published.
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Request the starting replicas, open the worker gate, wait for
    /// registration, then open the load gate. `false` if cancelled.
    pub async fn start(&mut self, cancel: &CancellationToken) -> anyhow::Result<bool> {
        let start = self.settings.start_replicas;
        match self.scaler.apply(start).await {
            Ok(granted) => self.policy.record_applied(granted),
            Err(e) => warn!(replicas = start, error = %e, "initial scale failed"),
        }
        self.params
            .publish_fractional(FractionalParameters::new(0.0, self.settings.fractional_delay))
            .await?;
        self.params.set(WORKER_GATE, "true").await?;

        loop {
            let registered = match self.engine.status().await {
                Ok(status) => status.queues.len(),
                Err(e) => {
                    warn!(error = %e, "status read failed");
                    0
                }
            };
            if registered >= start as usize {
                info!(registered, "replicas registered");
                break;
            }
            info!(registered, expected = start, "waiting for replicas to register");
            tokio::select! {
                _ = tokio::time::sleep(self.settings.registration_poll) => {}
                _ = cancel.cancelled() => return Ok(false),
            }
        }

        self.params.set(LOAD_GATE, "true").await?;
        info!(controller = self.controller.name(), "control loop starting");
        Ok(true)
    }

    /// Run one control tick.
    pub async fn tick(&mut self) -> TickRecord {
        self.ticks += 1;
        let tick = self.ticks;

        let completions = match self.engine.drain_completions().await {
            Ok(records) => records,
            Err(e) => {
                warn!(tick, error = %e, "completion feed unavailable");
                Vec::new()
            }
        };
        self.tracker.record(completions.len());
        if let Some(writer) = self.writer.as_mut()
            && let Err(e) = writer.append_trace(&completions)
        {
            warn!(error = %e, "trace write failed");
        }
        info!(
            tick,
            received = self.tracker.completed(),
            total = ?self.tracker.total(),
            percent = ?self.tracker.percent(),
            "results received"
        );

        let status = match self.engine.status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(tick, error = %e, "status unavailable, skipping tick");
                let record = self.record(
                    None,
                    f64::NAN,
                    None,
                    TickOutcome::Failed {
                        error: e.to_string(),
                    },
                    None,
                    QueueStatus::default(),
                );
                return self.persist(record);
            }
        };

        let snapshot = self.builder.build(&completions, &status, self.fraction);
        let latency = LatencySummary::from_samples(&snapshot.latencies_ms);
        match &latency {
            Some(l) => info!(
                tick,
                count = l.count,
                p25 = l.p25,
                p50 = l.p50,
                p95 = l.p95,
                p99 = l.p99,
                max = l.max,
                "latency"
            ),
            None => debug!(tick, "no completions this tick"),
        }

        let action = self.controller.action(&snapshot);
        let current = snapshot.replicas;

        let (decision, outcome) = match self.policy.decide(action, current) {
            PolicyDecision::Skip => {
                info!(tick, controller = self.controller.name(), "controller delegated scaling");
                (None, TickOutcome::Skipped)
            }
            PolicyDecision::Scale {
                target, changed, ..
            } => {
                let outcome = if changed {
                    self.apply(target.replicas).await
                } else {
                    TickOutcome::Unchanged
                };
                if !matches!(outcome, TickOutcome::Failed { .. }) {
                    self.publish_fraction(target.fraction).await;
                }
                (Some(target.replicas), outcome)
            }
        };

        info!(
            tick,
            from = current,
            action = ?action,
            decision = ?decision,
            fraction = self.fraction,
            outcome = ?outcome,
            "tick complete"
        );
        let record = self.record(Some(action), current, decision, outcome, latency, status);
        self.persist(record)
    }

    /// Start up, then tick every period until the workload settles or
    /// `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<RunSummary> {
        let mut cancelled = !self.start(&cancel).await?;

        while !cancelled {
            let started = Instant::now();
            self.tick().await;

            if self.tracker.is_settled() {
                info!(received = self.tracker.completed(), "all queries received");
                break;
            }

            let sleep_for = self.settings.period.saturating_sub(started.elapsed());
            debug!(sleep = ?sleep_for, "sleeping until next tick");
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancel.cancelled() => {
                    info!("control loop cancelled");
                    cancelled = true;
                }
            }
        }

        let summary = RunSummary {
            controller: self.controller.name(),
            ticks: self.ticks,
            completed: self.tracker.completed(),
            total: self.tracker.total(),
            cancelled,
        };
        if let Some(writer) = self.writer.take() {
            writer.finish(&summary)?;
        }
        Ok(summary)
    }

    async fn apply(&mut self, replicas: u32) -> TickOutcome {
        match self.scaler.apply(replicas).await {
            Ok(granted) => {
                self.policy.record_applied(granted);
                TickOutcome::Applied { replicas: granted }
            }
            Err(ScaleError::Rejected { requested, reason }) => {
                warn!(requested, %reason, scaler = self.scaler.name(), "scaling rejected");
                TickOutcome::Rejected { reason }
            }
            Err(e @ ScaleError::Unavailable(_)) => {
                warn!(replicas, error = %e, scaler = self.scaler.name(), "scaler unavailable");
                TickOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn publish_fraction(&mut self, fraction: f64) {
        if fraction == self.fraction {
            return;
        }
        let params = FractionalParameters::new(fraction, self.settings.fractional_delay);
        match self.params.publish_fractional(params).await {
            Ok(()) => {
                self.fraction = params.probability;
                debug!(fraction = self.fraction, "fraction published");
            }
            Err(e) => warn!(error = %e, "fraction publish failed"),
        }
    }

    fn record(
        &self,
        action: Option<ControllerAction>,
        current: f64,
        decision: Option<u32>,
        outcome: TickOutcome,
        latency: Option<LatencySummary>,
        status: QueueStatus,
    ) -> TickRecord {
        TickRecord {
            tick: self.ticks,
            ts: epoch_secs_f64(),
            controller: self.controller.name(),
            ctl_from: current,
            ctl_action: action,
            ctl_final_decision: decision,
            fraction: self.fraction,
            outcome,
            completed: self.tracker.completed(),
            total: self.tracker.total(),
            latency,
            status,
        }
    }

    fn persist(&mut self, record: TickRecord) -> TickRecord {
        if let Some(writer) = self.writer.as_mut()
            && let Err(e) = writer.append_status(&record)
        {
            warn!(error = %e, "status write failed");
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use fracscale_control::{DoNothing, Passthrough};
    use fracscale_core::{CompletionRecord, MetricsSnapshot, PassthroughConfig, PolicyConfig};
    use fracscale_queue::{MemoryParams, MemoryQueue};

    use crate::error::ScaleResult;
    use crate::scaler::CommandScaler;

    use super::*;

    /// Records requested targets; can be told to reject or fail.
    #[derive(Default)]
    struct RecordingScaler {
        calls: Mutex<Vec<u32>>,
        reject: bool,
        unavailable: bool,
    }

    impl RecordingScaler {
        fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Scaler for RecordingScaler {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn apply(&self, replicas: u32) -> ScaleResult<u32> {
            self.calls.lock().unwrap().push(replicas);
            if self.unavailable {
                return Err(ScaleError::Unavailable("connection refused".into()));
            }
            if self.reject {
                return Err(ScaleError::Rejected {
                    requested: replicas,
                    reason: "quota".into(),
                });
            }
            Ok(replicas)
        }
    }

    struct ConstantDelta(f64);

    impl Controller for ConstantDelta {
        fn name(&self) -> &'static str {
            "constant"
        }

        fn action(&mut self, _snapshot: &MetricsSnapshot) -> ControllerAction {
            ControllerAction::Delta(self.0)
        }
    }

    fn settings() -> RunnerSettings {
        RunnerSettings {
            period: Duration::from_millis(10),
            start_replicas: 1,
            stabilization_ticks: 3,
            registration_poll: Duration::from_millis(10),
            fractional_delay: Duration::from_millis(250),
        }
    }

    async fn engine_with_queues(n: usize) -> MemoryQueue {
        let engine = MemoryQueue::new(Duration::from_secs(600));
        for i in 0..n {
            engine.register(&format!("q-{i}")).await.unwrap();
        }
        engine
    }

    fn orchestrator(
        controller: Box<dyn Controller>,
        scaler: Arc<RecordingScaler>,
        engine: &MemoryQueue,
        params: &MemoryParams,
    ) -> Orchestrator {
        let policy = ScalingPolicy::new(&PolicyConfig {
            min_replicas: 1,
            max_replicas: 72,
        })
        .unwrap();
        Orchestrator::new(
            controller,
            policy,
            scaler,
            Arc::new(engine.clone()),
            Arc::new(params.clone()),
            settings(),
        )
    }

    fn done(query_id: u64) -> CompletionRecord {
        CompletionRecord {
            query_id,
            worker_id: "q-0".into(),
            sent_at: 10.0,
            enqueued_at: 10.0,
            dequeued_at: Some(10.01),
            done_at: Some(10.05),
        }
    }

    #[test]
    fn tracker_needs_consecutive_complete_ticks() {
        let mut tracker = CompletionTracker::new(Some(10), 3);
        tracker.record(10);
        tracker.record(0);
        assert!(!tracker.is_settled());
        tracker.record(0);
        assert!(tracker.is_settled());
        assert_eq!(tracker.percent(), Some(100.0));
    }

    #[test]
    fn tracker_without_total_never_settles() {
        let mut tracker = CompletionTracker::new(None, 1);
        for _ in 0..5 {
            tracker.record(100);
        }
        assert!(!tracker.is_settled());
        assert_eq!(tracker.percent(), None);
    }

    #[test]
    fn tracker_partial_progress() {
        let mut tracker = CompletionTracker::new(Some(4), 1);
        tracker.record(1);
        assert_eq!(tracker.percent(), Some(25.0));
        assert!(!tracker.is_settled());
    }

    #[tokio::test]
    async fn tick_applies_integer_part_and_publishes_fraction() {
        let engine = engine_with_queues(10).await;
        let params = MemoryParams::new();
        let scaler = Arc::new(RecordingScaler::default());
        let mut orch = orchestrator(Box::new(ConstantDelta(0.5)), scaler.clone(), &engine, &params);

        let record = orch.tick().await;
        assert_eq!(record.ctl_from, 10.0);
        assert_eq!(record.ctl_final_decision, Some(11));
        assert_eq!(record.outcome, TickOutcome::Applied { replicas: 11 });
        assert_eq!(scaler.calls(), vec![11]);

        let published = params.fractional().await.unwrap();
        assert!((published.probability - 0.5).abs() < 1e-9);
        assert_eq!(published.delay, Duration::from_millis(250));
        assert!((orch.fraction() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unchanged_target_skips_scaler() {
        let engine = engine_with_queues(4).await;
        let params = MemoryParams::new();
        let scaler = Arc::new(RecordingScaler::default());
        let mut orch = orchestrator(Box::new(DoNothing), scaler.clone(), &engine, &params);

        assert_eq!(orch.tick().await.outcome, TickOutcome::Applied { replicas: 4 });
        let second = orch.tick().await;
        assert_eq!(second.outcome, TickOutcome::Unchanged);
        assert_eq!(second.ctl_action, Some(ControllerAction::NEUTRAL));
        assert_eq!(scaler.calls(), vec![4]);
    }

    #[tokio::test]
    async fn do_not_scale_is_logged_but_not_applied() {
        let engine = engine_with_queues(3).await;
        let params = MemoryParams::new();
        let scaler = Arc::new(RecordingScaler::default());
        let controller = Box::new(Passthrough::new(&PassthroughConfig::default()));
        let mut orch = orchestrator(controller, scaler.clone(), &engine, &params);

        let record = orch.tick().await;
        assert_eq!(record.outcome, TickOutcome::Skipped);
        assert_eq!(record.ctl_action, Some(ControllerAction::DoNotScale));
        assert_eq!(record.ctl_final_decision, None);
        assert!(scaler.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_scaling_is_retried_next_tick() {
        let engine = engine_with_queues(2).await;
        let params = MemoryParams::new();
        let scaler = Arc::new(RecordingScaler {
            reject: true,
            ..Default::default()
        });
        let mut orch = orchestrator(Box::new(ConstantDelta(1.0)), scaler.clone(), &engine, &params);

        let first = orch.tick().await;
        assert_eq!(
            first.outcome,
            TickOutcome::Rejected {
                reason: "quota".into()
            }
        );
        orch.tick().await;
        assert_eq!(scaler.calls(), vec![3, 3]);
    }

    #[tokio::test]
    async fn unavailable_scaler_does_not_publish_fraction() {
        let engine = engine_with_queues(2).await;
        let params = MemoryParams::new();
        let scaler = Arc::new(RecordingScaler {
            unavailable: true,
            ..Default::default()
        });
        let mut orch = orchestrator(Box::new(ConstantDelta(0.4)), scaler.clone(), &engine, &params);

        let record = orch.tick().await;
        assert!(matches!(record.outcome, TickOutcome::Failed { .. }));
        assert_eq!(params.fractional().await.unwrap().probability, 0.0);
        assert_eq!(orch.fraction(), 0.0);
    }

    #[tokio::test]
    async fn hung_scale_command_fails_the_tick() {
        let engine = engine_with_queues(2).await;
        let params = MemoryParams::new();
        let scaler = CommandScaler::new("sleep 20").with_timeout(Duration::from_millis(100));
        let policy = ScalingPolicy::new(&PolicyConfig {
            min_replicas: 1,
            max_replicas: 72,
        })
        .unwrap();
        let mut orch = Orchestrator::new(
            Box::new(ConstantDelta(1.5)),
            policy,
            Arc::new(scaler),
            Arc::new(engine.clone()),
            Arc::new(params.clone()),
            settings(),
        );

        let record = tokio::time::timeout(Duration::from_secs(5), orch.tick())
            .await
            .expect("tick must not hang on the scaler");
        assert_eq!(record.ctl_final_decision, Some(4));
        assert!(matches!(record.outcome, TickOutcome::Failed { .. }));
        assert_eq!(orch.fraction(), 0.0);
    }

    #[tokio::test]
    async fn tick_builds_latency_summary_from_completions() {
        let engine = engine_with_queues(1).await;
        let params = MemoryParams::new();
        for id in 0..4 {
            engine.complete(done(id)).await.unwrap();
        }
        let scaler = Arc::new(RecordingScaler::default());
        let mut orch = orchestrator(Box::new(DoNothing), scaler, &engine, &params);

        let record = orch.tick().await;
        let latency = record.latency.unwrap();
        assert_eq!(latency.count, 4);
        assert!((latency.p99 - 50.0).abs() < 1e-6);
        assert_eq!(record.completed, 4);

        // Completions are consumed once.
        assert!(orch.tick().await.latency.is_none());
    }

    #[tokio::test]
    async fn run_stops_after_stabilization_window() {
        let engine = engine_with_queues(1).await;
        let params = MemoryParams::new();
        for id in 0..3 {
            engine.complete(done(id)).await.unwrap();
        }
        let tmp = tempfile::tempdir().unwrap();
        let writer = ResultWriter::create(tmp.path(), "do_nothing", &serde_json::json!({})).unwrap();
        let dir = writer.dir().to_path_buf();

        let scaler = Arc::new(RecordingScaler::default());
        let orch = orchestrator(Box::new(DoNothing), scaler.clone(), &engine, &params)
            .with_total(3)
            .with_writer(writer);

        let summary = orch.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.completed, 3);
        assert!(!summary.cancelled);

        // Start-up opened both gates and requested the starting replicas.
        assert!(params.flag(WORKER_GATE).await.unwrap());
        assert!(params.flag(LOAD_GATE).await.unwrap());
        assert_eq!(scaler.calls()[0], 1);

        let status = std::fs::read_to_string(dir.join("status.jsonl")).unwrap();
        assert_eq!(status.lines().count(), 3);
        let first: serde_json::Value = serde_json::from_str(status.lines().next().unwrap()).unwrap();
        assert_eq!(first["tick"], 1);
        assert_eq!(first["controller"], "do_nothing");
        assert!(first.get("queue_sizes").is_some());

        let trace = std::fs::read_to_string(dir.join("trace.jsonl")).unwrap();
        assert_eq!(trace.lines().count(), 3);
        let result = std::fs::read_to_string(dir.join("result.json")).unwrap();
        assert!(result.contains("\"num_queries_received\":3"));
    }

    #[tokio::test]
    async fn run_cancelled_while_waiting_for_registration() {
        let engine = engine_with_queues(0).await;
        let params = MemoryParams::new();
        let scaler = Arc::new(RecordingScaler::default());
        let orch = orchestrator(Box::new(DoNothing), scaler, &engine, &params).with_total(10);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(orch.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let summary = handle.await.unwrap().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.ticks, 0);
        assert!(!params.flag(LOAD_GATE).await.unwrap());
    }

    #[tokio::test]
    async fn run_cancelled_mid_workload() {
        let engine = engine_with_queues(1).await;
        let params = MemoryParams::new();
        let scaler = Arc::new(RecordingScaler::default());
        let orch = orchestrator(Box::new(DoNothing), scaler, &engine, &params).with_total(10);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(orch.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();

        let summary = handle.await.unwrap().unwrap();
        assert!(summary.cancelled);
        assert!(summary.ticks >= 1);
        assert_eq!(summary.completed, 0);
    }
}
