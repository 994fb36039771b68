//! End-to-end runs of the single-process mode: real workers, a real
//! load generator, and the control loop writing its result files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use fracscale_core::FracscaleConfig;
use fracscale_runner::run_standalone;

fn fast_config(results_dir: &Path, deltas_file: Option<PathBuf>) -> FracscaleConfig {
    let mut config = FracscaleConfig::from_toml(
        r#"
        [controller]
        kind = "bangbang"

        [policy]
        min_replicas = 1
        max_replicas = 8

        [runner]
        period = "50ms"
        start_replicas = 2
        stabilization_ticks = 3
        registration_poll = "10ms"

        [worker]
        pop_timeout = "20ms"
        heartbeat_interval = "50ms"
        heartbeat_lapse = "2s"
        fractional_poll = "20ms"
        termination_poll = "10ms"
        gate_poll = "10ms"
        processing_time = "2ms"

        [queue]
        heartbeat_timeout = "3s"

        [load]
        payload_bytes = 16
        fractional_delay = "10ms"
        "#,
    )
    .unwrap();
    config.runner.results_dir = results_dir.to_path_buf();
    config.load.deltas_file = deltas_file;
    config
}

fn run_dir(results_dir: &Path) -> PathBuf {
    let mut dirs: Vec<_> = std::fs::read_dir(results_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(dirs.len(), 1, "expected one run directory");
    dirs.remove(0)
}

fn json_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replays_workload_until_every_query_completes() {
    let tmp = tempfile::tempdir().unwrap();
    let load = tmp.path().join("load.txt");
    std::fs::write(&load, "5\n".repeat(40)).unwrap();
    let results = tmp.path().join("results");

    let config = fast_config(&results, Some(load));
    let summary = tokio::time::timeout(
        Duration::from_secs(30),
        run_standalone(config, CancellationToken::new()),
    )
    .await
    .expect("run should settle")
    .unwrap();

    assert_eq!(summary.controller, "bangbang");
    assert_eq!(summary.total, Some(40));
    assert_eq!(summary.completed, 40);
    assert!(!summary.cancelled);
    assert!(summary.ticks >= 3);

    let dir = run_dir(&results);
    assert!(
        dir.file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("bangbang-")
    );

    let trace = json_lines(&dir.join("trace.jsonl"));
    assert_eq!(trace.len(), 40);
    let mut ids: Vec<u64> = trace.iter().map(|r| r["query_id"].as_u64().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..40).collect::<Vec<_>>());

    let status = json_lines(&dir.join("status.jsonl"));
    assert_eq!(status.len() as u64, summary.ticks);
    for (i, record) in status.iter().enumerate() {
        assert_eq!(record["tick"], i as u64 + 1);
        assert_eq!(record["controller"], "bangbang");
        assert!(record["ctl_from"].as_f64().is_some());
        assert!(record.get("num_active_replica").is_some());
    }
    // The final window reads complete.
    let last = status.last().unwrap();
    assert_eq!(last["completed"], 40);
    assert_eq!(last["total"], 40);

    let result = json_lines(&dir.join("result.json"));
    assert_eq!(result[0]["num_queries_received"], 40);
    assert_eq!(result[0]["num_queries_total"], 40);

    let config = json_lines(&dir.join("config.json"));
    assert_eq!(config[0]["controller"]["kind"], "bangbang");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runs_until_cancelled_without_a_workload() {
    let tmp = tempfile::tempdir().unwrap();
    let results = tmp.path().join("results");
    let config = fast_config(&results, None);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_standalone(config, cancel.clone()));
    tokio::time::sleep(Duration::from_millis(400)).await;
    cancel.cancel();

    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("cancelled run should stop")
        .unwrap()
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.total, None);
    assert_eq!(summary.completed, 0);

    let dir = run_dir(&results);
    assert!(dir.join("result.json").exists());
}

#[tokio::test]
async fn invalid_configuration_is_rejected_before_starting() {
    let tmp = tempfile::tempdir().unwrap();
    let results = tmp.path().join("results");
    let mut config = fast_config(&results, None);
    config.policy.min_replicas = 9;

    let err = run_standalone(config, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("policy.max_replicas"));
    assert!(!results.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn termination_marker_ends_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let results = tmp.path().join("results");
    let marker = tmp.path().join("terminate");
    let mut config = fast_config(&results, None);
    config.worker.termination_marker = Some(marker.clone());

    let handle = tokio::spawn(run_standalone(config, CancellationToken::new()));
    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(&marker, "").unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("marker should stop the run")
        .unwrap()
        .unwrap();
    assert!(summary.cancelled);
}
