//! Worker cycle and run loop tests
//!
//! Covers:
//! - Claim order and exactly-one-location after each cycle
//! - Entries whose names cannot be claimed do not block later jobs
//! - Missing artifacts, invalid descriptors and persistence failures
//! - Producer fields round-trip into output records
//! - The async run loop drains the queue, leaves stuck entries alone and
//!   stops on cancellation

use mai_worker::config::WorkerConfig;
use mai_worker::pipeline::{OcrEngine, Pipeline, PipelineConfig};
use mai_worker::queue::{JobQueue, JobState, QueuePaths};
use mai_worker::{CycleOutcome, Worker};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Fixture {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::create_dir_all(root.join("uploads")).unwrap();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    fn config(&self) -> WorkerConfig {
        WorkerConfig::for_root(&self.root)
    }

    fn worker(&self) -> Worker {
        let queue = JobQueue::open(QueuePaths::under(&self.root.join("queue"))).unwrap();
        Worker::new(queue, self.root.join("uploads"), Pipeline::reference())
    }

    fn submit(&self, name: &str, descriptor: Value) {
        let pending = self.root.join("queue").join("pending");
        fs::create_dir_all(&pending).unwrap();
        fs::write(
            pending.join(format!("{}.json", name)),
            serde_json::to_string_pretty(&descriptor).unwrap(),
        )
        .unwrap();
    }

    fn upload(&self, file_name: &str, contents: &str) {
        fs::write(self.root.join("uploads").join(file_name), contents).unwrap();
    }

    fn record(&self, state: JobState, name: &str) -> Value {
        let path = self
            .root
            .join("queue")
            .join(state.dir_name())
            .join(format!("{}.json", name));
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }
}

fn locations(queue: &JobQueue, name: &str) -> Vec<JobState> {
    JobState::ALL
        .into_iter()
        .filter(|state| {
            queue
                .paths()
                .dir(*state)
                .join(format!("{}.json", name))
                .is_file()
        })
        .collect()
}

#[test]
fn test_jobs_are_claimed_in_name_order() {
    let fixture = Fixture::new();
    let worker = fixture.worker();
    for name in ["c", "a", "b"] {
        fixture.submit(name, json!({ "id": format!("job-{}", name), "uploadId": "u-1" }));
    }
    fixture.upload("u-1.jpg", "image bytes");

    let mut order = Vec::new();
    loop {
        match worker.step_once().unwrap() {
            CycleOutcome::Idle => break,
            CycleOutcome::Completed { name, .. } => order.push(name),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn test_unclaimable_entry_name_does_not_block_later_jobs() {
    let fixture = Fixture::new();
    let worker = fixture.worker();
    fixture.submit("A\\b", json!({ "id": "job-odd", "uploadId": "u-1" }));
    fixture.submit("a", json!({ "id": "job-a", "uploadId": "u-1" }));
    fixture.upload("u-1.jpg", "image bytes");

    let outcome = worker.step_once().unwrap();

    assert!(matches!(outcome, CycleOutcome::Completed { ref name, .. } if name == "a"));
    assert_eq!(worker.step_once().unwrap(), CycleOutcome::Idle);
    assert_eq!(locations(worker.queue(), "a"), vec![JobState::Completed]);
}

#[test]
fn test_completed_job_is_in_results_only() {
    let fixture = Fixture::new();
    let worker = fixture.worker();
    fixture.submit("a", json!({ "id": "job-a", "uploadId": "u-1" }));
    fixture.upload("u-1.png", "image bytes");

    let outcome = worker.step_once().unwrap();

    assert!(matches!(outcome, CycleOutcome::Completed { ref job_id, .. } if job_id == "job-a"));
    assert_eq!(locations(worker.queue(), "a"), vec![JobState::Completed]);

    let record = fixture.record(JobState::Completed, "a");
    let mut keys: Vec<&str> = record["result"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["citation", "docId", "ner", "ocr", "suggestions"]);
    assert_eq!(record["result"]["ner"]["entities"].as_array().unwrap().len(), 3);
    assert!(record["result"]["citation"]["url"].is_null());
}

#[test]
fn test_missing_artifact_fails_job() {
    let fixture = Fixture::new();
    let worker = fixture.worker();
    fixture.submit("a", json!({ "id": "job-a", "uploadId": "u-missing" }));

    let outcome = worker.step_once().unwrap();

    match outcome {
        CycleOutcome::Failed { job_id, error, .. } => {
            assert_eq!(job_id.as_deref(), Some("job-a"));
            assert!(error.contains("artifact not found"), "{}", error);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(locations(worker.queue(), "a"), vec![JobState::Failed]);

    let record = fixture.record(JobState::Failed, "a");
    assert!(record["error"]
        .as_str()
        .unwrap()
        .contains("artifact not found"));
    assert!(record.get("result").is_none());
}

#[test]
fn test_extra_descriptor_fields_round_trip() {
    let fixture = Fixture::new();
    let worker = fixture.worker();
    let descriptor = json!({
        "id": "job-a",
        "uploadId": "u-1",
        "submittedAt": "2024-05-01T10:00:00Z",
        "owner": { "name": "Ana", "roles": ["editor"] },
        "priority": 3
    });
    fixture.submit("a", descriptor.clone());
    fixture.submit("b", json!({ "id": "job-b", "uploadId": "u-none", "note": "é" }));
    fixture.upload("u-1.jpg", "image bytes");

    worker.step_once().unwrap();
    worker.step_once().unwrap();

    assert_eq!(fixture.record(JobState::Completed, "a")["job"], descriptor);
    assert_eq!(
        fixture.record(JobState::Failed, "b")["job"],
        json!({ "id": "job-b", "uploadId": "u-none", "note": "é" })
    );
}

#[test]
fn test_unparseable_descriptor_keeps_raw_json() {
    let fixture = Fixture::new();
    let worker = fixture.worker();
    fixture.submit("a", json!({ "uploadId": "u-1" }));

    let outcome = worker.step_once().unwrap();

    assert!(matches!(outcome, CycleOutcome::Failed { job_id: None, .. }));
    assert_eq!(
        fixture.record(JobState::Failed, "a")["job"],
        json!({ "uploadId": "u-1" })
    );
}

#[test]
fn test_result_persistence_failure_falls_back_to_failure_record() {
    let fixture = Fixture::new();
    let worker = fixture.worker();
    fixture.submit("a", json!({ "id": "job-a", "uploadId": "u-1" }));
    fixture.upload("u-1.jpg", "image bytes");

    // Results directory replaced by a plain file: record writes fail
    let results = worker.queue().paths().results.clone();
    fs::remove_dir(&results).unwrap();
    fs::write(&results, "not a directory").unwrap();

    let outcome = worker.step_once().unwrap();

    match outcome {
        CycleOutcome::Failed { error, .. } => {
            assert!(error.starts_with("failed to persist result"), "{}", error);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(worker.queue().status("a"), Some(JobState::Failed));
    assert!(!worker.queue().paths().processing.join("a.json").exists());
}

#[test]
fn test_from_config_with_plain_text_engine() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.pipeline = PipelineConfig {
        ocr_engine: OcrEngine::PlainText,
        ocr_language: Some("en".to_string()),
        citation_base_url: Some("https://archive.example/uploads".to_string()),
        ..PipelineConfig::default()
    };
    let worker = Worker::from_config(&config).unwrap();
    fixture.submit("a", json!({ "id": "job-a", "uploadId": "u-1" }));
    fixture.upload("u-1.txt", "Baptism of John Doe in 1861 at São Paulo");

    worker.step_once().unwrap();

    let result = &fixture.record(JobState::Completed, "a")["result"];
    assert_eq!(result["ocr"]["lang"], "en");
    assert_eq!(result["ner"]["entities"][0]["span"], json!({ "start": 11, "end": 19 }));
    assert_eq!(
        result["citation"]["url"],
        "https://archive.example/uploads/u-1.txt"
    );
}

#[test]
fn test_report_stuck_counts_dangling_entries() {
    let fixture = Fixture::new();
    let worker = fixture.worker();
    fs::write(
        worker.queue().paths().processing.join("z.json"),
        r#"{"id":"job-z","uploadId":"u-z"}"#,
    )
    .unwrap();

    assert_eq!(worker.report_stuck().unwrap(), 1);
    // Never picked up again
    assert_eq!(worker.step_once().unwrap(), CycleOutcome::Idle);
}

async fn wait_for(path: &Path) -> bool {
    for _ in 0..200 {
        if path.is_file() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_run_loop_drains_queue_and_stops_on_cancel() {
    let fixture = Fixture::new();
    let worker = Arc::new(
        fixture
            .worker()
            .with_intervals(Duration::from_millis(5), Duration::from_millis(20)),
    );
    fixture.submit("a", json!({ "id": "job-a", "uploadId": "u-1" }));
    fixture.submit("b", json!({ "id": "job-b", "uploadId": "u-2" }));
    fixture.upload("u-1.jpg", "image bytes");

    let cancel_token = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&worker).run(cancel_token.clone()));

    let results = worker.queue().paths().results.clone();
    let failed = worker.queue().paths().failed.clone();
    assert!(wait_for(&results.join("a.json")).await);
    assert!(wait_for(&failed.join("b.json")).await);

    cancel_token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();

    assert!(worker.queue().list_pending().unwrap().is_empty());
    assert!(worker.queue().list_processing().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_loop_reports_stuck_entries_and_keeps_draining() {
    let fixture = Fixture::new();
    let worker = Arc::new(
        fixture
            .worker()
            .with_intervals(Duration::from_millis(5), Duration::from_millis(20)),
    );
    let stuck = worker.queue().paths().processing.join("z.json");
    fs::write(&stuck, r#"{"id":"job-z","uploadId":"u-z"}"#).unwrap();
    fixture.submit("a", json!({ "id": "job-a", "uploadId": "u-1" }));
    fixture.upload("u-1.jpg", "image bytes");

    let cancel_token = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&worker).run(cancel_token.clone()));

    assert!(wait_for(&worker.queue().paths().results.join("a.json")).await);

    cancel_token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();

    assert!(stuck.is_file());
    assert_eq!(worker.queue().status("z"), Some(JobState::Processing));
}
