//! Integration tests for the job controller against a mock service.
//!
//! Every test starts its own `wiremock` server, so they run in parallel
//! without sharing state. Artifacts are written to a fresh temp directory.
//!
//! Run with:
//!   cargo test --test controller -- --nocapture

use docrelay::{
    ClientConfig, DocRelayError, JobController, JobObserver, Phase, ResultHandle, Retrieval,
    SelectedInput, StatusView, Tone,
};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=docrelay=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn controller(server: &MockServer, out: &TempDir) -> JobController {
    init_tracing();
    let config = ClientConfig::builder()
        .api_base(server.uri())
        .output_dir(out.path())
        .tick_interval(Duration::from_millis(10))
        .completion_delay(Duration::from_millis(20))
        .build()
        .expect("valid config");
    JobController::new(config).expect("client builds")
}

fn report_epub() -> SelectedInput {
    SelectedInput::from_bytes("report.epub", vec![7u8; 500 * 1024])
}

async fn mount_deferred_submit(server: &MockServer, task_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/point-me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "task_id": task_id, "status": "processing" })),
        )
        .mount(server)
        .await;
}

/// Records every progress value and phase change it is told about.
#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<f64>>,
    phases: Mutex<Vec<Phase>>,
}

impl JobObserver for Recorder {
    fn on_phase_change(&self, phase: Phase, _error: Option<&str>) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_progress(&self, percent: f64) {
        self.progress.lock().unwrap().push(percent);
    }
}

fn read_file(p: &Path) -> Vec<u8> {
    std::fs::read(p).unwrap_or_else(|e| panic!("reading {}: {e}", p.display()))
}

// ── Submission ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn deferred_job_is_retrieved_by_kind_and_task_id() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    mount_deferred_submit(&server, "abc123").await;
    Mock::given(method("GET"))
        .and(path("/api/download/read/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"READ-DOCX".to_vec(), DOCX_MIME))
        .expect(1)
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());
    c.submit().await.expect("submission succeeds");

    assert_eq!(c.phase(), Phase::Succeeded);
    assert_eq!(c.progress_percent(), 100.0);
    assert_eq!(
        c.result(),
        Some(ResultHandle::Deferred {
            task_id: "abc123".into()
        })
    );

    let saved = c.retrieve("read").await.expect("retrieval succeeds");
    let expected = out.path().join("read_report.docx");
    assert_eq!(saved, Retrieval::Saved(expected.clone()));
    assert_eq!(read_file(&expected), b"READ-DOCX");

    let snap = c.snapshot();
    assert_eq!(snap.task_id.as_deref(), Some("abc123"));
    assert_eq!(snap.retrievals["read"].last_saved.as_deref(), Some(expected.as_path()));
}

#[tokio::test]
async fn upload_is_a_single_multipart_file_field() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    mount_deferred_submit(&server, "t1").await;

    let c = controller(&server, &out);
    c.select_file(SelectedInput::from_bytes("weekly.epub", b"EPUB".to_vec()));
    c.submit().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"), "{content_type}");
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains(r#"name="file""#));
    assert!(body.contains(r#"filename="weekly.epub""#));
}

#[tokio::test]
async fn service_detail_becomes_the_failure_message() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/api/point-me"))
        .respond_with(ResponseTemplate::new(413).set_body_json(json!({ "detail": "file too large" })))
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());
    let err = c.submit().await.unwrap_err();

    assert!(matches!(err, DocRelayError::HttpStatus { status: 413, .. }));
    assert_eq!(c.phase(), Phase::Failed);
    assert_eq!(c.error_message().as_deref(), Some("file too large"));
    assert_eq!(c.progress_percent(), 20.0);

    let view = StatusView::from_snapshot(&c.snapshot(), &["read".into()]);
    assert_eq!(view.tone, Tone::Error);
    assert_eq!(view.headline, "file too large");
    assert!(view.submit_enabled);
}

#[tokio::test]
async fn non_json_error_body_gets_generic_message() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/api/point-me"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());
    assert!(c.submit().await.is_err());
    assert_eq!(
        c.error_message().as_deref(),
        Some("request failed (502), please retry later")
    );
}

#[tokio::test]
async fn submit_without_file_sends_nothing() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    mount_deferred_submit(&server, "never").await;

    let c = controller(&server, &out);
    let err = c.submit().await.unwrap_err();

    assert!(matches!(err, DocRelayError::Validation(_)));
    assert_eq!(c.phase(), Phase::Idle);
    assert!(c.error_message().is_some());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_service_fails_the_job() {
    // Nothing listens on the discard port.
    let out = tempfile::tempdir().unwrap();
    let config = ClientConfig::builder()
        .api_base("http://127.0.0.1:9")
        .output_dir(out.path())
        .build()
        .unwrap();
    let c = JobController::new(config).unwrap();
    c.select_file(report_epub());

    let err = c.submit().await.unwrap_err();
    assert!(matches!(err, DocRelayError::Network(_)));
    assert_eq!(c.phase(), Phase::Failed);
    assert_eq!(c.progress_percent(), 20.0);
    assert!(!c.error_message().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn second_submit_while_in_flight_is_rejected() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/api/point-me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "task_id": "slow" }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());

    let (first, second) = tokio::join!(c.submit(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        c.submit().await
    });

    assert!(first.is_ok());
    assert!(matches!(second, Err(DocRelayError::AlreadySubmitting)));
    assert_eq!(c.phase(), Phase::Succeeded);
}

#[tokio::test]
async fn reselecting_during_submission_discards_the_late_response() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/api/point-me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "task_id": "old" }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());

    let (outcome, ()) = tokio::join!(c.submit(), async {
        tokio::time::sleep(Duration::from_millis(80)).await;
        c.select_file(SelectedInput::from_bytes("other.epub", vec![1, 2, 3]));
    });

    assert!(matches!(outcome, Err(DocRelayError::Superseded)));
    let snap = c.snapshot();
    assert_eq!(snap.phase, Phase::Idle);
    assert_eq!(snap.progress_percent, 0.0);
    assert_eq!(snap.task_id, None);
    assert_eq!(snap.file_name.as_deref(), Some("other.epub"));

    // The abandoned sampler must not move the fresh job's progress.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(c.progress_percent(), 0.0);
}

#[tokio::test]
async fn progress_is_monotonic_and_capped_until_completion() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/api/point-me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "task_id": "t" }))
                .set_delay(Duration::from_millis(250)),
        )
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let c = controller(&server, &out).with_observer(recorder.clone());
    c.select_file(report_epub());
    c.submit().await.unwrap();

    // select_file reports 0, then the job starts at the initial value.
    let progress = recorder.progress.lock().unwrap().clone();
    assert_eq!(progress.first(), Some(&0.0));
    assert_eq!(progress.get(1), Some(&5.0));
    assert_eq!(progress.last(), Some(&100.0));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    let before_done = &progress[..progress.len() - 1];
    assert!(before_done.iter().all(|p| *p <= 90.0));

    let phases = recorder.phases.lock().unwrap().clone();
    assert_eq!(phases, vec![Phase::Idle, Phase::Submitting, Phase::Succeeded]);
}

#[tokio::test]
async fn malformed_success_body_fails_the_job() {
    let cases = [
        ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })),
        ResponseTemplate::new(200).set_body_raw(b"{not json".to_vec(), "application/json"),
        ResponseTemplate::new(200),
    ];
    for template in cases {
        let server = MockServer::start().await;
        let out = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path("/api/point-me"))
            .respond_with(template)
            .mount(&server)
            .await;

        let c = controller(&server, &out);
        c.select_file(report_epub());
        let err = c.submit().await.unwrap_err();

        assert!(matches!(err, DocRelayError::Parse(_)), "{err:?}");
        let snap = c.snapshot();
        assert_eq!(snap.phase, Phase::Failed);
        assert_eq!(snap.progress_percent, 20.0);
        assert_eq!(snap.error_message, Some(err.to_string()));
        assert!(!snap.has_result());
    }
}

// ── Retrieval ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn inline_result_is_saved_without_prefix_or_request() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/api/point-me"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"INLINE".to_vec(), DOCX_MIME))
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());
    c.submit().await.unwrap();
    assert!(matches!(c.result(), Some(ResultHandle::Inline { .. })));
    assert_eq!(c.snapshot().inline_bytes, Some(6));

    let saved = c.retrieve("read").await.unwrap();
    let expected = out.path().join("report.docx");
    assert_eq!(saved, Retrieval::Saved(expected.clone()));
    assert_eq!(read_file(&expected), b"INLINE");

    // Only the upload ever reached the service.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn expired_task_has_its_own_message() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    mount_deferred_submit(&server, "gone").await;
    Mock::given(method("GET"))
        .and(path("/api/download/listen/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "task not found" })))
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());
    c.submit().await.unwrap();

    let err = c.retrieve("listen").await.unwrap_err();
    assert!(matches!(err, DocRelayError::NotFound { .. }));
    assert!(err.to_string().contains("expired"));

    // Retrieval failures never touch the job phase.
    let snap = c.snapshot();
    assert_eq!(snap.phase, Phase::Succeeded);
    assert_eq!(snap.retrievals["listen"].last_error, Some(err.to_string()));
    assert!(!snap.retrievals["listen"].in_flight);
    assert!(!out.path().join("listen_report.docx").exists());
}

#[tokio::test]
async fn server_error_on_download_reports_status() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    mount_deferred_submit(&server, "t500").await;
    Mock::given(method("GET"))
        .and(path("/api/download/read/t500"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());
    c.submit().await.unwrap();

    let err = c.retrieve("read").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("download failed (500)"), "{err}");
    assert_eq!(c.phase(), Phase::Succeeded);
}

#[tokio::test]
async fn concurrent_retrieval_of_one_kind_issues_one_request() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    mount_deferred_submit(&server, "dup").await;
    Mock::given(method("GET"))
        .and(path("/api/download/read/dup"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"R".to_vec(), DOCX_MIME)
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());
    c.submit().await.unwrap();

    let (a, b) = tokio::join!(c.retrieve("read"), c.retrieve("read"));
    assert!(matches!(a, Ok(Retrieval::Saved(_))));
    assert_eq!(b.unwrap(), Retrieval::Skipped);
    server.verify().await;
}

#[tokio::test]
async fn different_kinds_download_side_by_side() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    mount_deferred_submit(&server, "both").await;
    for kind in ["read", "listen"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/download/{kind}/both")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(kind.as_bytes().to_vec(), DOCX_MIME)
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let c = controller(&server, &out);
    c.select_file(report_epub());
    c.submit().await.unwrap();

    let results = c
        .retrieve_many(&["read".to_string(), "listen".to_string()])
        .await;
    assert_eq!(results.len(), 2);
    for (kind, outcome) in results {
        let expected = out.path().join(format!("{kind}_report.docx"));
        assert_eq!(outcome.unwrap(), Retrieval::Saved(expected.clone()));
        assert_eq!(read_file(&expected), kind.as_bytes());
    }
}

#[tokio::test]
async fn failed_retrieval_can_be_retried() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    mount_deferred_submit(&server, "retry").await;
    Mock::given(method("GET"))
        .and(path("/api/download/read/retry"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/download/read/retry"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"OK".to_vec(), DOCX_MIME))
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());
    c.submit().await.unwrap();

    assert!(c.retrieve("read").await.is_err());
    assert!(c.snapshot().retrievals["read"].last_error.is_some());

    assert!(matches!(c.retrieve("read").await, Ok(Retrieval::Saved(_))));
    assert_eq!(c.snapshot().retrievals["read"].last_error, None);
}

// ── Abandoned calls ──────────────────────────────────────────────────────────

#[tokio::test]
async fn abandoned_submit_still_completes_the_job() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/api/point-me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "task_id": "late" }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());

    let waited = tokio::time::timeout(Duration::from_millis(50), c.submit()).await;
    assert!(waited.is_err(), "the response is delayed past the timeout");
    assert_eq!(c.phase(), Phase::Submitting);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(c.phase(), Phase::Succeeded);
    assert_eq!(c.progress_percent(), 100.0);
    assert_eq!(c.snapshot().task_id.as_deref(), Some("late"));

    // The job is not stuck: a new submission goes out.
    c.submit().await.expect("resubmission succeeds");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn abandoned_retrieve_releases_its_kind() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    mount_deferred_submit(&server, "slowdl").await;
    Mock::given(method("GET"))
        .and(path("/api/download/read/slowdl"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"LATE".to_vec(), DOCX_MIME)
                .set_delay(Duration::from_millis(300)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    c.select_file(report_epub());
    c.submit().await.unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(50), c.retrieve("read")).await;
    assert!(waited.is_err());
    assert!(c.snapshot().retrievals["read"].in_flight);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let state = c.snapshot().retrievals["read"].clone();
    let expected = out.path().join("read_report.docx");
    assert!(!state.in_flight);
    assert_eq!(state.last_saved.as_deref(), Some(expected.as_path()));
    assert_eq!(read_file(&expected), b"LATE");

    assert_eq!(c.retrieve("read").await.unwrap(), Retrieval::Saved(expected));
    server.verify().await;
}

// ── Informational endpoints ──────────────────────────────────────────────────

#[tokio::test]
async fn health_and_status_endpoints() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/analyze-status/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "processing",
            "current": 3,
            "total": 12,
            "failed_count": 0
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/analyze-status/nope"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "not_found" })))
        .mount(&server)
        .await;

    let c = controller(&server, &out);
    assert!(c.api().health().await.unwrap().is_ok());

    let status = c.api().status("abc").await.unwrap();
    assert!(status.is_known());
    assert_eq!((status.current, status.total), (Some(3), Some(12)));
    assert_eq!(status.error, None);

    assert!(!c.api().status("nope").await.unwrap().is_known());
}
