//! HTTP access to the conversion service.
//!
//! [`ApiClient`] owns the `reqwest` client and knows the wire format; it
//! turns every response into either a typed value or a classified
//! [`DocRelayError`]. It holds no job state, so the controller can call it
//! from any number of concurrent retrievals.
//!
//! ## Submission response shapes
//!
//! | Status | Content-Type | Meaning |
//! |--------|--------------|---------|
//! | 2xx | `application/json` | `{"task_id": …}`: deferred result |
//! | 2xx | anything else | the body is the artifact: inline result |
//! | non-2xx | any | failure, optionally `{"detail": string \| object}` |

use crate::config::ClientConfig;
use crate::error::DocRelayError;
use crate::job::{ResultHandle, SelectedInput};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest slice of an error body quoted back to the user.
const BODY_SNIPPET_CHARS: usize = 300;

/// Name of the multipart field carrying the file.
const FILE_FIELD: &str = "file";

/// Body of a deferred-result submission response.
#[derive(Debug, Clone, Deserialize)]
struct SubmitAccepted {
    task_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Answer of the service's `/health` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Server-side bookkeeping for a task, as reported by the status endpoint.
///
/// Purely informational: the displayed progress stays synthetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    /// `processing`, `building_docx`, `completed`, `error` or `not_found`.
    pub status: String,
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub failed_count: Option<u64>,
}

impl RemoteStatus {
    pub fn is_known(&self) -> bool {
        self.status != "not_found"
    }
}

/// Thin typed wrapper over the service's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    config: Arc<ClientConfig>,
}

impl ApiClient {
    pub fn new(config: Arc<ClientConfig>) -> Result<Self, DocRelayError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| DocRelayError::Internal(format!("building HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// POST the input as a single-field multipart form.
    pub async fn submit(&self, input: &SelectedInput) -> Result<ResultHandle, DocRelayError> {
        let url = self.config.submit_url();
        info!("Submitting '{}' ({} bytes) to {}", input.name(), input.size(), url);

        let part = Part::bytes(input.bytes().to_vec()).file_name(input.name().to_string());
        let form = Form::new().part(FILE_FIELD, part);

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.ok();
            let message = error_message_from_body(status.as_u16(), body.as_deref());
            warn!("Submission rejected with {}: {}", status, message);
            return Err(DocRelayError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;
        parse_submit_body(content_type.as_deref(), &body)
    }

    /// GET one artifact kind of a deferred job.
    pub async fn download(&self, kind: &str, task_id: &str) -> Result<Vec<u8>, DocRelayError> {
        let url = self.config.download_url(kind, task_id);
        debug!("Downloading {}", url);

        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!("Download of {} failed: {}", url, e);
            DocRelayError::service_unreachable()
        })?;

        match response.status() {
            s if s.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|_| DocRelayError::service_unreachable())?;
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(DocRelayError::NotFound {
                task_id: task_id.to_string(),
            }),
            s => Err(DocRelayError::download_failed(s.as_u16())),
        }
    }

    /// GET `/health`.
    pub async fn health(&self) -> Result<HealthStatus, DocRelayError> {
        let response = self.http.get(self.config.url("/health")).send().await?;
        if !response.status().is_success() {
            return Err(DocRelayError::request_failed(response.status().as_u16()));
        }
        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| DocRelayError::Parse(e.to_string()))
    }

    /// GET the server-side status of a task.
    pub async fn status(&self, task_id: &str) -> Result<RemoteStatus, DocRelayError> {
        let url = self.config.url(&format!("/api/analyze-status/{task_id}"));
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DocRelayError::request_failed(response.status().as_u16()));
        }
        response
            .json::<RemoteStatus>()
            .await
            .map_err(|e| DocRelayError::Parse(e.to_string()))
    }
}

/// Interpret a 2xx submission body.
pub fn parse_submit_body(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<ResultHandle, DocRelayError> {
    let is_json = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));

    if !is_json {
        if body.is_empty() {
            return Err(DocRelayError::Parse("empty response body".into()));
        }
        debug!("Inline result: {} bytes", body.len());
        return Ok(ResultHandle::Inline {
            payload: Arc::from(body),
        });
    }

    let accepted: SubmitAccepted =
        serde_json::from_slice(body).map_err(|e| DocRelayError::Parse(e.to_string()))?;
    match accepted.task_id {
        Some(task_id) if is_usable_task_id(&task_id) => {
            debug!(
                "Deferred result: task {} ({})",
                task_id,
                accepted.status.as_deref().unwrap_or("no status")
            );
            Ok(ResultHandle::Deferred { task_id })
        }
        Some(task_id) if !task_id.is_empty() => {
            Err(DocRelayError::Parse(format!("unusable task_id '{task_id}'")))
        }
        _ => Err(DocRelayError::Parse("missing task_id".into())),
    }
}

/// Dot segments would be resolved away by URL normalisation.
fn is_usable_task_id(task_id: &str) -> bool {
    !task_id.is_empty() && task_id != "." && task_id != ".."
}

/// Best-effort user message for a failed submission.
///
/// A JSON body with a truthy `detail` wins (strings as-is, anything else
/// serialised). A JSON body without one is quoted as `[status] snippet`.
/// Empty, unreadable or non-JSON bodies get the generic message.
pub fn error_message_from_body(status: u16, body: Option<&str>) -> String {
    let generic = || DocRelayError::request_failed(status).to_string();

    let Some(text) = body.filter(|t| !t.is_empty()) else {
        return generic();
    };
    let Ok(parsed) = serde_json::from_str::<Value>(text) else {
        return generic();
    };

    match parsed.get("detail") {
        Some(detail) if is_truthy(detail) => match detail {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        _ => {
            let snippet: String = text.chars().take(BODY_SNIPPET_CHARS).collect();
            format!("[{status}] {snippet}")
        }
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}
