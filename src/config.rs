//! Client configuration.
//!
//! Every knob the controller reads lives in [`ClientConfig`], built through
//! [`ClientConfigBuilder`]. Defaults match the conversion service's
//! development setup, so `ClientConfig::default()` talks to a backend on
//! `127.0.0.1:8000` and writes results to the current directory.
//!
//! # Example
//! ```rust
//! use docrelay::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .api_base("https://convert.example.com/")
//!     .tick_interval(Duration::from_millis(250))
//!     .output_extension("docx")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.api_base, "https://convert.example.com");
//! ```

use crate::error::DocRelayError;
use crate::job::ArtifactKind;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted by [`ClientConfig::from_env`].
pub const API_BASE_ENV: &str = "DOCRELAY_API_BASE";

/// Origin used when neither the config nor the environment names one.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";

/// Configuration for a [`crate::JobController`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service origin without a trailing slash, e.g. `https://host:8443`.
    pub api_base: String,

    /// Path of the submission endpoint. Default: `/api/point-me`.
    pub submit_path: String,

    /// Prefix of the per-kind retrieval endpoints. Default: `/api/download`.
    ///
    /// The full URL is `{api_base}{download_path}/{kind}/{task_id}`.
    pub download_path: String,

    /// Artifact kinds the service can render for a deferred job.
    /// Default: `read` and `listen`.
    pub artifact_kinds: Vec<ArtifactKind>,

    /// Extension given to every saved artifact, without the dot. Default: `docx`.
    pub output_extension: String,

    /// Directory retrieved artifacts are written to. Default: `.`.
    pub output_dir: PathBuf,

    /// Interval between progress samples while a submission is in flight.
    /// Default: 100 ms.
    pub tick_interval: Duration,

    /// Pause between the 90 % and 100 % marks after a successful submission.
    /// Default: 150 ms.
    pub completion_delay: Duration,

    /// Displayed progress right after `submit`. Default: 5.
    pub initial_percent: f64,

    /// Displayed progress once a submission fails. Default: 20.
    pub failure_percent: f64,

    /// Whole-request timeout. Conversions of large books run for many
    /// minutes, so the default is two hours.
    pub request_timeout: Duration,

    /// TCP connect timeout. Default: 10 s.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            submit_path: "/api/point-me".to_string(),
            download_path: "/api/download".to_string(),
            artifact_kinds: vec![ArtifactKind::read(), ArtifactKind::listen()],
            output_extension: "docx".to_string(),
            output_dir: PathBuf::from("."),
            tick_interval: Duration::from_millis(100),
            completion_delay: Duration::from_millis(150),
            initial_percent: 5.0,
            failure_percent: 20.0,
            request_timeout: Duration::from_secs(2 * 60 * 60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Create a new builder seeded with the defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults, with `api_base` taken from `DOCRELAY_API_BASE` when set.
    pub fn from_env() -> Result<Self, DocRelayError> {
        let mut builder = Self::builder();
        if let Ok(base) = std::env::var(API_BASE_ENV) {
            if !base.trim().is_empty() {
                builder = builder.api_base(base);
            }
        }
        builder.build()
    }

    /// Absolute URL of the submission endpoint.
    pub fn submit_url(&self) -> String {
        join_url(&self.api_base, &self.submit_path)
    }

    /// Absolute URL of the retrieval endpoint for one kind of one job.
    ///
    /// `kind` and `task_id` are appended as single percent-encoded path
    /// segments.
    pub fn download_url(&self, kind: &str, task_id: &str) -> String {
        let prefix = join_url(&self.api_base, &self.download_path);
        append_segments(&prefix, &[kind, task_id])
    }

    /// Absolute URL of an arbitrary path under the API origin.
    pub fn url(&self, path: &str) -> String {
        join_url(&self.api_base, path)
    }

    /// Look up a configured artifact kind by its endpoint name.
    pub fn kind(&self, name: &str) -> Option<&ArtifactKind> {
        self.artifact_kinds.iter().find(|k| k.name == name)
    }
}

/// Placeholder origin for resolving relative prefixes; only the path of the
/// result is kept.
const RELATIVE_ORIGIN: &str = "http://relative.invalid";

fn append_segments(prefix: &str, segments: &[&str]) -> String {
    let relative = !prefix.contains("://");
    let parsed = if relative {
        Url::parse(RELATIVE_ORIGIN).and_then(|origin| origin.join(prefix))
    } else {
        Url::parse(prefix)
    };
    let Ok(mut url) = parsed else {
        return format!("{}/{}", prefix.trim_end_matches('/'), segments.join("/"));
    };
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    if relative {
        url.path().to_string()
    } else {
        url.to_string()
    }
}

fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if base.is_empty() {
        format!("/{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn submit_path(mut self, path: impl Into<String>) -> Self {
        self.config.submit_path = path.into();
        self
    }

    pub fn download_path(mut self, path: impl Into<String>) -> Self {
        self.config.download_path = path.into();
        self
    }

    pub fn artifact_kinds(mut self, kinds: Vec<ArtifactKind>) -> Self {
        self.config.artifact_kinds = kinds;
        self
    }

    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.output_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    pub fn completion_delay(mut self, delay: Duration) -> Self {
        self.config.completion_delay = delay;
        self
    }

    pub fn initial_percent(mut self, pct: f64) -> Self {
        self.config.initial_percent = pct;
        self
    }

    pub fn failure_percent(mut self, pct: f64) -> Self {
        self.config.failure_percent = pct;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, DocRelayError> {
        let c = &self.config;
        if !c.api_base.is_empty()
            && !(c.api_base.starts_with("http://") || c.api_base.starts_with("https://"))
        {
            return Err(DocRelayError::InvalidConfig(format!(
                "API base must be an http(s) origin, got '{}'",
                c.api_base
            )));
        }
        if c.tick_interval.is_zero() {
            return Err(DocRelayError::InvalidConfig(
                "tick interval must be greater than zero".into(),
            ));
        }
        for (name, pct) in [
            ("initial", c.initial_percent),
            ("failure", c.failure_percent),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                return Err(DocRelayError::InvalidConfig(format!(
                    "{name} percent must be within 0–100, got {pct}"
                )));
            }
        }
        if c.output_extension.is_empty() {
            return Err(DocRelayError::InvalidConfig(
                "output extension must not be empty".into(),
            ));
        }
        if let Some(bad) = c
            .artifact_kinds
            .iter()
            .find(|k| !ArtifactKind::is_valid_name(&k.name))
        {
            return Err(DocRelayError::InvalidConfig(format!(
                "artifact kind name '{}' is not a valid path segment",
                bad.name
            )));
        }
        Ok(self.config)
    }
}
