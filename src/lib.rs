//! # docrelay
//!
//! Client for long-running document conversion services: submit a file,
//! show believable progress while the service works, then fetch the
//! converted artifacts.
//!
//! ## Why synthetic progress?
//!
//! The conversion service answers a single request once the whole job is
//! done, often minutes later, and exposes no progress channel. Instead of a
//! frozen spinner, the client estimates the total duration from the input
//! size and eases a progress value towards 90 % over that time. The last
//! step to 100 % happens only when the real answer arrives.
//!
//! ## Lifecycle
//!
//! ```text
//! select_file ──▶ submit ──▶ Submitting ──▶ Succeeded ──▶ retrieve(kind) …
//!      ▲                        │ (sampler ticks)
//!      │                        └──────────▶ Failed
//!      └──── select again at any point resets the job
//! ```
//!
//! Two result strategies are handled by one controller:
//!
//! | Response | [`ResultHandle`] | Retrieval |
//! |----------|------------------|-----------|
//! | JSON `{"task_id": …}` | `Deferred` | `GET {download_path}/{kind}/{task_id}` |
//! | binary body | `Inline` | write the held payload |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docrelay::{ClientConfig, JobController, Retrieval, SelectedInput};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API origin from DOCRELAY_API_BASE, or the local dev backend.
//!     let controller = JobController::new(ClientConfig::from_env()?)?;
//!     controller.select_file(SelectedInput::from_path("weekly.epub").await?);
//!     controller.submit().await?;
//!     if let Retrieval::Saved(path) = controller.retrieve("read").await? {
//!         println!("saved {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docrelay` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod estimate;
pub mod job;
pub mod observer;
pub mod progress;
pub mod retrieval;
pub mod save;
pub mod view;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use api::{ApiClient, HealthStatus, RemoteStatus};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use controller::JobController;
pub use error::DocRelayError;
pub use estimate::estimate;
pub use job::{ArtifactKind, JobSnapshot, Phase, ResultHandle, RetrievalState, SelectedInput};
pub use observer::{JobObserver, NoopObserver, SharedObserver};
pub use progress::{ProgressState, SIMULATED_CAP};
pub use retrieval::Retrieval;
pub use view::{StatusView, Tone};
