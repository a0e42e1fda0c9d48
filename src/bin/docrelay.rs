//! CLI binary for docrelay.
//!
//! A thin shim over the library crate: maps flags to `ClientConfig`, drives
//! one job through the controller and renders its events on the terminal.

use anyhow::{Context, Result};
use clap::Parser;
use docrelay::{
    ArtifactKind, ClientConfig, JobController, JobObserver, Phase, Retrieval,
    SelectedInput, SharedObserver, StatusView,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Renders the synthetic progress as a 0–100 bar and prints one line per
/// retrieval event above it.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Waiting");
        Arc::new(Self { bar })
    }
}

impl JobObserver for CliObserver {
    fn on_phase_change(&self, phase: Phase, error: Option<&str>) {
        match phase {
            Phase::Submitting => {
                self.bar.reset_elapsed();
                self.bar.set_prefix("Processing");
                self.bar.set_message("don't close this window");
                self.bar.enable_steady_tick(Duration::from_millis(80));
            }
            Phase::Succeeded => {
                self.bar.set_prefix("Done");
                self.bar.set_message("");
            }
            Phase::Failed => {
                self.bar.set_prefix("Failed");
                self.bar.abandon_with_message(red(error.unwrap_or("processing failed")));
            }
            Phase::Idle => {
                if let Some(e) = error {
                    self.bar.println(format!("  {} {}", yellow("!"), e));
                }
            }
        }
    }

    fn on_progress(&self, percent: f64) {
        self.bar.set_position(percent.round() as u64);
        if percent >= 100.0 {
            self.bar.finish();
        }
    }

    fn on_retrieval_start(&self, kind: &str) {
        self.bar.println(format!("  {} fetching {}", cyan("↓"), bold(kind)));
    }

    fn on_retrieval_complete(&self, kind: &str, path: &Path) {
        self.bar.println(format!(
            "  {} {:<8} {}",
            green("✓"),
            kind,
            dim(&path.display().to_string())
        ));
    }

    fn on_retrieval_error(&self, kind: &str, error: &str) {
        self.bar
            .println(format!("  {} {:<8} {}", red("✗"), kind, red(error)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Submit a book and fetch every configured artifact into the current dir
  docrelay weekly.epub

  # Only the written translation, into ./out
  docrelay weekly.epub --kind read -o out

  # Talk to a remote deployment
  docrelay --api-base https://convert.example.com weekly.epub

  # Check that the service is up
  docrelay --health

  # Ask the service about a task it is still working on
  docrelay --status 3f1c2a9e-7d4b-4e0c-9a51-0b6f7f3d2c11

ARTIFACT KINDS:
  read     written translation         saved as read_<name>.docx
  listen   spoken-script rendition     saved as listen_<name>.docx

  Services that return the document directly from the upload endpoint
  produce a single <name>.docx regardless of the kinds requested.

ENVIRONMENT VARIABLES:
  DOCRELAY_API_BASE       Service origin (default http://127.0.0.1:8000)
  DOCRELAY_OUTPUT_DIR     Directory for retrieved artifacts
  RUST_LOG                Override log filter (e.g. docrelay=debug)
"#;

/// Submit documents to a conversion service and fetch the results.
#[derive(Parser, Debug)]
#[command(
    name = "docrelay",
    version,
    about = "Submit documents to a conversion service and fetch the results",
    long_about = "Upload a document to a long-running conversion service, show estimated \
progress while it works, then download the converted artifacts. Works with services that \
return the document directly as well as ones that hand out a task id for later download.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to submit.
    #[arg(required_unless_present_any = ["health", "status"])]
    input: Option<PathBuf>,

    /// Directory retrieved artifacts are written to.
    #[arg(short, long, env = "DOCRELAY_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Service origin, e.g. https://convert.example.com.
    #[arg(long, env = "DOCRELAY_API_BASE", default_value = docrelay::config::DEFAULT_API_BASE)]
    api_base: String,

    /// Path of the submission endpoint.
    #[arg(long, env = "DOCRELAY_SUBMIT_PATH", default_value = "/api/point-me")]
    submit_path: String,

    /// Prefix of the retrieval endpoints.
    #[arg(long, env = "DOCRELAY_DOWNLOAD_PATH", default_value = "/api/download")]
    download_path: String,

    /// Artifact kind to retrieve; repeat for several. Default: all known kinds.
    #[arg(short, long = "kind", env = "DOCRELAY_KINDS", value_delimiter = ',')]
    kinds: Vec<String>,

    /// Extension of saved artifacts.
    #[arg(long, env = "DOCRELAY_EXTENSION", default_value = "docx")]
    ext: String,

    /// Whole-request timeout in seconds.
    #[arg(long, env = "DOCRELAY_TIMEOUT", default_value_t = 7200)]
    timeout: u64,

    /// Submit only; do not retrieve anything.
    #[arg(long)]
    no_download: bool,

    /// Print the final job snapshot as JSON on stdout.
    #[arg(long, env = "DOCRELAY_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCRELAY_NO_PROGRESS")]
    no_progress: bool,

    /// Check the service's health endpoint and exit.
    #[arg(long)]
    health: bool,

    /// Print the service-side status of a task and exit.
    #[arg(long, value_name = "TASK_ID")]
    status: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCRELAY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCRELAY_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the user-facing feedback; library logs stay
    // at ERROR while it is visible.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let known_kinds: Vec<String> = config.artifact_kinds.iter().map(|k| k.name.clone()).collect();

    let observer: Option<SharedObserver> = if show_progress {
        Some(CliObserver::new() as Arc<dyn JobObserver>)
    } else {
        None
    };

    let mut controller = JobController::new(config).context("Failed to create client")?;
    if let Some(obs) = observer {
        controller = controller.with_observer(obs);
    }

    // ── Informational modes ──────────────────────────────────────────────
    if cli.health {
        let health = controller
            .api()
            .health()
            .await
            .context("Health check failed")?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&health)?);
        } else if health.is_ok() {
            println!("{} service is healthy", green("✔"));
        } else {
            println!("{} service reports '{}'", yellow("⚠"), health.status);
        }
        return Ok(());
    }

    if let Some(ref task_id) = cli.status {
        let status = controller
            .api()
            .status(task_id)
            .await
            .context("Status query failed")?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            println!("Task:     {}", task_id);
            println!("Status:   {}", status.status);
            if let (Some(cur), Some(total)) = (status.current, status.total) {
                println!("Articles: {}/{}", cur, total);
            }
            if let Some(n) = status.failed_count {
                println!("Failed:   {}", n);
            }
            if let Some(ref e) = status.error {
                println!("Error:    {}", e);
            }
        }
        return Ok(());
    }

    // ── Submit ───────────────────────────────────────────────────────────
    let path = cli
        .input
        .as_ref()
        .context("An input file is required")?;
    let input = SelectedInput::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    controller.select_file(input);

    if let Err(e) = controller.submit().await {
        report(&cli, &controller, &known_kinds)?;
        return Err(anyhow::Error::new(e).context("Submission failed"));
    }

    // ── Retrieve ─────────────────────────────────────────────────────────
    let mut failures = 0usize;
    if !cli.no_download {
        let kinds = if cli.kinds.is_empty() {
            known_kinds.clone()
        } else {
            cli.kinds.clone()
        };
        // An inline result is one document; asking for it once is enough.
        let kinds = match controller.result() {
            Some(docrelay::ResultHandle::Inline { .. }) => kinds.into_iter().take(1).collect(),
            _ => kinds,
        };

        for (kind, outcome) in controller.retrieve_many(&kinds).await {
            match outcome {
                Ok(Retrieval::Saved(p)) if !show_progress && !cli.quiet && !cli.json => {
                    eprintln!("{} {:<8} {}", green("✓"), kind, p.display());
                }
                Ok(_) => {}
                Err(e) => {
                    failures += 1;
                    if !show_progress && !cli.quiet {
                        eprintln!("{} {:<8} {}", red("✗"), kind, e);
                    }
                }
            }
        }
    }

    report(&cli, &controller, &known_kinds)?;

    if failures > 0 {
        anyhow::bail!("{failures} artifact(s) could not be retrieved");
    }
    Ok(())
}

/// Final summary: JSON snapshot on stdout, or a one-line status on stderr.
fn report(cli: &Cli, controller: &JobController, kinds: &[String]) -> Result<()> {
    let snap = controller.snapshot();
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snap).context("Failed to serialise snapshot")?
        );
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    let view = StatusView::from_snapshot(&snap, kinds);
    let mark = match snap.phase {
        Phase::Succeeded => green("✔"),
        Phase::Failed => red("✘"),
        _ => cyan("◆"),
    };
    eprintln!("{} {}  {}", mark, bold(&view.headline), dim(&view.file_label));
    if let Some(ref task_id) = snap.task_id {
        eprintln!("   {}", dim(&format!("task {task_id}")));
    }
    Ok(())
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut kinds = vec![ArtifactKind::read(), ArtifactKind::listen()];
    for name in &cli.kinds {
        if !kinds.iter().any(|k| &k.name == name) {
            kinds.push(ArtifactKind::new(name.clone(), format!("{name}_")));
        }
    }

    ClientConfig::builder()
        .api_base(cli.api_base.clone())
        .submit_path(cli.submit_path.clone())
        .download_path(cli.download_path.clone())
        .artifact_kinds(kinds)
        .output_extension(cli.ext.clone())
        .output_dir(cli.output_dir.clone())
        .request_timeout(Duration::from_secs(cli.timeout))
        .build()
        .context("Invalid configuration")
}
