//! CLI binary for bill-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs the workflow and prints the JSON document.

use anyhow::{Context, Result};
use bill_extract::model::gemini::API_KEY_VARS;
use bill_extract::{
    run_workflow, write_output, BillError, ExtractionConfig, ExtractionProgressCallback,
    ProgressCallback, WorkflowStatus,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr while the image loads and the model thinks.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Loading");
        bar.set_message("reading image…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_load_complete(&self, path: &Path, bytes: usize, mime_type: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            path.display(),
            dim(&format!("{bytes} bytes, {mime_type}"))
        ));
    }

    fn on_extraction_start(&self, model: &str) {
        self.bar.set_prefix("Extracting");
        self.bar.set_message(format!("waiting for {model}…"));
    }

    fn on_extraction_complete(&self, duration_ms: u64) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} extracted in {}",
            green("✔"),
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0))
        );
    }

    fn on_error(&self, message: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(message));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract to stdout (Gemini, reads GOOGLE_API_KEY)
  bill-extract ./test_data/cge_electricidad.png

  # Write the JSON to a file
  bill-extract bill.jpg -o bill.json

  # Use another provider through edgequake-llm
  bill-extract --provider openai --model gpt-4.1-mini bill.jpg

  # Retry rate limits and 5xx twice, give up after 60s per call
  bill-extract --max-retries 2 --api-timeout 60 bill.jpg

OUTPUT:
  Success: the extraction record, every field present (null when unknown).
  Failure: {"error": "Failed to load image: …"} or {"error": "Extraction failed: …"}
  Exit code 0 on success, 1 on failure, 2 on invalid arguments or settings.

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY          Gemini API key (GEMINI_API_KEY also accepted)
  GEMINI_BASE_URL         Override the Gemini endpoint (proxies)
  OPENAI_API_KEY          OpenAI API key (with --provider openai)
  ANTHROPIC_API_KEY       Anthropic API key (with --provider anthropic)
  BILL_EXTRACT_PROVIDER   Default provider
  BILL_EXTRACT_MODEL      Default model
  RUST_LOG                Log filter, e.g. bill_extract=debug

  A .env file in the working directory is loaded at startup.
"#;

/// Extract structured billing metadata from a utility bill image.
#[derive(Parser, Debug)]
#[command(
    name = "bill-extract",
    version,
    about = "Extract structured billing metadata from utility bill images using Vision LLMs",
    long_about = "Send a photo or scan of a utility bill to a vision model and print the \
provider, document, customer, financial and billing-period fields as JSON. Uses Google Gemini \
structured output by default; any provider supported by edgequake-llm works too.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the bill image (JPEG or PNG).
    input: PathBuf,

    /// Write the JSON to this file instead of stdout.
    #[arg(short, long, env = "BILL_EXTRACT_OUTPUT")]
    output: Option<PathBuf>,

    /// Model ID (e.g. gemini-2.5-flash, gemini-2.5-pro, gpt-4.1-mini).
    #[arg(long, env = "BILL_EXTRACT_MODEL")]
    model: Option<String>,

    /// Provider: gemini (native), or openai, anthropic, ollama, … via edgequake-llm.
    #[arg(long, env = "BILL_EXTRACT_PROVIDER")]
    provider: Option<String>,

    /// Gemini API key (GEMINI_API_KEY is also checked).
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini endpoint override.
    #[arg(long, env = "GEMINI_BASE_URL")]
    base_url: Option<String>,

    /// Image MIME type; detected from the file when omitted.
    #[arg(long, value_parser = ["image/png", "image/jpeg"])]
    mime: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "BILL_EXTRACT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max output tokens.
    #[arg(long, env = "BILL_EXTRACT_MAX_TOKENS", default_value_t = 2048,
          value_parser = clap::value_parser!(u64).range(1..))]
    max_tokens: u64,

    /// Retries on rate limits, 5xx and network errors.
    #[arg(long, env = "BILL_EXTRACT_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-call model timeout in seconds (default: provider's own).
    #[arg(long, env = "BILL_EXTRACT_API_TIMEOUT",
          value_parser = clap::value_parser!(u64).range(1..))]
    api_timeout: Option<u64>,

    /// Path to a text file replacing the built-in instruction.
    #[arg(long, env = "BILL_EXTRACT_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// Print JSON on a single line.
    #[arg(long)]
    compact: bool,

    /// Disable the spinner.
    #[arg(long, env = "BILL_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BILL_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except the JSON document.
    #[arg(short, long, env = "BILL_EXTRACT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Credentials may live in .env; a missing file is fine.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // stdout is reserved for the JSON document; logs go to stderr. The
    // spinner already says what is happening, so INFO is muted while it runs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
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

    if let Some(problem) = dotenv_problem(&dotenv) {
        if show_progress {
            eprintln!("{} {problem}", red("warning:"));
        } else {
            warn!("{problem}");
        }
    }

    // ── Build config ─────────────────────────────────────────────────────
    let mut config = match build_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            return Ok(ExitCode::from(exit_code_for(&e)));
        }
    };

    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>;
        config.progress_callback = Some(cb);
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let state = run_workflow(&cli.input, &config).await;
    let status = state.status();
    let document = state.into_output();

    let json = if cli.compact {
        serde_json::to_string(&document)
    } else {
        serde_json::to_string_pretty(&document)
    }
    .context("Failed to serialise output")?;

    match (status, cli.output.as_ref()) {
        (WorkflowStatus::Success, Some(path)) => {
            write_output(path, &json).await?;
            if !cli.quiet {
                eprintln!("{} wrote {}", green("✔"), path.display());
            }
        }
        _ => println!("{json}"),
    }

    Ok(match status {
        WorkflowStatus::Success => ExitCode::SUCCESS,
        _ => ExitCode::from(1),
    })
}

/// `.env` failures worth telling the user about; a missing file is not one.
fn dotenv_problem(result: &dotenvy::Result<PathBuf>) -> Option<String> {
    match result {
        Ok(_) => None,
        Err(e) if e.not_found() => None,
        Err(e) => Some(format!("Ignoring .env: {e}")),
    }
}

/// Gemini key from the flag / `GOOGLE_API_KEY`, else `GEMINI_API_KEY`.
fn resolve_api_key(cli: &Cli) -> Option<String> {
    cli.api_key.clone().filter(|k| !k.is_empty()).or_else(|| {
        API_KEY_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.is_empty())
    })
}

/// Invalid settings are usage errors (2); anything else is a failure (1).
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<BillError>() {
        Some(BillError::InvalidConfig(_)) => 2,
        _ => 1,
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(usize::try_from(cli.max_tokens).unwrap_or(usize::MAX))
        .max_retries(cli.max_retries);

    if let Some(key) = resolve_api_key(cli) {
        builder = builder.api_key(key);
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }

    if let Some(ref path) = cli.instruction {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        builder = builder.instruction(text);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref mime) = cli.mime {
        builder = builder.mime_override(mime.clone());
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }

    Ok(builder.build()?)
}
