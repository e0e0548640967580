//! CLI binary for pdf-audit.
//!
//! A thin shim over the library crate that maps CLI flags to `AuditConfig`,
//! names the run's artefacts, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use pdf_audit::{
    audit, highlight_pdf, load_findings, save_findings, write_findings_csv, AuditConfig,
    AuditOutputs, AuditProgressCallback, HighlightReport, InMemoryRunStore, ProgressCallback,
    RunStore, SkipReason,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while the models think, then a bar over the
/// merged findings while they are highlighted.
struct CliProgressCallback {
    bar: ProgressBar,
    model_starts: Mutex<HashMap<String, Instant>>,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDFs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            model_starts: Mutex::new(HashMap::new()),
            skipped: AtomicUsize::new(0),
        })
    }

    fn starts(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        self.model_starts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditProgressCallback for CliProgressCallback {
    fn on_model_start(&self, tag: &str, model: &str) {
        self.starts().insert(tag.to_string(), Instant::now());
        self.bar.set_prefix("Auditing");
        self.bar.set_message(format!("waiting for {model}…"));
    }

    fn on_model_complete(&self, tag: &str, model: &str, findings: usize) {
        let elapsed = self
            .starts()
            .remove(tag)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        self.bar.println(format!(
            "  {} {:<24} {:<10} {}  {}",
            green("✓"),
            model,
            dim(tag),
            dim(&format!("{findings:>3} findings")),
            dim(&format!("{elapsed:.1}s")),
        ));
    }

    fn on_highlight_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} findings  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Highlighting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Highlighting {total} findings…"))
        ));
    }

    fn on_finding_annotated(&self, _index: usize, _total: usize, _rects: usize) {
        self.bar.inc(1);
    }

    fn on_finding_skipped(&self, index: usize, total: usize, reason: &SkipReason) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Finding {:>3}/{:<3}  {}",
            yellow("⚠"),
            index + 1,
            total,
            dim(&reason.to_string()),
        ));
        self.bar.inc(1);
    }

    fn on_highlight_complete(&self, annotated: usize, total: usize) {
        self.bar.finish_and_clear();
        let skipped = self.skipped.load(Ordering::SeqCst);
        if skipped == 0 {
            eprintln!(
                "{} {} findings highlighted",
                green("✔"),
                bold(&annotated.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} findings highlighted  ({} skipped)",
                cyan("⚠"),
                bold(&annotated.to_string()),
                total,
                yellow(&skipped.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Audit a policy against one circular
  pdf-audit policy.pdf --reference circular.pdf

  # Several references, custom instructions, results in ./runs
  pdf-audit policy.pdf -r circular.pdf -r master_direction.pdf \
      --instructions focus_on_ltv.txt -o runs

  # Keep the raw findings, then re-highlight later without any model calls
  pdf-audit policy.pdf -r circular.pdf --save-findings findings.json
  pdf-audit policy.pdf --findings findings.json

  # Other models
  pdf-audit --provider openai --model gpt-4.1 --secondary-model gpt-4.1-mini \
      policy.pdf -r circular.pdf

OUTPUTS:
  <output-dir>/audit_<run-id>.pdf   target with one highlight per finding,
                                    the explanation attached as a note
  <output-dir>/audit_<run-id>.csv   every merged finding; from_model names
                                    the model(s) that reported it

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  PDF_AUDIT_REFERENCES    Comma-separated reference PDFs
  PDFIUM_LIB_PATH         Directory or file of an existing libpdfium
  RUST_LOG                Log filter (overrides -v / -q)

  A .env file in the current directory is loaded first.
"#;

/// Audit a PDF against regulatory references and highlight every finding.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-audit",
    version,
    about = "Audit a PDF against regulatory references with two LLMs and highlight every finding",
    long_about = "Send a target PDF and one or more regulatory reference PDFs to two LLMs, \
merge their compliance findings, and write a copy of the target with every finding \
highlighted in place plus a spreadsheet of all findings.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF to audit.
    target: PathBuf,

    /// Regulatory reference PDF (repeatable).
    #[arg(
        short = 'r',
        long = "reference",
        env = "PDF_AUDIT_REFERENCES",
        value_delimiter = ','
    )]
    references: Vec<PathBuf>,

    /// Directory for the annotated PDF and spreadsheet.
    #[arg(short, long, env = "PDF_AUDIT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Primary model ID.
    #[arg(long, env = "PDF_AUDIT_MODEL")]
    model: Option<String>,

    /// Secondary model ID.
    #[arg(long, env = "PDF_AUDIT_SECONDARY_MODEL")]
    secondary_model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "PDF_AUDIT_PROVIDER",
        long_help = "LLM provider for both models. Auto-detected if not set:\n\
          EDGEQUAKE_LLM_PROVIDER, then gemini when GEMINI_API_KEY is set, then\n\
          whichever provider key is found in the environment."
    )]
    provider: Option<String>,

    /// Issue both model calls at the same time.
    #[arg(long, env = "PDF_AUDIT_CONCURRENT_MODELS")]
    concurrent_models: bool,

    /// Text file of extra instructions appended to the audit prompt.
    #[arg(long, env = "PDF_AUDIT_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// Send page text only, without rendered page images.
    #[arg(long, env = "PDF_AUDIT_NO_IMAGES")]
    no_images: bool,

    /// Rendering DPI for page images (72–400).
    #[arg(long, env = "PDF_AUDIT_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Password of the target PDF.
    #[arg(long, env = "PDF_AUDIT_PASSWORD")]
    password: Option<String>,

    /// Max LLM output tokens per model call.
    #[arg(long, env = "PDF_AUDIT_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF_AUDIT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per model call on failure.
    #[arg(long, env = "PDF_AUDIT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF_AUDIT_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Skip the models: highlight findings from this JSON file.
    #[arg(long, conflicts_with = "save_findings")]
    findings: Option<PathBuf>,

    /// Also write the merged findings to this JSON file.
    #[arg(long)]
    save_findings: Option<PathBuf>,

    /// Print a JSON summary on stdout.
    #[arg(long, env = "PDF_AUDIT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF_AUDIT_NO_PROGRESS")]
    no_progress: bool,

    /// Let pdfium write its diagnostics to stderr.
    #[arg(long, env = "PDF_AUDIT_KEEP_BACKEND_LOGS")]
    keep_backend_logs: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_AUDIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_AUDIT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v brings them all back.
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AuditProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Name the run ─────────────────────────────────────────────────────
    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("Failed to create {}", cli.output_dir.display()))?;
    let runs = InMemoryRunStore::new();
    let run_id = runs.create(&cli.target);
    let outputs = AuditOutputs::for_run(&cli.output_dir, &run_id);

    // ── Run ──────────────────────────────────────────────────────────────
    let (finding_count, report, tokens) = if let Some(ref findings_path) = cli.findings {
        let findings = load_findings(findings_path).context("Failed to read findings")?;
        write_findings_csv(&outputs.spreadsheet, &findings)
            .context("Failed to write spreadsheet")?;
        let report = highlight_pdf(&cli.target, &outputs.annotated_pdf, &findings, &config)
            .await
            .context("Highlighting failed")?;
        (findings.len(), report, None)
    } else {
        let result = audit(&cli.target, &config, &outputs)
            .await
            .context("Audit failed")?;
        if let Some(ref path) = cli.save_findings {
            save_findings(path, &result.findings).context("Failed to save findings")?;
        }
        let tokens = result.stats.models.iter().fold((0, 0), |(i, o), m| {
            (i + m.input_tokens, o + m.output_tokens)
        });
        (result.findings.len(), result.report, Some(tokens))
    };
    runs.record_outputs(&run_id, outputs.clone())?;

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let summary = serde_json::json!({
            "run_id": run_id.as_str(),
            "findings": finding_count,
            "outputs": outputs,
            "report": report,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_summary(&report, &outputs, finding_count, tokens, show_progress);
    }

    Ok(())
}

/// Map CLI args to `AuditConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AuditConfig> {
    let mut builder = AuditConfig::builder()
        .reference_documents(cli.references.iter().cloned())
        .attach_page_images(!cli.no_images)
        .dpi(cli.dpi)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .concurrent_models(cli.concurrent_models)
        .suppress_backend_diagnostics(!cli.keep_backend_logs);

    if let Some(ref path) = cli.instructions {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instructions from {:?}", path))?;
        builder = builder.user_instructions(text);
    }
    if let Some(ref model) = cli.model {
        builder = builder.primary_model(model.clone());
    }
    if let Some(ref model) = cli.secondary_model {
        builder = builder.secondary_model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(
    report: &HighlightReport,
    outputs: &AuditOutputs,
    findings: usize,
    tokens: Option<(usize, usize)>,
    progress_shown: bool,
) {
    // The progress callback already printed the per-finding lines.
    if !progress_shown {
        for skipped in &report.skipped {
            eprintln!(
                "  {} Finding {:>3}  {}",
                yellow("⚠"),
                skipped.index + 1,
                dim(&skipped.reason.to_string())
            );
        }
    }
    eprintln!(
        "{}  {}/{} findings highlighted  ({} native, {} fallback)",
        if report.skipped.is_empty() {
            green("✔")
        } else if report.annotated == 0 && findings > 0 {
            red("✘")
        } else {
            cyan("⚠")
        },
        report.annotated,
        findings,
        report.native_matches,
        report.fallback_matches,
    );
    eprintln!("   PDF  →  {}", bold(&outputs.annotated_pdf.display().to_string()));
    eprintln!("   CSV  →  {}", bold(&outputs.spreadsheet.display().to_string()));
    if let Some((input, output)) = tokens {
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&input.to_string()),
            dim(&output.to_string()),
        );
    }
}
