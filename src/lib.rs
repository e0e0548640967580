//! # pdf-audit
//!
//! Audit a PDF against regulatory reference documents with two LLMs, and
//! highlight every finding in place.
//!
//! ## Why this crate?
//!
//! A model can say *what* is wrong with a policy document, but its quote of
//! the offending text rarely survives a literal search: PDF extraction leaves
//! soft hyphens, non-breaking spaces, table pipes and stray punctuation in
//! the page text. This crate pairs the model calls with a tolerant phrase
//! locator, so the reviewer gets a PDF with each finding highlighted and its
//! explanation attached as a note, plus a spreadsheet of everything found.
//!
//! ## Pipeline Overview
//!
//! ```text
//! target PDF + reference PDFs
//!  │
//!  ├─ 1. Input     validate every path is a readable PDF
//!  ├─ 2. Extract   page text (+ page images) via pdfium, spawn_blocking
//!  ├─ 3. Audit     two model passes, retry/backoff, JSON findings
//!  ├─ 4. Merge     dedup by (page, phrase, note), provenance tags
//!  ├─ 5. Export    findings spreadsheet (CSV)
//!  └─ 6. Highlight locate each phrase (native search, then word windows),
//!                  annotate at opacity 0.4, save once, compact with lopdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_audit::{audit, AuditConfig, AuditOutputs, RunId};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider detected from GEMINI_API_KEY unless configured otherwise
//!     let config = AuditConfig::builder()
//!         .reference_document("rbi_master_circular.pdf")
//!         .build()?;
//!     let outputs = AuditOutputs::for_run(Path::new("out"), &RunId::now());
//!     let result = audit("gold_loan_policy.pdf", &config, &outputs).await?;
//!     eprintln!(
//!         "{} findings, {} highlighted",
//!         result.findings.len(),
//!         result.report.annotated
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-audit` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! ## PDFium
//!
//! The pdfium shared library is located at run time: `PDFIUM_LIB_PATH`, then
//! the current directory, then the system library path.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod audit;
pub mod backend;
pub mod config;
pub mod error;
pub mod finding;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod registry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use audit::{audit, highlight_document, highlight_pdf, highlight_to_file, run_llm_audit};
pub use backend::{AuditDocument, PageTextModel, Rect, Word};
pub use config::{AuditConfig, AuditConfigBuilder};
pub use error::{AuditError, SkipReason};
pub use finding::{load_findings, save_findings, Finding, MergedFinding, RawFinding};
pub use output::{AuditOutput, AuditOutputs, AuditStats, HighlightReport, ModelRun, SkippedFinding};
pub use pipeline::export::write_findings_csv;
pub use pipeline::locate::{locate, Located, LocateTier};
pub use pipeline::merge::{merge_findings, ModelFindings};
pub use pipeline::normalize::normalize_token;
pub use progress::{AuditProgressCallback, NoopProgressCallback, ProgressCallback};
pub use registry::{InMemoryRunStore, RunId, RunState, RunStatus, RunStore};
