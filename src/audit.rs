//! Audit entry points: ask two models for findings, merge them, export the
//! spreadsheet, and highlight every finding in a copy of the target PDF.
//!
//! ## Failure model
//!
//! Anything that prevents a run from producing output (unreadable input,
//! provider not configured, unparseable model answer, failed save) is an
//! [`AuditError`]. A single finding that cannot be placed is not: it is
//! recorded in the [`HighlightReport`] and the loop moves on, so one bad row
//! from a model never costs the user the whole annotated document.

use crate::backend::pdfium::{bind_pdfium, PdfiumDocument};
use crate::backend::AuditDocument;
use crate::config::AuditConfig;
use crate::error::{AuditError, SkipReason};
use crate::finding::MergedFinding;
use crate::output::{AuditOutput, AuditOutputs, AuditStats, HighlightReport, ModelRun, SkippedFinding};
use crate::pipeline::annotate::{annotate, finalize};
use crate::pipeline::llm::{self, AuditRequest};
use crate::pipeline::locate::locate;
use crate::pipeline::merge::{merge_findings, ModelFindings};
use crate::pipeline::quiet::{QuietStderr, UnmutedProgress};
use crate::pipeline::render::{self, RenderOptions};
use crate::pipeline::{export, input};
use crate::progress::AuditProgressCallback;
use edgequake_llm::{ChatMessage, LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run a full audit of `target` and write both artefacts.
///
/// # Errors
/// Returns `Err(AuditError)` only for fatal errors. Findings that could not
/// be highlighted are reported in `output.report.skipped`.
pub async fn audit(
    target: impl AsRef<Path>,
    config: &AuditConfig,
    outputs: &AuditOutputs,
) -> Result<AuditOutput, AuditError> {
    let total_start = Instant::now();
    let target = target.as_ref();
    info!("Starting audit: {}", target.display());

    // ── Step 1: Ask both models ──────────────────────────────────────────
    let llm_start = Instant::now();
    let (findings, models) = query_models(target, config).await?;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    // ── Step 2: Spreadsheet ──────────────────────────────────────────────
    export::write_findings_csv(&outputs.spreadsheet, &findings)?;

    // ── Step 3: Highlight ────────────────────────────────────────────────
    let highlight_start = Instant::now();
    let report = highlight_pdf(target, &outputs.annotated_pdf, &findings, config).await?;
    let highlight_duration_ms = highlight_start.elapsed().as_millis() as u64;

    let stats = AuditStats {
        models,
        merged_findings: findings.len(),
        llm_duration_ms,
        highlight_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Audit complete: {}/{} findings highlighted, {}ms total",
        report.annotated, report.total, stats.total_duration_ms
    );

    Ok(AuditOutput {
        findings,
        report,
        outputs: outputs.clone(),
        stats,
    })
}

/// Ask both configured models to audit `target` and merge their findings.
pub async fn run_llm_audit(
    target: impl AsRef<Path>,
    config: &AuditConfig,
) -> Result<Vec<MergedFinding>, AuditError> {
    let (findings, _) = query_models(target.as_ref(), config).await?;
    Ok(findings)
}

async fn query_models(
    target: &Path,
    config: &AuditConfig,
) -> Result<(Vec<MergedFinding>, Vec<ModelRun>), AuditError> {
    input::validate_audit_inputs(target, &config.reference_documents)?;

    let primary = resolve_provider(config, Pass::Primary)?;
    let secondary = resolve_provider(config, Pass::Secondary)?;

    let render_options = config.attach_page_images.then_some(RenderOptions {
        max_rendered_pixels: config.max_rendered_pixels,
        dpi: config.dpi,
    });
    let content = render::load_content(target, config.password.as_deref(), render_options).await?;
    let references = render::load_references(&config.reference_documents).await?;

    let request = AuditRequest {
        references,
        target_name: render::display_name(target),
        target_pages: content.pages,
        page_images: content.images,
    };
    let messages = llm::build_messages(&request, config.user_instructions.as_deref());
    debug!(
        "Audit request: {} references, {} target pages, {} images",
        request.references.len(),
        request.target_pages.len(),
        request.page_images.len()
    );

    let [(primary_tag, primary_model), (secondary_tag, secondary_model)] = model_passes(config);
    let primary_pass = run_pass(&primary, primary_tag, primary_model, &messages, config);
    let secondary_pass = run_pass(&secondary, secondary_tag, secondary_model, &messages, config);

    let (first, second) = if config.concurrent_models {
        let (first, second) = futures::join!(primary_pass, secondary_pass);
        (first?, second?)
    } else {
        let first = primary_pass.await?;
        let second = secondary_pass.await?;
        (first, second)
    };

    let runs = vec![first.run, second.run];
    let merged = merge_findings(
        ModelFindings::new(config.primary_model.clone(), first.findings),
        ModelFindings::new(config.secondary_model.clone(), second.findings),
    );
    info!("Merged {} findings from two models", merged.len());
    Ok((merged, runs))
}

/// `(pass, model)` for both audit passes, in merge order.
fn model_passes(config: &AuditConfig) -> [(&'static str, &str); 2] {
    [
        ("primary", config.primary_model.as_str()),
        ("secondary", config.secondary_model.as_str()),
    ]
}

/// One model call. `pass` names the slot (`primary` / `secondary`) and
/// becomes [`ModelRun::tag`]; findings are tagged by model name at merge.
async fn run_pass(
    provider: &Arc<dyn LLMProvider>,
    pass: &str,
    model: &str,
    messages: &[ChatMessage],
    config: &AuditConfig,
) -> Result<llm::ModelAnswer, AuditError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_model_start(pass, model);
    }
    let answer = llm::query_model(provider, pass, model, messages, config).await?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_model_complete(pass, model, answer.findings.len());
    }
    Ok(answer)
}

/// Highlight `findings` in a copy of `input` written to `output`.
///
/// pdfium runs on the blocking pool with its stderr chatter silenced (see
/// [`AuditConfig::suppress_backend_diagnostics`]). The document is saved
/// exactly once, after every finding has been tried.
pub async fn highlight_pdf(
    input_pdf: impl AsRef<Path>,
    output_pdf: impl AsRef<Path>,
    findings: &[MergedFinding],
    config: &AuditConfig,
) -> Result<HighlightReport, AuditError> {
    let input_pdf = input_pdf.as_ref().to_path_buf();
    let output_pdf = output_pdf.as_ref().to_path_buf();
    input::validate_pdf(&input_pdf)?;
    if same_file(&input_pdf, &output_pdf) {
        return Err(AuditError::InvalidConfig(
            "Annotated output must not overwrite the input PDF".into(),
        ));
    }

    let findings = findings.to_vec();
    let password = config.password.clone();
    let quiet = config.suppress_backend_diagnostics;
    let progress = config.progress_callback.clone();

    tokio::task::spawn_blocking(move || {
        let quiet = QuietStderr::new(quiet);
        let progress = progress
            .as_deref()
            .map(|inner| UnmutedProgress::new(inner, &quiet));
        let pdfium = bind_pdfium()?;
        let document = PdfiumDocument::open(&pdfium, &input_pdf, password.as_deref())?;
        highlight_to_file(
            &document,
            &findings,
            &output_pdf,
            progress.as_ref().map(|p| p as &dyn AuditProgressCallback),
        )
    })
    .await
    .map_err(|e| AuditError::Internal(format!("Highlight task panicked: {}", e)))?
}

/// Whether `output` names the same file as the existing `input`, however
/// either path is spelled. `output` may not exist yet.
fn same_file(input: &Path, output: &Path) -> bool {
    let Ok(input) = input.canonicalize() else {
        return input == output;
    };
    let output = output.canonicalize().ok().or_else(|| {
        let name = output.file_name()?;
        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        parent.canonicalize().ok().map(|dir| dir.join(name))
    });
    output.is_some_and(|output| output == input)
}

/// Highlight `findings` in `document` and write it to `output_pdf`.
pub fn highlight_to_file<D: AuditDocument>(
    document: &D,
    findings: &[MergedFinding],
    output_pdf: &Path,
    progress: Option<&dyn AuditProgressCallback>,
) -> Result<HighlightReport, AuditError> {
    let mut report = highlight_document(document, findings, progress);
    report.finalize = Some(finalize(document, output_pdf)?);
    Ok(report)
}

/// Place every finding on `document`, in input order. Never fails: findings
/// that cannot be placed are recorded in the report.
pub fn highlight_document<D: AuditDocument>(
    document: &D,
    findings: &[MergedFinding],
    progress: Option<&dyn AuditProgressCallback>,
) -> HighlightReport {
    let total = findings.len();
    let mut report = HighlightReport {
        total,
        ..Default::default()
    };
    if let Some(cb) = progress {
        cb.on_highlight_start(total);
    }

    for (index, merged) in findings.iter().enumerate() {
        match place_finding(document, merged, &mut report) {
            Ok(written) => {
                report.annotated += 1;
                if let Some(cb) = progress {
                    cb.on_finding_annotated(index, total, written);
                }
            }
            Err(reason) => {
                debug!("Finding {} skipped: {}", index + 1, reason);
                if let Some(cb) = progress {
                    cb.on_finding_skipped(index, total, &reason);
                }
                report.skipped.push(SkippedFinding {
                    index,
                    phrase: merged.raw.phrase().map(str::to_string),
                    reason,
                });
            }
        }
    }

    info!(
        "Highlighted {}/{} findings ({} annotations, {} skipped)",
        report.annotated,
        total,
        report.annotations_written,
        report.skipped.len()
    );
    if let Some(cb) = progress {
        cb.on_highlight_complete(report.annotated, total);
    }
    report
}

/// Validate, locate and annotate one finding. Returns the number of
/// highlights written.
fn place_finding<D: AuditDocument>(
    document: &D,
    merged: &MergedFinding,
    report: &mut HighlightReport,
) -> Result<usize, SkipReason> {
    let finding = merged.validate()?;
    let page_number = finding.page_number();

    let total_pages = document.page_count();
    if finding.page_index >= total_pages {
        return Err(SkipReason::PageOutOfRange {
            page: page_number,
            total: total_pages,
        });
    }

    let mut page = document
        .page(finding.page_index)
        .map_err(|e| SkipReason::PageUnavailable {
            page: page_number,
            detail: e.to_string(),
        })?;

    let located = locate(&page, &finding.phrase);
    if located.is_empty() {
        return Err(SkipReason::NotLocated { page: page_number });
    }
    report.record_tier(located.tier);

    let mut written = 0;
    let mut last_failure = None;
    for rect in located.rects {
        match annotate(&mut page, rect, &finding.note) {
            Ok(()) => written += 1,
            Err(e) => {
                warn!("Page {}: highlight for {:?} failed: {}", page_number, finding.phrase, e);
                report.annotation_failures += 1;
                last_failure = Some(e.to_string());
            }
        }
    }
    report.annotations_written += written;

    match (written, last_failure) {
        (0, Some(detail)) => Err(SkipReason::AnnotationFailed {
            page: page_number,
            detail,
        }),
        _ => Ok(written),
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Pass {
    Primary,
    Secondary,
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AuditError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AuditError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the provider for one pass, from most-specific to least-specific:
///
/// 1. **Pre-built provider** for the pass.
/// 2. **Named provider** (`config.provider_name`) with the pass's model.
/// 3. **`EDGEQUAKE_LLM_PROVIDER`** from the environment, with the pass's model.
/// 4. **Gemini** when `GEMINI_API_KEY` or `GOOGLE_API_KEY` is set, matching
///    the default model names.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`]. The
///    provider's own default model is used, so both passes may hit the same
///    model; a warning says so.
fn resolve_provider(config: &AuditConfig, pass: Pass) -> Result<Arc<dyn LLMProvider>, AuditError> {
    let (prebuilt, model) = match pass {
        Pass::Primary => (&config.primary_provider, &config.primary_model),
        Pass::Secondary => (&config.secondary_provider, &config.secondary_model),
    };

    if let Some(provider) = prebuilt {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let Ok(name) = std::env::var("EDGEQUAKE_LLM_PROVIDER") {
        if !name.is_empty() {
            return create_provider(&name, model);
        }
    }

    let has_key = |var: &str| std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false);
    if has_key("GEMINI_API_KEY") || has_key("GOOGLE_API_KEY") {
        return create_provider(crate::config::DEFAULT_PROVIDER, model);
    }

    warn!(
        "No provider configured for {:?} pass; auto-detecting (model '{}' may be ignored)",
        pass, model
    );
    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AuditError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, or pass --provider with the matching API key.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryDocument;
    use crate::finding::RawFinding;
    use serde_json::json;

    fn finding(value: serde_json::Value) -> MergedFinding {
        let raw: RawFinding = serde_json::from_value(value).unwrap();
        MergedFinding::new(raw, "model_1")
    }

    #[test]
    fn gold_loan_finding_gets_one_highlight() {
        let doc = MemoryDocument::from_pages(&["Gold Loan LTV Ratio"]);
        let report = highlight_document(
            &doc,
            &[finding(json!({"page_number": 1, "word/phrase_highlighted": "LTV Ratio", "whats_wrong": "exceeds cap"}))],
            None,
        );
        assert_eq!(report.annotated, 1);
        assert_eq!(report.native_matches, 1);

        let annotations = doc.annotations(0);
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].note.as_ref().unwrap().content, "exceeds cap");
    }

    #[test]
    fn bad_findings_do_not_stop_good_ones() {
        let doc = MemoryDocument::from_pages(&["Gold Loan", "LTV Ratio"]);
        let findings = [
            finding(json!({"page_number": 9, "word/phrase_highlighted": "Gold"})),
            finding(json!({"page_number": "x", "word/phrase_highlighted": "Gold"})),
            finding(json!({"page_number": 1, "word/phrase_highlighted": ""})),
            finding(json!({"page_number": 1, "word/phrase_highlighted": "Silver"})),
            finding(json!({"page_number": 2, "word/phrase_highlighted": "Ratio"})),
        ];
        let report = highlight_document(&doc, &findings, None);

        assert_eq!(report.total, 5);
        assert_eq!(report.annotated, 1);
        let reasons: Vec<&SkipReason> = report.skipped.iter().map(|s| &s.reason).collect();
        assert_eq!(
            reasons,
            vec![
                &SkipReason::PageOutOfRange { page: 9, total: 2 },
                &SkipReason::InvalidPageNumber { raw: "\"x\"".into() },
                &SkipReason::EmptyPhrase,
                &SkipReason::NotLocated { page: 1 },
            ]
        );
        assert_eq!(doc.annotations(1).len(), 1);
    }

    #[test]
    fn soft_hyphen_falls_back_to_word_window() {
        let doc = MemoryDocument::from_pages(&["Gold Loan LTV Ra\u{00AD}tio applies"]);
        let report = highlight_document(
            &doc,
            &[finding(json!({"page_number": 1, "word/phrase_highlighted": "LTV Ratio"}))],
            None,
        );
        assert_eq!(report.fallback_matches, 1);
        assert!(report.annotations_written > 0);
        assert!(doc.annotations(0).iter().all(|a| a.note.is_none()));
    }

    #[test]
    fn highlight_to_file_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("audit.pdf");
        let doc = MemoryDocument::from_pages(&["Gold Loan LTV Ratio"]);
        let report = highlight_to_file(
            &doc,
            &[finding(json!({"page_number": 1, "word/phrase_highlighted": "Gold"}))],
            &out,
            None,
        )
        .unwrap();
        assert!(out.exists());
        assert_eq!(report.finalize.unwrap().written_bytes as u64, std::fs::metadata(&out).unwrap().len());
    }

    #[tokio::test]
    async fn highlight_pdf_refuses_to_overwrite_input() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("in.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();
        let err = highlight_pdf(&pdf, &pdf, &[], &AuditConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn highlight_pdf_refuses_input_under_another_spelling() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("in.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();
        let aliased = dir.path().join(".").join("sub").join("..").join("in.pdf");
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let err = highlight_pdf(&pdf, &aliased, &[], &AuditConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidConfig(_)));
    }

    #[test]
    fn same_file_handles_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("in.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();
        assert!(same_file(&pdf, &dir.path().join("./in.pdf")));
        assert!(!same_file(&pdf, &dir.path().join("out.pdf")));
        assert!(!same_file(&pdf, &dir.path().join("missing_dir/in.pdf")));
    }

    #[tokio::test]
    async fn run_llm_audit_requires_references() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("in.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();
        let err = run_llm_audit(&pdf, &AuditConfig::default()).await.unwrap_err();
        assert!(matches!(err, AuditError::NoReferenceDocuments));
    }

    #[test]
    fn passes_are_told_apart_when_both_use_one_model() {
        let config = AuditConfig {
            primary_model: "gemini-2.5-pro".into(),
            secondary_model: "gemini-2.5-pro".into(),
            ..AuditConfig::default()
        };
        assert_eq!(
            model_passes(&config),
            [("primary", "gemini-2.5-pro"), ("secondary", "gemini-2.5-pro")]
        );
    }
}
