//! Result types returned by the audit entry points.

use crate::error::SkipReason;
use crate::finding::MergedFinding;
use crate::pipeline::annotate::FinalizeStats;
use crate::pipeline::locate::LocateTier;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A finding the highlight pass could not place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFinding {
    /// Position in the merged findings list.
    pub index: usize,
    /// The phrase as the model wrote it, if it had one.
    pub phrase: Option<String>,
    pub reason: SkipReason,
}

/// Outcome of one highlight pass over a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HighlightReport {
    /// Findings offered to the pass.
    pub total: usize,
    /// Findings that received at least one highlight.
    pub annotated: usize,
    /// Highlights written across all findings.
    pub annotations_written: usize,
    /// Findings placed by native search.
    pub native_matches: usize,
    /// Findings placed by the word-window fallback.
    pub fallback_matches: usize,
    /// Rectangles the backend refused to annotate.
    pub annotation_failures: usize,
    pub skipped: Vec<SkippedFinding>,
    /// Set once the document has been written.
    pub finalize: Option<FinalizeStats>,
}

impl HighlightReport {
    pub(crate) fn record_tier(&mut self, tier: Option<LocateTier>) {
        match tier {
            Some(LocateTier::Native) => self.native_matches += 1,
            Some(LocateTier::WordWindow) => self.fallback_matches += 1,
            None => {}
        }
    }
}

/// Token usage and timing for one model pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRun {
    pub tag: String,
    pub model: String,
    pub findings: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
}

/// Where a full audit wrote its artefacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditOutputs {
    pub annotated_pdf: PathBuf,
    pub spreadsheet: PathBuf,
}

/// Aggregate statistics for a full audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStats {
    pub models: Vec<ModelRun>,
    pub merged_findings: usize,
    pub llm_duration_ms: u64,
    pub highlight_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a full audit produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditOutput {
    pub findings: Vec<MergedFinding>,
    pub report: HighlightReport,
    pub outputs: AuditOutputs,
    pub stats: AuditStats,
}
