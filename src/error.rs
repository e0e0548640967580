//! Error types for the pdf-audit library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AuditError`] is **fatal**: the run cannot proceed at all (unreadable
//!   input, provider not configured, model output is not JSON, output file
//!   cannot be written). Returned as `Err(AuditError)` from the top-level
//!   entry points.
//!
//! * [`SkipReason`] is **non-fatal**: a single finding could not be placed on
//!   the page (bad page number, phrase not found) but every other finding is
//!   unaffected. Recorded in [`crate::output::HighlightReport`] so callers can
//!   see what was dropped instead of losing the whole document to one bad row.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-audit library.
#[derive(Debug, Error)]
pub enum AuditError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// No regulatory reference documents were configured.
    #[error("No reference documents configured.\nPass at least one with --reference <PDF>.")]
    NoReferenceDocuments,

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium could not serialise the annotated document.
    #[error("Failed to save annotated PDF to '{path}': {detail}")]
    SaveFailed { path: PathBuf, detail: String },

    /// lopdf could not reload or compact the serialised document.
    #[error("Failed to compact annotated PDF: {0}")]
    CompactionFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API kept failing after all retries.
    #[error("LLM API error from model '{model}' after {retries} retries: {message}")]
    LlmApiError {
        model: String,
        retries: u32,
        message: String,
    },

    /// A model call exceeded the configured timeout.
    #[error("Model '{model}' did not answer within {secs}s")]
    ApiTimeout { model: String, secs: u64 },

    /// The model answered, but not with a JSON array of findings.
    #[error("Model '{model}' returned output that is not a findings array: {detail}")]
    ModelOutputInvalid { model: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The findings spreadsheet could not be serialised.
    #[error("Failed to write spreadsheet '{path}': {detail}")]
    SpreadsheetFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library in the current\n\
directory, or install it system-wide.\n\
Pre-built libraries: https://github.com/bblanchon/pdfium-binaries/releases\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single finding was not annotated.
///
/// Never propagated: the highlight loop records it and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum SkipReason {
    /// The record has no `word/phrase_highlighted` string.
    #[error("finding has no phrase")]
    MissingPhrase,

    /// The phrase is empty after trimming.
    #[error("phrase is empty")]
    EmptyPhrase,

    /// `page_number` is missing or not a positive integer.
    #[error("page number {raw} is not a positive integer")]
    InvalidPageNumber { raw: String },

    /// `whats_wrong` is present but not a string.
    #[error("explanation is not a string")]
    InvalidNote,

    /// The page does not exist in the document.
    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// The backend refused to open the page.
    #[error("page {page} could not be opened: {detail}")]
    PageUnavailable { page: usize, detail: String },

    /// Neither search tier found the phrase.
    #[error("phrase not found on page {page}")]
    NotLocated { page: usize },

    /// The phrase was found but the backend rejected every highlight.
    #[error("highlights on page {page} could not be written: {detail}")]
    AnnotationFailed { page: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_out_of_range_display() {
        let e = SkipReason::PageOutOfRange { page: 9, total: 3 };
        let msg = e.to_string();
        assert!(msg.contains("page 9"), "got: {msg}");
        assert!(msg.contains("3 pages"), "got: {msg}");
    }

    #[test]
    fn llm_api_error_display() {
        let e = AuditError::LlmApiError {
            model: "gemini-2.5-flash".into(),
            retries: 3,
            message: "503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("gemini-2.5-flash"));
        assert!(msg.contains("3 retries"));
    }

    #[test]
    fn model_output_invalid_display() {
        let e = AuditError::ModelOutputInvalid {
            model: "m".into(),
            detail: "expected value at line 1".into(),
        };
        assert!(e.to_string().contains("expected value"));
    }

    #[test]
    fn skip_reason_serialises() {
        let json = serde_json::to_string(&SkipReason::NotLocated { page: 2 }).unwrap();
        assert!(json.contains("NotLocated"));
    }
}
