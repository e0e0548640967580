//! Highlight-pass integration tests on the in-memory backend.
//!
//! No pdfium library and no API key needed: the memory backend lays text out
//! on a fixed grid, searches it the way pdfium does, and serialises a real
//! PDF that these tests reload with lopdf.

use lopdf::{Dictionary, Document, Object};
use pdf_audit::backend::memory::MemoryDocument;
use pdf_audit::{
    highlight_document, highlight_to_file, merge_findings, write_findings_csv,
    AuditProgressCallback, MergedFinding, ModelFindings, RawFinding, SkipReason,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn raw(value: serde_json::Value) -> RawFinding {
    serde_json::from_value(value).unwrap()
}

fn merged(value: serde_json::Value) -> MergedFinding {
    MergedFinding::new(raw(value), "gemini-2.5-pro")
}

/// Annotation dictionaries on 1-based page `page` of a saved PDF.
fn annotations_on(doc: &Document, page: u32) -> Vec<&Dictionary> {
    let page_id = doc.get_pages()[&page];
    let page = doc.get_dictionary(page_id).unwrap();
    match page.get(b"Annots") {
        Ok(Object::Array(annots)) => annots
            .iter()
            .map(|o| doc.get_dictionary(o.as_reference().unwrap()).unwrap())
            .collect(),
        _ => Vec::new(),
    }
}

fn subtype(annot: &Dictionary) -> &[u8] {
    annot.get(b"Subtype").unwrap().as_name().unwrap()
}

fn contents(annot: &Dictionary) -> Option<String> {
    annot
        .get(b"Contents")
        .ok()
        .map(|o| String::from_utf8_lossy(o.as_str().unwrap()).into_owned())
}

// ── Highlight end to end ─────────────────────────────────────────────────────

#[test]
fn gold_loan_finding_is_written_as_one_highlight() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("audit.pdf");
    let doc = MemoryDocument::from_pages(&["Gold Loan LTV Ratio"]);

    let report = highlight_to_file(
        &doc,
        &[merged(json!({
            "page_number": 1,
            "word/phrase_highlighted": "LTV Ratio",
            "whats_wrong": "exceeds cap"
        }))],
        &out,
        None,
    )
    .unwrap();
    assert_eq!(report.annotated, 1);
    assert_eq!(report.annotations_written, 1);

    let saved = Document::load(&out).unwrap();
    let annots = annotations_on(&saved, 1);
    assert_eq!(annots.len(), 1);
    assert_eq!(subtype(annots[0]), b"Highlight");
    assert_eq!(contents(annots[0]).as_deref(), Some("exceeds cap"));
    let opacity = annots[0].get(b"CA").unwrap().as_float().unwrap();
    assert!((opacity - 0.4).abs() < 1e-6, "CA = {opacity}");
}

#[test]
fn out_of_range_page_is_skipped_and_file_still_written() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("audit.pdf");
    let doc = MemoryDocument::from_pages(&["Gold Loan", "Tenure 12 months"]);

    let report = highlight_to_file(
        &doc,
        &[
            merged(json!({"page_number": 7, "word/phrase_highlighted": "Gold Loan"})),
            merged(json!({"page_number": 2, "word/phrase_highlighted": "12 months", "whats_wrong": "too long"})),
        ],
        &out,
        None,
    )
    .unwrap();

    assert_eq!(report.annotated, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].index, 0);
    assert_eq!(
        report.skipped[0].reason,
        SkipReason::PageOutOfRange { page: 7, total: 2 }
    );

    let saved = Document::load(&out).unwrap();
    assert!(annotations_on(&saved, 1).is_empty());
    assert_eq!(annotations_on(&saved, 2).len(), 1);
}

#[test]
fn hyphenated_phrase_is_found_by_word_window() {
    let doc = MemoryDocument::from_pages(&["The max\u{00AD}imum LTV Ratio is 75%"]);
    let report = highlight_document(
        &doc,
        &[merged(json!({
            "page_number": 1,
            "word/phrase_highlighted": "maximum LTV",
            "whats_wrong": "not per circular"
        }))],
        None,
    );

    assert_eq!(report.annotated, 1);
    assert_eq!(report.native_matches, 0);
    assert_eq!(report.fallback_matches, 1);
    // Every fallback rectangle carries the same note.
    let annotations = doc.annotations(0);
    assert!(!annotations.is_empty());
    assert!(annotations
        .iter()
        .all(|a| a.note.as_ref().map(|n| n.content.as_str()) == Some("not per circular")));
}

#[test]
fn phrase_matches_case_insensitively() {
    let doc = MemoryDocument::from_pages(&["GOLD LOAN SCHEME"]);
    let report = highlight_document(
        &doc,
        &[merged(json!({"page_number": 1, "word/phrase_highlighted": "gold loan"}))],
        None,
    );
    assert_eq!(report.native_matches, 1);
    assert_eq!(doc.annotation_count(), 1);
}

#[test]
fn empty_findings_write_an_untouched_copy() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("audit.pdf");
    let doc = MemoryDocument::from_pages(&["Gold Loan", "LTV Ratio"]);

    let report = highlight_to_file(&doc, &[], &out, None).unwrap();
    assert_eq!(report.total, 0);

    let saved = Document::load(&out).unwrap();
    assert_eq!(saved.get_pages().len(), 2);
    assert!(annotations_on(&saved, 1).is_empty());
    assert!(annotations_on(&saved, 2).is_empty());
}

// ── Merge through to spreadsheet ─────────────────────────────────────────────

#[test]
fn merged_findings_reach_the_spreadsheet_with_provenance() {
    let first = vec![raw(json!({
        "page_number": 1,
        "word/phrase_highlighted": "LTV Ratio",
        "whats_wrong": "Exceeds cap"
    }))];
    let second = vec![
        raw(json!({
            "page_number": 1,
            "word/phrase_highlighted": " ltv ratio ",
            "whats_wrong": "exceeds cap"
        })),
        raw(json!({
            "page_number": 2,
            "word/phrase_highlighted": "Tenure",
            "whats_wrong": "missing"
        })),
    ];
    let findings = merge_findings(
        ModelFindings::new("model_1", first),
        ModelFindings::new("model_2", second),
    );
    assert_eq!(findings.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("audit.csv");
    write_findings_csv(&csv_path, &findings).unwrap();

    let text = std::fs::read_to_string(&csv_path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("page_number,word/phrase_highlighted,whats_wrong,from_model")
    );
    assert_eq!(lines.next(), Some("1,LTV Ratio,Exceeds cap,\"model_1, model_2\""));
    assert_eq!(lines.next(), Some("2,Tenure,missing,model_2"));
    assert_eq!(lines.next(), None);
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    started: AtomicUsize,
    annotated: AtomicUsize,
    skipped: Mutex<Vec<usize>>,
    completed: Mutex<Option<(usize, usize)>>,
}

impl AuditProgressCallback for Recorder {
    fn on_highlight_start(&self, total: usize) {
        self.started.store(total, Ordering::SeqCst);
    }

    fn on_finding_annotated(&self, _index: usize, _total: usize, _rects: usize) {
        self.annotated.fetch_add(1, Ordering::SeqCst);
    }

    fn on_finding_skipped(&self, index: usize, _total: usize, _reason: &SkipReason) {
        self.skipped.lock().unwrap().push(index);
    }

    fn on_highlight_complete(&self, annotated: usize, total: usize) {
        *self.completed.lock().unwrap() = Some((annotated, total));
    }
}

#[test]
fn progress_events_follow_the_highlight_pass() {
    let doc = MemoryDocument::from_pages(&["Gold Loan LTV Ratio"]);
    let recorder = Recorder::default();
    let findings = [
        merged(json!({"page_number": 1, "word/phrase_highlighted": "Gold"})),
        merged(json!({"page_number": 1, "word/phrase_highlighted": "Silver"})),
        merged(json!({"page_number": 0, "word/phrase_highlighted": "Gold"})),
        merged(json!({"page_number": 1, "word/phrase_highlighted": "Ratio"})),
    ];

    let report = highlight_document(&doc, &findings, Some(&recorder));

    assert_eq!(recorder.started.load(Ordering::SeqCst), 4);
    assert_eq!(recorder.annotated.load(Ordering::SeqCst), 2);
    assert_eq!(*recorder.skipped.lock().unwrap(), vec![1, 2]);
    assert_eq!(*recorder.completed.lock().unwrap(), Some((2, 4)));
    assert_eq!(report.annotated, 2);
}
