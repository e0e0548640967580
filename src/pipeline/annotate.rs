//! Annotation writer: turn located rectangles into highlight annotations and
//! persist the annotated document exactly once.

use crate::backend::{AnnotatablePage, AuditDocument, Rect};
use crate::error::AuditError;
use crate::pipeline::compact;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Opacity of every highlight. Semi-transparent so the text stays legible.
pub const HIGHLIGHT_OPACITY: f32 = 0.4;

/// Title attached to every highlight that carries an explanation.
pub const ANNOTATION_TITLE: &str = "⚠️ Compliance Observation";

/// Highlight colour as RGB.
pub const HIGHLIGHT_RGB: [u8; 3] = [255, 230, 0];

/// Title and body shown in the viewer's annotation popup.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Note {
    pub title: String,
    pub content: String,
}

/// A highlight ready to be written into a page.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Annotation {
    pub rect: Rect,
    pub opacity: f32,
    pub note: Option<Note>,
}

impl Annotation {
    /// Build the highlight for `rect`. An empty `note` yields a purely visual
    /// highlight with no popup text.
    pub fn highlight(rect: Rect, note: &str) -> Self {
        let note = note.trim();
        Self {
            rect,
            opacity: HIGHLIGHT_OPACITY,
            note: (!note.is_empty()).then(|| Note {
                title: ANNOTATION_TITLE.to_string(),
                content: note.to_string(),
            }),
        }
    }

    /// Opacity expressed as an 8-bit alpha channel value.
    pub fn alpha(&self) -> u8 {
        (self.opacity.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

/// Add one highlight for `rect` to `page`.
pub fn annotate<P: AnnotatablePage + ?Sized>(
    page: &mut P,
    rect: Rect,
    note: &str,
) -> Result<(), AuditError> {
    let annotation = Annotation::highlight(rect, note);
    page.add_highlight(&annotation)
        .map_err(|e| AuditError::Internal(format!("add highlight: {e}")))
}

/// Statistics from [`finalize`].
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct FinalizeStats {
    /// Size of the backend's own serialisation.
    pub raw_bytes: usize,
    /// Size written to disk after compaction.
    pub written_bytes: usize,
    /// Unreachable objects removed.
    pub pruned_objects: usize,
    /// False when compaction failed and the backend's bytes were written.
    pub compacted: bool,
}

/// Serialise `document`, compact it, and write it to `output_path`.
///
/// Compaction only shrinks the file: when lopdf cannot reload the backend's
/// output (an encrypted target, say) the uncompacted bytes are written
/// instead. The write goes to a sibling temp file first and is renamed into
/// place, so a failed save never leaves a truncated PDF at `output_path`.
pub fn finalize<D: AuditDocument>(
    document: &D,
    output_path: &Path,
) -> Result<FinalizeStats, AuditError> {
    let raw = document.to_bytes().map_err(|e| AuditError::SaveFailed {
        path: output_path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let stats = match compact::compact_pdf(&raw) {
        Ok(compacted) => {
            debug!(
                "Compacted PDF: {} → {} bytes, {} objects pruned",
                raw.len(),
                compacted.bytes.len(),
                compacted.pruned_objects
            );
            write_atomic(output_path, &compacted.bytes)?;
            FinalizeStats {
                raw_bytes: raw.len(),
                written_bytes: compacted.bytes.len(),
                pruned_objects: compacted.pruned_objects,
                compacted: true,
            }
        }
        Err(e) => {
            warn!("{}; writing the uncompacted document", e);
            write_atomic(output_path, &raw)?;
            FinalizeStats {
                raw_bytes: raw.len(),
                written_bytes: raw.len(),
                pruned_objects: 0,
                compacted: false,
            }
        }
    };
    info!("Annotated PDF written to {}", output_path.display());
    Ok(stats)
}

/// Write `bytes` to `path` via a uniquely named sibling temp file + rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AuditError> {
    let write_err = |source| AuditError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(write_err)?;

    // Dropping the temp file on an error path removes it.
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryDocument, MemoryPageRef};
    use crate::backend::BackendError;

    #[derive(Default)]
    struct RecordingPage {
        added: Vec<Annotation>,
    }

    impl AnnotatablePage for RecordingPage {
        fn add_highlight(&mut self, annotation: &Annotation) -> Result<(), BackendError> {
            self.added.push(annotation.clone());
            Ok(())
        }
    }

    #[test]
    fn note_becomes_titled_content() {
        let mut page = RecordingPage::default();
        annotate(&mut page, Rect::new(0.0, 0.0, 10.0, 10.0), "exceeds cap").unwrap();
        let note = page.added[0].note.as_ref().expect("note attached");
        assert_eq!(note.title, ANNOTATION_TITLE);
        assert_eq!(note.content, "exceeds cap");
    }

    #[test]
    fn empty_note_is_visual_only() {
        let mut page = RecordingPage::default();
        annotate(&mut page, Rect::new(0.0, 0.0, 10.0, 10.0), "   ").unwrap();
        assert!(page.added[0].note.is_none());
    }

    #[test]
    fn opacity_fixed_regardless_of_note() {
        let with = Annotation::highlight(Rect::new(0.0, 0.0, 1.0, 1.0), "x");
        let without = Annotation::highlight(Rect::new(0.0, 0.0, 1.0, 1.0), "");
        assert_eq!(with.opacity, 0.4);
        assert_eq!(without.opacity, 0.4);
        assert_eq!(with.alpha(), 102);
    }

    #[test]
    fn write_atomic_creates_parent_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.pdf");
        write_atomic(&path, b"%PDF-1.7").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1, "temp file left behind");
    }

    #[test]
    fn sibling_outputs_with_one_stem_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("audit_20260101_120000.pdf");
        let csv = dir.path().join("audit_20260101_120000.csv");
        write_atomic(&pdf, b"%PDF-1.7").unwrap();
        write_atomic(&csv, b"a,b\n").unwrap();
        assert_eq!(std::fs::read(&pdf).unwrap(), b"%PDF-1.7");
        assert_eq!(std::fs::read(&csv).unwrap(), b"a,b\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    /// Serialises to bytes lopdf cannot parse; pages come from a memory
    /// document.
    struct UnparseableDocument {
        pages: MemoryDocument,
        bytes: Vec<u8>,
    }

    impl AuditDocument for UnparseableDocument {
        type Page<'p> = MemoryPageRef<'p>
        where
            Self: 'p;

        fn page_count(&self) -> usize {
            self.pages.page_count()
        }

        fn page(&self, index: usize) -> Result<Self::Page<'_>, BackendError> {
            self.pages.page(index)
        }

        fn to_bytes(&self) -> Result<Vec<u8>, BackendError> {
            Ok(self.bytes.clone())
        }
    }

    #[test]
    fn compaction_failure_still_writes_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("audit.pdf");
        let bytes = b"%PDF-1.7\n1 0 obj << /Encrypt garbage".to_vec();
        let doc = UnparseableDocument {
            pages: MemoryDocument::from_pages(&["Gold Loan"]),
            bytes: bytes.clone(),
        };

        let stats = finalize(&doc, &out).unwrap();

        assert!(!stats.compacted);
        assert_eq!(stats.pruned_objects, 0);
        assert_eq!(stats.written_bytes, bytes.len());
        assert_eq!(std::fs::read(&out).unwrap(), bytes);
    }

    #[test]
    fn finalize_compacts_a_valid_document() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("audit.pdf");
        let stats = finalize(&MemoryDocument::from_pages(&["Gold Loan"]), &out).unwrap();
        assert!(stats.compacted);
        assert_eq!(stats.written_bytes as u64, std::fs::metadata(&out).unwrap().len());
    }
}
