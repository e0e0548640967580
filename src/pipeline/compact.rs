//! Post-save compaction with lopdf.
//!
//! pdfium writes a correct file but keeps every object it ever loaded and
//! leaves streams as it found them. Reloading the bytes with lopdf lets us
//! garbage-collect unreachable objects, drop empty streams, renumber the
//! survivors into a dense cross-reference table and deflate every stream, so
//! a document with hundreds of added highlights stays close to its original
//! size.

use crate::error::AuditError;
use lopdf::Document;

/// Output of [`compact_pdf`].
#[derive(Debug)]
pub struct Compacted {
    pub bytes: Vec<u8>,
    pub pruned_objects: usize,
}

/// Garbage-collect, renumber and compress a serialised PDF.
pub fn compact_pdf(bytes: &[u8]) -> Result<Compacted, AuditError> {
    let mut doc =
        Document::load_mem(bytes).map_err(|e| AuditError::CompactionFailed(e.to_string()))?;

    let mut pruned_objects = doc.prune_objects().len();
    pruned_objects += doc.delete_zero_length_streams().len();
    doc.renumber_objects();
    doc.compress();

    let mut buffer = Vec::with_capacity(bytes.len());
    doc.save_to(&mut buffer)
        .map_err(|e| AuditError::CompactionFailed(format!("Save failed: {e}")))?;

    Ok(Compacted {
        bytes: buffer,
        pruned_objects,
    })
}
