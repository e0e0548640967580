//! Input validation: check that every path handed to the audit is a readable
//! PDF before any model is called or any library is bound.
//!
//! Checking the `%PDF` magic up front turns "wrong file passed as reference"
//! into a clear error instead of a pdfium parse failure halfway through a run.

use crate::error::AuditError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Validate that `path` exists, is readable, and starts with `%PDF`.
pub fn validate_pdf(path: &Path) -> Result<(), AuditError> {
    if !path.exists() {
        return Err(AuditError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AuditError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(AuditError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(AuditError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    debug!("Validated PDF: {}", path.display());
    Ok(())
}

/// Validate the target and every reference document.
pub fn validate_audit_inputs<P: AsRef<Path>>(target: &Path, references: &[P]) -> Result<(), AuditError> {
    if references.is_empty() {
        return Err(AuditError::NoReferenceDocuments);
    }
    validate_pdf(target)?;
    for reference in references {
        validate_pdf(reference.as_ref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn accepts_pdf_magic() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write(dir.path(), "a.pdf", b"%PDF-1.7\n");
        validate_pdf(&pdf).unwrap();
    }

    #[test]
    fn rejects_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let txt = write(dir.path(), "a.pdf", b"hello world");
        let err = validate_pdf(&txt).unwrap_err();
        assert!(matches!(err, AuditError::NotAPdf { magic, .. } if &magic == b"hell"));
    }

    #[test]
    fn rejects_truncated_files() {
        let dir = tempfile::tempdir().unwrap();
        let tiny = write(dir.path(), "a.pdf", b"%P");
        assert!(matches!(validate_pdf(&tiny), Err(AuditError::NotAPdf { .. })));
    }

    #[test]
    fn missing_file() {
        let err = validate_pdf(Path::new("/nonexistent/doc.pdf")).unwrap_err();
        assert!(matches!(err, AuditError::FileNotFound { .. }));
    }

    #[test]
    fn references_required() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write(dir.path(), "t.pdf", b"%PDF-1.7\n");
        let none: [PathBuf; 0] = [];
        assert!(matches!(
            validate_audit_inputs(&pdf, &none),
            Err(AuditError::NoReferenceDocuments)
        ));
    }

    #[test]
    fn bad_reference_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write(dir.path(), "t.pdf", b"%PDF-1.7\n");
        let bad = dir.path().join("missing.pdf");
        let err = validate_audit_inputs(&pdf, &[bad.clone()]).unwrap_err();
        assert!(matches!(err, AuditError::FileNotFound { path } if path == bad));
    }
}
