//! pdfium-render backend.
//!
//! ## Binding order
//!
//! `PDFIUM_LIB_PATH` (a directory or the library file itself) wins, then the
//! platform library name in the current directory, then whatever the system
//! loader finds.
//!
//! ## Search capabilities
//!
//! pdfium's `FPDFText_FindStart` matches case-insensitively when asked but has
//! no dehyphenation mode; a phrase split by a soft hyphen falls through to the
//! word-window tier.

use crate::backend::{
    AnnotatablePage, AuditDocument, BackendError, Glyph, PageTextModel, Rect, SearchCapabilities,
    SearchMode, SearchablePage,
};
use crate::error::AuditError;
use crate::pipeline::annotate::{Annotation, HIGHLIGHT_RGB};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

impl From<PdfiumError> for BackendError {
    fn from(e: PdfiumError) -> Self {
        BackendError(format!("{:?}", e))
    }
}

/// Bind to a pdfium shared library.
pub fn bind_pdfium() -> Result<Pdfium, AuditError> {
    if let Ok(configured) = std::env::var("PDFIUM_LIB_PATH") {
        let configured = PathBuf::from(configured);
        let library = if configured.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&configured)
        } else {
            configured
        };
        debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", library.display());
        return Pdfium::bind_to_library(&library)
            .map(Pdfium::new)
            .map_err(|e| AuditError::PdfiumBindingFailed(format!("{}: {:?}", library.display(), e)));
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| AuditError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Map a pdfium load failure to the matching fatal error.
fn load_error(path: &Path, password: Option<&str>, e: PdfiumError) -> AuditError {
    let detail = format!("{:?}", e);
    if detail.contains("Password") || detail.contains("password") {
        if password.is_some() {
            AuditError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            AuditError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        AuditError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}

fn to_rect(r: PdfRect) -> Rect {
    Rect::new(r.left().value, r.bottom().value, r.right().value, r.top().value)
}

fn to_pdf_rect(r: Rect) -> PdfRect {
    PdfRect::new_from_values(r.bottom, r.left, r.top, r.right)
}

/// An open pdfium document.
pub struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumDocument<'a> {
    pub fn open(pdfium: &'a Pdfium, path: &Path, password: Option<&'a str>) -> Result<Self, AuditError> {
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| load_error(path, password, e))?;
        debug!("Opened {} ({} pages)", path.display(), document.pages().len());
        Ok(Self { document })
    }

    /// Plain text of every page, in page order.
    pub fn page_texts(&self) -> Result<Vec<String>, BackendError> {
        self.document
            .pages()
            .iter()
            .map(|page| -> Result<String, BackendError> { Ok(page.text()?.all()) })
            .collect()
    }

    pub fn inner(&self) -> &PdfDocument<'a> {
        &self.document
    }
}

/// One page of a [`PdfiumDocument`].
pub struct PdfiumPage<'a> {
    page: PdfPage<'a>,
}

impl SearchablePage for PdfiumPage<'_> {
    fn capabilities(&self) -> SearchCapabilities {
        SearchCapabilities {
            ignore_case: true,
            dehyphenate: false,
        }
    }

    fn native_search(&self, phrase: &str, mode: SearchMode) -> Result<Vec<Rect>, BackendError> {
        let text = self.page.text()?;
        let options = PdfSearchOptions::new().match_case(!mode.ignore_case);
        let search = text.search(phrase, &options)?;

        let mut rects = Vec::new();
        for segments in search.iter(PdfSearchDirection::SearchForward) {
            rects.extend(segments.iter().map(|segment| to_rect(segment.bounds())));
        }
        Ok(rects)
    }

    fn text_model(&self) -> Result<PageTextModel, BackendError> {
        let text = self.page.text()?;
        let chars = text.chars();
        let glyphs = chars.iter().map(|c| Glyph {
            ch: c.unicode_char(),
            rect: c.loose_bounds().ok().map(to_rect),
        });
        Ok(PageTextModel::from_glyphs(glyphs))
    }
}

impl AnnotatablePage for PdfiumPage<'_> {
    fn add_highlight(&mut self, annotation: &Annotation) -> Result<(), BackendError> {
        let bounds = to_pdf_rect(annotation.rect);
        let [r, g, b] = HIGHLIGHT_RGB;

        let mut highlight = self.page.annotations_mut().create_highlight_annotation()?;
        highlight.set_bounds(bounds)?;
        highlight
            .attachment_points_mut()
            .create_attachment_point_at_end(PdfQuadPoints::from_rect(&bounds))?;
        highlight.set_stroke_color(PdfColor::new(r, g, b, annotation.alpha()))?;

        if let Some(note) = &annotation.note {
            highlight.set_creator(&note.title)?;
            highlight.set_contents(&note.content)?;
        }
        Ok(())
    }
}

impl<'a> AuditDocument for PdfiumDocument<'a> {
    type Page<'p> = PdfiumPage<'a>
    where
        Self: 'p;

    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page(&self, index: usize) -> Result<Self::Page<'_>, BackendError> {
        let index = u16::try_from(index)
            .map_err(|_| BackendError(format!("page index {index} exceeds pdfium's limit")))?;
        let page = self.document.pages().get(index)?;
        Ok(PdfiumPage { page })
    }

    fn to_bytes(&self) -> Result<Vec<u8>, BackendError> {
        Ok(self.document.save_to_bytes()?)
    }
}
