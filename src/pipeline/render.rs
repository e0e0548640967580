//! Document content for the model request: per-page text, and optionally
//! each page rasterised and PNG-encoded as an image attachment.
//!
//! ## Why spawn_blocking?
//!
//! pdfium keeps thread-local state and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto the blocking
//! pool so Tokio worker threads never stall on CPU-heavy rendering.
//!
//! ## DPI and the pixel cap
//!
//! Pages render at the configured DPI, but page sizes vary wildly, so
//! `max_rendered_pixels` caps both edges regardless of physical size. That
//! keeps memory and request size bounded for posters and drawings.

use crate::backend::pdfium::{bind_pdfium, PdfiumDocument};
use crate::error::AuditError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Rendering settings for page images.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub max_rendered_pixels: u32,
    /// Resolution before the pixel cap applies.
    pub dpi: u32,
}

/// Extracted content of one PDF.
#[derive(Debug, Clone, Default)]
pub struct DocumentContent {
    /// Text per page, in page order.
    pub pages: Vec<String>,
    /// PNG page images, in page order. Pages that failed to render or
    /// encode are left out.
    pub images: Vec<ImageData>,
}

/// Extract every page's text, and render page images when `render` is set.
pub async fn load_content(
    pdf_path: &Path,
    password: Option<&str>,
    render: Option<RenderOptions>,
) -> Result<DocumentContent, AuditError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || load_content_blocking(&path, password.as_deref(), render))
        .await
        .map_err(|e| AuditError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn load_content_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    render: Option<RenderOptions>,
) -> Result<DocumentContent, AuditError> {
    let pdfium = bind_pdfium()?;
    let document = PdfiumDocument::open(&pdfium, pdf_path, password)?;

    let pages = document.page_texts().map_err(|e| AuditError::CorruptPdf {
        path: pdf_path.to_path_buf(),
        detail: e.to_string(),
    })?;
    info!(
        "Extracted text from {} ({} pages)",
        pdf_path.display(),
        pages.len()
    );

    let images = match render {
        Some(options) => render_images(&document, pdf_path, options),
        None => Vec::new(),
    };

    Ok(DocumentContent { pages, images })
}

fn render_images(
    document: &PdfiumDocument<'_>,
    pdf_path: &Path,
    options: RenderOptions,
) -> Vec<ImageData> {
    let mut images = Vec::new();
    for (idx, page) in document.inner().pages().iter().enumerate() {
        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width(page.width().value, options))
            .set_maximum_height(options.max_rendered_pixels as i32);
        let bitmap = match page.render_with_config(&render_config) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                warn!(
                    "{}: page {} could not be rendered: {:?}",
                    pdf_path.display(),
                    idx + 1,
                    e
                );
                continue;
            }
        };

        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());

        match encode_page(&image) {
            Ok(data) => images.push(data),
            Err(e) => warn!("Failed to encode page {}: {}", idx + 1, e),
        }
    }
    images
}

/// Pixel width for a page `width_pts` wide: `dpi / 72` pixels per point,
/// capped at `max_rendered_pixels`.
fn target_width(width_pts: f32, options: RenderOptions) -> i32 {
    let at_dpi = (width_pts * options.dpi as f32 / 72.0).round() as i32;
    at_dpi.clamp(1, options.max_rendered_pixels as i32)
}

/// Encode a rasterised page as a base64 PNG image attachment.
///
/// PNG keeps rendered text crisp; `detail: "high"` asks the provider to use
/// its full tile budget so small print and tables stay legible.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(ImageData::new(STANDARD.encode(&buf), "image/png").with_detail("high"))
}

/// Display name for a document in the model request.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract text from every reference document, keyed by display name.
pub async fn load_references(paths: &[PathBuf]) -> Result<Vec<(String, String)>, AuditError> {
    let mut references = Vec::with_capacity(paths.len());
    for path in paths {
        let content = load_content(path, None, None).await?;
        let text = content
            .pages
            .iter()
            .enumerate()
            .map(|(i, page)| format!("[page {}]\n{}", i + 1, page.trim_end()))
            .collect::<Vec<_>>()
            .join("\n");
        references.push((display_name(path), text));
    }
    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn target_width_follows_dpi_until_capped() {
        let options = RenderOptions {
            max_rendered_pixels: 2000,
            dpi: 150,
        };
        // US Letter, 612pt wide
        assert_eq!(target_width(612.0, options), 1275);
        assert_eq!(target_width(612.0, RenderOptions { dpi: 400, ..options }), 2000);
        assert_eq!(target_width(0.0, options), 1);
    }

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn display_name_uses_file_name() {
        assert_eq!(display_name(Path::new("/refs/rbi_master.pdf")), "rbi_master.pdf");
    }
}
