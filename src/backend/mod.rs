//! Document backends: the seam between the audit engine and a PDF library.
//!
//! The locator and the highlight loop only ever talk to the three traits in
//! this module. [`pdfium`] implements them on top of `pdfium-render` for real
//! documents; [`memory`] implements them over plain word lists so the engine
//! can be exercised without a native library.
//!
//! ## Coordinate space
//!
//! Every [`Rect`] is in PDF user space: points, origin at the bottom-left
//! corner of the page, `top >= bottom`.

pub mod memory;
pub mod pdfium;

use crate::pipeline::annotate::Annotation;
use thiserror::Error;

/// A failure reported by a document backend.
///
/// Backends stringify their native error types here so the engine does not
/// depend on any one PDF library.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// Axis-aligned rectangle in page space.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Rect {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    /// Smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }

    fn vertical_centre(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }
}

/// One extracted word and the box that covers its glyphs.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub rect: Rect,
}

impl Word {
    pub fn new(text: impl Into<String>, rect: Rect) -> Self {
        Self {
            text: text.into(),
            rect,
        }
    }
}

/// A single glyph as reported by a backend: its character (if it maps to
/// Unicode) and its bounds (if the backend could compute them).
#[derive(Debug, Clone, Copy)]
pub struct Glyph {
    pub ch: Option<char>,
    pub rect: Option<Rect>,
}

/// A page's words in reading order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageTextModel {
    pub words: Vec<Word>,
}

impl PageTextModel {
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Group a glyph stream into words.
    ///
    /// A word ends at whitespace, at a glyph without bounds, or where the
    /// next glyph sits on a different line (its vertical centre is outside
    /// the current word's box). Control characters other than whitespace are
    /// dropped; pdfium emits them for generated line-break markers.
    pub fn from_glyphs(glyphs: impl IntoIterator<Item = Glyph>) -> Self {
        let mut words = Vec::new();
        let mut text = String::new();
        let mut bounds: Option<Rect> = None;

        let mut flush = |text: &mut String, bounds: &mut Option<Rect>| {
            if let Some(rect) = bounds.take() {
                if !text.is_empty() {
                    words.push(Word::new(std::mem::take(text), rect));
                }
            }
            text.clear();
        };

        for glyph in glyphs {
            let (ch, rect) = match (glyph.ch, glyph.rect) {
                (Some(ch), Some(rect)) if !ch.is_whitespace() => (ch, rect),
                (Some(ch), _) if ch.is_control() && !ch.is_whitespace() => continue,
                _ => {
                    flush(&mut text, &mut bounds);
                    continue;
                }
            };

            if ch.is_control() {
                continue;
            }

            if let Some(current) = bounds {
                let centre = rect.vertical_centre();
                if centre > current.top || centre < current.bottom {
                    flush(&mut text, &mut bounds);
                }
            }

            text.push(ch);
            bounds = Some(match bounds {
                Some(current) => current.union(&rect),
                None => rect,
            });
        }
        flush(&mut text, &mut bounds);

        Self { words }
    }
}

/// Matching modes requested from a backend's native search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMode {
    pub ignore_case: bool,
    pub dehyphenate: bool,
}

impl Default for SearchMode {
    fn default() -> Self {
        Self {
            ignore_case: true,
            dehyphenate: true,
        }
    }
}

/// Which [`SearchMode`] flags a backend actually honours.
///
/// Flags a backend lacks are dropped before the search runs; asking for an
/// unsupported mode is never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchCapabilities {
    pub ignore_case: bool,
    pub dehyphenate: bool,
}

impl SearchCapabilities {
    /// Restrict `requested` to the modes this backend supports.
    pub fn restrict(&self, requested: SearchMode) -> SearchMode {
        SearchMode {
            ignore_case: requested.ignore_case && self.ignore_case,
            dehyphenate: requested.dehyphenate && self.dehyphenate,
        }
    }
}

/// Read access to one page's text.
pub trait SearchablePage {
    /// Search modes this backend can honour.
    fn capabilities(&self) -> SearchCapabilities;

    /// The backend's own text search for the literal `phrase`.
    fn native_search(&self, phrase: &str, mode: SearchMode) -> Result<Vec<Rect>, BackendError>;

    /// The page's words with their boxes, in reading order.
    fn text_model(&self) -> Result<PageTextModel, BackendError>;
}

/// Write access for highlight annotations.
pub trait AnnotatablePage {
    /// Add `annotation` to the page and commit its appearance immediately.
    fn add_highlight(&mut self, annotation: &Annotation) -> Result<(), BackendError>;
}

/// An open document the highlight loop can walk and serialise.
pub trait AuditDocument {
    type Page<'p>: SearchablePage + AnnotatablePage
    where
        Self: 'p;

    fn page_count(&self) -> usize;

    /// Open the page at 0-based `index`. Callers check bounds first.
    fn page(&self, index: usize) -> Result<Self::Page<'_>, BackendError>;

    /// Serialise the document, annotations included.
    fn to_bytes(&self) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(ch: char, left: f32, bottom: f32) -> Glyph {
        Glyph {
            ch: Some(ch),
            rect: Some(Rect::new(left, bottom, left + 5.0, bottom + 10.0)),
        }
    }

    fn glyphs_for(text: &str, bottom: f32) -> Vec<Glyph> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| glyph(ch, i as f32 * 5.0, bottom))
            .collect()
    }

    #[test]
    fn groups_glyphs_on_whitespace() {
        let model = PageTextModel::from_glyphs(glyphs_for("Gold Loan", 700.0));
        let texts: Vec<&str> = model.words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["Gold", "Loan"]);
        assert_eq!(model.words[0].rect, Rect::new(0.0, 700.0, 20.0, 710.0));
        assert_eq!(model.words[1].rect.left, 25.0);
    }

    #[test]
    fn line_change_splits_word() {
        let mut glyphs = glyphs_for("LTV", 700.0);
        glyphs.extend(glyphs_for("Ratio", 680.0));
        let model = PageTextModel::from_glyphs(glyphs);
        assert_eq!(model.len(), 2);
        assert_eq!(model.words[1].text, "Ratio");
    }

    #[test]
    fn glyph_without_bounds_ends_word() {
        let mut glyphs = glyphs_for("ab", 0.0);
        glyphs.push(Glyph {
            ch: Some('x'),
            rect: None,
        });
        glyphs.extend(glyphs_for("cd", 0.0));
        let model = PageTextModel::from_glyphs(glyphs);
        let texts: Vec<&str> = model.words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "cd"]);
    }

    #[test]
    fn control_characters_are_dropped() {
        let mut glyphs = glyphs_for("ab", 0.0);
        glyphs.push(Glyph {
            ch: Some('\u{2}'),
            rect: Some(Rect::new(10.0, 0.0, 12.0, 10.0)),
        });
        let model = PageTextModel::from_glyphs(glyphs);
        assert_eq!(model.words, vec![Word::new("ab", Rect::new(0.0, 0.0, 10.0, 10.0))]);
    }

    #[test]
    fn capabilities_restrict_requested_modes() {
        let caps = SearchCapabilities {
            ignore_case: true,
            dehyphenate: false,
        };
        let mode = caps.restrict(SearchMode::default());
        assert!(mode.ignore_case);
        assert!(!mode.dehyphenate);
    }
}
