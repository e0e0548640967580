//! In-memory document backend.
//!
//! Pages are plain word lists laid out on a fixed grid (12 pt text, 6 pt per
//! character, 14 pt leading on a US-Letter page). Native search emulates
//! pdfium's literal matching over the page text joined with single spaces, so
//! artefacts such as soft hyphens defeat it exactly as they defeat pdfium.
//! [`AuditDocument::to_bytes`] produces a real PDF through lopdf, with every
//! highlight written as a `/Highlight` annotation, which makes the whole
//! highlight pipeline testable without a native library.

use crate::backend::{
    AnnotatablePage, AuditDocument, BackendError, PageTextModel, Rect, SearchCapabilities,
    SearchMode, SearchablePage, Word,
};
use crate::pipeline::annotate::{Annotation, HIGHLIGHT_RGB};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, StringFormat, Stream};
use std::cell::RefCell;

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const FONT_SIZE: f32 = 12.0;
const CHAR_WIDTH: f32 = 6.0;
const LEADING: f32 = 14.0;

/// One page of a [`MemoryDocument`].
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    words: Vec<Word>,
    annotations: Vec<Annotation>,
}

impl MemoryPage {
    /// Lay out `text` on the page grid. Lines split on `\n`, words on ASCII
    /// spaces only, so NBSP and soft hyphens stay inside their word.
    pub fn from_text(text: &str) -> Self {
        let mut words = Vec::new();
        for (line_no, line) in text.split('\n').enumerate() {
            let top = PAGE_HEIGHT - MARGIN - line_no as f32 * LEADING;
            let mut left = MARGIN;
            for word in line.split(' ').filter(|w| !w.is_empty()) {
                let width = word.chars().count() as f32 * CHAR_WIDTH;
                words.push(Word::new(word, Rect::new(left, top - FONT_SIZE, left + width, top)));
                left += width + CHAR_WIDTH;
            }
        }
        Self {
            words,
            annotations: Vec::new(),
        }
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

/// A document held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    pages: Vec<RefCell<MemoryPage>>,
    capabilities: SearchCapabilities,
}

impl MemoryDocument {
    /// One page per entry of `pages`.
    pub fn from_pages<S: AsRef<str>>(pages: &[S]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|text| RefCell::new(MemoryPage::from_text(text.as_ref())))
                .collect(),
            capabilities: SearchCapabilities {
                ignore_case: true,
                dehyphenate: false,
            },
        }
    }

    pub fn with_capabilities(mut self, capabilities: SearchCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Snapshot of the highlights added to page `index`.
    pub fn annotations(&self, index: usize) -> Vec<Annotation> {
        self.pages
            .get(index)
            .map(|p| p.borrow().annotations.clone())
            .unwrap_or_default()
    }

    /// Total highlights across all pages.
    pub fn annotation_count(&self) -> usize {
        self.pages.iter().map(|p| p.borrow().annotations.len()).sum()
    }
}

/// Borrowed view of one page, handed out by [`MemoryDocument::page`].
pub struct MemoryPageRef<'p> {
    page: &'p RefCell<MemoryPage>,
    capabilities: SearchCapabilities,
}

impl SearchablePage for MemoryPageRef<'_> {
    fn capabilities(&self) -> SearchCapabilities {
        self.capabilities
    }

    fn native_search(&self, phrase: &str, mode: SearchMode) -> Result<Vec<Rect>, BackendError> {
        let page = self.page.borrow();
        Ok(literal_search(&page.words, phrase, mode.ignore_case))
    }

    fn text_model(&self) -> Result<PageTextModel, BackendError> {
        Ok(PageTextModel::new(self.page.borrow().words.clone()))
    }
}

impl AnnotatablePage for MemoryPageRef<'_> {
    fn add_highlight(&mut self, annotation: &Annotation) -> Result<(), BackendError> {
        self.page.borrow_mut().annotations.push(annotation.clone());
        Ok(())
    }
}

impl AuditDocument for MemoryDocument {
    type Page<'p> = MemoryPageRef<'p>
    where
        Self: 'p;

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, index: usize) -> Result<Self::Page<'_>, BackendError> {
        let page = self
            .pages
            .get(index)
            .ok_or_else(|| BackendError(format!("no page at index {index}")))?;
        Ok(MemoryPageRef {
            page,
            capabilities: self.capabilities,
        })
    }

    fn to_bytes(&self) -> Result<Vec<u8>, BackendError> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let page = page.borrow();

            let content: Content<Vec<Operation>> = Content {
                operations: page.words.iter().flat_map(text_operations).collect(),
            };
            let encoded = content
                .encode()
                .map_err(|e| BackendError(format!("encode content: {e}")))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

            let annots: Vec<Object> = page
                .annotations
                .iter()
                .map(|a| doc.add_object(highlight_dictionary(a)).into())
                .collect();

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), Object::Real(PAGE_WIDTH), Object::Real(PAGE_HEIGHT)],
                "Resources" => resources_id,
                "Contents" => content_id,
                "Annots" => annots,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => kids.len() as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| BackendError(format!("save: {e}")))?;
        Ok(buffer)
    }
}

/// Case-(in)sensitive literal search over words joined by single spaces.
/// Like pdfium's text segments, each match yields one rectangle per line:
/// the union of the matched words on that line.
fn literal_search(words: &[Word], phrase: &str, ignore_case: bool) -> Vec<Rect> {
    let fold = |c: char| {
        if ignore_case {
            c.to_lowercase().next().unwrap_or(c)
        } else {
            c
        }
    };

    let needle: Vec<char> = phrase.trim().chars().map(fold).collect();
    if needle.is_empty() {
        return Vec::new();
    }

    // Flattened page text plus the owning word of every character.
    let mut haystack = Vec::new();
    let mut owner = Vec::new();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            haystack.push(' ');
            owner.push(None);
        }
        for c in word.text.chars() {
            haystack.push(fold(c));
            owner.push(Some(i));
        }
    }

    let mut rects = Vec::new();
    let mut start = 0;
    while start + needle.len() <= haystack.len() {
        if haystack[start..start + needle.len()] == needle[..] {
            let mut last = None;
            let mut segment: Option<Rect> = None;
            for &idx in owner[start..start + needle.len()].iter().flatten() {
                if last == Some(idx) {
                    continue;
                }
                last = Some(idx);
                let rect = words[idx].rect;
                segment = match segment {
                    Some(current) if current.top == rect.top && current.bottom == rect.bottom => {
                        Some(current.union(&rect))
                    }
                    Some(current) => {
                        rects.push(current);
                        Some(rect)
                    }
                    None => Some(rect),
                };
            }
            rects.extend(segment);
            start += needle.len();
        } else {
            start += 1;
        }
    }
    rects
}

fn text_operations(word: &Word) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), Object::Real(FONT_SIZE)]),
        Operation::new(
            "Td",
            vec![Object::Real(word.rect.left), Object::Real(word.rect.bottom)],
        ),
        Operation::new("Tj", vec![Object::string_literal(word.text.as_bytes().to_vec())]),
        Operation::new("ET", vec![]),
    ]
}

fn highlight_dictionary(annotation: &Annotation) -> lopdf::Dictionary {
    let r = annotation.rect;
    let [red, green, blue] = HIGHLIGHT_RGB.map(|c| Object::Real(c as f32 / 255.0));

    let mut dict = dictionary! {
        "Type" => "Annot",
        "Subtype" => "Highlight",
        "Rect" => vec![Object::Real(r.left), Object::Real(r.bottom), Object::Real(r.right), Object::Real(r.top)],
        "QuadPoints" => vec![
            Object::Real(r.left), Object::Real(r.top),
            Object::Real(r.right), Object::Real(r.top),
            Object::Real(r.left), Object::Real(r.bottom),
            Object::Real(r.right), Object::Real(r.bottom),
        ],
        "C" => vec![red, green, blue],
        "CA" => Object::Real(annotation.opacity),
    };
    if let Some(note) = &annotation.note {
        dict.set("T", text_string(&note.title));
        dict.set("Contents", text_string(&note.content));
    }
    dict
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::string_literal(s);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::annotate::ANNOTATION_TITLE;

    #[test]
    fn layout_keeps_nbsp_and_soft_hyphen_inside_words() {
        let page = MemoryPage::from_text("LTV\u{00A0}Ratio Ra\u{00AD}tio");
        let texts: Vec<&str> = page.words().iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["LTV\u{00A0}Ratio", "Ra\u{00AD}tio"]);
    }

    #[test]
    fn literal_search_merges_words_on_a_line() {
        let page = MemoryPage::from_text("Gold Loan LTV Ratio");
        let rects = literal_search(page.words(), "ltv ratio", true);
        assert_eq!(rects, vec![page.words()[2].rect.union(&page.words()[3].rect)]);
    }

    #[test]
    fn literal_search_splits_across_lines() {
        let page = MemoryPage::from_text("Gold Loan LTV\nRatio applies");
        let rects = literal_search(page.words(), "LTV Ratio", true);
        assert_eq!(rects, vec![page.words()[2].rect, page.words()[3].rect]);
    }

    #[test]
    fn literal_search_respects_case_flag() {
        let page = MemoryPage::from_text("Gold Loan");
        assert!(literal_search(page.words(), "gold", false).is_empty());
        assert_eq!(literal_search(page.words(), "Gold", false).len(), 1);
    }

    #[test]
    fn soft_hyphen_defeats_literal_search() {
        let page = MemoryPage::from_text("LTV Ra\u{00AD}tio");
        assert!(literal_search(page.words(), "LTV Ratio", true).is_empty());
    }

    #[test]
    fn to_bytes_writes_highlight_annotations() {
        let doc = MemoryDocument::from_pages(&["Gold Loan"]);
        {
            let mut page = doc.page(0).unwrap();
            let rect = page.text_model().unwrap().words[0].rect;
            page.add_highlight(&Annotation::highlight(rect, "exceeds cap"))
                .unwrap();
        }

        let bytes = doc.to_bytes().unwrap();
        let parsed = Document::load_mem(&bytes).unwrap();
        let page_id = *parsed.get_pages().get(&1).unwrap();
        let page = parsed.get_dictionary(page_id).unwrap();
        let annots = page.get(b"Annots").unwrap().as_array().unwrap();
        assert_eq!(annots.len(), 1);

        let annot = parsed
            .get_dictionary(annots[0].as_reference().unwrap())
            .unwrap();
        assert_eq!(annot.get(b"Subtype").unwrap().as_name().unwrap(), b"Highlight");
        assert_eq!(
            annot.get(b"Contents").unwrap().as_str().unwrap(),
            b"exceeds cap"
        );
        let ca = annot.get(b"CA").unwrap().as_float().unwrap();
        assert!((ca - 0.4).abs() < 1e-6);
    }

    #[test]
    fn non_ascii_title_is_utf16() {
        match text_string(ANNOTATION_TITLE) {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
            }
            other => panic!("unexpected object {other:?}"),
        }
    }

    #[test]
    fn page_out_of_range_is_backend_error() {
        let doc = MemoryDocument::from_pages(&["only page"]);
        assert!(doc.page(1).is_err());
    }
}
