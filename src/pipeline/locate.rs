//! Phrase locator: find where a model-quoted phrase sits on a page.
//!
//! ## Two tiers
//!
//! 1. **Native search.** The backend's own text search for the literal
//!    phrase, case-insensitive (and dehyphenating where supported). Fast and
//!    precise; succeeds whenever the phrase survived extraction verbatim.
//! 2. **Word-window fallback.** When the literal phrase is broken by
//!    extraction artefacts (soft hyphens, bold markers, table pipes, odd
//!    spacing), compare normalised tokens instead: slide a window a little
//!    wider than the phrase over the page's words and accept any window that
//!    contains every phrase token.
//!
//! Tier 2 only checks that each token occurs somewhere in the window, as a
//! substring. Order and multiplicity are not enforced, so "rate rate" matches
//! a window containing a single "rate". Overlapping matches are not merged,
//! so one word's rectangle can be returned several times.

use crate::backend::{PageTextModel, Rect, SearchMode, SearchablePage};
use crate::pipeline::normalize::normalize_token;
use tracing::{debug, warn};

/// Extra words each fallback window covers beyond the phrase length.
pub const WINDOW_SLACK: usize = 2;

/// Which tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LocateTier {
    Native,
    WordWindow,
}

/// Rectangles covering a phrase, and the tier that found them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Located {
    pub rects: Vec<Rect>,
    pub tier: Option<LocateTier>,
}

impl Located {
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}

/// Locate `phrase` on `page`, trying native search before the fallback.
pub fn locate<P: SearchablePage + ?Sized>(page: &P, phrase: &str) -> Located {
    let mode = page.capabilities().restrict(SearchMode::default());

    match page.native_search(phrase, mode) {
        Ok(rects) if !rects.is_empty() => {
            debug!("Native search matched {:?} ({} rects)", phrase, rects.len());
            return Located {
                rects,
                tier: Some(LocateTier::Native),
            };
        }
        Ok(_) => {}
        Err(e) => warn!("Native search failed for {:?}: {}", phrase, e),
    }

    let model = match page.text_model() {
        Ok(model) => model,
        Err(e) => {
            warn!("Word extraction failed: {}", e);
            return Located::default();
        }
    };

    let rects = word_window_rects(&model, phrase);
    if rects.is_empty() {
        debug!("Phrase {:?} not found by either tier", phrase);
        return Located::default();
    }

    debug!("Word-window fallback matched {:?} ({} rects)", phrase, rects.len());
    Located {
        rects,
        tier: Some(LocateTier::WordWindow),
    }
}

/// Tier 2: match normalised phrase tokens against sliding word windows.
///
/// For every start index `i`, the tokens `i .. i + n + 2` (clipped to the
/// page) are joined with spaces; if every phrase token is a substring of the
/// joined text, the rectangles of those same words are appended.
pub fn word_window_rects(model: &PageTextModel, phrase: &str) -> Vec<Rect> {
    if model.is_empty() {
        return Vec::new();
    }

    let phrase_tokens: Vec<String> = phrase
        .split_whitespace()
        .map(normalize_token)
        .filter(|t| !t.is_empty())
        .collect();
    if phrase_tokens.is_empty() {
        return Vec::new();
    }

    let page_tokens: Vec<String> = model.words.iter().map(|w| normalize_token(&w.text)).collect();
    let span = phrase_tokens.len() + WINDOW_SLACK;

    let mut rects = Vec::new();
    for start in 0..page_tokens.len() {
        let end = (start + span).min(page_tokens.len());
        let joined = page_tokens[start..end].join(" ");

        if phrase_tokens.iter().all(|t| joined.contains(t.as_str())) {
            rects.extend(model.words[start..end].iter().map(|w| w.rect));
        }
    }

    rects
}
