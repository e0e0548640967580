//! Prompts for the compliance audit model calls.
//!
//! Every prompt lives here so a wording change touches one file, and so
//! tests can assert on the output contract (the JSON keys the engine reads)
//! without calling a model.

use crate::finding::{NOTE_KEY, PAGE_NUMBER_KEY, PHRASE_KEY};

/// Base instructions sent with every audit request.
///
/// The field names must match [`crate::finding`]'s keys; a test below keeps
/// them in sync.
pub const BASE_AUDIT_PROMPT: &str = r#"You are a senior compliance auditor for a regulated lender. You are given one or more REFERENCE documents (regulations, master circulars, internal credit policy) followed by a TARGET document to audit.

Your task: find every statement in the TARGET that contradicts, exceeds, omits or misstates a requirement in the REFERENCE documents.

Rules:

1. Only report genuine compliance gaps. Do not report style, grammar or formatting issues.
2. For each gap, quote the offending words from the TARGET exactly as they appear on the page, keeping the original spelling, capitalisation and punctuation. Quote the shortest span that identifies the problem (typically 2 to 12 words). Never paraphrase the quote.
3. Page numbers are 1-indexed and refer to the TARGET document only.
4. Explain in one or two sentences what is wrong and cite the reference clause when you can.

Output format:

Return ONLY a JSON array, with no commentary before or after it. Each element is an object with exactly these keys:

- "page_number": integer, the TARGET page containing the quote
- "word/phrase_highlighted": string, the exact quote
- "whats_wrong": string, the explanation
- "regulation_reference": string, the reference document and clause, or "" if none applies

If the TARGET is fully compliant, return []."#;

/// Heading under which user instructions are appended.
pub const USER_INSTRUCTIONS_HEADING: &str = "### ADDITIONAL USER INSTRUCTIONS";

/// Append optional user instructions to [`BASE_AUDIT_PROMPT`].
///
/// Blank instructions leave the base prompt unchanged.
pub fn build_final_prompt(user_instructions: Option<&str>) -> String {
    match user_instructions.map(str::trim).filter(|s| !s.is_empty()) {
        Some(extra) => format!("{BASE_AUDIT_PROMPT}\n\n{USER_INSTRUCTIONS_HEADING}\n{extra}"),
        None => BASE_AUDIT_PROMPT.to_string(),
    }
}

/// Wrap one reference document's extracted text for the request.
pub fn reference_block(name: &str, text: &str) -> String {
    format!("=== REFERENCE DOCUMENT: {name} ===\n{text}\n=== END REFERENCE DOCUMENT: {name} ===")
}

/// Wrap the target's extracted text with explicit page markers so the model
/// can report 1-indexed page numbers.
pub fn target_block(name: &str, pages: &[String]) -> String {
    let mut out = format!("=== TARGET DOCUMENT: {name} ({} pages) ===\n", pages.len());
    for (i, text) in pages.iter().enumerate() {
        out.push_str(&format!("--- PAGE {} ---\n{}\n", i + 1, text.trim_end()));
    }
    out.push_str("=== END TARGET DOCUMENT ===");
    out
}

/// Caption accompanying the rendered target page images.
pub fn page_images_note(count: usize) -> String {
    format!(
        "The {count} attached images are the TARGET pages in order (image 1 is page 1). Use them to check tables and layout; quote text exactly as printed."
    )
}
