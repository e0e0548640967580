//! Pipeline stages for a compliance audit.
//!
//! Each submodule implements one step, so each can be tested on its own and
//! swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ llm ──▶ merge ──▶ export
//! (validate) (text+png) (2 models) (dedup)  (csv)
//!                                   │
//!                                   ▼
//!                normalize ──▶ locate ──▶ annotate ──▶ compact
//!                            (2 tiers)   (highlight)  (lopdf)
//! ```
//!
//! 1. [`input`]: check every path is a readable PDF
//! 2. [`render`]: page text and page images; runs in `spawn_blocking`
//! 3. [`llm`]: audit request, retry/backoff, findings parsing
//! 4. [`merge`]: key-based dedup of the two models' findings
//! 5. [`export`]: findings spreadsheet
//! 6. [`normalize`] / [`locate`]: find a phrase's rectangles on a page
//! 7. [`annotate`] / [`compact`]: write highlights, save once, compact
//! 8. [`quiet`]: stderr guard held while pdfium runs

pub mod annotate;
pub mod compact;
pub mod export;
pub mod input;
pub mod llm;
pub mod locate;
pub mod merge;
pub mod normalize;
pub mod quiet;
pub mod render;
