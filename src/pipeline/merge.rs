//! Two-model merge: deduplicate findings by exact key, keep provenance.
//!
//! Key = `(page_number as written, lower(trim(phrase)), lower(trim(note)))`.
//! A key produced by both models becomes one record tagged `"first, second"`;
//! otherwise the record keeps the producing model's tag. Provenance follows
//! the pass, not the tag text: when both passes run the same model the
//! shared record reads `"m, m"`. The first
//! occurrence's fields win and insertion order is preserved. There is no
//! fuzzy reconciliation: two explanations differing by one word are two
//! findings.

use crate::finding::{MergedFinding, RawFinding};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// One model's output and the tag identifying it.
#[derive(Debug, Clone)]
pub struct ModelFindings {
    pub tag: String,
    pub findings: Vec<RawFinding>,
}

impl ModelFindings {
    pub fn new(tag: impl Into<String>, findings: Vec<RawFinding>) -> Self {
        Self {
            tag: tag.into(),
            findings,
        }
    }
}

type MergeKey = (String, String, String);

fn merge_key(raw: &RawFinding) -> MergeKey {
    let page = raw
        .page_number()
        .map(|v| v.to_string())
        .unwrap_or_default();
    let fold = |s: Option<&str>| s.unwrap_or_default().trim().to_lowercase();
    (page, fold(raw.phrase()), fold(raw.note()))
}

/// Merge two model outputs, first model's findings first.
pub fn merge_findings(first: ModelFindings, second: ModelFindings) -> Vec<MergedFinding> {
    let mut merged: Vec<MergedFinding> = Vec::new();
    // Position in `merged` and a bit per pass that produced the key.
    let mut index: HashMap<MergeKey, (usize, u8)> = HashMap::new();

    for (pass, source) in [first, second].into_iter().enumerate() {
        let bit = 1u8 << pass;
        for raw in source.findings {
            match index.entry(merge_key(&raw)) {
                Entry::Occupied(mut slot) => {
                    let (at, passes) = slot.get_mut();
                    if *passes & bit == 0 {
                        *passes |= bit;
                        let existing = &mut merged[*at];
                        existing.source_tag = format!("{}, {}", existing.source_tag, source.tag);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert((merged.len(), bit));
                    merged.push(MergedFinding::new(raw, source.tag.clone()));
                }
            }
        }
    }

    debug!("Merged findings: {} unique", merged.len());
    merged
}
