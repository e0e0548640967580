//! Findings: untrusted model records and their validated form.
//!
//! Models return loosely-typed JSON. A [`RawFinding`] keeps every field the
//! model produced (the spreadsheet shows them all) and exposes defensive
//! accessors for the three fields the engine actually uses. Conversion to a
//! [`Finding`] is the only validation boundary; it never fails fatally, it
//! yields a [`SkipReason`] instead.

use crate::error::{AuditError, SkipReason};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Key holding the 1-indexed page number.
pub const PAGE_NUMBER_KEY: &str = "page_number";
/// Key holding the phrase to highlight.
pub const PHRASE_KEY: &str = "word/phrase_highlighted";
/// Key holding the explanation shown in the annotation.
pub const NOTE_KEY: &str = "whats_wrong";
/// Column carrying the provenance tag in exported findings.
pub const SOURCE_KEY: &str = "from_model";

/// One finding exactly as a model produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawFinding(pub Map<String, Value>);

impl RawFinding {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn page_number(&self) -> Option<&Value> {
        self.0.get(PAGE_NUMBER_KEY)
    }

    pub fn phrase(&self) -> Option<&str> {
        self.0.get(PHRASE_KEY).and_then(Value::as_str)
    }

    pub fn note(&self) -> Option<&str> {
        self.0.get(NOTE_KEY).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for RawFinding {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A validated finding, ready for the locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// 0-indexed page.
    pub page_index: usize,
    /// Trimmed, non-empty.
    pub phrase: String,
    /// Possibly empty.
    pub note: String,
    pub source_tag: String,
}

impl Finding {
    /// 1-indexed page number, as the model reported it.
    pub fn page_number(&self) -> usize {
        self.page_index + 1
    }

    /// Validate `raw`. Checks run in a fixed order: page number, phrase,
    /// then note.
    pub fn from_raw(raw: &RawFinding, source_tag: &str) -> Result<Self, SkipReason> {
        let page_number = coerce_page_number(raw.page_number())?;

        let phrase = match raw.0.get(PHRASE_KEY) {
            Some(Value::String(s)) => s.trim(),
            _ => return Err(SkipReason::MissingPhrase),
        };
        if phrase.is_empty() {
            return Err(SkipReason::EmptyPhrase);
        }

        let note = match raw.0.get(NOTE_KEY) {
            None | Some(Value::Null) => "",
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Err(SkipReason::InvalidNote),
        };

        Ok(Self {
            page_index: page_number - 1,
            phrase: phrase.to_string(),
            note: note.to_string(),
            source_tag: source_tag.to_string(),
        })
    }
}

/// Accept a JSON integer, an integral float, or a numeric string; anything
/// below 1 is rejected.
fn coerce_page_number(value: Option<&Value>) -> Result<usize, SkipReason> {
    let invalid = |raw: String| SkipReason::InvalidPageNumber { raw };

    let value = match value {
        None => return Err(invalid("missing".to_string())),
        Some(v) => v,
    };

    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    };

    match number {
        Some(n) if n >= 1 => usize::try_from(n).map_err(|_| invalid(value.to_string())),
        _ => Err(invalid(value.to_string())),
    }
}

/// A finding after the two-model merge, with its provenance.
///
/// Serialises flat: the raw fields plus a `from_model` column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedFinding {
    #[serde(flatten)]
    pub raw: RawFinding,
    #[serde(rename = "from_model", default)]
    pub source_tag: String,
}

impl MergedFinding {
    pub fn new(raw: RawFinding, source_tag: impl Into<String>) -> Self {
        Self {
            raw,
            source_tag: source_tag.into(),
        }
    }

    pub fn validate(&self) -> Result<Finding, SkipReason> {
        Finding::from_raw(&self.raw, &self.source_tag)
    }
}

/// Read findings previously written with `--save-findings`, or a bare model
/// output array (entries without `from_model` get an empty tag).
pub fn load_findings(path: &Path) -> Result<Vec<MergedFinding>, AuditError> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AuditError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => AuditError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => AuditError::Internal(format!("read {}: {e}", path.display())),
    })?;

    serde_json::from_str(&text).map_err(|e| {
        AuditError::InvalidConfig(format!(
            "findings file '{}' is not a JSON array of objects: {e}",
            path.display()
        ))
    })
}

/// Write findings as pretty JSON, readable by [`load_findings`].
pub fn save_findings(path: &Path, findings: &[MergedFinding]) -> Result<(), AuditError> {
    let json = serde_json::to_vec_pretty(findings)
        .map_err(|e| AuditError::Internal(format!("serialise findings: {e}")))?;
    crate::pipeline::annotate::write_atomic(path, &json)
}
