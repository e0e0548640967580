//! Token normalisation: the single definition of "same text" used by the
//! phrase locator.
//!
//! Model output and pdfium's extracted text disagree in small, predictable
//! ways: soft hyphens left over from line wrapping, non-breaking spaces,
//! bold markers (`**`), table pipes, and trailing punctuation. Normalising both
//! sides through one function makes those differences disappear before any
//! comparison happens.

/// Characters removed outright before comparison.
const STRIPPED_PUNCTUATION: [char; 7] = ['*', ':', '|', '(', ')', '%', ','];

/// Canonicalise a raw token for comparison.
///
/// Rules, in order:
/// 1. `\n` and `\r` become a space
/// 2. soft hyphen (U+00AD) is removed
/// 3. non-breaking space (U+00A0) becomes a space
/// 4. `* : | ( ) % ,` are removed
/// 5. lower-case, then trim
///
/// Total and idempotent: `normalize_token(&normalize_token(x)) == normalize_token(x)`.
pub fn normalize_token(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(token.len());
    for ch in token.chars() {
        match ch {
            '\n' | '\r' | '\u{00A0}' => out.push(' '),
            '\u{00AD}' => {}
            c if STRIPPED_PUNCTUATION.contains(&c) => {}
            c => out.push(c),
        }
    }

    out.to_lowercase().trim().to_string()
}

/// Normalise an optional token; `None` behaves like the empty string.
pub fn normalize_optional(token: Option<&str>) -> String {
    token.map(normalize_token).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_punctuation_and_case() {
        assert_eq!(normalize_token("(LTV):"), "ltv");
        assert_eq!(normalize_token("**Ratio**,"), "ratio");
        assert_eq!(normalize_token("75%"), "75");
        assert_eq!(normalize_token("a|b"), "ab");
    }

    #[test]
    fn removes_soft_hyphen_without_space() {
        assert_eq!(normalize_token("regu\u{00AD}lation"), "regulation");
    }

    #[test]
    fn whitespace_variants_become_spaces() {
        assert_eq!(normalize_token("Gold\u{00A0}Loan"), "gold loan");
        assert_eq!(normalize_token("\r\nGold\nLoan\n"), "gold loan");
    }

    #[test]
    fn empty_and_none_are_empty() {
        assert_eq!(normalize_token(""), "");
        assert_eq!(normalize_optional(None), "");
        assert_eq!(normalize_token("  *:|  "), "");
    }

    #[test]
    fn hyphen_minus_is_kept() {
        assert_eq!(normalize_token("loan-to-value"), "loan-to-value");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in any::<String>()) {
            let once = normalize_token(&s);
            prop_assert_eq!(normalize_token(&once), once);
        }

        #[test]
        fn normalize_output_has_no_stripped_chars(s in "[A-Za-z0-9 *:|()%,\u{00AD}\u{00A0}\n\r]{0,40}") {
            let out = normalize_token(&s);
            prop_assert!(!out.contains(|c: char| STRIPPED_PUNCTUATION.contains(&c)));
            prop_assert!(!out.contains('\u{00AD}'), "output contains U+00AD: {:?}", out);
            prop_assert!(!out.contains('\u{00A0}'), "output contains U+00A0: {:?}", out);
            prop_assert_eq!(out.trim(), out.as_str());
        }
    }
}
