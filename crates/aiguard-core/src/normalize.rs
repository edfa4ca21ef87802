//! Text canonicalization applied before any rule matching.
//!
//! Raw generator output (and the inbound prompt) is normalized so that
//! compatibility variants, casing tricks, and invisible characters cannot be
//! used to slip a forbidden pattern past the rule engine. Normalization is
//! total: any Unicode input produces output, there is no error path.

use unicode_normalization::UnicodeNormalization;

/// Canonicalize text for rule matching.
///
/// Steps, in order:
/// 1. Unicode NFKC normalization (collapses homoglyph/compatibility forms,
///    e.g. fullwidth `ＡＢＣ` to `ABC`).
/// 2. Lowercasing.
/// 3. Removal of invisible formatting characters (zero-width spaces and
///    joiners, word joiner, stray byte-order marks).
/// 4. Every whitespace run collapsed to a single ASCII space. Leading and
///    trailing runs are collapsed too, not trimmed.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.nfkc() {
        if is_invisible(ch) {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        for lower in ch.to_lowercase() {
            out.push(lower);
        }
    }
    if pending_space {
        out.push(' ');
    }

    out
}

/// Zero-width and formatting characters commonly used to evade matchers.
fn is_invisible(ch: char) -> bool {
    matches!(ch, '\u{200B}'..='\u{200F}' | '\u{2060}' | '\u{FEFF}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize("a  b\t\nc"), "a b c");
        assert_eq!(normalize("  lead and trail  "), " lead and trail ");
    }

    #[test]
    fn lowercases_and_folds_compatibility_forms() {
        assert_eq!(normalize("ＨＥＬＬＯ"), "hello");
        assert_eq!(normalize("SeCrEt"), "secret");
    }

    #[test]
    fn strips_invisible_characters() {
        assert_eq!(normalize("se\u{200B}cr\u{FEFF}et"), "secret");
        assert_eq!(normalize("wo\u{2060}rd"), "word");
        // A zero-width char inside a word must not become a space
        assert_eq!(normalize("a\u{200D}b"), "ab");
    }

    #[test]
    fn empty_input() {
        assert_eq!(normalize(""), "");
    }

    proptest! {
        #[test]
        fn idempotent(s in "[ \\t\\n\\r\u{200B}\u{FEFF}a-zA-Z0-9ａ-ｚＡ-Ｚàéîöÿα-ωΑ-Ω.,:;!-]{0,200}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn output_has_no_double_spaces(s in "[ \\t\\na-z0-9]{0,100}") {
            prop_assert!(!normalize(&s).contains("  "));
        }
    }
}
