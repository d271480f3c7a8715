//! Text cleanup between extraction and chunking.
//!
//! PDF text layers and OCR output are laid out for the eye, not the ear:
//! lines break mid-sentence, words are hyphenated across lines, and
//! typesetting leaves ligatures and zero-width marks behind. A speech engine
//! reads all of that literally, so the text is flattened into plain
//! single-spaced prose first.
//!
//! ## Rule Order
//!
//! Line endings are normalised before de-hyphenation so the hyphen rule only
//! has to match `\n`; whitespace collapsing runs last because it erases the
//! line breaks the earlier rules key on.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to extracted text.
///
/// Rules (applied in order):
/// 1. Normalise line endings and form feeds to `\n`
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Expand typographic ligatures (`ﬁ` → `fi`)
/// 4. Re-join words hyphenated across a line break
/// 5. Collapse every whitespace run to a single space and trim
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_breaks(input);
    let s = remove_invisible_chars(&s);
    let s = expand_ligatures(&s);
    let s = join_hyphenated_words(&s);
    collapse_whitespace(&s)
}

// ── Rule 1: Normalise line breaks ────────────────────────────────────────────

fn normalise_line_breaks(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace(['\r', '\u{000C}', '\u{2028}', '\u{2029}'], "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{0000}',
        ],
        "",
    )
}

// ── Rule 3: Expand ligatures ─────────────────────────────────────────────────

fn expand_ligatures(input: &str) -> String {
    input
        .replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
}

// ── Rule 4: Re-join hyphenated words ─────────────────────────────────────────
//
// Only a lowercase continuation is joined: "inter-\nnational" becomes
// "international", while "Anglo-\nSaxon" keeps its hyphen.

static RE_HYPHEN_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{L})-[ \t]*\n[ \t]*(\p{Ll})").unwrap());

fn join_hyphenated_words(input: &str) -> String {
    RE_HYPHEN_BREAK.replace_all(input, "$1$2").into_owned()
}

// ── Rule 5: Collapse whitespace ──────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_breaks_become_spaces() {
        assert_eq!(
            clean_text("The quick brown\r\nfox jumps\nover the\x0Clazy dog."),
            "The quick brown fox jumps over the lazy dog."
        );
    }

    #[test]
    fn test_hyphenated_words_rejoined() {
        assert_eq!(clean_text("inter-\nnational law"), "international law");
        assert_eq!(clean_text("Anglo-\nSaxon"), "Anglo- Saxon");
        assert_eq!(clean_text("well-known fact"), "well-known fact");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(clean_text(input), "helloworldfoobar");
    }

    #[test]
    fn test_ligatures() {
        assert_eq!(clean_text("\u{FB01}nal \u{FB02}ow"), "final flow");
    }

    #[test]
    fn test_whitespace_only_becomes_empty() {
        assert_eq!(clean_text(" \n\t \r\n "), "");
    }

    #[test]
    fn test_idempotent() {
        let once = clean_text("A  sen-\ntence.\n\nAnother   one! ");
        assert_eq!(clean_text(&once), once);
        assert_eq!(once, "A sentence. Another one!");
    }
}
