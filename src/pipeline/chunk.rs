//! Chunker: split long text into pieces a speech backend accepts.
//!
//! ## Strategy
//!
//! 1. Cut the text into sentences. A sentence ends at `.`, `!` or `?`
//!    (plus any run of further terminators and closing quotes/brackets)
//!    when the next character is whitespace or the end of the text.
//! 2. Pack sentences greedily: a chunk grows until the next sentence would
//!    push it past the budget.
//! 3. A sentence that alone exceeds the budget starts a fresh chunk and is
//!    packed word by word; a word that alone exceeds the budget is cut at
//!    character boundaries.
//!
//! Every chunk is an exact slice of the input, so nothing is rewritten,
//! reordered or lost: only the whitespace between two chunks disappears.
//! Lengths are counted in `char`s, which is what remote backends bill.
//!
//! Abbreviations ("e.g. this") and initials end a sentence like any other
//! period followed by a space. That only moves a chunk boundary, never the
//! text itself.

use crate::error::Pdf2AudioError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One ordered piece of text sent to the backend in a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// 0-based position in the job's chunk sequence.
    pub index: usize,
    pub text: String,
}

impl TextChunk {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// The chunk budget kept under a backend's hard limit: 14/15 of it, so a
/// 3000-character cap yields 2800.
pub fn safety_budget(hard_limit: usize) -> usize {
    (hard_limit * 14 / 15).max(1)
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Whitespace-only input yields no chunks; input that already fits yields
/// exactly one chunk equal to `text`.
pub fn split(text: &str, max_chars: usize) -> Result<Vec<TextChunk>, Pdf2AudioError> {
    if max_chars == 0 {
        return Err(Pdf2AudioError::Chunking(
            "max_chunk_chars must be at least 1".into(),
        ));
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    if text.chars().count() <= max_chars {
        return Ok(vec![TextChunk {
            index: 0,
            text: text.to_string(),
        }]);
    }

    let mut packer = Packer::new(text, max_chars);
    for sentence in sentence_spans(text) {
        if char_len(&text[sentence.clone()]) <= max_chars {
            packer.push(sentence);
            continue;
        }
        packer.flush();
        for word in word_spans(text, sentence) {
            if char_len(&text[word.clone()]) <= max_chars {
                packer.push(word);
            } else {
                for piece in char_pieces(text, word, max_chars) {
                    packer.push(piece);
                }
            }
        }
    }

    Ok(packer
        .finish()
        .into_iter()
        .enumerate()
        .map(|(index, range)| TextChunk {
            index,
            text: text[range].to_string(),
        })
        .collect())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

// ── Greedy packing ───────────────────────────────────────────────────────────

/// Accumulates adjacent byte ranges of `text` into chunk ranges.
struct Packer<'a> {
    text: &'a str,
    max_chars: usize,
    done: Vec<Range<usize>>,
    /// Open chunk: byte range and its char count.
    open: Option<(Range<usize>, usize)>,
}

impl<'a> Packer<'a> {
    fn new(text: &'a str, max_chars: usize) -> Self {
        Self {
            text,
            max_chars,
            done: Vec::new(),
            open: None,
        }
    }

    /// Append `unit` (at most `max_chars` long) to the open chunk, or close
    /// it and open a new one if it would overflow.
    fn push(&mut self, unit: Range<usize>) {
        if let Some((ref mut range, ref mut chars)) = self.open {
            let extra = char_len(&self.text[range.end..unit.end]);
            if *chars + extra <= self.max_chars {
                range.end = unit.end;
                *chars += extra;
                return;
            }
        }
        self.flush();
        let chars = char_len(&self.text[unit.clone()]);
        self.open = Some((unit, chars));
    }

    fn flush(&mut self) {
        if let Some((range, _)) = self.open.take() {
            self.done.push(range);
        }
    }

    fn finish(mut self) -> Vec<Range<usize>> {
        self.flush();
        self.done
    }
}

// ── Boundaries ───────────────────────────────────────────────────────────────

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_closer(c: char) -> bool {
    matches!(
        c,
        '"' | '\'' | ')' | ']' | '}' | '\u{201D}' | '\u{2019}' | '\u{00BB}'
    )
}

/// Byte ranges of the sentences in `text`, without surrounding whitespace.
///
/// Every non-whitespace character of `text` falls in exactly one span.
pub fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if start.is_none() {
            if c.is_whitespace() {
                continue;
            }
            start = Some(i);
        }
        if !is_terminator(c) {
            continue;
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if is_terminator(next) || is_closer(next) {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let at_boundary = chars.peek().is_none_or(|&(_, next)| next.is_whitespace());
        if at_boundary {
            if let Some(s) = start.take() {
                spans.push(s..end);
            }
        }
    }

    if let Some(s) = start {
        spans.push(s..text.trim_end().len());
    }
    spans
}

/// Byte ranges of the whitespace-separated words inside `within`.
fn word_spans(text: &str, within: Range<usize>) -> Vec<Range<usize>> {
    let offset = within.start;
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text[within.clone()].char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(offset + s..offset + i);
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(offset + s..within.end);
    }
    spans
}

/// Cut `within` into consecutive pieces of at most `max_chars` characters.
fn char_pieces(text: &str, within: Range<usize>, max_chars: usize) -> Vec<Range<usize>> {
    let offset = within.start;
    let mut pieces = Vec::new();
    let mut piece_start = within.start;

    for (n, (i, _)) in text[within.clone()].char_indices().enumerate() {
        if n > 0 && n % max_chars == 0 {
            pieces.push(piece_start..offset + i);
            piece_start = offset + i;
        }
    }
    pieces.push(piece_start..within.end);
    pieces
}
