//! Reversible code masking.
//!
//! Formatting heuristics must never rewrite code. Before a prose processor
//! runs, fenced code blocks and inline code spans are replaced by opaque
//! placeholder tokens; after the processor finishes, the tokens are swapped
//! back for the original snippets. Masking then unmasking unchanged text is
//! an exact round trip, byte for byte.
//!
//! Fenced blocks are found with a line scanner (open fence of three or more
//! backticks or tildes, closed by a run of the same character at least as
//! long, or by end of input). Inline spans are found by parsing the
//! fence-masked text with pulldown-cmark and taking the byte ranges of its
//! `Code` events, so unbalanced backticks never produce a span.

use std::ops::Range;
use std::sync::LazyLock;

use pulldown_cmark::{Event, Parser};
use regex::Regex;

/// Placeholder prefix for masked fenced blocks.
pub const FENCE_TOKEN_PREFIX: &str = "__DOCMEND_FENCE_";
/// Placeholder prefix for masked inline code spans.
pub const INLINE_TOKEN_PREFIX: &str = "__DOCMEND_CODE_";

/// Matches any mask placeholder token.
pub static MASK_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__DOCMEND_(?:FENCE|CODE)_\d+__").unwrap());

/// What a single mask token stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    Fenced,
    Inline,
}

/// One placeholder substitution made by [`mask`].
#[derive(Debug, Clone)]
pub struct Mask {
    pub token: String,
    pub original: String,
    pub kind: MaskKind,
}

/// Text with its code regions replaced by tokens, plus the substitutions
/// needed to restore it.
#[derive(Debug, Clone)]
pub struct MaskedText {
    pub text: String,
    pub masks: Vec<Mask>,
}

impl MaskedText {
    pub fn has_masks(&self) -> bool {
        !self.masks.is_empty()
    }

    /// Restore the original code regions in `self.text`.
    pub fn restore(&self) -> String {
        unmask(&self.text, &self.masks)
    }
}

/// Replace fenced blocks, then inline code spans, with placeholder tokens.
///
/// Tokens are numbered sequentially per call, skipping any number whose
/// token already occurs in the input as literal text, so `unmask`'s
/// one-for-one replacement can never hit a lookalike first. Text without any
/// code comes back unchanged with an empty mask list.
pub fn mask(text: &str) -> MaskedText {
    let mut masks = Vec::new();

    // Fenced blocks first so the inline parse below never looks inside them.
    let fence_ranges = fenced_block_ranges(text);
    let mut fenced = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut fence_no = 0;
    for range in &fence_ranges {
        fenced.push_str(&text[cursor..range.start]);
        let token = fresh_token(text, FENCE_TOKEN_PREFIX, &mut fence_no);
        fenced.push_str(&token);
        masks.push(Mask {
            token,
            original: text[range.clone()].to_string(),
            kind: MaskKind::Fenced,
        });
        cursor = range.end;
    }
    fenced.push_str(&text[cursor..]);

    // Inline spans on the fence-masked text. Offsets from the parser refer to
    // `fenced`, so replacements are applied back to front while tokens keep
    // document order.
    let span_ranges = inline_code_ranges(&fenced);
    let mut inline_no = 0;
    let mut inline_masks: Vec<(Range<usize>, Mask)> = span_ranges
        .into_iter()
        .map(|range| {
            let token = fresh_token(&fenced, INLINE_TOKEN_PREFIX, &mut inline_no);
            let mask = Mask {
                token,
                original: fenced[range.clone()].to_string(),
                kind: MaskKind::Inline,
            };
            (range, mask)
        })
        .collect();

    let mut masked = fenced;
    for (range, mask) in inline_masks.iter().rev() {
        masked.replace_range(range.clone(), &mask.token);
    }
    masks.extend(inline_masks.drain(..).map(|(_, mask)| mask));

    MaskedText { text: masked, masks }
}

/// Swap placeholder tokens back for their original snippets.
///
/// Masks are undone in reverse creation order, so an inline span whose
/// original text contains a fence token is restored before that fence token
/// is itself expanded. A token a processor removed entirely is skipped.
pub fn unmask(text: &str, masks: &[Mask]) -> String {
    let mut restored = text.to_string();
    for mask in masks.iter().rev() {
        restored = restored.replacen(&mask.token, &mask.original, 1);
    }
    restored
}

/// Whether `text` contains any mask placeholder token.
pub fn contains_mask_token(text: &str) -> bool {
    MASK_TOKEN_RE.is_match(text)
}

/// Next numbered token over `prefix` that does not occur in `text`, bumping
/// `next` past every candidate tried.
fn fresh_token(text: &str, prefix: &str, next: &mut usize) -> String {
    loop {
        let token = format!("{prefix}{next}__");
        *next += 1;
        if !text.contains(&token) {
            return token;
        }
    }
}

/// Byte ranges of fenced code blocks, each spanning from the start of the
/// opening fence line through the end of the closing fence line. A block left
/// unterminated extends to the end of the input.
pub fn fenced_block_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    let mut open: Option<(usize, char, usize)> = None; // (start offset, fence char, run length)

    for line in text.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        let content = content.strip_suffix('\r').unwrap_or(content);
        match open {
            None => {
                if let Some((ch, run)) = fence_open(content) {
                    open = Some((offset, ch, run));
                }
            }
            Some((start, ch, run)) => {
                if fence_close(content, ch, run) {
                    let end = offset + line.trim_end_matches(['\n', '\r']).len();
                    ranges.push(start..end);
                    open = None;
                }
            }
        }
        offset += line.len();
    }

    if let Some((start, _, _)) = open {
        ranges.push(start..text.len());
    }
    ranges
}

/// Parse a fence opener: up to three spaces of indent, then a run of three or
/// more backticks or tildes. A backtick fence may not carry backticks in its
/// info string.
fn fence_open(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let run = trimmed.chars().take_while(|&c| c == ch).count();
    if run < 3 {
        return None;
    }
    if ch == '`' && trimmed[run..].contains('`') {
        return None;
    }
    Some((ch, run))
}

/// A closing fence uses the same character, at least as long a run, and
/// nothing but whitespace around it.
fn fence_close(line: &str, ch: char, open_run: usize) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    let run = trimmed.chars().take_while(|&c| c == ch).count();
    run >= open_run && run == trimmed.chars().count()
}

/// Byte ranges of inline code spans, backticks included, in document order.
fn inline_code_ranges(text: &str) -> Vec<Range<usize>> {
    Parser::new(text)
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Code(_) => Some(range),
            _ => None,
        })
        .collect()
}
