//! Shared compiled regexes. Kept in one place so processors and the patch
//! applier agree on what counts as a heading or an HTML tag.

use fancy_regex::Regex as FancyRegex;
use regex::Regex;
use std::sync::LazyLock;

/// ATX heading: 1-6 hashes, required space, text, optional closing hashes.
pub static ATX_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").unwrap());

/// Literal `\n` (and `\r\n`) escape sequences, not preceded by another
/// backslash so `\\n` in regex examples survives.
pub static LITERAL_NEWLINE_ESCAPE_RE: LazyLock<FancyRegex> =
    LazyLock::new(|| FancyRegex::new(r"(?<!\\)(?:\\r\\n|\\n)").unwrap());

/// Anything that looks like an HTML tag (open, close, or self-closing).
pub static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9]*(?:\s[^<>]*)?/?>").unwrap());
