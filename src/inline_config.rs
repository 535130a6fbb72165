//! Inline directive comment handling
//!
//! Supports:
//! - `<!-- docmend-disable -->` - Disable all processors for this text
//! - `<!-- docmend-disable list-format markdown-format -->` - Disable specific processors
//!
//! Directives apply to the whole piece of text they appear in, so a reviewer
//! can pin down hand-tuned content that the heuristics would otherwise keep
//! reflowing. Directives inside fenced code blocks are ignored.

use crate::config::normalize_key;
use crate::mask::fenced_block_ranges;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static DISABLE_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*docmend-disable(?:\s+([^>]*?))?\s*-->").unwrap());

/// Processor disables collected from one piece of text.
#[derive(Debug, Clone, Default)]
pub struct InlineConfig {
    all_disabled: bool,
    disabled: HashSet<String>,
}

impl InlineConfig {
    /// Scan `content` for directive comments, skipping fenced code blocks.
    pub fn from_content(content: &str) -> Self {
        let mut config = InlineConfig::default();
        if !content.contains("<!--") {
            return config;
        }

        let code_blocks = fenced_block_ranges(content);
        let in_code_block = |pos: usize| code_blocks.iter().any(|r| r.contains(&pos));

        for m in DISABLE_COMMENT_RE.captures_iter(content) {
            let whole = m.get(0).unwrap();
            if in_code_block(whole.start()) {
                continue;
            }
            match m.get(1).map(|names| names.as_str().trim()) {
                None | Some("") => config.all_disabled = true,
                Some(names) => {
                    config
                        .disabled
                        .extend(names.split_whitespace().map(normalize_key));
                }
            }
        }
        config
    }

    /// Whether a bare `docmend-disable` turned everything off.
    pub fn all_disabled(&self) -> bool {
        self.all_disabled
    }

    /// Whether the named processor is disabled by a directive.
    pub fn is_disabled(&self, processor: &str) -> bool {
        self.all_disabled || self.disabled.contains(&normalize_key(processor))
    }

    pub fn is_empty(&self) -> bool {
        !self.all_disabled && self.disabled.is_empty()
    }
}
