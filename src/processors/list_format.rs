//! List formatting repair.
//!
//! Splits numbered items and bullets that were emitted on one line. Every
//! split keys on a recognizable boundary token (a digit-period marker or a
//! bullet marker directly glued to prior content) so already well-formed
//! lists and ordinary emphasis are never re-split.
//!
//! Runs on masked text, which is also what makes the "bullet glued to an
//! inline-code span" case tractable: the span is a single opaque token by the
//! time this processor sees it.

use std::collections::VecDeque;
use std::sync::LazyLock;

use fancy_regex::Regex as FancyRegex;
use regex::Regex;

use crate::config::Config;
use crate::context::ProcessingContext;
use crate::mask::{mask, unmask};
use crate::processor::{ProcessOutcome, TextProcessor};
use crate::processors::LIST_FORMAT;

/// `N.` marker glued to a bare word or closing parenthesis.
static NUMBER_AFTER_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z\)])(\d{1,2}\.[ \t])").unwrap());

/// `N.` marker glued to a plain `Label:`. The letter before the colon keeps
/// times like `10:30` out.
static NUMBER_AFTER_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]:)(\d{1,2}\.[ \t])").unwrap());

/// `N.` marker glued to a closed emphasis run, colon inside or outside the
/// markers (`**Steps:**1.`, `**Steps**:1.`, `***Title:***1.`).
static NUMBER_AFTER_EMPHASIS_RE: LazyLock<FancyRegex> =
    LazyLock::new(|| FancyRegex::new(r"(\*{1,3})([^\s*][^*\n]*?)\1(:?)(\d{1,2}\.[ \t])").unwrap());

/// Bullet marker glued to the end of a mask token (an inline span or fence).
static BULLET_AFTER_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(__DOCMEND_(?:CODE|FENCE)_\d+__)([*-][ \t]\S)").unwrap());

/// Bullet marker glued to prior content. The capitalized-or-token follow
/// requirement is what protects emphasis closers (`*flag* here`) and
/// hyphenated typos (`well- known`).
static BULLET_GLUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z\)\.!?_])([*-][ \t](?:[A-Z]|__DOCMEND_))").unwrap());

/// Leading bullet marker of a list-item line.
static BULLET_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]{0,3}([*-])[ \t]").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct ListFormatProcessor;

impl ListFormatProcessor {
    pub fn new() -> Self {
        Self
    }

    fn split_numbered(&self, text: &str) -> String {
        let mut current = NUMBER_AFTER_WORD_RE.replace_all(text, "$1\n\n$2").into_owned();
        current = NUMBER_AFTER_LABEL_RE.replace_all(&current, "$1\n\n$2").into_owned();
        NUMBER_AFTER_EMPHASIS_RE
            .replace_all(&current, |caps: &fancy_regex::Captures| {
                format!("{}{}{}{}\n\n{}", &caps[1], &caps[2], &caps[1], &caps[3], &caps[4])
            })
            .into_owned()
    }

    /// Earliest glued-bullet boundary in `line`, as (split position, separator).
    fn bullet_candidate(&self, line: &str, line_marker: Option<char>) -> Option<(usize, &'static str)> {
        let mut best: Option<(usize, &'static str)> = None;

        if let Some(caps) = BULLET_AFTER_TOKEN_RE.captures(line) {
            let at = caps.get(2).unwrap().start();
            best = Some((at, "\n"));
        }

        if let Some(caps) = BULLET_GLUE_RE.captures(line) {
            let m = caps.get(2).unwrap();
            let candidate_marker = line[m.start()..].chars().next();
            let separator = match line_marker {
                // Inside an item line, only the line's own marker counts and
                // the pieces stay in one list.
                Some(marker) if candidate_marker == Some(marker) => Some("\n"),
                Some(_) => None,
                // In prose, only a sentence-terminal boundary starts a list.
                None => {
                    let before = &caps[1];
                    matches!(before, "." | "!" | "?" | ":").then_some("\n\n")
                }
            };
            if let Some(sep) = separator {
                if best.is_none_or(|(at, _)| m.start() < at) {
                    best = Some((m.start(), sep));
                }
            }
        }

        best
    }

    fn split_bullets(&self, text: &str) -> String {
        let mut out: Vec<String> = Vec::new();
        let mut queue: VecDeque<String> = text.lines().map(str::to_string).collect();

        while let Some(line) = queue.pop_front() {
            let line_marker = BULLET_LINE_RE
                .captures(&line)
                .map(|c| c[1].chars().next().unwrap_or('-'));
            match self.bullet_candidate(&line, line_marker) {
                Some((at, separator)) => {
                    out.push(line[..at].to_string());
                    if separator == "\n\n" {
                        out.push(String::new());
                    }
                    queue.push_front(line[at..].to_string());
                }
                None => out.push(line),
            }
        }

        let mut result = out.join("\n");
        if text.ends_with('\n') {
            result.push('\n');
        }
        result
    }
}

impl TextProcessor for ListFormatProcessor {
    fn name(&self) -> &'static str {
        LIST_FORMAT
    }

    fn description(&self) -> &'static str {
        "Split numbered items and bullets that were emitted on one line"
    }

    fn should_process(&self, ctx: &ProcessingContext) -> bool {
        ctx.is_markdown
    }

    fn process(&self, text: &str, _ctx: &ProcessingContext) -> ProcessOutcome {
        if text.is_empty() {
            return ProcessOutcome::unchanged(text);
        }
        let masked = mask(text);
        let mut current = self.split_numbered(&masked.text);
        current = self.split_bullets(&current);
        let restored = unmask(&current, &masked.masks);
        ProcessOutcome::from_rewrite(text, restored)
    }

    fn from_config(_config: &Config) -> Box<dyn TextProcessor> {
        Box::new(Self::new())
    }
}
