//! Markdown formatting repair.
//!
//! Fixes the structural damage LLM-generated Markdown commonly arrives with:
//! headings glued to the prose that should follow them, missing paragraph
//! breaks after bold pseudo-headers and admonition fences, run-on sentence
//! boundaries, links fused to the following word, literal `\n` escapes, and
//! stray whitespace. Every rewrite is narrow and guarded so legitimate prose,
//! identifiers like `DataSync.Replicate`, and version numbers are never
//! touched. All rules run on masked text; code is invisible to them.

use std::collections::HashSet;
use std::sync::LazyLock;

use fancy_regex::Regex as FancyRegex;
use regex::Regex;
use serde::Deserialize;

use crate::config::Config;
use crate::context::ProcessingContext;
use crate::mask::{mask, unmask};
use crate::processor::{ProcessOutcome, TextProcessor};
use crate::processors::MARKDOWN_FORMAT;
use crate::utils::patterns::LITERAL_NEWLINE_ESCAPE_RE;
use crate::utils::{collapse_excess_blank_lines, strip_trailing_spaces, trim_trailing_blank_lines};

/// Words that plausibly open a new sentence. Splits on an uppercase letter
/// happen only when the glued word is in this set, which is what keeps
/// `DataSync.Replicate` and `TestNet` intact.
const DEFAULT_SENTENCE_STARTERS: &[&str] = &[
    "A", "After", "All", "Also", "An", "Before", "Check", "Each", "Ensure", "Finally", "First",
    "Follow", "For", "However", "If", "In", "It", "Make", "Next", "Note", "Once", "Otherwise",
    "Please", "Refer", "Run", "See", "Second", "The", "Then", "These", "This", "Those", "To",
    "Use", "We", "When", "While", "You",
];

/// ATX heading whose text runs straight into a capitalized word followed by
/// more prose. The candidate word still has to pass the starter allowlist.
static HEADING_GLUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6}[ \t]+\S.*?[a-z0-9\)])([A-Z][A-Za-z']*)([ \t].+)$").unwrap());

/// Line-leading emphasis run (a pseudo-header like `**Title**` or
/// `***Title:***`), optionally followed by a colon, glued to capitalized
/// content. The backreference makes the closing run match the opening one.
static BOLD_HEADER_GLUE_RE: LazyLock<FancyRegex> =
    LazyLock::new(|| FancyRegex::new(r"(?m)^(\*{1,3})([^\s*][^*\n]*?)\1(:?)([A-Z].*)$").unwrap());

/// One-line admonition fence pair glued to following prose.
static ADMONITION_GLUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(:{3}.*?:{3})([A-Z].*)$").unwrap());

/// A known label word, optionally numbered, glued directly onto sentence-end
/// punctuation or a colon, e.g. `...fails.Cause: the daemon is down`.
static LABEL_GLUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([.!?:])((?:Cause|Details|Error|Example|Fix|Impact|Issue|Note|Prerequisites|Reason|Resolution|Result|Solution|Step|Steps|Symptom|Warning|Workaround)(?: \d{1,3})?:)(\s)",
    )
    .unwrap()
});

/// Sentence run-on: word character, period, then a capitalized word with no
/// separating space. Gated by the starter allowlist.
static RUNON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z0-9\)])\.([A-Z][a-z]+)([ \t,;:])").unwrap());

/// Inline or reference-style link fused to what follows it.
static LINK_GLUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\[[^\]\n]*\]\([^)\s]+\)|\[[^\]\n]+\]\[[^\]\n]*\])([A-Za-z0-9("'“])"#).unwrap()
});

/// Bold run opened directly after a lowercase-ending period.
static BOLD_AFTER_PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z])\.(\*{1,3}[A-Za-z])").unwrap());

/// A line consisting only of `=` characters.
static EQUALS_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[ \t]*=+[ \t]*$").unwrap());

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct MarkdownFormatSettings {
    /// Additional sentence-starter words merged into the built-in allowlist.
    pub extra_sentence_starters: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MarkdownFormatProcessor {
    starters: HashSet<String>,
}

impl Default for MarkdownFormatProcessor {
    fn default() -> Self {
        Self::with_settings(&MarkdownFormatSettings::default())
    }
}

impl MarkdownFormatProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &MarkdownFormatSettings) -> Self {
        let mut starters: HashSet<String> =
            DEFAULT_SENTENCE_STARTERS.iter().map(|s| s.to_string()).collect();
        starters.extend(settings.extra_sentence_starters.iter().cloned());
        Self { starters }
    }

    fn convert_literal_newlines(&self, text: &str) -> String {
        LITERAL_NEWLINE_ESCAPE_RE.replace_all(text, "\n").into_owned()
    }

    fn split_glued_headings(&self, text: &str) -> String {
        let mut out: Vec<String> = Vec::new();
        for line in text.lines() {
            match HEADING_GLUE_RE.captures(line) {
                Some(caps) if self.starters.contains(&caps[2]) => {
                    out.push(caps[1].to_string());
                    out.push(String::new());
                    out.push(format!("{}{}", &caps[2], &caps[3]));
                }
                _ => out.push(line.to_string()),
            }
        }
        let mut result = out.join("\n");
        if text.ends_with('\n') {
            result.push('\n');
        }
        result
    }

    fn split_glued_bold_headers(&self, text: &str) -> String {
        BOLD_HEADER_GLUE_RE
            .replace_all(text, |caps: &fancy_regex::Captures| {
                format!("{}{}{}{}\n\n{}", &caps[1], &caps[2], &caps[1], &caps[3], &caps[4])
            })
            .into_owned()
    }

    fn split_glued_admonitions(&self, text: &str) -> String {
        ADMONITION_GLUE_RE.replace_all(text, "$1\n\n$2").into_owned()
    }

    fn split_glued_labels(&self, text: &str) -> String {
        LABEL_GLUE_RE.replace_all(text, "$1\n\n$2$3").into_owned()
    }

    fn fix_sentence_runons(&self, text: &str) -> String {
        RUNON_RE
            .replace_all(text, |caps: &regex::Captures| {
                if self.starters.contains(&caps[2]) {
                    format!("{}. {}{}", &caps[1], &caps[2], &caps[3])
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    fn fix_glued_links(&self, text: &str) -> String {
        LINK_GLUE_RE.replace_all(text, "$1 $2").into_owned()
    }

    fn fix_bold_after_period(&self, text: &str) -> String {
        BOLD_AFTER_PERIOD_RE.replace_all(text, "$1. $2").into_owned()
    }

    /// Drop a lone run of `=` at the very end of the text unless it is a
    /// setext underline, i.e. a non-blank line sits directly above it.
    fn remove_trailing_equals(&self, text: &str) -> String {
        let lines: Vec<&str> = text.lines().collect();
        let Some(last_idx) = lines.iter().rposition(|l| !l.trim().is_empty()) else {
            return text.to_string();
        };
        if !EQUALS_RUN_RE.is_match(lines[last_idx]) {
            return text.to_string();
        }
        let is_setext = last_idx > 0 && !lines[last_idx - 1].trim().is_empty();
        if is_setext {
            return text.to_string();
        }
        // Blank lines that only led up to the removed run go with it.
        let mut kept: Vec<&str> = lines[..last_idx].to_vec();
        while kept.last().is_some_and(|l| l.trim().is_empty()) {
            kept.pop();
        }
        let mut result = kept.join("\n");
        if text.ends_with('\n') && !result.is_empty() {
            result.push('\n');
        }
        result
    }

    fn apply_rules(&self, text: &str) -> String {
        let mut current = self.convert_literal_newlines(text);
        current = self.split_glued_headings(&current);
        current = self.split_glued_bold_headers(&current);
        current = self.split_glued_admonitions(&current);
        current = self.split_glued_labels(&current);
        current = self.fix_sentence_runons(&current);
        current = self.fix_glued_links(&current);
        current = self.fix_bold_after_period(&current);
        current = self.remove_trailing_equals(&current);
        current = strip_trailing_spaces(&current);
        current = collapse_excess_blank_lines(&current);
        trim_trailing_blank_lines(&current)
    }
}

impl TextProcessor for MarkdownFormatProcessor {
    fn name(&self) -> &'static str {
        MARKDOWN_FORMAT
    }

    fn description(&self) -> &'static str {
        "Repair sentence, heading, and whitespace damage in Markdown prose"
    }

    fn should_process(&self, ctx: &ProcessingContext) -> bool {
        ctx.is_markdown
    }

    fn process(&self, text: &str, _ctx: &ProcessingContext) -> ProcessOutcome {
        if text.is_empty() {
            return ProcessOutcome::unchanged(text);
        }
        let masked = mask(text);
        let repaired = self.apply_rules(&masked.text);
        let restored = unmask(&repaired, &masked.masks);
        ProcessOutcome::from_rewrite(text, restored)
    }

    fn from_config(config: &Config) -> Box<dyn TextProcessor> {
        let settings: MarkdownFormatSettings = config.processor_settings(MARKDOWN_FORMAT);
        Box::new(Self::with_settings(&settings))
    }
}
