//! HTML-to-Markdown conversion.
//!
//! Rewrites embedded HTML into Markdown for Markdown-family targets. The
//! rewrites are an ordered set of tag-level substitutions: `<pre>` blocks and
//! `<code>` spans first (their contents are stashed so later rules cannot
//! reach inside), then inline tags so that nested emphasis composes
//! (`<strong><em>x</em></strong>` becomes `***x***`), then block tags, then
//! wrapper removal. HTML entities are left exactly as written.
//!
//! A has-tags pre-check makes plain Markdown a pass-through, and because the
//! processor runs on masked text, tag-shaped content inside code spans and
//! fences neither converts nor triggers the check.
//!
//! Alongside conversion, a non-blocking complexity scan reports constructs
//! that cannot be converted mechanically: tables, inline style attributes,
//! `svg`, `script`, and form elements.

use std::sync::LazyLock;

use fancy_regex::Regex as FancyRegex;
use regex::Regex;

use crate::config::Config;
use crate::context::ProcessingContext;
use crate::mask::{mask, unmask};
use crate::processor::{ProcessOutcome, TextProcessor};
use crate::processors::HTML_TO_MARKDOWN;
use crate::utils::collapse_excess_blank_lines;
use crate::utils::patterns::HTML_TAG_RE;

/// Placeholder for a `<pre>` block or `<code>` span already converted, so
/// later rules cannot rewrite tag-shaped text inside it.
const PRE_STASH_PREFIX: &str = "__DOCMEND_HTMLPRE_";

static PRE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pre\b[^>]*>\s*<code\b([^>]*)>(.*?)</code\s*>\s*</pre\s*>").unwrap());
static PRE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<pre\b[^>]*>(.*?)</pre\s*>").unwrap());
static LANG_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"language-([A-Za-z0-9_+-]+)").unwrap());

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<code\b[^>]*>(.*?)</code\s*>").unwrap());
static STRONG_RE: LazyLock<FancyRegex> =
    LazyLock::new(|| FancyRegex::new(r"(?s)<(strong|b)\b[^>]*>(.*?)</\1\s*>").unwrap());
static EM_RE: LazyLock<FancyRegex> =
    LazyLock::new(|| FancyRegex::new(r"(?s)<(em|i)\b[^>]*>(.*?)</\1\s*>").unwrap());
static DEL_RE: LazyLock<FancyRegex> =
    LazyLock::new(|| FancyRegex::new(r"(?s)<(del|s|strike)\b[^>]*>(.*?)</\1\s*>").unwrap());

static A_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a\b[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a\s*>"#).unwrap()
});
static A_PLAIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<a\b[^>]*>(.*?)</a\s*>").unwrap());
static IMG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<img\b[^>]*/?>").unwrap());
static SRC_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static ALT_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"alt\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<br\s*/?\s*>").unwrap());

static P_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<p\b[^>]*>(.*?)</p\s*>").unwrap());
static LI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<li\b[^>]*>(.*?)</li\s*>").unwrap());
static LIST_WRAPPER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?(?:ul|ol)\b[^>]*>").unwrap());
static HEADING_RE: LazyLock<FancyRegex> =
    LazyLock::new(|| FancyRegex::new(r"(?s)<h([1-6])\b[^>]*>(.*?)</h\1\s*>").unwrap());
static HR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<hr\b[^>]*/?>").unwrap());

static BLOCKQUOTE_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<blockquote\b[^>]*?class\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</blockquote\s*>"#)
        .unwrap()
});
static BLOCKQUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<blockquote\b[^>]*>(.*?)</blockquote\s*>").unwrap());

static DIV_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?div\b[^>]*>").unwrap());
static SPAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?span\b[^>]*>").unwrap());
static ORPHAN_P_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?p\b[^>]*>").unwrap());

static TABLE_SCAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<table\b").unwrap());
static STYLE_SCAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<[a-z][^>]*\bstyle\s*="#).unwrap());
static SVG_SCAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<svg\b").unwrap());
static SCRIPT_SCAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<script\b").unwrap());
static FORM_SCAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:form|input|select|textarea|button)\b").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlToMarkdownProcessor;

impl HtmlToMarkdownProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Warnings for constructs with no mechanical Markdown equivalent. Never
    /// blocks or changes the text.
    fn complexity_scan(&self, text: &str) -> Vec<String> {
        let mut warnings = Vec::new();
        if TABLE_SCAN_RE.is_match(text) {
            warnings.push("HTML table found; tables are not converted automatically".to_string());
        }
        if STYLE_SCAN_RE.is_match(text) {
            warnings.push("inline style attribute found; styling is dropped in Markdown".to_string());
        }
        if SVG_SCAN_RE.is_match(text) {
            warnings.push("embedded svg found; it has no Markdown equivalent".to_string());
        }
        if SCRIPT_SCAN_RE.is_match(text) {
            warnings.push("script element found; it has no Markdown equivalent".to_string());
        }
        if FORM_SCAN_RE.is_match(text) {
            warnings.push("form element found; it has no Markdown equivalent".to_string());
        }
        warnings
    }

    /// Convert `<pre>`/`<pre><code>` to fenced blocks, stashed behind
    /// placeholders until every other rule has run.
    fn convert_pre_blocks(&self, text: &str, stash: &mut Vec<String>) -> String {
        let with_code = PRE_CODE_RE.replace_all(text, |caps: &regex::Captures| {
            let language = LANG_CLASS_RE
                .captures(&caps[1])
                .map(|l| l[1].to_string())
                .unwrap_or_default();
            stash_fence(stash, &language, &caps[2])
        });
        PRE_RE
            .replace_all(&with_code, |caps: &regex::Captures| stash_fence(stash, "", &caps[1]))
            .into_owned()
    }

    fn restore_pre_blocks(&self, text: &str, stash: &[String]) -> String {
        let mut restored = text.to_string();
        for (i, fence) in stash.iter().enumerate() {
            restored = restored.replacen(&format!("{PRE_STASH_PREFIX}{i}__"), fence, 1);
        }
        restored
    }

    fn convert_inline(&self, text: &str, stash: &mut Vec<String>) -> String {
        // Code spans are stashed like pre blocks; their token sits inline, so
        // no newline padding here.
        let mut current = CODE_RE
            .replace_all(text, |caps: &regex::Captures| {
                stash.push(format!("`{}`", &caps[1]));
                format!("{PRE_STASH_PREFIX}{}__", stash.len() - 1)
            })
            .into_owned();
        current = STRONG_RE
            .replace_all(&current, |caps: &fancy_regex::Captures| format!("**{}**", &caps[2]))
            .into_owned();
        current = EM_RE
            .replace_all(&current, |caps: &fancy_regex::Captures| format!("*{}*", &caps[2]))
            .into_owned();
        current = DEL_RE
            .replace_all(&current, |caps: &fancy_regex::Captures| format!("~~{}~~", &caps[2]))
            .into_owned();
        current = A_HREF_RE
            .replace_all(&current, |caps: &regex::Captures| {
                let href = caps.get(1).or(caps.get(2)).map(|m| m.as_str()).unwrap_or("");
                format!("[{}]({href})", caps[3].trim())
            })
            .into_owned();
        current = A_PLAIN_RE.replace_all(&current, "$1").into_owned();
        current = IMG_RE
            .replace_all(&current, |caps: &regex::Captures| {
                let tag = &caps[0];
                let src = attr_value(&SRC_ATTR_RE, tag);
                let alt = attr_value(&ALT_ATTR_RE, tag);
                match src {
                    Some(src) => format!("![{}]({src})", alt.unwrap_or_default()),
                    None => String::new(),
                }
            })
            .into_owned();
        BR_RE.replace_all(&current, "\n").into_owned()
    }

    fn convert_blocks(&self, text: &str) -> String {
        let mut current = P_RE
            .replace_all(text, |caps: &regex::Captures| format!("\n\n{}\n\n", caps[1].trim()))
            .into_owned();
        current = LI_RE
            .replace_all(&current, |caps: &regex::Captures| format!("- {}\n", caps[1].trim()))
            .into_owned();
        current = LIST_WRAPPER_RE.replace_all(&current, "\n").into_owned();
        current = HEADING_RE
            .replace_all(&current, |caps: &fancy_regex::Captures| {
                let level: usize = caps[1].parse().unwrap_or(1);
                format!("\n\n{} {}\n\n", "#".repeat(level), caps[2].trim())
            })
            .into_owned();
        current = BLOCKQUOTE_CLASS_RE
            .replace_all(&current, |caps: &regex::Captures| {
                let class = caps.get(1).or(caps.get(2)).map(|m| m.as_str()).unwrap_or("");
                let body = caps[3].trim();
                match admonition_kind(class) {
                    Some(kind) => format!("\n\n:::{kind}\n{body}\n:::\n\n"),
                    None => format!("\n\n{}\n\n", quote_prefix(body)),
                }
            })
            .into_owned();
        current = BLOCKQUOTE_RE
            .replace_all(&current, |caps: &regex::Captures| {
                format!("\n\n{}\n\n", quote_prefix(caps[1].trim()))
            })
            .into_owned();
        HR_RE.replace_all(&current, "\n\n---\n\n").into_owned()
    }

    fn unwrap_wrappers(&self, text: &str) -> String {
        let mut current = DIV_RE.replace_all(text, "\n").into_owned();
        current = SPAN_RE.replace_all(&current, "").into_owned();
        // Unpaired <p> tags that survived the pair rule become breaks.
        ORPHAN_P_RE.replace_all(&current, "\n\n").into_owned()
    }
}

fn stash_fence(stash: &mut Vec<String>, language: &str, content: &str) -> String {
    let body = content.trim_matches('\n');
    stash.push(format!("```{language}\n{body}\n```"));
    format!("\n\n{PRE_STASH_PREFIX}{}__\n\n", stash.len() - 1)
}

fn attr_value(re: &Regex, tag: &str) -> Option<String> {
    re.captures(tag)
        .and_then(|c| c.get(1).or(c.get(2)))
        .map(|m| m.as_str().to_string())
}

/// Admonition type for a blockquote class, per the fixed mapping. Unknown
/// classes fall back to a plain quote.
fn admonition_kind(class: &str) -> Option<&'static str> {
    match class.split_whitespace().next()?.to_ascii_lowercase().as_str() {
        "info" => Some("info"),
        "warning" => Some("warning"),
        "tip" => Some("tip"),
        "danger" => Some("danger"),
        "caution" => Some("caution"),
        "success" => Some("tip"),
        "important" => Some("warning"),
        _ => None,
    }
}

fn quote_prefix(body: &str) -> String {
    body.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl TextProcessor for HtmlToMarkdownProcessor {
    fn name(&self) -> &'static str {
        HTML_TO_MARKDOWN
    }

    fn description(&self) -> &'static str {
        "Rewrite embedded HTML into Markdown for Markdown-family targets"
    }

    fn should_process(&self, ctx: &ProcessingContext) -> bool {
        ctx.is_markdown && !ctx.is_html
    }

    fn process(&self, text: &str, _ctx: &ProcessingContext) -> ProcessOutcome {
        let masked = mask(text);
        if !HTML_TAG_RE.is_match(&masked.text) {
            return ProcessOutcome::unchanged(text);
        }
        let warnings = self.complexity_scan(&masked.text);

        let mut stash = Vec::new();
        let mut current = self.convert_pre_blocks(&masked.text, &mut stash);
        current = self.convert_inline(&current, &mut stash);
        current = self.convert_blocks(&current);
        current = self.unwrap_wrappers(&current);
        current = self.restore_pre_blocks(&current, &stash);
        current = collapse_excess_blank_lines(&current);
        current = current.trim_matches('\n').to_string();

        let restored = unmask(&current, &masked.masks);
        ProcessOutcome::from_rewrite(text, restored).with_warnings(warnings)
    }

    fn from_config(_config: &Config) -> Box<dyn TextProcessor> {
        Box::new(Self::new())
    }
}
