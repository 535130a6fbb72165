//! In-fence repair for shell and JSON code blocks.
//!
//! The only processor that deliberately looks inside fenced code, so it runs
//! on raw text instead of masked text. It touches exactly two kinds of block
//! content and leaves everything else byte for byte:
//!
//! - shell blocks: splits commands that were concatenated onto one line,
//!   converts literal `\n` escapes, and drops spurious single-character
//!   tokens wedged between two commands
//! - JSON blocks: pretty-prints single-line payloads; unparseable JSON is
//!   left unchanged with a warning
//!
//! Fence lines themselves and block language tags are never modified.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::config::Config;
use crate::context::ProcessingContext;
use crate::mask::fenced_block_ranges;
use crate::processor::{ProcessOutcome, TextProcessor};
use crate::processors::CODE_BLOCK_FORMAT;
use crate::utils::patterns::LITERAL_NEWLINE_ESCAPE_RE;

const SHELL_LANGUAGES: &[&str] = &["sh", "bash", "shell", "zsh", "console", "terminal"];
const JSON_LANGUAGES: &[&str] = &["json"];

/// Commands that can plausibly start a new shell command. A token from this
/// set appearing mid-line marks a split point, subject to the guards below.
const DEFAULT_COMMAND_WORDS: &[&str] = &[
    "apt", "apt-get", "aws", "az", "brew", "cargo", "cat", "cd", "chmod", "chown", "cp", "curl",
    "docker", "docker-compose", "dotnet", "echo", "export", "gcloud", "git", "go", "gradle",
    "grep", "helm", "kubectl", "ls", "make", "mkdir", "mv", "mvn", "node", "npm", "npx", "pip",
    "pip3", "pnpm", "python", "python3", "rm", "rustc", "scp", "service", "source", "ssh", "sudo",
    "systemctl", "tar", "terraform", "touch", "wget", "yarn",
];

/// Tokens after which a command word is an argument, not a new command:
/// wrappers (`xargs git ...`, `sudo systemctl ...`, a `$` prompt) and
/// commands whose first argument is free-form (`grep node`, `echo npm`).
const WRAPPER_WORDS: &[&str] = &[
    "$", "cat", "command", "echo", "env", "exec", "find", "grep", "head", "less", "man", "nohup",
    "printf", "sudo", "tail", "time", "type", "watch", "which", "xargs",
];

/// Subcommands that take package-name arguments. Once one appears in the
/// current command, later command-word lookalikes (`apt install git curl`)
/// stop counting as split points.
const INSTALL_LIKE_WORDS: &[&str] = &[
    "add", "get", "info", "install", "remove", "require", "search", "show", "uninstall",
    "update", "upgrade",
];

static SHELL_OPERATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\|\||&&|[|;&\\])$").unwrap());

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct CodeBlockFormatSettings {
    /// Additional command words merged into the built-in set.
    pub extra_command_words: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CodeBlockFormatProcessor {
    command_words: HashSet<String>,
}

impl Default for CodeBlockFormatProcessor {
    fn default() -> Self {
        Self::with_settings(&CodeBlockFormatSettings::default())
    }
}

/// One fenced block split into its parts. `close` is `None` for a block left
/// unterminated at end of input.
struct FencedBlock<'a> {
    open: &'a str,
    content: Vec<&'a str>,
    close: Option<&'a str>,
}

impl<'a> FencedBlock<'a> {
    fn parse(block: &'a str) -> Self {
        let mut lines: Vec<&str> = block.lines().collect();
        let open = if lines.is_empty() { block } else { lines.remove(0) };
        let close = match lines.last() {
            Some(last) if is_fence_line(last) => lines.pop(),
            _ => None,
        };
        Self {
            open,
            content: lines,
            close,
        }
    }

    /// Language tag from the opening fence, lowercased. Empty when untagged.
    fn language(&self) -> String {
        self.open
            .trim_start()
            .trim_start_matches(['`', '~'])
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase()
    }

    fn assemble(&self, content: &str) -> String {
        let mut out = String::from(self.open);
        if !content.is_empty() || self.close.is_some() {
            out.push('\n');
        }
        out.push_str(content);
        if let Some(close) = self.close {
            if !content.is_empty() {
                out.push('\n');
            }
            out.push_str(close);
        }
        out
    }
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim();
    (trimmed.starts_with("```") || trimmed.starts_with("~~~"))
        && trimmed.chars().all(|c| c == '`' || c == '~')
}

impl CodeBlockFormatProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &CodeBlockFormatSettings) -> Self {
        let mut command_words: HashSet<String> =
            DEFAULT_COMMAND_WORDS.iter().map(|s| s.to_string()).collect();
        command_words.extend(settings.extra_command_words.iter().map(|w| w.to_ascii_lowercase()));
        Self { command_words }
    }

    fn rewrite_block(&self, block_text: &str, warnings: &mut Vec<String>) -> String {
        let block = FencedBlock::parse(block_text);
        let content = block.content.join("\n");
        let language = block.language();

        let rewritten = if SHELL_LANGUAGES.contains(&language.as_str()) {
            self.format_shell(&content)
        } else if JSON_LANGUAGES.contains(&language.as_str()) {
            self.format_json(&content, true, warnings)
        } else if language.is_empty() {
            if looks_like_json(&content) {
                self.format_json(&content, false, warnings)
            } else if self.looks_like_shell(&content) {
                self.format_shell(&content)
            } else {
                content.clone()
            }
        } else {
            content.clone()
        };

        if rewritten == content {
            block_text.to_string()
        } else {
            block.assemble(&rewritten)
        }
    }

    /// Untagged block whose first word is a known command.
    fn looks_like_shell(&self, content: &str) -> bool {
        content
            .split_whitespace()
            .next()
            .is_some_and(|first| self.command_words.contains(&first.to_ascii_lowercase()))
    }

    fn format_shell(&self, content: &str) -> String {
        let content = LITERAL_NEWLINE_ESCAPE_RE.replace_all(content, "\n").into_owned();
        content
            .lines()
            .map(|line| self.split_command_line(line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Split one line into separate commands at recognized command words.
    fn split_command_line(&self, line: &str) -> String {
        let tokens = tokens_with_offsets(line);
        if tokens.len() < 2 {
            return line.to_string();
        }
        let indent = &line[..tokens[0].0];

        // (first token, last token) of each command, with stray tokens dropped.
        let mut segments: Vec<(usize, usize)> = Vec::new();
        let mut seg_start = 0;
        let mut seg_has_install = false;
        let mut force_boundary = false;

        let mut i = 1;
        while i < tokens.len() {
            let word = tokens[i].1.to_ascii_lowercase();
            let prev = tokens[i - 1].1;
            let prev_lower = prev.to_ascii_lowercase();
            let after_operator = SHELL_OPERATOR_RE.is_match(prev);
            let after_wrapper = WRAPPER_WORDS.contains(&prev_lower.as_str());

            // A stray single-character token between two otherwise-valid
            // commands is dropped and forces a boundary after itself.
            if !force_boundary
                && tokens[i].1.len() == 1
                && tokens[i].1.chars().all(|c| c.is_ascii_uppercase())
                && !prev.starts_with('-')
                && !after_operator
                && tokens
                    .get(i + 1)
                    .is_some_and(|(_, next)| self.command_words.contains(&next.to_ascii_lowercase()))
            {
                segments.push((seg_start, i - 1));
                force_boundary = true;
                i += 1;
                continue;
            }

            let is_boundary = if force_boundary {
                true
            } else {
                !after_operator
                    && !after_wrapper
                    && (word == "echo" || (self.command_words.contains(&word) && !seg_has_install))
            };

            if is_boundary {
                if !force_boundary {
                    segments.push((seg_start, i - 1));
                }
                seg_start = i;
                seg_has_install = false;
                force_boundary = false;
            }
            // A path-like argument ends any package list, so `git add . git
            // commit` still splits while `apt install -y curl wget` does not.
            if !word.starts_with('-') && word.contains(['/', '.', ':']) {
                seg_has_install = false;
            } else if INSTALL_LIKE_WORDS.contains(&word.as_str()) {
                seg_has_install = true;
            }
            i += 1;
        }
        segments.push((seg_start, tokens.len() - 1));

        if segments.len() == 1 && segments[0] == (0, tokens.len() - 1) {
            return line.to_string();
        }
        segments
            .iter()
            .map(|&(a, b)| format!("{indent}{}", slice_tokens(line, &tokens, a, b)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_json(&self, content: &str, tagged: bool, warnings: &mut Vec<String>) -> String {
        let trimmed = content.trim();
        if trimmed.is_empty() || trimmed.lines().count() > 1 {
            return content.to_string();
        }
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(pretty) => pretty,
                Err(_) => content.to_string(),
            },
            Err(err) => {
                if tagged {
                    warnings.push(format!("JSON block could not be parsed and was left unchanged: {err}"));
                }
                content.to_string()
            }
        }
    }
}

/// Whitespace-separated tokens with their byte offsets in `line`.
fn tokens_with_offsets(line: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    for token in line.split_whitespace() {
        let start = line[cursor..]
            .find(token)
            .map(|at| at + cursor)
            .unwrap_or(cursor);
        tokens.push((start, token));
        cursor = start + token.len();
    }
    tokens
}

/// Original text from the start of token `a` through the end of token `b`,
/// spacing between them preserved.
fn slice_tokens<'a>(line: &'a str, tokens: &[(usize, &str)], a: usize, b: usize) -> &'a str {
    let start = tokens[a].0;
    let end = tokens[b].0 + tokens[b].1.len();
    &line[start..end]
}

fn looks_like_json(content: &str) -> bool {
    let trimmed = content.trim();
    (trimmed.starts_with('{') || trimmed.starts_with('['))
        && trimmed.lines().count() == 1
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

impl TextProcessor for CodeBlockFormatProcessor {
    fn name(&self) -> &'static str {
        CODE_BLOCK_FORMAT
    }

    fn description(&self) -> &'static str {
        "Split concatenated shell commands and pretty-print JSON inside fenced blocks"
    }

    fn should_process(&self, ctx: &ProcessingContext) -> bool {
        ctx.is_markdown
    }

    fn process(&self, text: &str, _ctx: &ProcessingContext) -> ProcessOutcome {
        let ranges = fenced_block_ranges(text);
        if ranges.is_empty() {
            return ProcessOutcome::unchanged(text);
        }
        let mut warnings = Vec::new();
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for range in ranges {
            out.push_str(&text[cursor..range.start]);
            out.push_str(&self.rewrite_block(&text[range.clone()], &mut warnings));
            cursor = range.end;
        }
        out.push_str(&text[cursor..]);
        ProcessOutcome::from_rewrite(text, out).with_warnings(warnings)
    }

    fn from_config(config: &Config) -> Box<dyn TextProcessor> {
        let settings: CodeBlockFormatSettings = config.processor_settings(CODE_BLOCK_FORMAT);
        Box::new(Self::with_settings(&settings))
    }
}
