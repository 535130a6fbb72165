//! Per-proposal processing context.
//!
//! A [`ProcessingContext`] is built once per proposal and handed unchanged to
//! every processor in the pipeline. It carries the facts processors use to
//! decide whether and how to run: the target path, its file family, the text
//! as it looked before any pipeline stage ran, and warnings accumulated by
//! earlier stages.

use std::path::Path;

/// Extensions treated as Markdown-family documents. File discovery and the
/// per-file `is_markdown` flag both key off this list.
pub(crate) const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdx", "mdown", "mkd"];

/// Extensions treated as HTML-family documents. These are never converted to
/// Markdown even when they contain HTML tags.
const HTML_EXTENSIONS: &[&str] = &["html", "htm", "xhtml"];

/// Immutable description of the proposal being processed.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    /// Path of the file the proposal targets (as given by the caller)
    pub target_path: String,
    /// Lowercased extension without the dot, empty when the path has none
    pub file_extension: String,
    /// Whether the target is a Markdown-family file
    pub is_markdown: bool,
    /// Whether the target is an HTML-family file
    pub is_html: bool,
    /// The proposal text before any pipeline stage ran
    pub original_text: String,
    /// Warnings carried over from earlier pipeline stages
    pub previous_warnings: Vec<String>,
}

impl ProcessingContext {
    pub fn new(target_path: &str, original_text: &str) -> Self {
        let file_extension = extension_of(target_path);
        Self {
            target_path: target_path.to_string(),
            is_markdown: MARKDOWN_EXTENSIONS.contains(&file_extension.as_str()),
            is_html: HTML_EXTENSIONS.contains(&file_extension.as_str()),
            file_extension,
            original_text: original_text.to_string(),
            previous_warnings: Vec::new(),
        }
    }

    /// Like [`ProcessingContext::new`] but carrying warnings from earlier stages.
    pub fn with_warnings(target_path: &str, original_text: &str, previous_warnings: Vec<String>) -> Self {
        Self {
            previous_warnings,
            ..Self::new(target_path, original_text)
        }
    }
}

/// Lowercased extension of a path, without the leading dot.
pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}
