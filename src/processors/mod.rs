//! Processor registry.
//!
//! Every pipeline stage lives in its own module here and is addressed by a
//! stable kebab-case name. The default order matters and is part of the
//! observable behavior: HTML conversion runs first so the later Markdown
//! stages see Markdown, and code block formatting runs last so it sees the
//! final fence layout.

mod code_block_format;
mod html_convert;
mod list_format;
mod markdown_format;

pub use code_block_format::{CodeBlockFormatProcessor, CodeBlockFormatSettings};
pub use html_convert::HtmlToMarkdownProcessor;
pub use list_format::ListFormatProcessor;
pub use markdown_format::{MarkdownFormatProcessor, MarkdownFormatSettings};

use std::collections::HashSet;

use crate::config::{Config, GlobalConfig};
use crate::processor::TextProcessor;

pub const HTML_TO_MARKDOWN: &str = "html-to-markdown";
pub const MARKDOWN_FORMAT: &str = "markdown-format";
pub const LIST_FORMAT: &str = "list-format";
pub const CODE_BLOCK_FORMAT: &str = "code-block-format";

/// Default execution order of the full pipeline.
pub const DEFAULT_PROCESSOR_ORDER: &[&str] =
    &[HTML_TO_MARKDOWN, MARKDOWN_FORMAT, LIST_FORMAT, CODE_BLOCK_FORMAT];

/// Returns all processor instances, in default order, for pipeline
/// construction and the CLI listing.
pub fn all_processors(config: &Config) -> Vec<Box<dyn TextProcessor>> {
    type ProcessorCtor = fn(&Config) -> Box<dyn TextProcessor>;
    const PROCESSORS: &[(&str, ProcessorCtor)] = &[
        (HTML_TO_MARKDOWN, HtmlToMarkdownProcessor::from_config),
        (MARKDOWN_FORMAT, MarkdownFormatProcessor::from_config),
        (LIST_FORMAT, ListFormatProcessor::from_config),
        (CODE_BLOCK_FORMAT, CodeBlockFormatProcessor::from_config),
    ];
    PROCESSORS.iter().map(|(_, ctor)| ctor(config)).collect()
}

/// Filter processors by the global enable/disable lists, preserving order.
/// `disable = ["all"]` empties the pipeline unless `enable` re-adds stages.
pub fn filter_processors(
    processors: &[Box<dyn TextProcessor>],
    global_config: &GlobalConfig,
) -> Vec<Box<dyn TextProcessor>> {
    let mut enabled: Vec<Box<dyn TextProcessor>> = Vec::new();
    let disabled: HashSet<&str> = global_config.disable.iter().map(String::as_str).collect();

    if disabled.contains("all") {
        if !global_config.enable.is_empty() {
            let enable_set: HashSet<&str> = global_config.enable.iter().map(String::as_str).collect();
            for processor in processors {
                if enable_set.contains(processor.name()) {
                    enabled.push(dyn_clone::clone_box(&**processor));
                }
            }
        }
        return enabled;
    }

    if !global_config.enable.is_empty() {
        let enable_set: HashSet<&str> = global_config.enable.iter().map(String::as_str).collect();
        for processor in processors {
            if enable_set.contains(processor.name()) && !disabled.contains(processor.name()) {
                enabled.push(dyn_clone::clone_box(&**processor));
            }
        }
    } else {
        for processor in processors {
            if !disabled.contains(processor.name()) {
                enabled.push(dyn_clone::clone_box(&**processor));
            }
        }
    }

    enabled
}
