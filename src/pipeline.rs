//! The ordered processor chain applied to one proposal's text.
//!
//! A [`Pipeline`] folds the text through its processors in sequence,
//! concatenating warnings and OR-ing the modified flag. A stage is skipped
//! when its `should_process` pre-check declines the target, when its name is
//! in the caller-supplied disabled set, or when an inline
//! `<!-- docmend-disable -->` directive in the text names it. Stages can be
//! added and removed by name at runtime, so callers can build custom chains
//! on top of the configured default.

use std::collections::HashSet;

use crate::config::{Config, normalize_key};
use crate::context::ProcessingContext;
use crate::inline_config::InlineConfig;
use crate::processor::{ProcessOutcome, TextProcessor};
use crate::processors::{all_processors, filter_processors};

#[derive(Clone)]
pub struct Pipeline {
    processors: Vec<Box<dyn TextProcessor>>,
}

impl Pipeline {
    pub fn new(processors: Vec<Box<dyn TextProcessor>>) -> Self {
        Self { processors }
    }

    /// The full default chain, filtered by the config's enable/disable lists.
    pub fn from_config(config: &Config) -> Self {
        let registered = all_processors(config);
        Self::new(filter_processors(&registered, &config.global))
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = normalize_key(name);
        self.processors.iter().any(|p| p.name() == name)
    }

    /// Append a stage at the end of the chain.
    pub fn add(&mut self, processor: Box<dyn TextProcessor>) {
        self.processors.push(processor);
    }

    /// Insert a stage before the named one. Appends at the end when the name
    /// is not in the chain, and reports whether the name was found.
    pub fn insert_before(&mut self, name: &str, processor: Box<dyn TextProcessor>) -> bool {
        let name = normalize_key(name);
        match self.processors.iter().position(|p| p.name() == name) {
            Some(index) => {
                self.processors.insert(index, processor);
                true
            }
            None => {
                self.processors.push(processor);
                false
            }
        }
    }

    /// Remove the named stage, reporting whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let name = normalize_key(name);
        let before = self.processors.len();
        self.processors.retain(|p| p.name() != name);
        self.processors.len() != before
    }

    /// Run the chain over `text`.
    pub fn run(&self, text: &str, ctx: &ProcessingContext) -> ProcessOutcome {
        self.run_with_disabled(text, ctx, &HashSet::new())
    }

    /// Run the chain with an extra set of disabled processor names, as
    /// resolved from `per-file-disables` for the target path.
    pub fn run_with_disabled(
        &self,
        text: &str,
        ctx: &ProcessingContext,
        disabled: &HashSet<String>,
    ) -> ProcessOutcome {
        let inline = InlineConfig::from_content(text);
        if inline.all_disabled() {
            // Skipping the chain must not drop warnings carried in from
            // earlier runs.
            return ProcessOutcome::unchanged(text).with_warnings(ctx.previous_warnings.clone());
        }

        let mut current = text.to_string();
        let mut warnings = ctx.previous_warnings.clone();
        let mut modified = false;

        for processor in &self.processors {
            if inline.is_disabled(processor.name()) || disabled.contains(processor.name()) {
                log::debug!("{}: disabled for {}", processor.name(), ctx.target_path);
                continue;
            }
            if !processor.should_process(ctx) {
                continue;
            }
            let stage_ctx =
                ProcessingContext::with_warnings(&ctx.target_path, &ctx.original_text, warnings.clone());
            let outcome = processor.process(&current, &stage_ctx);
            if outcome.modified {
                log::debug!("{}: modified {}", processor.name(), ctx.target_path);
            }
            warnings.extend(outcome.warnings);
            modified |= outcome.modified;
            current = outcome.text;
        }

        ProcessOutcome {
            text: current,
            warnings,
            modified,
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("processors", &self.processor_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::{
        CODE_BLOCK_FORMAT, DEFAULT_PROCESSOR_ORDER, HTML_TO_MARKDOWN, LIST_FORMAT, MARKDOWN_FORMAT,
        MarkdownFormatProcessor,
    };

    fn default_pipeline() -> Pipeline {
        Pipeline::from_config(&Config::default())
    }

    fn md_ctx(text: &str) -> ProcessingContext {
        ProcessingContext::new("docs/guide.md", text)
    }

    #[test]
    fn test_default_chain_order() {
        assert_eq!(default_pipeline().processor_names(), DEFAULT_PROCESSOR_ORDER);
    }

    #[test]
    fn test_clean_markdown_is_untouched() {
        let text = "# Title\n\nA well formed paragraph.\n\n- one\n- two\n";
        let out = default_pipeline().run(text, &md_ctx(text));
        assert_eq!(out.text, text);
        assert!(!out.modified);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_html_is_converted_end_to_end() {
        let text = "<strong>bold</strong> text";
        let out = default_pipeline().run(text, &md_ctx(text));
        assert_eq!(out.text, "**bold** text");
        assert!(out.modified);
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let text = "## ConsiderationsThe text continues\n\n**Steps:**1. First step";
        let pipeline = default_pipeline();
        let once = pipeline.run(text, &md_ctx(text));
        let twice = pipeline.run(&once.text, &md_ctx(&once.text));
        assert_eq!(once.text, twice.text);
        assert!(once.modified);
        assert!(!twice.modified);
    }

    #[test]
    fn test_code_spans_survive_the_full_chain() {
        let text = "Call `foo.Bar` and read `<table>` docs.\n\n```sh\nplain content\n```\n";
        let out = default_pipeline().run(text, &md_ctx(text));
        assert!(out.text.contains("`foo.Bar`"));
        assert!(out.text.contains("`<table>`"));
        assert!(out.text.contains("```sh\nplain content\n```"));
    }

    #[test]
    fn test_non_markdown_target_is_untouched() {
        let text = "<strong>bold</strong>## TitleThe rest";
        let ctx = ProcessingContext::new("notes.txt", text);
        let out = default_pipeline().run(text, &ctx);
        assert_eq!(out.text, text);
        assert!(!out.modified);
    }

    #[test]
    fn test_inline_disable_all() {
        let text = "<!-- docmend-disable -->\n\n<strong>x</strong>";
        let out = default_pipeline().run(text, &md_ctx(text));
        assert_eq!(out.text, text);
        assert!(!out.modified);
    }

    #[test]
    fn test_inline_disable_all_keeps_previous_warnings() {
        let text = "<!-- docmend-disable -->\n\n<strong>x</strong>";
        let ctx = ProcessingContext::with_warnings("a.md", text, vec!["earlier".to_string()]);
        let out = default_pipeline().run(text, &ctx);
        assert_eq!(out.text, text);
        assert!(!out.modified);
        assert_eq!(out.warnings, vec!["earlier".to_string()]);
    }

    #[test]
    fn test_inline_disable_single_processor() {
        let text = "<!-- docmend-disable markdown-format -->\n\n## ConsiderationsThe text continues";
        let out = default_pipeline().run(text, &md_ctx(text));
        assert!(out.text.contains("## ConsiderationsThe text continues"));
    }

    #[test]
    fn test_run_with_disabled_set() {
        let text = "<strong>x</strong>";
        let disabled: HashSet<String> = [HTML_TO_MARKDOWN.to_string()].into();
        let out = default_pipeline().run_with_disabled(text, &md_ctx(text), &disabled);
        assert_eq!(out.text, text);
    }

    #[test]
    fn test_warnings_flow_through() {
        let text = "<table><tr><td>x</td></tr></table>";
        let out = default_pipeline().run(text, &md_ctx(text));
        assert!(out.warnings.iter().any(|w| w.contains("table")));
    }

    #[test]
    fn test_previous_warnings_are_kept() {
        let ctx = ProcessingContext::with_warnings("a.md", "text", vec!["earlier".to_string()]);
        let out = default_pipeline().run("text", &ctx);
        assert_eq!(out.warnings, vec!["earlier".to_string()]);
    }

    #[test]
    fn test_add_remove_contains() {
        let mut pipeline = default_pipeline();
        assert!(pipeline.contains(MARKDOWN_FORMAT));
        assert!(pipeline.remove(MARKDOWN_FORMAT));
        assert!(!pipeline.contains(MARKDOWN_FORMAT));
        assert!(!pipeline.remove(MARKDOWN_FORMAT));
        assert_eq!(pipeline.len(), 3);

        pipeline.add(MarkdownFormatProcessor::from_config(&Config::default()));
        assert_eq!(pipeline.processor_names().last(), Some(&MARKDOWN_FORMAT));
    }

    #[test]
    fn test_insert_before() {
        let mut pipeline = Pipeline::empty();
        assert!(pipeline.is_empty());

        // Unknown anchor appends and reports false.
        let appended = pipeline.insert_before(LIST_FORMAT, MarkdownFormatProcessor::from_config(&Config::default()));
        assert!(!appended);
        assert_eq!(pipeline.processor_names(), vec![MARKDOWN_FORMAT]);

        let mut pipeline = default_pipeline();
        pipeline.remove(MARKDOWN_FORMAT);
        assert!(pipeline.insert_before(LIST_FORMAT, MarkdownFormatProcessor::from_config(&Config::default())));
        assert_eq!(
            pipeline.processor_names(),
            vec![HTML_TO_MARKDOWN, MARKDOWN_FORMAT, LIST_FORMAT, CODE_BLOCK_FORMAT]
        );
    }

    #[test]
    fn test_config_disable_shrinks_chain() {
        let mut config = Config::default();
        config.global.disable = vec![HTML_TO_MARKDOWN.to_string(), CODE_BLOCK_FORMAT.to_string()];
        let pipeline = Pipeline::from_config(&config);
        assert_eq!(pipeline.processor_names(), vec![MARKDOWN_FORMAT, LIST_FORMAT]);
    }
}
