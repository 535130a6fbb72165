//! The processor trait every pipeline stage implements.

use crate::config::Config;
use crate::context::ProcessingContext;
use dyn_clone::DynClone;

/// What one processor did with one piece of text.
///
/// Processors are total: they always return a usable `text`, falling back to
/// their input (plus a warning) when they hit something unexpected. They
/// never panic and never return an error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutcome {
    /// The (possibly rewritten) text
    pub text: String,
    /// Warnings produced by this stage, in emission order
    pub warnings: Vec<String>,
    /// Whether `text` differs from the input
    pub modified: bool,
}

impl ProcessOutcome {
    /// Outcome for a stage that left the text alone.
    pub fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            warnings: Vec::new(),
            modified: false,
        }
    }

    /// Outcome computed by comparing the stage's output against its input.
    pub fn from_rewrite(input: &str, output: String) -> Self {
        Self {
            modified: output != input,
            text: output,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// A single text-repair stage.
///
/// Implementations must be pure with respect to their inputs: same text and
/// context in, same outcome out. Anything the stage cannot handle is left
/// as-is and reported through [`ProcessOutcome::warnings`].
pub trait TextProcessor: DynClone + Send + Sync {
    /// Stable kebab-case identifier used in configuration and inline
    /// directives, e.g. `"markdown-format"`.
    fn name(&self) -> &'static str;

    /// One-line human description shown by `docmend processors`.
    fn description(&self) -> &'static str;

    /// Cheap pre-check deciding whether this stage applies to the target at
    /// all. Returning `false` skips the stage for this proposal.
    fn should_process(&self, ctx: &ProcessingContext) -> bool;

    /// Rewrite `text`. Must never panic; unexpected input degrades to an
    /// unchanged outcome with a warning.
    fn process(&self, text: &str, ctx: &ProcessingContext) -> ProcessOutcome;

    /// Build the processor from loaded configuration.
    fn from_config(config: &Config) -> Box<dyn TextProcessor>
    where
        Self: Sized;
}

dyn_clone::clone_trait_object!(TextProcessor);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_outcome() {
        let out = ProcessOutcome::unchanged("abc");
        assert_eq!(out.text, "abc");
        assert!(!out.modified);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_from_rewrite_sets_modified() {
        let same = ProcessOutcome::from_rewrite("abc", "abc".to_string());
        assert!(!same.modified);
        let changed = ProcessOutcome::from_rewrite("abc", "abd".to_string());
        assert!(changed.modified);
        assert_eq!(changed.text, "abd");
    }

    #[test]
    fn test_with_warnings() {
        let out = ProcessOutcome::unchanged("x").with_warnings(vec!["w".into()]);
        assert_eq!(out.warnings, vec!["w".to_string()]);
    }
}
