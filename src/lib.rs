pub mod config;
pub mod context;
pub mod exit_codes;
pub mod file_processor;
pub mod inline_config;
pub mod mask;
pub mod patch;
pub mod pipeline;
pub mod processor;
pub mod processors;
pub mod proposal;
pub mod utils;

pub use crate::config::{Config, ConfigError, GlobalConfig};
pub use crate::context::ProcessingContext;
pub use crate::mask::{MaskedText, mask, unmask};
pub use crate::patch::{ApplyError, ApplyReport, ApplyStatus, ProposalOutcome, apply_proposals};
pub use crate::pipeline::Pipeline;
pub use crate::processor::{ProcessOutcome, TextProcessor};
pub use crate::proposal::{Location, Proposal, UpdateType};

/// Clean one piece of text bound for `target_path` with the configured
/// pipeline. Honors the config's enable/disable lists, `per-file-disables`
/// globs, and any inline directives inside the text.
pub fn clean_text(text: &str, target_path: &str, config: &Config) -> ProcessOutcome {
    let pipeline = Pipeline::from_config(config);
    let ctx = ProcessingContext::new(target_path, text);
    let disabled = config.disabled_for_file(target_path);
    pipeline.run_with_disabled(text, &ctx, &disabled)
}

/// Clean a proposal in place and report whether its text changed.
///
/// The reviewer-edited text is cleaned when present, otherwise the model
/// text; the result is written back to the same field, and the proposal's
/// warning list is replaced by the accumulated pipeline warnings.
pub fn clean_proposal(proposal: &mut Proposal, config: &Config) -> bool {
    let pipeline = Pipeline::from_config(config);
    clean_proposal_with(&pipeline, proposal, config)
}

/// Like [`clean_proposal`], but reusing a prebuilt pipeline across a batch.
pub fn clean_proposal_with(pipeline: &Pipeline, proposal: &mut Proposal, config: &Config) -> bool {
    let text = proposal.effective_text().to_string();
    let ctx =
        ProcessingContext::with_warnings(&proposal.target_path, &text, proposal.warnings.clone());
    let disabled = config.disabled_for_file(&proposal.target_path);
    let outcome = pipeline.run_with_disabled(&text, &ctx, &disabled);

    let modified = outcome.modified;
    proposal.warnings = outcome.warnings;
    match proposal.edited_text.as_mut() {
        Some(edited) => *edited = outcome.text,
        None => proposal.text = outcome.text,
    }
    modified
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_repairs_glued_heading() {
        let out = clean_text("## ConsiderationsThe text continues", "doc.md", &Config::default());
        assert_eq!(out.text, "## Considerations\n\nThe text continues");
        assert!(out.modified);
    }

    #[test]
    fn test_clean_proposal_writes_back_model_text() {
        let mut p = Proposal::new("doc.md", UpdateType::Insert, "<strong>bold</strong> text");
        let modified = clean_proposal(&mut p, &Config::default());
        assert!(modified);
        assert_eq!(p.text, "**bold** text");
        assert!(p.edited_text.is_none());
    }

    #[test]
    fn test_clean_proposal_prefers_edited_text() {
        let mut p = Proposal::new("doc.md", UpdateType::Update, "model <b>x</b>");
        p.edited_text = Some("**Steps:**1. First step".to_string());
        let modified = clean_proposal(&mut p, &Config::default());
        assert!(modified);
        // The model text is untouched; only the reviewer's version is cleaned.
        assert_eq!(p.text, "model <b>x</b>");
        assert_eq!(p.edited_text.as_deref(), Some("**Steps:**\n\n1. First step"));
    }

    #[test]
    fn test_clean_proposal_accumulates_warnings() {
        let mut p = Proposal::new("doc.md", UpdateType::Insert, "<table><tr><td>x</td></tr></table>");
        p.warnings.push("earlier".to_string());
        clean_proposal(&mut p, &Config::default());
        assert_eq!(p.warnings[0], "earlier");
        assert!(p.warnings.iter().any(|w| w.contains("table")));
    }

    #[test]
    fn test_clean_proposal_keeps_warnings_when_inline_disabled() {
        let mut p = Proposal::new(
            "doc.md",
            UpdateType::Insert,
            "<!-- docmend-disable -->\n\n<strong>x</strong>",
        );
        p.warnings.push("earlier".to_string());
        let modified = clean_proposal(&mut p, &Config::default());
        assert!(!modified);
        assert!(p.text.contains("<strong>x</strong>"));
        assert_eq!(p.warnings, vec!["earlier".to_string()]);
    }

    #[test]
    fn test_clean_then_apply_round() {
        let config = Config::default();
        let mut p = Proposal::new("doc.md", UpdateType::Update, "<strong>fixed</strong> line")
            .with_location(Location::range(1, 1));
        clean_proposal(&mut p, &config);

        let report = apply_proposals("# Title\nold line\ntail", &[p]);
        assert_eq!(report.text, "# Title\n**fixed** line\ntail");
        assert!(report.all_applied());
    }

    #[test]
    fn test_per_file_disables_respected() {
        let config: Config = toml::from_str(
            r#"
[per-file-disables]
"generated/**" = ["markdown-format"]
"#,
        )
        .unwrap();

        let glued = "## ConsiderationsThe text continues";
        let skipped = clean_text(glued, "generated/api.md", &config);
        assert_eq!(skipped.text, glued);
        let cleaned = clean_text(glued, "docs/guide.md", &config);
        assert!(cleaned.modified);
    }
}
