//! The proposal data model.
//!
//! A [`Proposal`] is one candidate edit against one file, as produced by the
//! upstream generation step and exchanged as JSON. Field names follow the
//! wire format (camelCase), with snake_case aliases accepted on input.

use serde::{Deserialize, Serialize};

/// What kind of edit a proposal describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateType {
    Insert,
    Update,
    Delete,
    /// No edit. Kept in the model because upstream emits it for proposals
    /// that were reviewed away; the applier skips these.
    None,
}

impl std::fmt::Display for UpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpdateType::Insert => "INSERT",
            UpdateType::Update => "UPDATE",
            UpdateType::Delete => "DELETE",
            UpdateType::None => "NONE",
        };
        f.write_str(s)
    }
}

/// An explicit 0-based line target. `line_end` is inclusive and defaults to
/// `line_start` when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(alias = "line_start")]
    pub line_start: usize,
    #[serde(default, alias = "line_end", skip_serializing_if = "Option::is_none")]
    pub line_end: Option<usize>,
}

impl Location {
    pub fn line(line_start: usize) -> Self {
        Self {
            line_start,
            line_end: None,
        }
    }

    pub fn range(line_start: usize, line_end: usize) -> Self {
        Self {
            line_start,
            line_end: Some(line_end),
        }
    }
}

/// One candidate edit targeting one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    #[serde(alias = "target_path")]
    pub target_path: String,

    #[serde(alias = "update_type")]
    pub update_type: UpdateType,

    /// Heading name resolved against the document when no explicit location
    /// is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    /// Model-suggested content.
    pub text: String,

    /// Reviewer-edited content. When present it wins over `text` everywhere.
    #[serde(default, alias = "edited_text", skip_serializing_if = "Option::is_none")]
    pub edited_text: Option<String>,

    /// Warnings accumulated by the cleanup pipeline, in emission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Proposal {
    pub fn new(target_path: &str, update_type: UpdateType, text: &str) -> Self {
        Self {
            target_path: target_path.to_string(),
            update_type,
            section: None,
            location: None,
            text: text.to_string(),
            edited_text: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_section(mut self, section: &str) -> Self {
        self.section = Some(section.to_string());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// The content to apply: the reviewer's edit when present, otherwise the
    /// model's.
    pub fn effective_text(&self) -> &str {
        self.edited_text.as_deref().unwrap_or(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camel_case_wire_format() {
        let json = r#"{
            "targetPath": "docs/setup.md",
            "updateType": "UPDATE",
            "section": "Install",
            "location": {"lineStart": 3, "lineEnd": 7},
            "text": "new body"
        }"#;
        let p: Proposal = serde_json::from_str(json).unwrap();
        assert_eq!(p.target_path, "docs/setup.md");
        assert_eq!(p.update_type, UpdateType::Update);
        assert_eq!(p.section.as_deref(), Some("Install"));
        assert_eq!(p.location, Some(Location::range(3, 7)));
        assert!(p.edited_text.is_none());
        assert!(p.warnings.is_empty());
    }

    #[test]
    fn test_parse_snake_case_aliases() {
        let json = r#"{
            "target_path": "a.md",
            "update_type": "INSERT",
            "location": {"line_start": 0},
            "text": "x",
            "edited_text": "y"
        }"#;
        let p: Proposal = serde_json::from_str(json).unwrap();
        assert_eq!(p.target_path, "a.md");
        assert_eq!(p.update_type, UpdateType::Insert);
        assert_eq!(p.location, Some(Location::line(0)));
        assert_eq!(p.effective_text(), "y");
    }

    #[test]
    fn test_update_type_wire_names() {
        for (json, expected) in [
            ("\"INSERT\"", UpdateType::Insert),
            ("\"UPDATE\"", UpdateType::Update),
            ("\"DELETE\"", UpdateType::Delete),
            ("\"NONE\"", UpdateType::None),
        ] {
            let parsed: UpdateType = serde_json::from_str(json).unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
            assert_eq!(format!("{parsed}"), json.trim_matches('"'));
        }
    }

    #[test]
    fn test_effective_text_prefers_edit() {
        let mut p = Proposal::new("a.md", UpdateType::Insert, "model text");
        assert_eq!(p.effective_text(), "model text");
        p.edited_text = Some("human text".to_string());
        assert_eq!(p.effective_text(), "human text");
    }

    #[test]
    fn test_serialize_omits_empty_optionals() {
        let p = Proposal::new("a.md", UpdateType::Delete, "").with_section("Old");
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"targetPath\""));
        assert!(json.contains("\"updateType\":\"DELETE\""));
        assert!(!json.contains("location"));
        assert!(!json.contains("editedText"));
        assert!(!json.contains("warnings"));
    }
}
