//! Applying proposals to a document.
//!
//! The applier takes one file's full text plus every proposal targeting that
//! path and produces the complete new text in a single pass. Each proposal is
//! first resolved into a line splice against the original snapshot, then the
//! splices are applied bottom-to-top so earlier ones never shift the line
//! numbers still pending above them. End-of-file appends run last, in their
//! input order. When two proposals claim overlapping lines, the first one in
//! input order wins and the later one fails. Failures are per-proposal: a
//! proposal that cannot be resolved is recorded and skipped while the rest of
//! the batch continues.
//!
//! Lines are 0-based throughout, matching the wire format.

use std::collections::HashSet;

use thiserror::Error;

use crate::mask::fenced_block_ranges;
use crate::proposal::{Proposal, UpdateType};
use crate::utils::patterns::ATX_HEADING_RE;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("target file not found: {path}")]
    FileNotFound { path: String },

    #[error("section not found: '{section}'")]
    SectionNotFound { section: String },

    #[error("{update_type} proposal carries neither a location nor a section")]
    MissingTarget { update_type: UpdateType },

    #[error("{0}")]
    Parse(String),
}

impl ApplyError {
    /// Stable classification string for structured reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            ApplyError::FileNotFound { .. } => "file-not-found",
            ApplyError::SectionNotFound { .. } => "section-not-found",
            ApplyError::MissingTarget { .. } => "missing-target",
            ApplyError::Parse(_) => "parse",
        }
    }
}

/// What happened to one proposal during an apply pass.
#[derive(Debug)]
pub enum ApplyStatus {
    Applied,
    /// `NONE` proposals pass through without touching the document.
    Skipped,
    Failed(ApplyError),
}

#[derive(Debug)]
pub struct ProposalOutcome {
    /// Index of the proposal in the input slice.
    pub index: usize,
    pub status: ApplyStatus,
}

impl ProposalOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self.status, ApplyStatus::Applied)
    }

    pub fn error(&self) -> Option<&ApplyError> {
        match &self.status {
            ApplyStatus::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Result of one apply pass over one document.
#[derive(Debug)]
pub struct ApplyReport {
    /// The complete new document text.
    pub text: String,
    /// One outcome per input proposal, in input order.
    pub outcomes: Vec<ProposalOutcome>,
}

impl ApplyReport {
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error().is_some()).count()
    }

    pub fn all_applied(&self) -> bool {
        self.failed_count() == 0
    }
}

/// An ATX heading outside any fenced block.
#[derive(Debug, Clone)]
struct Heading {
    line: usize,
    level: usize,
    text: String,
}

/// A proposal resolved into a concrete splice against the original snapshot.
/// `end` is exclusive; `start == end` is a pure insertion.
#[derive(Debug)]
struct ResolvedEdit {
    index: usize,
    start: usize,
    end: usize,
    replacement: Vec<String>,
}

enum Resolution {
    Edit {
        start: usize,
        end: usize,
        replacement: Vec<String>,
    },
    Append(Vec<String>),
    Skip,
}

/// Apply every proposal to `text`, returning the new document text and a
/// per-proposal classification.
pub fn apply_proposals(text: &str, proposals: &[Proposal]) -> ApplyReport {
    let ends_with_newline = text.ends_with('\n');
    let mut lines: Vec<String> = text.lines().map(String::from).collect();
    let fenced = fenced_line_set(text);
    let headings = document_headings(&lines, &fenced);

    let mut edits: Vec<ResolvedEdit> = Vec::new();
    let mut appends: Vec<Vec<String>> = Vec::new();
    let mut outcomes: Vec<ProposalOutcome> = Vec::new();

    for (index, proposal) in proposals.iter().enumerate() {
        match resolve(proposal, &lines, &headings) {
            Ok(Resolution::Edit { start, end, replacement }) => match find_overlap(&edits, start, end) {
                None => {
                    edits.push(ResolvedEdit {
                        index,
                        start,
                        end,
                        replacement,
                    });
                    outcomes.push(ProposalOutcome {
                        index,
                        status: ApplyStatus::Applied,
                    });
                }
                Some(prior) => {
                    let error = ApplyError::Parse(format!(
                        "edit starting at line {start} overlaps proposal {}",
                        prior.index
                    ));
                    log::warn!("proposal {index} for {}: {error}", proposal.target_path);
                    outcomes.push(ProposalOutcome {
                        index,
                        status: ApplyStatus::Failed(error),
                    });
                }
            },
            Ok(Resolution::Append(replacement)) => {
                appends.push(replacement);
                outcomes.push(ProposalOutcome {
                    index,
                    status: ApplyStatus::Applied,
                });
            }
            Ok(Resolution::Skip) => {
                outcomes.push(ProposalOutcome {
                    index,
                    status: ApplyStatus::Skipped,
                });
            }
            Err(error) => {
                log::warn!("proposal {index} for {}: {error}", proposal.target_path);
                outcomes.push(ProposalOutcome {
                    index,
                    status: ApplyStatus::Failed(error),
                });
            }
        }
    }

    // Bottom-to-top. At the same start line the wider edit goes first, then
    // the later proposal, so same-point insertions land in input order and an
    // insertion at the start of a replaced range ends up before the
    // replacement.
    edits.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)).then(b.index.cmp(&a.index)));
    for edit in edits {
        lines.splice(edit.start..edit.end, edit.replacement);
    }
    for replacement in appends {
        lines.extend(replacement);
    }

    let mut new_text = lines.join("\n");
    if ends_with_newline && !new_text.is_empty() {
        new_text.push('\n');
    }
    ApplyReport {
        text: new_text,
        outcomes,
    }
}

/// First accepted edit whose half-open range intersects `start..end`, if any.
/// Pure insertions at the same point do not intersect.
fn find_overlap(edits: &[ResolvedEdit], start: usize, end: usize) -> Option<&ResolvedEdit> {
    edits.iter().find(|e| e.start < end && start < e.end)
}

fn resolve(proposal: &Proposal, lines: &[String], headings: &[Heading]) -> Result<Resolution, ApplyError> {
    let replacement: Vec<String> = proposal.effective_text().lines().map(String::from).collect();

    match proposal.update_type {
        UpdateType::None => Ok(Resolution::Skip),

        UpdateType::Insert => {
            if let Some(location) = proposal.location {
                // Insert immediately after the given line. Positions past the
                // end degrade to an append.
                let at = location.line_start.saturating_add(1).min(lines.len());
                Ok(Resolution::Edit {
                    start: at,
                    end: at,
                    replacement,
                })
            } else if let Some(section) = &proposal.section {
                let heading = find_section(headings, section)?;
                let at = section_end(headings, heading, lines.len());
                Ok(Resolution::Edit {
                    start: at,
                    end: at,
                    replacement,
                })
            } else {
                Ok(Resolution::Append(replacement))
            }
        }

        UpdateType::Update | UpdateType::Delete => {
            let delete = proposal.update_type == UpdateType::Delete;
            if let Some(location) = proposal.location {
                let start = location.line_start;
                let end = location.line_end.unwrap_or(start);
                if start >= lines.len() {
                    return Err(ApplyError::Parse(format!(
                        "line {start} is past the end of the document ({} lines)",
                        lines.len()
                    )));
                }
                if end < start {
                    return Err(ApplyError::Parse(format!("invalid line range {start}..{end}")));
                }
                Ok(Resolution::Edit {
                    start,
                    end: end.min(lines.len() - 1) + 1,
                    replacement: if delete { Vec::new() } else { replacement },
                })
            } else if let Some(section) = &proposal.section {
                let heading = find_section(headings, section)?;
                let end = section_end(headings, heading, lines.len());
                if delete {
                    // The heading goes with its section.
                    Ok(Resolution::Edit {
                        start: heading.line,
                        end,
                        replacement: Vec::new(),
                    })
                } else {
                    // The heading survives; only the body is replaced.
                    Ok(Resolution::Edit {
                        start: heading.line + 1,
                        end,
                        replacement,
                    })
                }
            } else {
                Err(ApplyError::MissingTarget {
                    update_type: proposal.update_type,
                })
            }
        }
    }
}

/// Line indices covered by fenced code blocks. Headings inside fences are
/// code, not structure.
fn fenced_line_set(text: &str) -> HashSet<usize> {
    let ranges = fenced_block_ranges(text);
    let mut fenced = HashSet::new();
    let mut offset = 0;
    for (i, line) in text.split_inclusive('\n').enumerate() {
        if ranges.iter().any(|r| r.contains(&offset)) {
            fenced.insert(i);
        }
        offset += line.len();
    }
    fenced
}

fn document_headings(lines: &[String], fenced: &HashSet<usize>) -> Vec<Heading> {
    let mut headings = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if fenced.contains(&i) {
            continue;
        }
        if let Some(caps) = ATX_HEADING_RE.captures(strip_heading_indent(line)) {
            headings.push(Heading {
                line: i,
                level: caps[1].len(),
                text: caps[2].trim().to_string(),
            });
        }
    }
    headings
}

/// Up to three leading spaces still leave a valid heading; four or more make
/// an indented code line, which the caller's regex then rejects.
fn strip_heading_indent(line: &str) -> &str {
    let spaces = line.len() - line.trim_start_matches(' ').len();
    if spaces <= 3 { &line[spaces..] } else { line }
}

/// Case-insensitive exact match first, substring match as fallback. First
/// match wins within each pass.
fn find_section<'a>(headings: &'a [Heading], section: &str) -> Result<&'a Heading, ApplyError> {
    let needle = normalize_section(section);
    if needle.is_empty() {
        return Err(ApplyError::SectionNotFound {
            section: section.to_string(),
        });
    }
    headings
        .iter()
        .find(|h| normalize_section(&h.text) == needle)
        .or_else(|| headings.iter().find(|h| normalize_section(&h.text).contains(&needle)))
        .ok_or_else(|| ApplyError::SectionNotFound {
            section: section.to_string(),
        })
}

/// Index of the first line after the section: the next heading at the same or
/// a higher level, or end of file.
fn section_end(headings: &[Heading], heading: &Heading, line_count: usize) -> usize {
    headings
        .iter()
        .find(|h| h.line > heading.line && h.level <= heading.level)
        .map_or(line_count, |h| h.line)
}

/// Section names arrive in whatever shape the model produced, sometimes with
/// the heading markers still attached.
fn normalize_section(name: &str) -> String {
    name.trim().trim_start_matches('#').trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::Location;

    fn update(lines: Location, text: &str) -> Proposal {
        Proposal::new("doc.md", UpdateType::Update, text).with_location(lines)
    }

    #[test]
    fn test_update_single_line() {
        let report = apply_proposals("Line0\nLine1\nLine2", &[update(Location::range(1, 1), "X")]);
        assert_eq!(report.text, "Line0\nX\nLine2");
        assert!(report.all_applied());
    }

    #[test]
    fn test_update_inclusive_range_with_multiline_text() {
        let report = apply_proposals("a\nb\nc\nd", &[update(Location::range(1, 2), "X\nY\nZ")]);
        assert_eq!(report.text, "a\nX\nY\nZ\nd");
    }

    #[test]
    fn test_update_line_end_defaults_to_line_start() {
        let report = apply_proposals("a\nb\nc", &[update(Location::line(2), "C")]);
        assert_eq!(report.text, "a\nb\nC");
    }

    #[test]
    fn test_delete_by_location() {
        let p = Proposal::new("doc.md", UpdateType::Delete, "").with_location(Location::range(1, 2));
        let report = apply_proposals("a\nb\nc\nd", &[p]);
        assert_eq!(report.text, "a\nd");
    }

    #[test]
    fn test_delete_by_section_removes_heading() {
        let doc = "# T\n\n## Foo\n\nbody\n\n## Bar\n\nb2";
        let p = Proposal::new("doc.md", UpdateType::Delete, "").with_section("Foo");
        let report = apply_proposals(doc, &[p]);
        assert_eq!(report.text, "# T\n\n## Bar\n\nb2");
    }

    #[test]
    fn test_update_by_section_keeps_heading() {
        let doc = "# T\n\n## Foo\n\nold body\n\n## Bar\n\nb2";
        let p = Proposal::new("doc.md", UpdateType::Update, "new body\n").with_section("Foo");
        let report = apply_proposals(doc, &[p]);
        assert_eq!(report.text, "# T\n\n## Foo\nnew body\n## Bar\n\nb2");
    }

    #[test]
    fn test_update_last_section_runs_to_end_of_file() {
        let doc = "## A\n\na body\n\n## B\n\nb body\nmore";
        let p = Proposal::new("doc.md", UpdateType::Update, "replaced").with_section("B");
        let report = apply_proposals(doc, &[p]);
        assert_eq!(report.text, "## A\n\na body\n\n## B\nreplaced");
    }

    #[test]
    fn test_insert_after_location_line() {
        let p = Proposal::new("doc.md", UpdateType::Insert, "new").with_location(Location::line(0));
        let report = apply_proposals("a\nb", &[p]);
        assert_eq!(report.text, "a\nnew\nb");
    }

    #[test]
    fn test_insert_past_end_appends() {
        let p = Proposal::new("doc.md", UpdateType::Insert, "new").with_location(Location::line(99));
        let report = apply_proposals("a\nb", &[p]);
        assert_eq!(report.text, "a\nb\nnew");
        assert!(report.all_applied());
    }

    #[test]
    fn test_insert_by_section_lands_before_next_heading() {
        let doc = "# T\n\n## Foo\n\nbody\n\n## Bar\n\nb2";
        let p = Proposal::new("doc.md", UpdateType::Insert, "added").with_section("Foo");
        let report = apply_proposals(doc, &[p]);
        assert_eq!(report.text, "# T\n\n## Foo\n\nbody\n\nadded\n## Bar\n\nb2");
    }

    #[test]
    fn test_insert_into_last_section_appends() {
        let doc = "## Foo\n\nbody";
        let p = Proposal::new("doc.md", UpdateType::Insert, "added").with_section("Foo");
        let report = apply_proposals(doc, &[p]);
        assert_eq!(report.text, "## Foo\n\nbody\nadded");
    }

    #[test]
    fn test_insert_without_target_appends_at_end() {
        let p = Proposal::new("doc.md", UpdateType::Insert, "Appended");
        let report = apply_proposals("Line0\nLine1", &[p]);
        assert_eq!(report.text, "Line0\nLine1\nAppended");
    }

    #[test]
    fn test_section_boundaries() {
        // H1 > H2a, H2b: H2a ends exactly at H2b, H2b ends at end of file.
        let doc = "# H1\n\n## H2a\n\na\n\n## H2b\n\nb";
        let lines: Vec<String> = doc.lines().map(String::from).collect();
        let headings = document_headings(&lines, &HashSet::new());
        assert_eq!(headings.len(), 3);

        let h2a = find_section(&headings, "H2a").unwrap();
        assert_eq!(section_end(&headings, h2a, lines.len()), 6);
        let h2b = find_section(&headings, "H2b").unwrap();
        assert_eq!(section_end(&headings, h2b, lines.len()), lines.len());
    }

    #[test]
    fn test_section_match_is_case_insensitive_exact_first() {
        let doc = "## Overview\n\nx\n\n## Overview of Internals\n\ny";
        let lines: Vec<String> = doc.lines().map(String::from).collect();
        let headings = document_headings(&lines, &HashSet::new());

        // Exact match wins even though the longer heading also contains it.
        let exact = find_section(&headings, "overview").unwrap();
        assert_eq!(exact.line, 0);

        // Substring fallback picks the first containing heading.
        let partial = find_section(&headings, "internals").unwrap();
        assert_eq!(partial.line, 4);
    }

    #[test]
    fn test_section_name_with_heading_markers() {
        let doc = "## Setup\n\nbody";
        let lines: Vec<String> = doc.lines().map(String::from).collect();
        let headings = document_headings(&lines, &HashSet::new());
        assert_eq!(find_section(&headings, "## Setup").unwrap().line, 0);
    }

    #[test]
    fn test_headings_inside_fences_are_ignored() {
        let doc = "```\n# not a heading\n```\n\n# Real\n\nbody";
        let p = Proposal::new("doc.md", UpdateType::Update, "new").with_section("Real");
        let report = apply_proposals(doc, &[p]);
        assert_eq!(report.text, "```\n# not a heading\n```\n\n# Real\nnew");

        let fenced = fenced_line_set(doc);
        assert!(fenced.contains(&1));
        assert!(!fenced.contains(&4));
    }

    #[test]
    fn test_missing_target_fails_update() {
        let p = Proposal::new("doc.md", UpdateType::Update, "x");
        let report = apply_proposals("a\nb", &[p]);
        assert_eq!(report.text, "a\nb");
        assert_eq!(report.failed_count(), 1);
        let error = report.outcomes[0].error().unwrap();
        assert!(matches!(error, ApplyError::MissingTarget { .. }));
        assert_eq!(error.kind(), "missing-target");
    }

    #[test]
    fn test_unknown_section_fails_soft() {
        let doc = "# A\n\nbody";
        let failing = Proposal::new("doc.md", UpdateType::Delete, "").with_section("Nope");
        let passing = update(Location::range(2, 2), "fixed");
        let report = apply_proposals(doc, &[failing, passing]);

        // The bad proposal is recorded, the good one still lands.
        assert_eq!(report.text, "# A\n\nfixed");
        assert_eq!(report.applied_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(matches!(
            report.outcomes[0].error(),
            Some(ApplyError::SectionNotFound { .. })
        ));
    }

    #[test]
    fn test_update_past_end_of_document_fails() {
        let report = apply_proposals("a\nb", &[update(Location::range(5, 6), "x")]);
        assert_eq!(report.text, "a\nb");
        assert!(matches!(report.outcomes[0].error(), Some(ApplyError::Parse(_))));
    }

    #[test]
    fn test_update_end_clamped_to_last_line() {
        let report = apply_proposals("a\nb\nc", &[update(Location::range(1, 99), "X")]);
        assert_eq!(report.text, "a\nX");
    }

    #[test]
    fn test_inverted_range_fails() {
        let report = apply_proposals("a\nb\nc", &[update(Location::range(2, 1), "x")]);
        assert!(matches!(report.outcomes[0].error(), Some(ApplyError::Parse(_))));
    }

    #[test]
    fn test_order_independence_of_nonoverlapping_updates() {
        let doc = "l0\nl1\nl2\nl3\nl4";
        let a = update(Location::range(0, 0), "A");
        let b = update(Location::range(3, 4), "B");
        let forward = apply_proposals(doc, &[a.clone(), b.clone()]);
        let reverse = apply_proposals(doc, &[b, a]);
        assert_eq!(forward.text, "A\nl1\nl2\nB");
        assert_eq!(forward.text, reverse.text);
    }

    #[test]
    fn test_bottom_to_top_keeps_pending_line_numbers_valid() {
        let doc = "a\nb\nc\nd";
        // The first proposal grows the top of the file; the second still
        // refers to the original line numbers.
        let grow = update(Location::range(0, 0), "a1\na2\na3");
        let tail = update(Location::range(3, 3), "D");
        let report = apply_proposals(doc, &[grow, tail]);
        assert_eq!(report.text, "a1\na2\na3\nb\nc\nD");
    }

    #[test]
    fn test_same_point_inserts_keep_input_order() {
        let first = Proposal::new("doc.md", UpdateType::Insert, "first").with_location(Location::line(0));
        let second = Proposal::new("doc.md", UpdateType::Insert, "second").with_location(Location::line(0));
        let report = apply_proposals("a\nb", &[first, second]);
        assert_eq!(report.text, "a\nfirst\nsecond\nb");
    }

    #[test]
    fn test_overlapping_updates_fail_the_later_proposal() {
        let doc = "a\nb\nc\nd";
        let report = apply_proposals(doc, &[update(Location::range(0, 2), "X"), update(Location::range(1, 3), "Y")]);
        assert_eq!(report.text, "X\nd");
        assert!(report.outcomes[0].is_applied());
        assert_eq!(report.outcomes[1].error().map(|e| e.kind()), Some("parse"));

        // Same ranges, reversed input order: the other proposal wins.
        let report = apply_proposals(doc, &[update(Location::range(1, 3), "Y"), update(Location::range(0, 2), "X")]);
        assert_eq!(report.text, "a\nY");
        assert!(report.outcomes[0].is_applied());
        assert_eq!(report.outcomes[1].error().map(|e| e.kind()), Some("parse"));
    }

    #[test]
    fn test_insert_inside_replaced_range_fails_soft() {
        let replace = update(Location::range(1, 3), "R");
        let inside = Proposal::new("doc.md", UpdateType::Insert, "mid").with_location(Location::line(1));
        let report = apply_proposals("a\nb\nc\nd\ne", &[replace, inside]);
        assert_eq!(report.text, "a\nR\ne");
        assert_eq!(report.applied_count(), 1);
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn test_insert_at_replaced_range_boundary_survives() {
        // "after line 0" touches the start of the replaced range, "after
        // line 3" its end; neither point is inside lines 1..3.
        let replace = update(Location::range(1, 3), "R");
        let before = Proposal::new("doc.md", UpdateType::Insert, "pre").with_location(Location::line(0));
        let after = Proposal::new("doc.md", UpdateType::Insert, "post").with_location(Location::line(3));
        let report = apply_proposals("a\nb\nc\nd\ne", &[replace, before, after]);
        assert!(report.all_applied());
        assert_eq!(report.text, "a\npre\nR\npost\ne");
    }

    #[test]
    fn test_appends_run_last_in_input_order() {
        let doc = "a\nb";
        let append_one = Proposal::new("doc.md", UpdateType::Insert, "tail1");
        let edit = update(Location::range(0, 0), "A");
        let append_two = Proposal::new("doc.md", UpdateType::Insert, "tail2");
        let report = apply_proposals(doc, &[append_one, edit, append_two]);
        assert_eq!(report.text, "A\nb\ntail1\ntail2");
    }

    #[test]
    fn test_edited_text_wins_over_model_text() {
        let mut p = update(Location::range(0, 0), "model");
        p.edited_text = Some("human".to_string());
        let report = apply_proposals("old", &[p]);
        assert_eq!(report.text, "human");
    }

    #[test]
    fn test_none_proposal_is_skipped() {
        let p = Proposal::new("doc.md", UpdateType::None, "ignored");
        let report = apply_proposals("a\nb", &[p]);
        assert_eq!(report.text, "a\nb");
        assert!(matches!(report.outcomes[0].status, ApplyStatus::Skipped));
        assert_eq!(report.applied_count(), 0);
        assert!(report.all_applied());
    }

    #[test]
    fn test_trailing_newline_is_preserved() {
        let report = apply_proposals("a\nb\n", &[update(Location::range(0, 0), "A")]);
        assert_eq!(report.text, "A\nb\n");
        let report = apply_proposals("a\nb", &[update(Location::range(0, 0), "A")]);
        assert_eq!(report.text, "A\nb");
    }

    #[test]
    fn test_empty_document_accepts_appends_only() {
        let append = Proposal::new("doc.md", UpdateType::Insert, "content");
        let report = apply_proposals("", &[append]);
        assert_eq!(report.text, "content");

        let bad = update(Location::range(0, 0), "x");
        let report = apply_proposals("", &[bad]);
        assert!(matches!(report.outcomes[0].error(), Some(ApplyError::Parse(_))));
    }
}
