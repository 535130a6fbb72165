//! Terminal formatting for diff previews.

use colored::*;
use similar::{ChangeTag, TextDiff};

/// Render a colored unified diff between the original and cleaned text.
pub fn generate_diff(original: &str, cleaned: &str, path: &str) -> String {
    let diff = TextDiff::from_lines(original, cleaned);
    let mut out = String::new();
    out.push_str(&format!("{}\n", format!("--- {path}").bold()));
    out.push_str(&format!("{}\n", format!("+++ {path} (cleaned)").bold()));

    for group in diff.grouped_ops(3) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_start = first.old_range().start;
        let old_len = last.old_range().end - old_start;
        let new_start = first.new_range().start;
        let new_len = last.new_range().end - new_start;
        let header = format!("@@ -{},{} +{},{} @@", old_start + 1, old_len, new_start + 1, new_len);
        out.push_str(&format!("{}\n", header.cyan()));

        for op in &group {
            for change in diff.iter_changes(op) {
                let value = change.value();
                let body = value.strip_suffix('\n').unwrap_or(value);
                let line = match change.tag() {
                    ChangeTag::Delete => format!("-{body}").red().to_string(),
                    ChangeTag::Insert => format!("+{body}").green().to_string(),
                    ChangeTag::Equal => format!(" {body}"),
                };
                out.push_str(&line);
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_diff(original: &str, cleaned: &str) -> String {
        colored::control::set_override(false);
        generate_diff(original, cleaned, "doc.md")
    }

    #[test]
    fn test_diff_headers_name_the_file() {
        let out = plain_diff("a\n", "b\n");
        assert!(out.starts_with("--- doc.md\n+++ doc.md (cleaned)\n"));
    }

    #[test]
    fn test_diff_marks_changed_lines() {
        let out = plain_diff("keep\nold\n", "keep\nnew\n");
        assert!(out.contains(" keep\n"));
        assert!(out.contains("-old\n"));
        assert!(out.contains("+new\n"));
    }

    #[test]
    fn test_diff_hunk_header_uses_one_based_lines() {
        let out = plain_diff("a\nb\n", "a\nc\n");
        assert!(out.contains("@@ -1,2 +1,2 @@"), "got:\n{out}");
    }

    #[test]
    fn test_diff_handles_missing_trailing_newline() {
        let out = plain_diff("line", "line changed");
        assert!(out.contains("-line\n"));
        assert!(out.contains("+line changed\n"));
    }

    #[test]
    fn test_identical_text_yields_no_hunks() {
        let out = plain_diff("same\n", "same\n");
        assert_eq!(out, "--- doc.md\n+++ doc.md (cleaned)\n");
    }
}
