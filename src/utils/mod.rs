//! Small text helpers shared across processors.

pub mod patterns;

/// Collapse every run of three or more blank lines down to a single blank
/// line. Shorter runs are left alone. Lines containing only whitespace count
/// as blank but survive verbatim when their run is short enough.
pub fn collapse_excess_blank_lines(text: &str) -> String {
    fn flush<'a>(out: &mut Vec<&'a str>, blank_run: &mut Vec<&'a str>) {
        if blank_run.len() >= 3 {
            blank_run.clear();
            out.push("");
        } else {
            out.append(blank_run);
        }
    }

    let ends_with_newline = text.ends_with('\n');
    let mut out: Vec<&str> = Vec::new();
    let mut blank_run: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run.push(line);
        } else {
            flush(&mut out, &mut blank_run);
            out.push(line);
        }
    }
    flush(&mut out, &mut blank_run);

    let mut result = out.join("\n");
    if ends_with_newline && !result.is_empty() {
        result.push('\n');
    }
    result
}

/// Remove trailing spaces and tabs from every line.
pub fn strip_trailing_spaces(text: &str) -> String {
    let ends_with_newline = text.ends_with('\n');
    let mut result = text
        .lines()
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join("\n");
    if ends_with_newline && !result.is_empty() {
        result.push('\n');
    }
    result
}

/// Line ending convention of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Detect whether a document uses CRLF or LF line endings. Any `\r\n`
/// marks the whole document as CRLF; documents without line breaks
/// report LF.
pub fn detect_line_ending(text: &str) -> LineEnding {
    if text.contains("\r\n") {
        LineEnding::CrLf
    } else {
        LineEnding::Lf
    }
}

/// Rewrite `text` to use the given line ending convention.
pub fn normalize_line_ending(text: &str, ending: LineEnding) -> String {
    let unified = text.replace("\r\n", "\n");
    match ending {
        LineEnding::Lf => unified,
        LineEnding::CrLf => unified.replace('\n', "\r\n"),
    }
}

/// Drop blank lines at the very end of the text, keeping at most the final
/// newline of the last content line.
pub fn trim_trailing_blank_lines(text: &str) -> String {
    let ends_with_newline = text.ends_with('\n');
    let trimmed = text.trim_end_matches(|c| c == '\n' || c == ' ' || c == '\t' || c == '\r');
    if trimmed.is_empty() {
        return String::new();
    }
    let mut result = trimmed.to_string();
    if ends_with_newline {
        result.push('\n');
    }
    result
}
