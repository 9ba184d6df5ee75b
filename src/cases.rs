//! Structured extraction of test cases from free-form oracle answers.
//!
//! The oracle is asked to answer in this shape:
//!
//! ````text
//! Test Case 1: Adding a Product to the Cart
//! ...description...
//! Selenium Code (Python):
//! ```python
//! ...script...
//! ```
//! ````
//!
//! Parsing is purely syntactic and never fails: headers found outside code
//! fences split the answer into segments, and each segment that carries the
//! script marker followed by a fenced block becomes a [`TestCaseRecord`].
//! Anything else is dropped, so an answer that ignores the format yields an
//! empty list.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

use crate::models::TestCaseRecord;

const FENCE: &str = "```";

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Test Case[ \t]+(\d+[A-Za-z]?)[ \t]*\**[ \t]*:").expect("valid header regex")
    })
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Selenium Code \(Python\)[ \t]*\**[ \t]*:").expect("valid marker regex")
    })
}

/// Extracts every test case from `answer`, in order of appearance.
///
/// With `require_script`, only cases followed by the script marker and a
/// fenced code block are returned. Without it, cases lacking a script are
/// kept with `script = None` and their whole segment as the body.
pub fn parse_test_cases(answer: &str, require_script: bool) -> Vec<TestCaseRecord> {
    let fences = fence_ranges(answer);
    let inside_fence = |pos: usize| fences.iter().any(|r| r.contains(&pos));

    let headers: Vec<(usize, usize, String)> = header_re()
        .captures_iter(answer)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if inside_fence(whole.start()) {
                return None;
            }
            Some((whole.start(), whole.end(), caps[1].to_string()))
        })
        .collect();

    let mut records = Vec::new();

    for (i, (_, body_start, id)) in headers.iter().enumerate() {
        let segment_end = headers
            .get(i + 1)
            .map(|(start, _, _)| *start)
            .unwrap_or(answer.len());
        let segment = &answer[*body_start..segment_end];

        match split_script(segment) {
            Some((body, script)) => records.push(TestCaseRecord {
                id: id.clone(),
                body: clean_text(body),
                script: Some(script),
            }),
            None if !require_script => records.push(TestCaseRecord {
                id: id.clone(),
                body: clean_text(segment),
                script: None,
            }),
            None => {}
        }
    }

    records
}

/// Splits a segment into (description, script) at the script marker.
fn split_script(segment: &str) -> Option<(&str, String)> {
    let marker = marker_re().find(segment)?;
    let after = segment[marker.end()..].trim_start_matches(|c: char| c.is_whitespace() || c == '*');
    let fenced = after.strip_prefix(FENCE)?;

    // Skip the info string (`python`, `py`, or nothing) up to the newline.
    let newline = fenced.find('\n')?;
    let code = &fenced[newline + 1..];
    let close = fence_marks(code).first().copied()?;

    let script = code[..close]
        .trim_start_matches(['\r', '\n'])
        .trim_end()
        .to_string();
    Some((&segment[..marker.start()], script))
}

/// Byte offsets of fence markers. Like Markdown, a fence only counts at
/// the start of a line, after optional indentation; inline backticks in
/// prose are ignored.
fn fence_marks(text: &str) -> Vec<usize> {
    let mut marks = Vec::new();
    let mut line_start = 0;
    for line in text.split_inclusive('\n') {
        let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
        if line[indent..].starts_with(FENCE) {
            marks.push(line_start + indent);
        }
        line_start += line.len();
    }
    marks
}

/// Byte ranges covered by fenced code blocks. An unclosed fence runs to the
/// end of the text.
fn fence_ranges(text: &str) -> Vec<Range<usize>> {
    fence_marks(text)
        .chunks(2)
        .map(|pair| match pair.get(1) {
            Some(close) => pair[0]..close + FENCE.len(),
            None => pair[0]..text.len(),
        })
        .collect()
}

/// Trims whitespace and the `**` left over from a bold header line or a
/// bold script marker. Other asterisks in the description are kept.
fn clean_text(text: &str) -> String {
    let trimmed = strip_bold(text);
    match trimmed.split_once('\n') {
        Some((title, rest)) => format!("{}\n{}", strip_bold(title), rest),
        None => trimmed.to_string(),
    }
}

fn strip_bold(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix("**").unwrap_or(text).trim_start();
    text.strip_suffix("**").unwrap_or(text).trim_end()
}
