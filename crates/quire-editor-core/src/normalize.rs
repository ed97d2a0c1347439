//! Content normalization applied before a text is broadcast or saved.
//!
//! Runs of three or more blank lines collapse to exactly two. A line counts as
//! blank when it holds nothing but whitespace; the two lines that survive a
//! collapse are kept verbatim. Everything else passes through untouched, so
//! normalizing an already normalized text is a no-op.

use std::borrow::Cow;

/// Longest run of blank lines kept as is.
pub const MAX_BLANK_LINES: usize = 2;

/// Normalize `text`, borrowing when nothing needs to change.
pub fn normalize(text: &str) -> Cow<'_, str> {
    if !needs_collapse(text) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    let mut first = true;

    for line in text.split('\n') {
        if is_blank(line) {
            blank_run += 1;
            if blank_run > MAX_BLANK_LINES {
                continue;
            }
        } else {
            blank_run = 0;
        }

        if !first {
            out.push('\n');
        }
        out.push_str(line);
        first = false;
    }

    Cow::Owned(out)
}

/// True if [`normalize`] would change `text`.
pub fn needs_collapse(text: &str) -> bool {
    let mut blank_run = 0;
    for line in text.split('\n') {
        if is_blank(line) {
            blank_run += 1;
            if blank_run > MAX_BLANK_LINES {
                return true;
            }
        } else {
            blank_run = 0;
        }
    }
    false
}

fn is_blank(line: &str) -> bool {
    line.chars().all(char::is_whitespace)
}
