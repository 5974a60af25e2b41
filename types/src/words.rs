//! The editor's word-boundary rule.
//!
//! A word is a maximal run of word characters or `$` — view-tree component
//! names are `$`-prefixed, so the dollar sign belongs to the token.

fn is_word_char(c: char) -> bool {
    c == '$' || c == '_' || c.is_ascii_alphanumeric()
}

/// Character span `[start, end)` of the word covering `column` in `line`.
///
/// A cursor sitting immediately after a word still covers it, matching the
/// editor behavior used for completion-prefix extraction.
#[must_use]
pub fn word_span(line: &str, column: usize) -> Option<(usize, usize)> {
    let chars: Vec<char> = line.chars().collect();

    let anchor = if column < chars.len() && is_word_char(chars[column]) {
        column
    } else if column > 0 && column <= chars.len() && is_word_char(chars[column - 1]) {
        column - 1
    } else {
        return None;
    };

    let mut start = anchor;
    while start > 0 && is_word_char(chars[start - 1]) {
        start -= 1;
    }
    let mut end = anchor + 1;
    while end < chars.len() && is_word_char(chars[end]) {
        end += 1;
    }
    Some((start, end))
}

/// Length of the word token at `column`, or 0 when none covers it.
#[must_use]
pub fn word_len_at(line: &str, column: usize) -> usize {
    word_span(line, column).map_or(0, |(start, end)| end - start)
}
