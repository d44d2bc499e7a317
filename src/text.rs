//! Word-level text handling shared by the scorer and the live sampler.

use itertools::Itertools;

/// Collapse every whitespace run (spaces, tabs, newlines) to a single space
/// and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}

/// Words of the whitespace-normalized text. Empty or all-whitespace input
/// yields no words.
pub fn split_words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Comparison token for a single word: surrounding non-alphanumeric
/// characters are stripped and the rest is lower-cased. A word made only of
/// punctuation becomes the empty token.
pub fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_lowercase()
}

/// Comparison tokens for a whole passage, in order.
pub fn word_tokens(text: &str) -> Vec<String> {
    split_words(text).into_iter().map(normalize_word).collect()
}

/// Raw word count used for live metrics: whitespace-delimited, no alignment.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
