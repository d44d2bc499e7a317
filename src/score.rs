//! Final scoring of a finished typing session.
//!
//! Everything here is a pure function of its inputs. Numeric edge cases have
//! explicit defaults (accuracy is 0 when nothing was typed, consistency is
//! 100 with fewer than two samples) so a score can always be produced.

use serde::{Deserialize, Serialize};

use crate::alignment::lcs_len;
use crate::text::word_tokens;
use crate::time_series::SampleSeries;
use crate::util::{clamp_percent, mean, std_dev};

/// Terminal artifact of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub elapsed_seconds: u64,
    pub total_chars: usize,
    pub correct_chars: usize,
    pub incorrect_chars: usize,
    pub extra_chars: usize,
    pub missed_chars: usize,
    pub total_words: usize,
    pub correct_words: usize,
    pub wpm: f64,
    pub net_wpm: f64,
    pub accuracy_percent: f64,
    pub consistency_percent: f64,
    pub typos: usize,
}

/// Positional character comparison of the typed text against the reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharBreakdown {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub extra: usize,
    pub missed: usize,
}

impl CharBreakdown {
    pub fn typos(&self) -> usize {
        self.incorrect + self.extra + self.missed
    }
}

/// Word-level metrics derived from the LCS alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordMetrics {
    pub total_words: usize,
    pub correct_words: usize,
    pub accuracy_percent: f64,
}

/// Per-position verdict used when reviewing a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharMark {
    Correct(char),
    /// typed character differs from the expected one
    Incorrect {
        expected: char,
        typed: char,
    },
    /// typed past the end of the reference
    Extra(char),
    /// reference character never reached
    Missed(char),
}

/// Compare `typed` to `reference` position by position over their overlap.
pub fn char_breakdown(reference: &str, typed: &str) -> CharBreakdown {
    let reference_len = reference.chars().count();
    let typed_len = typed.chars().count();

    let correct = reference
        .chars()
        .zip(typed.chars())
        .filter(|(expected, actual)| expected == actual)
        .count();
    let overlap = reference_len.min(typed_len);

    CharBreakdown {
        total: typed_len,
        correct,
        incorrect: overlap - correct,
        extra: typed_len.saturating_sub(reference_len),
        missed: reference_len.saturating_sub(typed_len),
    }
}

/// Align the word streams and derive correct/total word counts and accuracy.
pub fn word_metrics(reference: &str, typed: &str) -> WordMetrics {
    let reference_tokens = word_tokens(reference);
    let typed_tokens = word_tokens(typed);

    let correct_words = lcs_len(&reference_tokens, &typed_tokens);
    let total_words = typed_tokens.iter().filter(|t| !t.is_empty()).count();

    // Punctuation-only tokens match each other but are not counted as typed
    // words, so the ratio can exceed 1.
    let accuracy_percent = if total_words == 0 {
        0.0
    } else {
        clamp_percent(correct_words as f64 / total_words as f64 * 100.0)
    };

    WordMetrics {
        total_words,
        correct_words,
        accuracy_percent,
    }
}

/// Correctly aligned words per elapsed minute.
pub fn words_per_minute(correct_words: usize, elapsed_seconds: u64) -> f64 {
    if elapsed_seconds == 0 {
        return 0.0;
    }
    correct_words as f64 / (elapsed_seconds as f64 / 60.0)
}

/// 100 minus the relative standard deviation of the wpm series, clamped to
/// `0..=100`. A mean below 1 wpm is treated as 1.
pub fn consistency(wpm_series: &[f64]) -> f64 {
    if wpm_series.len() < 2 {
        return 100.0;
    }
    match (mean(wpm_series), std_dev(wpm_series)) {
        (Some(avg), Some(sd)) => clamp_percent(100.0 - (sd / avg.max(1.0)) * 100.0),
        _ => 100.0,
    }
}

/// Whole seconds for scoring, never below 1.
pub fn clamp_elapsed(elapsed_seconds: i64) -> u64 {
    elapsed_seconds.max(1) as u64
}

pub fn score(
    reference: &str,
    typed: &str,
    elapsed_seconds: i64,
    series: &SampleSeries,
) -> ScoreResult {
    let elapsed_seconds = clamp_elapsed(elapsed_seconds);
    let chars = char_breakdown(reference, typed);
    let words = word_metrics(reference, typed);

    let wpm = words_per_minute(words.correct_words, elapsed_seconds);
    let net_wpm = wpm * (words.accuracy_percent / 100.0);

    ScoreResult {
        elapsed_seconds,
        total_chars: chars.total,
        correct_chars: chars.correct,
        incorrect_chars: chars.incorrect,
        extra_chars: chars.extra,
        missed_chars: chars.missed,
        total_words: words.total_words,
        correct_words: words.correct_words,
        wpm,
        net_wpm,
        accuracy_percent: words.accuracy_percent,
        consistency_percent: consistency(series.wpm_at_time()),
        typos: chars.typos(),
    }
}

/// Verdict for every position in `max(len(reference), len(typed))`.
pub fn mark_chars(reference: &str, typed: &str) -> Vec<CharMark> {
    let mut expected = reference.chars();
    let mut actual = typed.chars();
    let mut marks = Vec::new();

    loop {
        let mark = match (expected.next(), actual.next()) {
            (Some(e), Some(a)) if e == a => CharMark::Correct(a),
            (Some(e), Some(a)) => CharMark::Incorrect {
                expected: e,
                typed: a,
            },
            (None, Some(a)) => CharMark::Extra(a),
            (Some(e), None) => CharMark::Missed(e),
            (None, None) => break,
        };
        marks.push(mark);
    }

    marks
}
