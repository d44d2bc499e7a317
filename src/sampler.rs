//! Live metrics recorded while a session is running.
//!
//! These are provisional: raw whitespace word counts and positional error
//! counts, cheap enough to compute on every poll. They only feed the
//! consistency metric and the results chart; the final score is computed
//! separately by [`crate::score::score`].

use crate::text::count_words;
use crate::time_series::{Sample, SampleSeries};

/// Whitespace-delimited words typed so far divided by elapsed minutes. The
/// minute count never drops below one second's worth.
pub fn provisional_wpm(typed: &str, seconds: u64) -> f64 {
    let minutes = (seconds as f64 / 60.0).max(1.0 / 60.0);
    count_words(typed) as f64 / minutes
}

/// Typed characters that do not match the reference at the same position.
/// Characters past the end of the reference count as errors.
pub fn provisional_errors(reference: &[char], typed: &[char]) -> u64 {
    let correct = reference
        .iter()
        .zip(typed)
        .filter(|(expected, actual)| expected == actual)
        .count();
    typed.len().saturating_sub(correct) as u64
}

/// Appends at most one sample per whole second to a [`SampleSeries`].
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    last_second: u64,
    series: SampleSeries,
}

impl Sampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample if `seconds` is a second boundary not yet sampled.
    /// Second 0 is never sampled.
    pub fn observe(&mut self, seconds: u64, reference: &[char], typed: &[char]) -> Option<Sample> {
        if seconds == self.last_second {
            return None;
        }

        let typed_text: String = typed.iter().collect();
        let sample = Sample::new(
            seconds,
            provisional_wpm(&typed_text, seconds),
            provisional_errors(reference, typed),
        );

        if self.series.push(sample) {
            self.last_second = seconds;
            Some(sample)
        } else {
            None
        }
    }

    pub fn series(&self) -> &SampleSeries {
        &self.series
    }

    pub fn into_series(self) -> SampleSeries {
        self.series
    }
}
