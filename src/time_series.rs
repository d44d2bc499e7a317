use serde::{Deserialize, Serialize};

/// One live sample: whole seconds since the timer started, provisional wpm
/// and provisional error count at that second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub t: u64,
    pub wpm: f64,
    pub errors: u64,
}

impl Sample {
    pub fn new(t: u64, wpm: f64, errors: u64) -> Self {
        Self { t, wpm, errors }
    }
}

impl From<Sample> for (f64, f64) {
    fn from(s: Sample) -> Self {
        (s.t as f64, s.wpm)
    }
}

/// Three index-aligned sequences (time, wpm, errors). Times are strictly
/// increasing, so a second is never sampled twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    time_seconds: Vec<u64>,
    wpm_at_time: Vec<f64>,
    errors_at_time: Vec<u64>,
}

impl SampleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample. Returns `false` and leaves the series untouched when
    /// `t` does not come after the last recorded second.
    pub fn push(&mut self, sample: Sample) -> bool {
        if let Some(&last) = self.time_seconds.last() {
            if sample.t <= last {
                return false;
            }
        }
        self.time_seconds.push(sample.t);
        self.wpm_at_time.push(sample.wpm);
        self.errors_at_time.push(sample.errors);
        true
    }

    pub fn len(&self) -> usize {
        self.time_seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_seconds.is_empty()
    }

    pub fn time_seconds(&self) -> &[u64] {
        &self.time_seconds
    }

    pub fn wpm_at_time(&self) -> &[f64] {
        &self.wpm_at_time
    }

    pub fn errors_at_time(&self) -> &[u64] {
        &self.errors_at_time
    }

    pub fn last(&self) -> Option<Sample> {
        self.iter().last()
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.time_seconds
            .iter()
            .zip(&self.wpm_at_time)
            .zip(&self.errors_at_time)
            .map(|((&t, &wpm), &errors)| Sample { t, wpm, errors })
    }

    /// `(seconds, wpm)` pairs for charting.
    pub fn wpm_points(&self) -> Vec<(f64, f64)> {
        self.iter().map(Into::into).collect()
    }

    /// `(seconds, errors)` pairs for charting.
    pub fn error_points(&self) -> Vec<(f64, f64)> {
        self.iter().map(|s| (s.t as f64, s.errors as f64)).collect()
    }
}

impl FromIterator<Sample> for SampleSeries {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        let mut series = SampleSeries::new();
        for sample in iter {
            series.push(sample);
        }
        series
    }
}
