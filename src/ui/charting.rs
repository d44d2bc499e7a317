use crate::time_series::SampleSeries;

/// Axis bounds for the results chart
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartBounds {
    pub seconds: f64,
    pub wpm: f64,
    pub errors: f64,
}

/// X runs to the last sampled second (or the elapsed time when nothing was
/// sampled), Y to the highest wpm seen. Both are at least 1.
pub fn compute_chart_bounds(series: &SampleSeries, elapsed_seconds: u64) -> ChartBounds {
    let seconds = series
        .last()
        .map(|s| s.t as f64)
        .unwrap_or(elapsed_seconds as f64)
        .max(1.0);
    let wpm = series
        .wpm_at_time()
        .iter()
        .copied()
        .fold(0.0_f64, f64::max)
        .ceil()
        .max(1.0);
    let errors = series
        .errors_at_time()
        .iter()
        .copied()
        .max()
        .unwrap_or(0)
        .max(1) as f64;

    ChartBounds {
        seconds,
        wpm,
        errors,
    }
}

/// Errors are drawn on the wpm axis, scaled so the peak error count meets the
/// top of the chart.
pub fn scaled_error_points(series: &SampleSeries, bounds: &ChartBounds) -> Vec<(f64, f64)> {
    let scale = bounds.wpm / bounds.errors;
    series
        .error_points()
        .into_iter()
        .map(|(t, e)| (t, e * scale))
        .collect()
}

/// Format a simple numeric label consistently
pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.2}")
    }
}
