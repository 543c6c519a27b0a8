use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramOpts, HistogramVec, IntCounterVec,
};

use super::{Action, Outcome};

const DEFAULT_BUCKETS: &[f64] = &[
    5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0,
];

// Compile requests by mode and outcome
static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "oker_compile_requests_total",
        "Compile requests handled since oker-web started",
        &["action", "outcome"]
    )
    .unwrap()
});

// Histogram for end-to-end compile latency
static DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "oker_compile_duration_ms",
        "Compile request latency in milliseconds, including toolchain run time",
    )
    .buckets(DEFAULT_BUCKETS.to_vec());
    register_histogram_vec!(opts, &["action"]).unwrap()
});

/// Records one handled compile request.
pub fn observe(action: Action, outcome: &Outcome, elapsed: Duration) {
    REQUESTS
        .with_label_values(&[action.as_str(), outcome.label()])
        .inc();
    DURATION
        .with_label_values(&[action.as_str()])
        .observe(elapsed.as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_counts_by_outcome() {
        let before = REQUESTS
            .with_label_values(&["ast", "timed_out"])
            .get();

        observe(Action::Ast, &Outcome::TimedOut(10), Duration::from_millis(42));
        observe(Action::Ast, &Outcome::TimedOut(10), Duration::from_millis(42));

        let after = REQUESTS
            .with_label_values(&["ast", "timed_out"])
            .get();
        assert_eq!(before + 2, after);

        let samples = DURATION.with_label_values(&["ast"]).get_sample_count();
        assert!(samples >= 2);
    }
}
