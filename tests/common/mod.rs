//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use gstpl_rs::{Pipeline, PipelineError, Sample};
use std::time::{Duration, Instant};

/// Upper bound for anything that should happen "promptly"
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Receive until the first error, returning the samples and that error
pub fn drain(pipeline: &Pipeline) -> (Vec<Sample>, PipelineError) {
    let mut samples = Vec::new();
    loop {
        match pipeline.recv() {
            Ok(sample) => samples.push(sample),
            Err(err) => return (samples, err),
        }
    }
}

/// Run `f` and return its result with the elapsed wall time
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let t0 = Instant::now();
    let value = f();
    (value, t0.elapsed())
}

/// Assert a duration falls within `[min, max]`
pub fn assert_between(actual: Duration, min: Duration, max: Duration) {
    assert!(
        actual >= min && actual <= max,
        "Expected {:?} to be between {:?} and {:?}",
        actual,
        min,
        max
    );
}
