// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Reboot Detection

use cim_image_builder::poll::{Convergence, RebootDetector};
use proptest::prelude::*;

fn uptime() -> impl Strategy<Value = f64> {
    0.0f64..10_000.0
}

fn uptimes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(uptime(), 0..40)
}

fn drops(samples: &[f64], tolerance: f64) -> u32 {
    samples
        .windows(2)
        .filter(|pair| pair[0] - pair[1] > tolerance)
        .count() as u32
}

proptest! {
    /// Property: the detector counts exactly the drops between samples
    #[test]
    fn prop_reboots_equal_drops(samples in uptimes()) {
        let mut detector = RebootDetector::new(u32::MAX);
        for sample in &samples {
            detector.observe(sample);
        }

        prop_assert_eq!(detector.reboots(), drops(&samples, 0.0));
    }

    /// Property: a tolerance only ever hides reboots
    #[test]
    fn prop_tolerance_never_adds_reboots(samples in uptimes(), tolerance in 0.0f64..500.0) {
        let mut strict = RebootDetector::new(u32::MAX);
        let mut tolerant = RebootDetector::new(u32::MAX).with_jitter_tolerance(tolerance);
        for sample in &samples {
            strict.observe(sample);
            tolerant.observe(sample);
        }

        prop_assert!(tolerant.reboots() <= strict.reboots());
        prop_assert_eq!(tolerant.reboots(), drops(&samples, tolerance));
    }

    /// Property: monotonic uptime never converges on a positive target
    #[test]
    fn prop_monotonic_uptime_never_converges(mut samples in uptimes(), expected in 1u32..5) {
        samples.sort_by(f64::total_cmp);
        let mut detector = RebootDetector::new(expected);

        prop_assert!(samples.iter().all(|sample| !detector.observe(sample)));
    }

    /// Property: non-finite samples leave the count untouched
    #[test]
    fn prop_non_finite_samples_are_ignored(samples in uptimes()) {
        let mut clean = RebootDetector::new(u32::MAX);
        let mut noisy = RebootDetector::new(u32::MAX);
        for sample in &samples {
            clean.observe(sample);
            noisy.observe(sample);
            noisy.observe(&f64::NAN);
            noisy.observe(&f64::INFINITY);
        }

        prop_assert_eq!(clean.reboots(), noisy.reboots());
    }
}
