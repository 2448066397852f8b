// Copyright (c) 2025 - Cowboy AI, Inc.
//! Convergence poller tests
//!
//! All tests run on tokio's paused clock: sleeps advance virtual time
//! instantly, so elapsed-time bounds are exact.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::time::Duration;

use cim_image_builder::context::CancelFlag;
use cim_image_builder::errors::{BuildError, BuildResult};
use cim_image_builder::poll::{poll_until, Level, PollPolicy, Probe, RebootDetector};

/// Probe replaying a fixed script; the last entry repeats
struct Scripted<T> {
    results: VecDeque<BuildResult<T>>,
    calls: u32,
    cancel_after: Option<(u32, CancelFlag)>,
}

impl<T: Clone> Scripted<T> {
    fn values(values: impl IntoIterator<Item = T>) -> Self {
        Self::results(values.into_iter().map(Ok).collect())
    }

    fn results(results: Vec<BuildResult<T>>) -> Self {
        Self {
            results: results.into(),
            calls: 0,
            cancel_after: None,
        }
    }

    fn cancelling_after(mut self, calls: u32, flag: &CancelFlag) -> Self {
        self.cancel_after = Some((calls, flag.clone()));
        self
    }
}

#[async_trait]
impl<T> Probe for Scripted<T>
where
    T: Clone + std::fmt::Debug + Send + Sync,
{
    type Snapshot = T;

    fn describe(&self) -> String {
        "scripted value".to_string()
    }

    async fn probe(&mut self) -> BuildResult<T> {
        self.calls += 1;
        if let Some((after, flag)) = &self.cancel_after {
            if self.calls >= *after {
                flag.cancel();
            }
        }
        if self.results.len() > 1 {
            self.results
                .pop_front()
                .unwrap_or_else(|| Err(BuildError::external("probe", "exhausted")))
        } else {
            self.results
                .front()
                .cloned()
                .unwrap_or_else(|| Err(BuildError::external("probe", "exhausted")))
        }
    }
}

fn policy(attempts: u32) -> PollPolicy {
    PollPolicy::new(Duration::from_secs(10), attempts)
}

#[tokio::test(start_paused = true)]
async fn test_level_condition_converges_on_first_match() {
    let mut probe = Scripted::values([0, 0, 7, 9]);
    let mut condition = Level(|value: &i32| *value > 0);

    let polled = poll_until(&policy(10), &mut probe, &mut condition, None)
        .await
        .unwrap();

    assert_eq!(polled.snapshot, 7);
    assert_eq!(polled.attempts, 3);
    assert_eq!(polled.elapsed, Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_first_probe_success_does_not_sleep() {
    let mut probe = Scripted::values([1]);
    let mut condition = Level(|value: &i32| *value == 1);

    let polled = poll_until(&policy(5), &mut probe, &mut condition, None)
        .await
        .unwrap();

    assert_eq!(polled.attempts, 1);
    assert_eq!(polled.elapsed, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_single_reboot_is_detected_on_drop() {
    let mut probe = Scripted::values([5.0, 40.0, 75.0, 3.0, 30.0]);
    let mut detector = RebootDetector::new(1);

    let polled = poll_until(&policy(20), &mut probe, &mut detector, None)
        .await
        .unwrap();

    assert_eq!(polled.attempts, 4);
    assert_eq!(polled.snapshot, 3.0);
    assert_eq!(detector.reboots(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_two_reboots_are_both_required() {
    let mut probe = Scripted::values([5.0, 40.0, 75.0, 3.0, 30.0, 2.0, 50.0]);
    let mut detector = RebootDetector::new(2);

    let polled = poll_until(&policy(20), &mut probe, &mut detector, None)
        .await
        .unwrap();

    assert_eq!(polled.attempts, 6);
    assert_eq!(detector.events().len(), 2);
    assert_eq!(detector.events()[1].uptime_before, 30.0);
}

#[tokio::test(start_paused = true)]
async fn test_monotonic_uptime_times_out() {
    let mut probe = Scripted::values([5.0, 15.0, 25.0, 35.0, 45.0]);
    let mut detector = RebootDetector::new(1);

    let err = poll_until(&policy(5), &mut probe, &mut detector, None)
        .await
        .unwrap_err();

    match err {
        BuildError::Timeout {
            what,
            attempts,
            elapsed,
        } => {
            assert_eq!(what, "scripted value");
            assert_eq!(attempts, 5);
            assert_eq!(elapsed, Duration::from_secs(40));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_elapsed_never_exceeds_interval_times_attempts_minus_one() {
    let started = tokio::time::Instant::now();
    let mut probe = Scripted::values([false]);
    let mut condition = Level(|value: &bool| *value);

    let _ = poll_until(&policy(4), &mut probe, &mut condition, None).await;

    assert!(started.elapsed() <= Duration::from_secs(30));
    assert_eq!(probe.calls, 4);
}

#[tokio::test(start_paused = true)]
async fn test_max_elapsed_caps_the_wait() {
    let mut probe = Scripted::values([false]);
    let mut condition = Level(|value: &bool| *value);
    let capped = policy(100).with_max_elapsed(Duration::from_secs(35));

    let err = poll_until(&capped, &mut probe, &mut condition, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Timeout { attempts: 4, .. }));
    assert_eq!(capped.worst_case(), Duration::from_secs(35));
}

#[tokio::test(start_paused = true)]
async fn test_one_failed_probe_is_tolerated() {
    let mut probe = Scripted::results(vec![
        Ok(0),
        Err(BuildError::external("probe", "transient")),
        Ok(1),
    ]);
    let mut condition = Level(|value: &i32| *value == 1);

    let polled = poll_until(&policy(10), &mut probe, &mut condition, None)
        .await
        .unwrap();

    assert_eq!(polled.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_two_consecutive_failed_probes_abort() {
    let mut probe = Scripted::results(vec![
        Ok(0),
        Err(BuildError::external("probe", "first")),
        Err(BuildError::external("probe", "second")),
        Ok(1),
    ]);
    let mut condition = Level(|value: &i32| *value == 1);

    let err = poll_until(&policy(10), &mut probe, &mut condition, None)
        .await
        .unwrap_err();

    assert_eq!(err, BuildError::external("probe", "second"));
}

#[tokio::test(start_paused = true)]
async fn test_tolerance_is_configurable() {
    let mut probe = Scripted::results(vec![
        Err(BuildError::external("probe", "first")),
        Err(BuildError::external("probe", "second")),
        Ok(1),
    ]);
    let mut condition = Level(|value: &i32| *value == 1);

    let strict = policy(10).tolerating(0);
    let err = poll_until(&strict, &mut probe, &mut condition, None)
        .await
        .unwrap_err();
    assert_eq!(err, BuildError::external("probe", "first"));

    let mut probe = Scripted::results(vec![
        Err(BuildError::external("probe", "first")),
        Err(BuildError::external("probe", "second")),
        Ok(1),
    ]);
    let lenient = policy(10).tolerating(2);
    let polled = poll_until(&lenient, &mut probe, &mut condition, None)
        .await
        .unwrap();
    assert_eq!(polled.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_probe_error_is_not_tolerated() {
    let mut probe = Scripted::results(vec![Err(BuildError::Cancelled), Ok(1)]);
    let mut condition = Level(|value: &i32| *value == 1);

    let err = poll_until(&policy(10), &mut probe, &mut condition, None)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_is_observed_at_next_attempt() {
    let flag = CancelFlag::new();
    let mut probe = Scripted::values([false]).cancelling_after(2, &flag);
    let mut condition = Level(|value: &bool| *value);

    let err = poll_until(&policy(10), &mut probe, &mut condition, Some(&flag))
        .await
        .unwrap_err();

    assert_eq!(err, BuildError::Cancelled);
    assert_eq!(probe.calls, 2);
}

#[tokio::test(start_paused = true)]
async fn test_already_cancelled_never_probes() {
    let flag = CancelFlag::new();
    flag.cancel();
    let mut probe = Scripted::values([true]);
    let mut condition = Level(|value: &bool| *value);

    let err = poll_until(&policy(10), &mut probe, &mut condition, Some(&flag))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(probe.calls, 0);
}
