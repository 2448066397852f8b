// Copyright (c) 2025 - Cowboy AI, Inc.
//! Convergence Poller
//!
//! Bounded waits for external, eventually-consistent state: a guest getting
//! an address, a guest finishing its reboot cycle, a remote channel starting
//! to answer. Nothing pushes these transitions to us, so we probe.
//!
//! # Shape of a wait
//!
//! ```text
//! ┌─► cancelled? ──yes──► Err(Cancelled)
//! │      │ no
//! │   probe() ──err──► tolerated? ──no──► Err(probe error)
//! │      │ ok              │ yes
//! │   converged? ──yes──► Ok(Polled)
//! │      │ no              │
//! │   bound reached? ◄─────┘ ──yes──► Err(Timeout)
//! │      │ no
//! └── sleep(interval)
//! ```
//!
//! # Guarantees
//!
//! - At most `max_attempts` probes and `max_attempts - 1` sleeps, so the
//!   worst case is bounded by `interval * max_attempts` plus probe time.
//! - If `max_elapsed` is set, the poller never starts a sleep that would
//!   end past it.
//! - Cancellation is observed only between attempts; an in-flight probe or
//!   sleep is never interrupted.
//! - Consecutive probe failures up to `tolerated_probe_failures` count as
//!   attempts without progress; one more aborts the wait with the probe's
//!   own error.

pub mod detectors;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::context::CancelFlag;
use crate::errors::{BuildError, BuildResult};

pub use detectors::{Level, RebootDetector, RebootEvent};

/// Interval and bounds of one convergence wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub max_elapsed: Option<Duration>,
    pub tolerated_probe_failures: u32,
}

impl PollPolicy {
    /// Attempt-bounded policy tolerating one bad probe
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            max_elapsed: None,
            tolerated_probe_failures: 1,
        }
    }

    /// Additionally bound the wait by wall-clock time
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    pub fn tolerating(mut self, tolerated_probe_failures: u32) -> Self {
        self.tolerated_probe_failures = tolerated_probe_failures;
        self
    }

    /// Upper bound on time spent sleeping between probes
    pub fn worst_case(&self) -> Duration {
        let bound = self.interval * self.max_attempts.max(1);
        match self.max_elapsed {
            Some(max_elapsed) => bound.min(max_elapsed),
            None => bound,
        }
    }
}

/// Source of snapshots for a wait
#[async_trait]
pub trait Probe: Send {
    type Snapshot: fmt::Debug + Send;

    /// What is being waited for, used in timeout errors
    fn describe(&self) -> String;

    async fn probe(&mut self) -> BuildResult<Self::Snapshot>;
}

/// Success condition over the snapshots seen so far
///
/// Stateless predicates use [`Level`]; edge detectors such as
/// [`RebootDetector`] keep their own history between calls.
pub trait Convergence<T> {
    fn observe(&mut self, snapshot: &T) -> bool;
}

/// A converged wait
#[derive(Debug, Clone, PartialEq)]
pub struct Polled<T> {
    /// Snapshot that satisfied the condition
    pub snapshot: T,
    /// Probes issued, including failed ones
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Probe until `condition` holds or the policy's bound is reached
pub async fn poll_until<P, C>(
    policy: &PollPolicy,
    probe: &mut P,
    condition: &mut C,
    cancel: Option<&CancelFlag>,
) -> BuildResult<Polled<P::Snapshot>>
where
    P: Probe,
    C: Convergence<P::Snapshot> + Send,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0u32;
    let mut consecutive_failures = 0u32;

    loop {
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(BuildError::Cancelled);
        }

        attempts += 1;
        match probe.probe().await {
            Ok(snapshot) => {
                consecutive_failures = 0;
                if condition.observe(&snapshot) {
                    debug!(
                        "{} converged after {} attempts: {:?}",
                        probe.describe(),
                        attempts,
                        snapshot
                    );
                    return Ok(Polled {
                        snapshot,
                        attempts,
                        elapsed: started.elapsed(),
                    });
                }
                debug!("{} not yet converged: {:?}", probe.describe(), snapshot);
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                consecutive_failures += 1;
                if consecutive_failures > policy.tolerated_probe_failures {
                    return Err(err);
                }
                warn!(
                    "{} probe failed ({} of {} tolerated): {}",
                    probe.describe(),
                    consecutive_failures,
                    policy.tolerated_probe_failures,
                    err
                );
            }
        }

        let elapsed = started.elapsed();
        let out_of_time = policy
            .max_elapsed
            .is_some_and(|max_elapsed| elapsed + policy.interval > max_elapsed);
        if attempts >= max_attempts || out_of_time {
            return Err(BuildError::Timeout {
                what: probe.describe(),
                attempts,
                elapsed,
            });
        }

        tokio::time::sleep(policy.interval).await;
    }
}
