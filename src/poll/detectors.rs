// Copyright (c) 2025 - Cowboy AI, Inc.
//! Convergence conditions
//!
//! - [`Level`]: level-triggered, true as soon as one snapshot qualifies
//! - [`RebootDetector`]: edge-triggered over guest uptime; counts drops

use tracing::info;

use super::Convergence;

/// Level-triggered condition from a plain predicate
pub struct Level<F>(pub F);

impl<T, F> Convergence<T> for Level<F>
where
    F: FnMut(&T) -> bool,
{
    fn observe(&mut self, snapshot: &T) -> bool {
        (self.0)(snapshot)
    }
}

/// One detected guest reboot
#[derive(Debug, Clone, PartialEq)]
pub struct RebootEvent {
    /// Running count including this reboot
    pub count: u32,
    /// Uptime seen before the drop, i.e. how long the previous boot lasted
    pub uptime_before: f64,
    pub uptime_after: f64,
}

/// Counts guest reboots from a sequence of uptime samples
///
/// Uptime only grows while a guest runs and restarts near zero after a
/// reboot, so every drop between consecutive samples is one reboot. A drop
/// no larger than `jitter_tolerance` is ignored; with the default tolerance
/// of zero every decrease counts, including reporting glitches.
///
/// Samples are seconds as reported by the provider; non-finite samples are
/// skipped without touching the history.
#[derive(Debug, Clone)]
pub struct RebootDetector {
    expected: u32,
    jitter_tolerance: f64,
    last: Option<f64>,
    events: Vec<RebootEvent>,
}

impl RebootDetector {
    pub fn new(expected: u32) -> Self {
        Self {
            expected,
            jitter_tolerance: 0.0,
            last: None,
            events: Vec::new(),
        }
    }

    pub fn with_jitter_tolerance(mut self, seconds: f64) -> Self {
        self.jitter_tolerance = seconds.max(0.0);
        self
    }

    pub fn reboots(&self) -> u32 {
        self.events.len() as u32
    }

    pub fn events(&self) -> &[RebootEvent] {
        &self.events
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }
}

impl Convergence<f64> for RebootDetector {
    fn observe(&mut self, uptime: &f64) -> bool {
        let uptime = *uptime;
        if !uptime.is_finite() {
            return self.reboots() >= self.expected;
        }

        if let Some(last) = self.last {
            if last - uptime > self.jitter_tolerance {
                let event = RebootEvent {
                    count: self.reboots() + 1,
                    uptime_before: last,
                    uptime_after: uptime,
                };
                info!(
                    "Detected reboot {} after {} seconds of uptime",
                    event.count, event.uptime_before
                );
                self.events.push(event);
            }
        }
        self.last = Some(uptime);

        self.reboots() >= self.expected
    }
}
