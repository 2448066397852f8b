// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Saga Unwinding

use cim_image_builder::saga::{Outcome, SagaRunner, Step};
use proptest::prelude::*;

use crate::fixtures::{entries, journal, Harness, Script, ScriptedStep};

/// How the run stops, if it stops early
fn terminal_script() -> impl Strategy<Value = Option<Script>> {
    prop_oneof![
        Just(None),
        Just(Some(Script::Halt)),
        Just(Some(Script::Reject)),
        Just(Some(Script::Fail)),
        Just(Some(Script::Cancel)),
        Just(Some(Script::RaiseCancel)),
    ]
}

/// (step count, index of the terminal step, terminal script)
fn run_shape() -> impl Strategy<Value = (usize, usize, Option<Script>)> {
    (1usize..12).prop_flat_map(|count| (Just(count), 0..count, terminal_script()))
}

fn run(count: usize, stop_at: usize, terminal: Option<Script>) -> (Outcome, Vec<String>) {
    let journal = journal();
    let steps: Vec<Box<dyn Step>> = (0..count)
        .map(|index| {
            let script = match terminal {
                Some(script) if index == stop_at => script,
                _ => Script::Continue,
            };
            ScriptedStep::new(&format!("s{}", index), script, &journal).boxed()
        })
        .collect();

    let harness = Harness::default();
    let mut ctx = harness.context();
    let report = tokio_test::block_on(SagaRunner::new(steps).run(&mut ctx));

    (report.outcome, entries(&journal))
}

proptest! {
    /// Property: the cleanups are exactly the entered steps, reversed
    #[test]
    fn prop_cleanups_mirror_entered_steps((count, stop_at, terminal) in run_shape()) {
        let (_, journal) = run(count, stop_at, terminal);

        let entered: Vec<&str> = journal
            .iter()
            .filter_map(|entry| entry.strip_prefix("run:"))
            .collect();
        let mut cleaned: Vec<&str> = journal
            .iter()
            .filter_map(|entry| entry.strip_prefix("cleanup:"))
            .collect();
        cleaned.reverse();

        prop_assert_eq!(entered, cleaned, "Every entered step is cleaned once, in reverse");
    }

    /// Property: a step that stops the run is the last one entered
    #[test]
    fn prop_nothing_runs_after_terminal_step((count, stop_at, terminal) in run_shape()) {
        let (outcome, journal) = run(count, stop_at, terminal);
        let entered = journal.iter().filter(|entry| entry.starts_with("run:")).count();

        match terminal {
            None => {
                prop_assert_eq!(entered, count);
                prop_assert!(outcome.is_completed());
            }
            Some(Script::Continue) => unreachable!(),
            Some(_) => {
                prop_assert_eq!(entered, stop_at + 1);
                prop_assert!(!outcome.is_completed());
            }
        }
    }

    /// Property: forward calls all precede compensation calls
    #[test]
    fn prop_forward_precedes_unwind((count, stop_at, terminal) in run_shape()) {
        let (_, journal) = run(count, stop_at, terminal);

        let first_cleanup = journal
            .iter()
            .position(|entry| entry.starts_with("cleanup:"))
            .unwrap_or(journal.len());
        prop_assert!(journal[first_cleanup..].iter().all(|entry| entry.starts_with("cleanup:")));
    }

    /// Property: cancellation always yields the cancelled outcome
    #[test]
    fn prop_cancellation_is_reported((count, stop_at) in (1usize..12).prop_flat_map(|n| (Just(n), 0..n))) {
        let (outcome, _) = run(count, stop_at, Some(Script::RaiseCancel));
        prop_assert_eq!(outcome, Outcome::Cancelled);
    }
}
