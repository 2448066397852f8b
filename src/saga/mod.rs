// Copyright (c) 2025 - Cowboy AI, Inc.
//! Saga Runner
//!
//! Executes an ordered list of reversible steps against one shared
//! [`RunContext`], then unwinds every step that ran, newest first.
//!
//! # Execution Flow
//!
//! ```text
//! ┌──────────┐  Continue   ┌──────────┐  Continue        ┌──────────┐
//! │  step 1  │────────────►│  step 2  │──────── ... ────►│  step N  │
//! └──────────┘             └──────────┘                  └──────────┘
//!       │                        │ Halt / Err / cancel         │
//!       ▼                        ▼                             ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ unwind: cleanup(k), cleanup(k-1), ..., cleanup(1)                  │
//! │ (every executed step, errors collected, never aborting the unwind) │
//! └───────────────────────────────────────────────────────────────────┘
//!       │
//!       ▼
//!  Outcome: Completed(artifact) | Halted(first error) | Cancelled
//! ```
//!
//! # Guarantees
//!
//! - A step is recorded as executed before its result is inspected, so a
//!   step that fails halfway still gets its compensation.
//! - Compensations run on every exit path, success included. Steps decide
//!   from [`RunContext::run_completed`] whether their resource is a product
//!   to keep or debris to remove.
//! - Cancellation is observed before and after every step, never during.
//! - Exactly one outcome per run; the halting error is the first error the
//!   context recorded. Cleanup failures are reported separately.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::context::{keys, RunContext};
use crate::errors::{BuildError, BuildResult};
use crate::state_machine::{
    RunPhase, RunSignal, StateMachineWithHistory, Transition, Verdict,
};

/// What a forward step asks the runner to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    /// Stop going forward; the step should have recorded why
    Halt,
}

/// One reversible unit of work
///
/// `cleanup` is called for every step whose `run` was entered, whatever it
/// returned, and must tolerate a forward pass that never got far. It may be
/// called more than once; only the first call may act on the outside world.
#[async_trait]
pub trait Step: Send + Sync {
    /// Action label used in UI reporting
    fn name(&self) -> &str;

    /// Context keys this step requires from earlier steps
    fn reads(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Context keys this step publishes for later steps
    fn writes(&self) -> Vec<&'static str> {
        Vec::new()
    }

    async fn run(&mut self, ctx: &mut RunContext) -> BuildResult<StepAction>;

    async fn cleanup(&mut self, ctx: &RunContext) -> BuildResult<()>;
}

/// A read no earlier step (or initial key) satisfies
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step '{step}' reads '{key}' but no earlier step writes it")]
pub struct UnsatisfiedRead {
    pub step: String,
    pub key: &'static str,
}

/// Verify every declared read is written by an earlier step
///
/// Only declarations are inspected, nothing runs.
pub fn check_dependencies(
    steps: &[Box<dyn Step>],
    initial_keys: &[&'static str],
) -> Result<(), Vec<UnsatisfiedRead>> {
    let mut available: HashSet<&'static str> = initial_keys.iter().copied().collect();
    let mut unsatisfied = Vec::new();

    for step in steps {
        for key in step.reads() {
            if !available.contains(key) {
                unsatisfied.push(UnsatisfiedRead {
                    step: step.name().to_string(),
                    key,
                });
            }
        }
        available.extend(step.writes());
    }

    if unsatisfied.is_empty() {
        Ok(())
    } else {
        Err(unsatisfied)
    }
}

/// A compensation that reported an error during unwind
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupFailure {
    pub step: String,
    pub error: BuildError,
}

/// Terminal result of one run
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Every step continued; carries the exported artifact if one was made
    Completed(Option<Artifact>),
    Halted(BuildError),
    Cancelled,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    /// The single error a failed run surfaces
    pub fn error(&self) -> Option<BuildError> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Halted(error) => Some(error.clone()),
            Outcome::Cancelled => Some(BuildError::Cancelled),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Outcome,
    /// Labels of steps whose forward pass was entered, in execution order
    pub executed: Vec<String>,
    pub cleanup_failures: Vec<CleanupFailure>,
    /// Timestamped phase transitions
    pub history: Vec<Transition<RunPhase, RunSignal>>,
}

/// Sequential saga executor
pub struct SagaRunner {
    steps: Vec<Box<dyn Step>>,
}

impl SagaRunner {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.name().to_string()).collect()
    }

    pub fn check_dependencies(
        &self,
        initial_keys: &[&'static str],
    ) -> Result<(), Vec<UnsatisfiedRead>> {
        check_dependencies(&self.steps, initial_keys)
    }

    /// Run every step forward, then unwind what ran
    pub async fn run(mut self, ctx: &mut RunContext) -> RunReport {
        let mut phase = StateMachineWithHistory::new(RunPhase::Pending);
        let mut executed: Vec<usize> = Vec::new();

        if ctx.is_cancelled() {
            advance(&mut phase, RunSignal::CancelRequested);
        } else {
            advance(&mut phase, RunSignal::Start);
            self.run_forward(ctx, &mut phase, &mut executed).await;
        }

        if *phase.current_state() == RunPhase::Running {
            ctx.mark_completed();
            advance(&mut phase, RunSignal::AllStepsDone);
        }

        let cleanup_failures = self.unwind(ctx, &executed).await;
        advance(&mut phase, RunSignal::UnwindDone);

        let verdict = match phase.current_state() {
            RunPhase::Finished(verdict) | RunPhase::Unwinding(verdict) => *verdict,
            _ => fallback_verdict(ctx),
        };

        let outcome = match verdict {
            Verdict::Completed => Outcome::Completed(completed_artifact(ctx).await),
            Verdict::Halted => Outcome::Halted(
                ctx.take_error()
                    .unwrap_or_else(|| BuildError::Halted("unknown step".to_string())),
            ),
            Verdict::Cancelled => Outcome::Cancelled,
        };
        info!("Build finished: {:?}", verdict);

        RunReport {
            outcome,
            executed: executed
                .iter()
                .map(|index| self.steps[*index].name().to_string())
                .collect(),
            cleanup_failures,
            history: phase.into_history(),
        }
    }

    async fn run_forward(
        &mut self,
        ctx: &mut RunContext,
        phase: &mut StateMachineWithHistory<RunPhase>,
        executed: &mut Vec<usize>,
    ) {
        for (index, step) in self.steps.iter_mut().enumerate() {
            if ctx.is_cancelled() {
                advance(phase, RunSignal::CancelRequested);
                return;
            }

            let label = step.name().to_string();
            debug!("Running step '{}'", label);
            let result = step.run(ctx).await;
            executed.push(index);

            match result {
                Ok(StepAction::Continue) if ctx.error().is_none() => {}
                Ok(_) => {
                    if ctx.error().is_none() {
                        ctx.fail(BuildError::Halted(label.clone()));
                    }
                    if let Some(err) = ctx.error() {
                        ctx.ui().error(&failure_message(&label, err));
                    }
                    warn!("Step '{}' halted the build", label);
                    advance(phase, RunSignal::StepHalted);
                    return;
                }
                Err(err) if err.is_cancelled() => {
                    info!("Step '{}' observed cancellation", label);
                    advance(phase, RunSignal::CancelRequested);
                    return;
                }
                Err(err) => {
                    ctx.ui().error(&failure_message(&label, &err));
                    ctx.fail(err);
                    advance(phase, RunSignal::StepHalted);
                    return;
                }
            }

            if ctx.is_cancelled() {
                advance(phase, RunSignal::CancelRequested);
                return;
            }
            advance(phase, RunSignal::StepContinued);
        }
    }

    async fn unwind(&mut self, ctx: &RunContext, executed: &[usize]) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();

        for index in executed.iter().rev() {
            let step = &mut self.steps[*index];
            debug!("Cleaning up step '{}'", step.name());
            if let Err(error) = step.cleanup(ctx).await {
                ctx.ui()
                    .error(&format!("Cleanup of '{}' failed: {}", step.name(), error));
                warn!("Cleanup of '{}' failed: {}", step.name(), error);
                failures.push(CleanupFailure {
                    step: step.name().to_string(),
                    error,
                });
            }
        }

        failures
    }
}

fn advance(phase: &mut StateMachineWithHistory<RunPhase>, signal: RunSignal) {
    if let Err(err) = phase.transition_with_history(signal, Utc::now()) {
        warn!("Ignoring run phase signal: {}", err);
    }
}

/// UI line for a forward failure
///
/// External call errors already name their action, so the step label is
/// only prefixed to errors that carry no origin of their own.
fn failure_message(label: &str, err: &BuildError) -> String {
    match err {
        BuildError::ExternalCall { .. } | BuildError::Halted(_) => err.to_string(),
        _ => format!("{}: {}", label, err),
    }
}

fn fallback_verdict(ctx: &RunContext) -> Verdict {
    if ctx.error().is_some() {
        Verdict::Halted
    } else if ctx.is_cancelled() {
        Verdict::Cancelled
    } else {
        Verdict::Completed
    }
}

async fn completed_artifact(ctx: &RunContext) -> Option<Artifact> {
    let dir = ctx.get(keys::ARTIFACT_DIR)?;
    Some(Artifact::describe(dir, ctx.get(keys::VM_NAME).cloned()).await)
}
