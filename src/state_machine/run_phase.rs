// Copyright (c) 2025 - Cowboy AI, Inc.
//! Build Run Phase State Machine
//!
//! Formal FSM for the lifecycle of one saga run. The runner feeds it a
//! signal after every step outcome; the machine decides whether the run
//! keeps going forward or turns around and unwinds.
//!
//! # State Machine Type
//!
//! This is a **Mealy Machine** with unit output: the verdict carried into
//! `Unwinding` is the interesting payload.
//!
//! # States
//!
//! - Pending: No step has run yet
//! - Running: Forward steps are executing
//! - Unwinding(verdict): Compensations are running in reverse
//! - Finished(verdict): Terminal
//!
//! # Inputs
//!
//! - Start: Pending → Running
//! - StepContinued: Running → Running
//! - StepHalted: Running → Unwinding(Halted)
//! - CancelRequested: Pending | Running → Unwinding(Cancelled)
//! - AllStepsDone: Running → Unwinding(Completed)
//! - UnwindDone: Unwinding(v) → Finished(v)

use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Completed,
    Halted,
    Cancelled,
}

/// Phase of a saga run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Pending,
    Running,
    Unwinding(Verdict),
    Finished(Verdict),
}

/// Runner observation fed into the phase machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    Start,
    StepContinued,
    StepHalted,
    CancelRequested,
    AllStepsDone,
    UnwindDone,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Pending => write!(f, "pending"),
            RunPhase::Running => write!(f, "running"),
            RunPhase::Unwinding(verdict) => write!(f, "unwinding ({:?})", verdict),
            RunPhase::Finished(verdict) => write!(f, "finished ({:?})", verdict),
        }
    }
}

impl StateMachine for RunPhase {
    type Input = RunSignal;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use RunPhase::*;
        use RunSignal::*;

        let next = match (self, input) {
            (Pending, Start) => Running,
            (Pending, CancelRequested) => Unwinding(Verdict::Cancelled),

            (Running, StepContinued) => Running,
            (Running, StepHalted) => Unwinding(Verdict::Halted),
            (Running, CancelRequested) => Unwinding(Verdict::Cancelled),
            (Running, AllStepsDone) => Unwinding(Verdict::Completed),

            (Unwinding(verdict), UnwindDone) => Finished(*verdict),

            (from, input) => {
                return Err(TransitionError::InvalidTransition {
                    from: from.to_string(),
                    input: format!("{:?}", input),
                })
            }
        };
        Ok((next, ()))
    }

    fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Finished(_))
    }
}
