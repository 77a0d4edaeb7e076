//! move-sequencer
//!
//! Runs ordered sequences of dependent Move calls against a ledger. Each
//! unit (one step, or a batch of up to `batch_size` steps composed into one
//! transaction) is simulated first and only submitted once confirmed, either
//! by an operator or by the auto-execute policy.
//!
//! - [`types`]: step, payload and outcome data (re-export of `sequencer-types`)
//! - [`core`]: the orchestration engine, ledgers and runner (re-export of
//!   `sequencer-core`)
//!
//! The `move-sequencer` binary wraps [`core::run_sequence`] behind
//! `validate`, `plan` and `run` subcommands.

pub use sequencer_core as core;
pub use sequencer_types as types;

pub use sequencer_core::{
    run_sequence, Ack, AutoDecider, BatchPlanner, ConfirmDecider, Decision, EngineConfig, EngineError,
    EngineEvent, EngineHandle, EngineSnapshot, ExecutionMode, IgnoredReason,
    OrchestrationEngine, Phase, SequenceRunReport, SequenceSpec,
};
pub use sequencer_types::{OperationTarget, StepDefinition};
