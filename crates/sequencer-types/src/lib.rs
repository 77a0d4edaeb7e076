//! Shared types for the move-sequencer workspace.
//!
//! This crate holds the data that flows between the orchestration engine,
//! the ledger collaborators and whatever presentation layer sits on top:
//!
//! - [`step`]: operation targets and step definitions
//! - [`payload`]: single-call and composite payloads handed to a ledger
//! - [`outcome`]: simulation outcomes, execution handles and signer identity
//! - [`env_utils`]: environment variable parsing helpers

pub mod env_utils;
pub mod outcome;
pub mod payload;
pub mod step;

pub use outcome::{
    DeltaKind, ExecutionHandle, LedgerEvent, SignerIdentity, SimulationOutcome, StateDelta,
    SubmitOptions,
};
pub use payload::{CallUnit, ScriptArgument, ScriptCall, TransactionPayload};
pub use step::{OperationTarget, StepDefinition};
