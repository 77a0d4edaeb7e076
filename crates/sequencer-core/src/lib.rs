//! Sequencer Core
//!
//! Orchestration engine for ordered sequences of dependent, irreversible
//! Move calls. Every unit of work (one step, or one batch of steps) is
//! simulated against current ledger state before it is submitted, and the
//! engine only advances once a submission has been accepted.
//!
//! # Core Modules
//!
//! - [`engine`]: actor-owned [`OrchestrationEngine`] and its [`EngineHandle`]
//! - [`state`]: the pure state machine behind the engine
//! - [`planner`]: fixed-size, order-preserving batch partitioning
//! - [`batch_builder`]: composite payload construction with signer injection
//! - [`gateway`]: uniform simulate/submit wrappers over a ledger
//! - [`ledger`]: ledger client and signer traits plus the sandbox and HTTP clients
//! - [`sequence`]: sequence files (JSON/YAML) and their validation
//! - [`runner`]: drives a sequence to completion and produces a report
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sequencer_core::{EngineConfig, ExecutionMode, OrchestrationEngine};
//! use sequencer_core::ledger::{LocalSigner, SandboxLedger};
//!
//! let ledger = Arc::new(SandboxLedger::new());
//! let signer = Arc::new(LocalSigner::new(identity, ledger.clone()));
//! let engine = OrchestrationEngine::spawn(EngineConfig::default(), ledger, signer)?;
//!
//! engine.configure(steps, ExecutionMode::Batch, true).await?;
//! engine.trigger_simulate().await;
//! let done = engine.wait_until(|s| s.phase.is_terminal() || s.last_error.is_some()).await;
//! ```

pub mod batch_builder;
pub mod config;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod ledger;
pub mod planner;
pub mod runner;
pub mod sequence;
pub mod state;

pub use config::EngineConfig;
pub use engine::{EngineEvent, EngineHandle, OrchestrationEngine};
pub use errors::EngineError;
pub use planner::{Batch, BatchPlanner};
pub use runner::{run_sequence, AutoDecider, ConfirmDecider, Decision, PendingUnit, SequenceRunReport, UnitReport};
pub use sequence::SequenceSpec;
pub use state::{
    Ack, EngineSnapshot, EngineState, ExecutionMode, ExecutionRecord, IgnoredReason, Phase,
    WorkUnit,
};
