//! Ledger and signer collaborators.
//!
//! The engine never talks to a network directly. It goes through a
//! [`LedgerClient`] for evaluation and batch composition, and through a
//! [`SignerProvider`] for the active identity and signed submission. Both are
//! injected at construction so the engine can run against the in-memory
//! [`SandboxLedger`] in tests and rehearsals.

use anyhow::Result;

use sequencer_types::{
    CallUnit, ExecutionHandle, SignerIdentity, SimulationOutcome, SubmitOptions,
    TransactionPayload,
};

use crate::batch_builder;

pub mod http;
pub mod sandbox;
pub mod signer;

pub use http::HttpLedgerClient;
pub use sandbox::{JournalEntry, JournalKind, SandboxLedger};
pub use signer::LocalSigner;

/// Remote ledger access.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    /// Short name for logs ("sandbox", an endpoint host, ...).
    fn network_name(&self) -> &str;

    /// Speculatively evaluate `payload` without committing state.
    async fn evaluate(
        &self,
        payload: &TransactionPayload,
        signer_public_key: &str,
    ) -> Result<SimulationOutcome>;

    /// Submit a signed payload. Returns once the ledger accepted it.
    async fn submit(
        &self,
        payload: &TransactionPayload,
        signer: &SignerIdentity,
        options: &SubmitOptions,
    ) -> Result<ExecutionHandle>;

    /// Build one composite payload from several calls, inserting the
    /// sender as the leading argument of each call.
    fn compose_batch(&self, units: &[CallUnit], sender: &SignerIdentity) -> Result<TransactionPayload> {
        batch_builder::compose_batch(units, &sender.address)
    }
}

/// Session that owns the active identity and signs submissions.
#[async_trait::async_trait]
pub trait SignerProvider: Send + Sync {
    fn active_identity(&self) -> Option<SignerIdentity>;

    /// Sign and submit `payload`. Fails when no identity is active.
    async fn sign_and_submit(
        &self,
        payload: &TransactionPayload,
        options: &SubmitOptions,
    ) -> Result<ExecutionHandle>;
}
