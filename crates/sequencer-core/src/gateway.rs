//! Simulation and execution gateways.
//!
//! Both gateways accept a [`WorkUnit`] and hide whether it is one step or a
//! batch: a single step goes out as an entry-function payload, a batch is
//! composed by the ledger into one composite payload. Failures leave the
//! gateway as [`EngineError`]s; a simulated-but-rejected outcome is returned
//! as a normal result.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use sequencer_types::{
    CallUnit, ExecutionHandle, SignerIdentity, SimulationOutcome, SubmitOptions,
    TransactionPayload,
};

use crate::batch_builder;
use crate::errors::EngineError;
use crate::ledger::{LedgerClient, SignerProvider};
use crate::state::WorkUnit;

/// Build the payload for `unit` as `identity` would submit it.
pub fn build_payload(
    ledger: &dyn LedgerClient,
    unit: &WorkUnit,
    identity: &SignerIdentity,
) -> Result<TransactionPayload> {
    match unit {
        WorkUnit::Single { step, .. } => Ok(batch_builder::single_call(step)),
        WorkUnit::Batch { steps, .. } => {
            let units: Vec<CallUnit> = steps.iter().map(CallUnit::from).collect();
            ledger
                .compose_batch(&units, identity)
                .with_context(|| format!("failed to compose {}", unit.label()))
        }
    }
}

#[derive(Clone)]
pub struct SimulationGateway {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn SignerProvider>,
}

impl SimulationGateway {
    pub fn new(ledger: Arc<dyn LedgerClient>, signer: Arc<dyn SignerProvider>) -> Self {
        Self { ledger, signer }
    }

    /// Evaluate `unit` without committing anything.
    pub async fn evaluate(&self, unit: &WorkUnit) -> Result<SimulationOutcome, EngineError> {
        self.evaluate_inner(unit).await.map_err(|err| {
            warn!(unit = %unit.label(), error = %format!("{err:#}"), "simulation failed");
            EngineError::evaluation(err)
        })
    }

    async fn evaluate_inner(&self, unit: &WorkUnit) -> Result<SimulationOutcome> {
        let identity = self
            .signer
            .active_identity()
            .ok_or_else(|| anyhow!("no active signer identity"))?;
        let payload = build_payload(self.ledger.as_ref(), unit, &identity)?;

        let start = Instant::now();
        let outcome = self
            .ledger
            .evaluate(&payload, &identity.public_key)
            .await
            .with_context(|| format!("evaluate {} on {}", unit.label(), self.ledger.network_name()))?;
        debug!(
            unit = %unit.label(),
            calls = payload.call_count(),
            success = outcome.success,
            gas = %outcome.gas_estimate,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "simulation finished"
        );
        Ok(outcome)
    }
}

#[derive(Clone)]
pub struct ExecutionGateway {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn SignerProvider>,
    options: SubmitOptions,
}

impl ExecutionGateway {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn SignerProvider>,
        options: SubmitOptions,
    ) -> Self {
        Self {
            ledger,
            signer,
            options,
        }
    }

    /// Sign and submit `unit`. A returned handle means the ledger accepted the
    /// transaction, not that it is final.
    pub async fn submit(&self, unit: &WorkUnit) -> Result<ExecutionHandle, EngineError> {
        self.submit_inner(unit).await.map_err(|err| {
            warn!(unit = %unit.label(), error = %format!("{err:#}"), "submission failed");
            EngineError::submission(err)
        })
    }

    async fn submit_inner(&self, unit: &WorkUnit) -> Result<ExecutionHandle> {
        let identity = self
            .signer
            .active_identity()
            .ok_or_else(|| anyhow!("no active signer identity"))?;
        let payload = build_payload(self.ledger.as_ref(), unit, &identity)?;

        let start = Instant::now();
        let handle = self
            .signer
            .sign_and_submit(&payload, &self.options)
            .await
            .with_context(|| format!("submit {} on {}", unit.label(), self.ledger.network_name()))?;
        debug!(
            unit = %unit.label(),
            tx_id = %handle.transaction_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "submission accepted"
        );
        Ok(handle)
    }
}
