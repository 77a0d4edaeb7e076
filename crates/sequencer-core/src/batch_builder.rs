//! Payload construction.
//!
//! A single step becomes an entry-function payload unchanged. A batch becomes
//! one composite payload in which every call receives the submitting account
//! as an explicit leading `signer` argument, followed by that step's own
//! arguments in their original order. Type arguments are never merged across
//! calls; each call keeps its own.

use anyhow::{bail, Result};

use sequencer_types::{
    CallUnit, ScriptArgument, ScriptCall, SignerIdentity, StepDefinition, TransactionPayload,
};

/// Payload for one step executed on its own.
pub fn single_call(step: &StepDefinition) -> TransactionPayload {
    TransactionPayload::EntryFunction(CallUnit::from(step))
}

/// Compose several calls into one composite payload signed by `sender`.
pub fn compose_batch(units: &[CallUnit], sender: &str) -> Result<TransactionPayload> {
    if units.is_empty() {
        bail!("cannot compose an empty batch");
    }
    if sender.trim().is_empty() {
        bail!("cannot compose a batch without a sender address");
    }

    let calls = units
        .iter()
        .map(|unit| {
            let mut arguments = Vec::with_capacity(unit.arguments.len() + 1);
            arguments.push(ScriptArgument::Signer(sender.to_string()));
            arguments.extend(unit.arguments.iter().cloned().map(ScriptArgument::Pure));
            ScriptCall {
                target: unit.target.clone(),
                type_arguments: unit.type_arguments.clone(),
                arguments,
            }
        })
        .collect();

    Ok(TransactionPayload::Composite { calls })
}

/// Compose the given steps for `identity`.
pub fn compose_steps(
    steps: &[StepDefinition],
    identity: &SignerIdentity,
) -> Result<TransactionPayload> {
    let units: Vec<CallUnit> = steps.iter().map(CallUnit::from).collect();
    compose_batch(&units, &identity.address)
}
