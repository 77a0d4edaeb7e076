//! Results returned by ledger collaborators.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a speculative evaluation.
///
/// `success == false` is a normal answer from the ledger ("this would
/// abort"), not a transport failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub success: bool,
    pub status_message: String,
    /// Gas estimate as reported by the ledger (kept as a string, some
    /// ledgers report u128 or decimal values).
    pub gas_estimate: String,
    #[serde(default)]
    pub events: Vec<LedgerEvent>,
    #[serde(default)]
    pub state_deltas: Vec<StateDelta>,
}

impl SimulationOutcome {
    pub fn succeeded(status_message: impl Into<String>, gas_estimate: u64) -> Self {
        Self {
            success: true,
            status_message: status_message.into(),
            gas_estimate: gas_estimate.to_string(),
            events: Vec::new(),
            state_deltas: Vec::new(),
        }
    }

    pub fn rejected(status_message: impl Into<String>, gas_estimate: u64) -> Self {
        Self {
            success: false,
            ..Self::succeeded(status_message, gas_estimate)
        }
    }
}

/// Event emitted by a simulated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub type_tag: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Created,
    Modified,
    Deleted,
}

/// A state change the evaluated payload would make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub address: String,
    pub resource: String,
    pub kind: DeltaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Handle returned once a submission was accepted for processing.
///
/// Acceptance is not finality; the handle is only a reference for the
/// operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHandle {
    pub transaction_id: String,
}

impl ExecutionHandle {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
        }
    }

    /// Explorer URL for this transaction, e.g. `https://explorer/txblock/<id>`.
    pub fn explorer_link(&self, base_url: &str) -> String {
        format!(
            "{}/txblock/{}",
            base_url.trim_end_matches('/'),
            self.transaction_id
        )
    }
}

/// The account that signs and pays for submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerIdentity {
    pub address: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOptions {
    pub max_gas: u64,
}
