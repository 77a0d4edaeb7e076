//! In-memory rehearsal ledger.
//!
//! `SandboxLedger` answers evaluate/submit calls locally with deterministic
//! gas figures, one event and one state delta per call, and transaction ids
//! derived from the payload. It journals every call in the order it was
//! issued and supports failure injection, which makes it the fake used by
//! the engine tests and the `--ledger sandbox` rehearsal mode of the CLI.
//!
//! ```ignore
//! let ledger = SandboxLedger::new();
//! ledger.fail_next_submit("signer declined");
//! ledger.reject_function("0x2::pool::swap", "MoveAbort(0x2::pool, 7)");
//! ledger.set_latency(Duration::from_millis(50));
//! ```

use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use sequencer_types::{
    DeltaKind, ExecutionHandle, LedgerEvent, OperationTarget, ScriptArgument, SignerIdentity,
    SimulationOutcome, StateDelta, SubmitOptions, TransactionPayload,
};

use super::LedgerClient;

const BASE_GAS: u64 = 1_000;
const GAS_PER_CALL: u64 = 500;
const GAS_PER_ARGUMENT: u64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalKind {
    Evaluate,
    Submit,
}

/// One recorded ledger call.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub kind: JournalKind,
    pub payload: TransactionPayload,
}

impl JournalEntry {
    /// Function names called by the payload, in order.
    pub fn functions(&self) -> Vec<String> {
        self.payload
            .targets()
            .into_iter()
            .map(|target| target.function.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
struct SandboxInner {
    journal: Vec<JournalEntry>,
    evaluate_failures: VecDeque<String>,
    submit_failures: VecDeque<String>,
    /// Fully qualified target -> abort status.
    rejected: HashMap<String, String>,
    latency: Duration,
    sequence_number: u64,
    committed: Vec<OperationTarget>,
}

#[derive(Debug, Default)]
pub struct SandboxLedger {
    inner: Mutex<SandboxInner>,
}

impl SandboxLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `evaluate` call fail with `message`.
    pub fn fail_next_evaluate(&self, message: &str) -> &Self {
        self.inner
            .lock()
            .evaluate_failures
            .push_back(message.to_string());
        self
    }

    /// Make the next `submit` call fail with `message`.
    pub fn fail_next_submit(&self, message: &str) -> &Self {
        self.inner
            .lock()
            .submit_failures
            .push_back(message.to_string());
        self
    }

    /// Any payload calling `target` simulates as rejected and aborts on submit.
    pub fn reject_function(&self, target: &str, status: &str) -> &Self {
        let key = target
            .parse::<OperationTarget>()
            .map(|parsed| parsed.to_string())
            .unwrap_or_else(|_| target.trim().to_string());
        self.inner.lock().rejected.insert(key, status.to_string());
        self
    }

    pub fn clear_rejections(&self) -> &Self {
        self.inner.lock().rejected.clear();
        self
    }

    /// Delay applied to every call before it resolves.
    pub fn set_latency(&self, latency: Duration) -> &Self {
        self.inner.lock().latency = latency;
        self
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.inner.lock().journal.clone()
    }

    pub fn evaluate_count(&self) -> usize {
        self.count(JournalKind::Evaluate)
    }

    pub fn submit_count(&self) -> usize {
        self.count(JournalKind::Submit)
    }

    /// Targets of every committed call, in commit order.
    pub fn committed_targets(&self) -> Vec<OperationTarget> {
        self.inner.lock().committed.clone()
    }

    pub fn sequence_number(&self) -> u64 {
        self.inner.lock().sequence_number
    }

    fn count(&self, kind: JournalKind) -> usize {
        self.inner
            .lock()
            .journal
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    /// Records the call and returns the configured latency.
    fn record(&self, kind: JournalKind, payload: &TransactionPayload) -> Duration {
        let mut inner = self.inner.lock();
        inner.journal.push(JournalEntry {
            kind,
            payload: payload.clone(),
        });
        inner.latency
    }

    fn rejection_for(&self, payload: &TransactionPayload) -> Option<(String, String)> {
        let inner = self.inner.lock();
        payload.targets().into_iter().find_map(|target| {
            let key = target.to_string();
            inner
                .rejected
                .get(&key)
                .map(|status| (key.clone(), status.clone()))
        })
    }
}

fn estimate_gas(payload: &TransactionPayload) -> u64 {
    let arguments = match payload {
        TransactionPayload::EntryFunction(call) => call.arguments.len(),
        TransactionPayload::Composite { calls } => {
            calls.iter().map(|call| call.arguments.len()).sum()
        }
    };
    BASE_GAS + GAS_PER_CALL * payload.call_count() as u64 + GAS_PER_ARGUMENT * arguments as u64
}

fn sender_of(payload: &TransactionPayload) -> Option<&str> {
    match payload {
        TransactionPayload::EntryFunction(_) => None,
        TransactionPayload::Composite { calls } => calls.iter().find_map(|call| {
            call.arguments.iter().find_map(|arg| match arg {
                ScriptArgument::Signer(address) => Some(address.as_str()),
                ScriptArgument::Pure(_) => None,
            })
        }),
    }
}

fn simulated_effects(payload: &TransactionPayload) -> (Vec<LedgerEvent>, Vec<StateDelta>) {
    let owner = sender_of(payload);
    payload
        .targets()
        .into_iter()
        .enumerate()
        .map(|(index, target)| {
            let event = LedgerEvent {
                type_tag: format!("{}::CallEvent", target.module_id()),
                data: json!({ "function": target.function, "call_index": index }),
            };
            let delta = StateDelta {
                address: owner.unwrap_or(&target.address).to_string(),
                resource: format!("{}::State", target.module_id()),
                kind: DeltaKind::Modified,
                data: None,
            };
            (event, delta)
        })
        .unzip()
}

fn derive_transaction_id(sequence_number: u64, sender: &str, payload: &TransactionPayload) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sequence_number.to_le_bytes());
    hasher.update(sender.as_bytes());
    hasher.update(serde_json::to_vec(payload).unwrap_or_default());
    format!("0x{}", hex::encode(hasher.finalize()))
}

#[async_trait::async_trait]
impl LedgerClient for SandboxLedger {
    fn network_name(&self) -> &str {
        "sandbox"
    }

    async fn evaluate(
        &self,
        payload: &TransactionPayload,
        signer_public_key: &str,
    ) -> Result<SimulationOutcome> {
        let latency = self.record(JournalKind::Evaluate, payload);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(message) = self.inner.lock().evaluate_failures.pop_front() {
            bail!("{}", message);
        }
        if signer_public_key.trim().is_empty() {
            bail!("evaluate requires a signer public key");
        }

        let gas = estimate_gas(payload);
        let (events, state_deltas) = simulated_effects(payload);
        let mut outcome = match self.rejection_for(payload) {
            Some((target, status)) => {
                SimulationOutcome::rejected(format!("{status} in {target}"), gas)
            }
            None => SimulationOutcome::succeeded("Executed successfully", gas),
        };
        if outcome.success {
            outcome.events = events;
            outcome.state_deltas = state_deltas;
        }
        Ok(outcome)
    }

    async fn submit(
        &self,
        payload: &TransactionPayload,
        signer: &SignerIdentity,
        options: &SubmitOptions,
    ) -> Result<ExecutionHandle> {
        let latency = self.record(JournalKind::Submit, payload);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(message) = self.inner.lock().submit_failures.pop_front() {
            bail!("{}", message);
        }
        if let Some((target, status)) = self.rejection_for(payload) {
            return Err(anyhow!("transaction aborted: {status} in {target}"));
        }
        let gas = estimate_gas(payload);
        if gas > options.max_gas {
            bail!(
                "insufficient gas budget: needs {} but max_gas is {}",
                gas,
                options.max_gas
            );
        }

        let mut inner = self.inner.lock();
        inner.sequence_number += 1;
        let transaction_id = derive_transaction_id(inner.sequence_number, &signer.address, payload);
        inner
            .committed
            .extend(payload.targets().into_iter().cloned());
        Ok(ExecutionHandle::new(transaction_id))
    }
}
