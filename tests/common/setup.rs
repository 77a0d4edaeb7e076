//! Engine harness backed by the sandbox ledger.

use std::sync::Arc;
use std::time::Duration;

use move_sequencer::core::ledger::{LocalSigner, SandboxLedger};
use move_sequencer::{EngineConfig, EngineHandle, EngineSnapshot, OrchestrationEngine};

use super::fixtures::identity;

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Short settle delay so auto-execute tests finish quickly.
pub fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_settle_delay(Duration::from_millis(5))
        .with_call_timeout(Some(Duration::from_secs(5)))
}

pub struct Harness {
    pub ledger: Arc<SandboxLedger>,
    pub signer: Arc<LocalSigner>,
    pub engine: EngineHandle,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let ledger = Arc::new(SandboxLedger::new());
        let signer = Arc::new(LocalSigner::new(identity(), ledger.clone()));
        let engine = OrchestrationEngine::spawn(config, ledger.clone(), signer.clone())
            .expect("engine config should be valid");
        Self {
            ledger,
            signer,
            engine,
        }
    }
}

/// Wait until nothing is in flight or scheduled.
pub async fn settle(engine: &EngineHandle) -> EngineSnapshot {
    wait_for(engine, |s| s.is_settled()).await
}

pub async fn wait_for<F>(engine: &EngineHandle, predicate: F) -> EngineSnapshot
where
    F: FnMut(&EngineSnapshot) -> bool,
{
    tokio::time::timeout(WAIT, engine.wait_until(predicate))
        .await
        .expect("engine did not reach the expected state in time")
}
