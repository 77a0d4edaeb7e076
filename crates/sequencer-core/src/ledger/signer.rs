use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use std::sync::Arc;

use sequencer_types::{ExecutionHandle, SignerIdentity, SubmitOptions, TransactionPayload};

use super::{LedgerClient, SignerProvider};

/// Signer session backed by a locally held identity.
///
/// The identity can be swapped or cleared at runtime, which is how a
/// disconnected wallet is modelled.
pub struct LocalSigner {
    identity: RwLock<Option<SignerIdentity>>,
    ledger: Arc<dyn LedgerClient>,
}

impl LocalSigner {
    pub fn new(identity: SignerIdentity, ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            identity: RwLock::new(Some(identity)),
            ledger,
        }
    }

    /// A session with no active identity.
    pub fn disconnected(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            identity: RwLock::new(None),
            ledger,
        }
    }

    pub fn connect(&self, identity: SignerIdentity) {
        *self.identity.write() = Some(identity);
    }

    pub fn disconnect(&self) {
        *self.identity.write() = None;
    }
}

#[async_trait::async_trait]
impl SignerProvider for LocalSigner {
    fn active_identity(&self) -> Option<SignerIdentity> {
        self.identity.read().clone()
    }

    async fn sign_and_submit(
        &self,
        payload: &TransactionPayload,
        options: &SubmitOptions,
    ) -> Result<ExecutionHandle> {
        let identity = self
            .active_identity()
            .ok_or_else(|| anyhow!("no active signer identity"))?;
        self.ledger.submit(payload, &identity, options).await
    }
}
