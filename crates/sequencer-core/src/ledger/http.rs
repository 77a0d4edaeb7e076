//! JSON-over-HTTP ledger client.
//!
//! Talks to a ledger gateway exposing two routes:
//!
//! - `POST {endpoint}/simulate` with `{ "payload", "public_key" }`, answering
//!   with a [`SimulationOutcome`] object
//! - `POST {endpoint}/submit` with `{ "payload", "sender", "public_key",
//!   "max_gas" }`, answering with `{ "transaction_id" }`
//!
//! Either route may answer `{ "error": ... }` instead. `ureq` is blocking, so
//! requests run on tokio's blocking pool.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use std::time::Duration;

use sequencer_types::env_utils::env_var_or;
use sequencer_types::{
    ExecutionHandle, SignerIdentity, SimulationOutcome, SubmitOptions, TransactionPayload,
};

use super::LedgerClient;

pub struct HttpLedgerClient {
    endpoint: String,
    name: String,
    agent: ureq::Agent,
}

impl HttpLedgerClient {
    /// Default request timeout in seconds (can be overridden by env).
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    /// Default connect timeout in seconds (can be overridden by env).
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    fn default_timeouts() -> (Duration, Duration) {
        (
            Duration::from_secs(env_var_or(
                "SEQUENCER_HTTP_TIMEOUT_SECS",
                Self::DEFAULT_TIMEOUT_SECS,
            )),
            Duration::from_secs(env_var_or(
                "SEQUENCER_HTTP_CONNECT_TIMEOUT_SECS",
                Self::DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
        )
    }

    pub fn new(endpoint: &str) -> Result<Self> {
        let (timeout, connect_timeout) = Self::default_timeouts();
        Self::with_timeouts(endpoint, timeout, connect_timeout)
    }

    pub fn with_timeouts(endpoint: &str, timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        let Some(rest) = endpoint
            .strip_prefix("https://")
            .or_else(|| endpoint.strip_prefix("http://"))
        else {
            bail!("ledger endpoint `{}` must be an http(s) URL", endpoint);
        };
        let name = rest.split('/').next().unwrap_or_default().to_string();
        if name.is_empty() {
            bail!("ledger endpoint `{}` has no host", endpoint);
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .timeout_connect(connect_timeout)
            .build();
        Ok(Self {
            endpoint,
            name,
            agent,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, route: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}", self.endpoint, route);
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || post_blocking(&agent, &url, &body))
            .await
            .context("ledger request task panicked")?
    }
}

fn post_blocking(agent: &ureq::Agent, url: &str, body: &Value) -> Result<Value> {
    let response = match agent
        .post(url)
        .set("Content-Type", "application/json")
        .send_json(body)
    {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            let text = response.into_string().unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|value| error_message(&value))
                .unwrap_or(text);
            bail!("{} returned HTTP {}: {}", url, code, detail);
        }
        Err(err) => return Err(anyhow!("request to {} failed: {}", url, err)),
    };

    let value: Value = response
        .into_json()
        .with_context(|| format!("failed to parse response from {}", url))?;
    if let Some(message) = error_message(&value) {
        bail!("{}", message);
    }
    Ok(value)
}

/// Extract `error` as either a string or an object with a `message`.
fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if error.is_null() {
        return None;
    }
    Some(
        error
            .as_str()
            .map(ToOwned::to_owned)
            .or_else(|| {
                error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned)
            })
            .unwrap_or_else(|| error.to_string()),
    )
}

fn parse_handle(value: &Value) -> Result<ExecutionHandle> {
    value
        .get("transaction_id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(ExecutionHandle::new)
        .ok_or_else(|| anyhow!("submit response is missing `transaction_id`"))
}

#[async_trait::async_trait]
impl LedgerClient for HttpLedgerClient {
    fn network_name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &self,
        payload: &TransactionPayload,
        signer_public_key: &str,
    ) -> Result<SimulationOutcome> {
        let body = json!({
            "payload": payload,
            "public_key": signer_public_key,
        });
        let value = self.post("simulate", body).await?;
        serde_json::from_value(value).context("malformed simulate response")
    }

    async fn submit(
        &self,
        payload: &TransactionPayload,
        signer: &SignerIdentity,
        options: &SubmitOptions,
    ) -> Result<ExecutionHandle> {
        let body = json!({
            "payload": payload,
            "sender": signer.address,
            "public_key": signer.public_key,
            "max_gas": options.max_gas,
        });
        let value = self.post("submit", body).await?;
        parse_handle(&value)
    }
}
