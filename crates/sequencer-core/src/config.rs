//! Engine configuration.
//!
//! Defaults can be overlaid from the environment:
//!
//! | Variable                      | Field           |
//! |-------------------------------|-----------------|
//! | `SEQUENCER_BATCH_SIZE`        | `batch_size`    |
//! | `SEQUENCER_SETTLE_DELAY_MS`   | `settle_delay`  |
//! | `SEQUENCER_CALL_TIMEOUT_SECS` | `call_timeout` (0 disables) |
//! | `SEQUENCER_MAX_GAS`           | `max_gas`       |
//! | `SEQUENCER_EXPLORER_URL`      | `explorer_url`  |

use std::time::Duration;

use sequencer_types::env_utils::{env_duration_ms, env_string, env_var};
use sequencer_types::SubmitOptions;

use crate::errors::EngineError;

/// Steps per batch when batch mode is selected.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Pause between a successful execution and the next auto-triggered simulation.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Upper bound on any single evaluate or submit call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_MAX_GAS: u64 = 200_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub settle_delay: Duration,
    /// `None` waits on the ledger indefinitely.
    pub call_timeout: Option<Duration>,
    pub max_gas: u64,
    pub explorer_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            settle_delay: DEFAULT_SETTLE_DELAY,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            max_gas: DEFAULT_MAX_GAS,
            explorer_url: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with any `SEQUENCER_*` variables that are set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(batch_size) = env_var::<usize>("SEQUENCER_BATCH_SIZE") {
            config.batch_size = batch_size;
        }
        if let Some(delay) = env_duration_ms("SEQUENCER_SETTLE_DELAY_MS") {
            config.settle_delay = delay;
        }
        if let Some(secs) = env_var::<u64>("SEQUENCER_CALL_TIMEOUT_SECS") {
            config.call_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(max_gas) = env_var::<u64>("SEQUENCER_MAX_GAS") {
            config.max_gas = max_gas;
        }
        if let Some(url) = env_string("SEQUENCER_EXPLORER_URL") {
            config.explorer_url = Some(url);
        }
        config
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_explorer_url(mut self, explorer_url: Option<String>) -> Self {
        self.explorer_url = explorer_url;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.batch_size == 0 {
            return Err(EngineError::configuration("batch size must be >= 1"));
        }
        if self.max_gas == 0 {
            return Err(EngineError::configuration("max gas must be >= 1"));
        }
        if self.call_timeout == Some(Duration::ZERO) {
            return Err(EngineError::configuration(
                "call timeout must be positive (use None to disable)",
            ));
        }
        Ok(())
    }

    pub fn submit_options(&self) -> SubmitOptions {
        SubmitOptions {
            max_gas: self.max_gas,
        }
    }
}
