//! Run command - drive a sequence file through the orchestration engine

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::output::{format_error, format_outcome, format_report, format_report_json};
use sequencer_core::ledger::{HttpLedgerClient, LedgerClient, LocalSigner, SandboxLedger};
use sequencer_core::{
    run_sequence, AutoDecider, ConfirmDecider, Decision, EngineConfig, ExecutionMode,
    OrchestrationEngine, PendingUnit, SequenceSpec,
};
use sequencer_types::env_utils::{env_bool, env_string};
use sequencer_types::{SignerIdentity, SimulationOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Single,
    Batch,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => ExecutionMode::Single,
            ModeArg::Batch => ExecutionMode::Batch,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LedgerArg {
    /// In-memory rehearsal ledger
    Sandbox,
    /// JSON-over-HTTP ledger gateway (requires --endpoint)
    Http,
}

#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Sequence file (.json, .yaml or .yml)
    pub file: PathBuf,

    /// Execution mode (overrides the sequence file)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Chain units without re-triggering (also SEQUENCER_AUTO_EXECUTE)
    #[arg(long)]
    pub auto: bool,

    /// Steps per batch (default: SEQUENCER_BATCH_SIZE or 5)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Pause before an auto-executed unit is simulated, in milliseconds
    #[arg(long)]
    pub settle_delay_ms: Option<u64>,

    /// Gas budget per submitted transaction
    #[arg(long)]
    pub max_gas: Option<u64>,

    /// Ledger to run against
    #[arg(long, value_enum, default_value = "sandbox")]
    pub ledger: LedgerArg,

    /// Ledger gateway URL (also SEQUENCER_LEDGER_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Sender address (also SEQUENCER_SENDER)
    #[arg(long)]
    pub sender: Option<String>,

    /// Sender public key (also SEQUENCER_PUBLIC_KEY)
    #[arg(long)]
    pub public_key: Option<String>,

    /// Explorer base URL for transaction links (also SEQUENCER_EXPLORER_URL)
    #[arg(long)]
    pub explorer_url: Option<String>,

    /// Confirm successful simulations without prompting
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// With --yes, also execute units whose simulation was rejected
    #[arg(long, requires = "yes")]
    pub force_rejected: bool,
}

const DEFAULT_SENDER: &str = "0x0";

impl RunCmd {
    pub async fn execute(&self, json_output: bool, verbose: bool) -> Result<()> {
        let result = self.execute_inner(json_output, verbose).await;
        if let Err(e) = &result {
            eprintln!("{}", format_error(e, json_output));
        }
        result
    }

    async fn execute_inner(&self, json_output: bool, verbose: bool) -> Result<()> {
        let mut spec = SequenceSpec::load_from_path(&self.file)?;
        if let Some(mode) = self.mode {
            spec.mode = mode.into();
        }
        spec.auto_execute |= self.auto || env_bool("SEQUENCER_AUTO_EXECUTE");

        let config = self.engine_config();
        let ledger = self.build_ledger()?;
        let identity = self.identity();
        debug!(
            ledger = ledger.network_name(),
            sender = %identity.address,
            "resolved ledger and signer"
        );
        let signer = Arc::new(LocalSigner::new(identity, ledger.clone()));
        let engine = OrchestrationEngine::spawn(config, ledger, signer)?;

        let decider: Box<dyn ConfirmDecider> = if self.yes {
            Box::new(AutoDecider {
                force_rejected: self.force_rejected,
            })
        } else {
            Box::new(PromptDecider { verbose })
        };

        let report = run_sequence(&engine, &spec, decider.as_ref()).await;
        engine.shutdown().await;
        let report = report?;

        if json_output {
            println!("{}", format_report_json(&report));
        } else {
            print!("{}", format_report(&report));
        }

        if report.stopped_early {
            bail!(
                "sequence stopped after {} of {} steps{}",
                report.committed_steps,
                report.total_steps,
                report
                    .stop_reason
                    .as_deref()
                    .map(|reason| format!(": {reason}"))
                    .unwrap_or_default()
            );
        }
        Ok(())
    }

    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(delay) = self.settle_delay_ms {
            config = config.with_settle_delay(Duration::from_millis(delay));
        }
        if let Some(max_gas) = self.max_gas {
            config.max_gas = max_gas;
        }
        if let Some(url) = &self.explorer_url {
            config = config.with_explorer_url(Some(url.clone()));
        }
        config
    }

    fn build_ledger(&self) -> Result<Arc<dyn LedgerClient>> {
        match self.ledger {
            LedgerArg::Sandbox => Ok(Arc::new(SandboxLedger::new())),
            LedgerArg::Http => {
                let endpoint = self
                    .endpoint
                    .clone()
                    .or_else(|| env_string("SEQUENCER_LEDGER_ENDPOINT"))
                    .ok_or_else(|| anyhow!("--ledger http requires --endpoint"))?;
                let client = HttpLedgerClient::new(&endpoint)
                    .with_context(|| format!("invalid ledger endpoint {endpoint}"))?;
                Ok(Arc::new(client))
            }
        }
    }

    fn identity(&self) -> SignerIdentity {
        let address = self
            .sender
            .clone()
            .or_else(|| env_string("SEQUENCER_SENDER"))
            .unwrap_or_else(|| DEFAULT_SENDER.to_string());
        let public_key = self
            .public_key
            .clone()
            .or_else(|| env_string("SEQUENCER_PUBLIC_KEY"))
            .unwrap_or_else(|| format!("local:{address}"));
        SignerIdentity {
            address,
            public_key,
        }
    }
}

/// Asks on the terminal before every submission.
struct PromptDecider {
    verbose: bool,
}

#[async_trait::async_trait]
impl ConfirmDecider for PromptDecider {
    async fn decide(&self, unit: &PendingUnit, outcome: &SimulationOutcome) -> Decision {
        let mut prompt = format!(
            "\n\x1b[1mSteps {}-{}\x1b[0m: {}\n",
            unit.step_range.start + 1,
            unit.step_range.end,
            unit.titles.join(", ")
        );
        prompt.push_str(&format_outcome(outcome, self.verbose));
        prompt.push_str(if outcome.success {
            "Execute? [y/N] "
        } else {
            "Execute anyway? [force/N] "
        });
        let success = outcome.success;

        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut stderr = std::io::stderr();
            stderr.write_all(prompt.as_bytes())?;
            stderr.flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        let answer = match answer {
            Ok(Ok(line)) => line.trim().to_ascii_lowercase(),
            _ => return Decision::Cancel,
        };
        match (success, answer.as_str()) {
            (true, "y" | "yes") => Decision::Confirm,
            (false, "force") => Decision::ForceConfirm,
            _ => Decision::Cancel,
        }
    }
}
