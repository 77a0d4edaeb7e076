//! `validate` and `plan` commands - check a sequence file without running it

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use super::output::{format_plan, format_plan_json};
use sequencer_core::config::DEFAULT_BATCH_SIZE;
use sequencer_core::SequenceSpec;
use sequencer_types::env_utils::env_var_or;

#[derive(Parser, Debug)]
pub struct ValidateCmd {
    /// Sequence file (.json, .yaml or .yml)
    pub file: PathBuf,
}

impl ValidateCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let spec = SequenceSpec::load_from_path(&self.file)?;
        if json_output {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "valid": true,
                    "name": spec.display_name(),
                    "steps": spec.steps.len(),
                    "mode": spec.mode,
                    "auto_execute": spec.auto_execute,
                }))?
            );
        } else {
            println!(
                "\x1b[32m✓\x1b[0m {} is valid: {} step(s), {} mode{}",
                self.file.display(),
                spec.steps.len(),
                spec.mode.as_str(),
                if spec.auto_execute { ", auto-execute" } else { "" }
            );
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
pub struct PlanCmd {
    /// Sequence file (.json, .yaml or .yml)
    pub file: PathBuf,

    /// Steps per batch (default: SEQUENCER_BATCH_SIZE or 5)
    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl PlanCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let spec = SequenceSpec::load_from_path(&self.file)?;
        let batch_size = self
            .batch_size
            .unwrap_or_else(|| env_var_or("SEQUENCER_BATCH_SIZE", DEFAULT_BATCH_SIZE));
        let batches = spec.plan(batch_size)?;
        if json_output {
            println!("{}", format_plan_json(&spec, &batches, batch_size));
        } else {
            print!("{}", format_plan(&spec, &batches, batch_size));
        }
        Ok(())
    }
}
