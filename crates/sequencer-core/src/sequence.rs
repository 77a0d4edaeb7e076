//! Sequence files.
//!
//! A sequence file names the ordered steps of one orchestration together
//! with the execution mode and auto-execute policy it should start with.
//! JSON and YAML are both accepted, chosen by file extension.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use sequencer_types::StepDefinition;

use crate::planner::{Batch, BatchPlanner};
use crate::state::ExecutionMode;

pub const SUPPORTED_SEQUENCE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSpec {
    #[serde(default = "default_sequence_version")]
    pub version: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub auto_execute: bool,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

fn default_sequence_version() -> u32 {
    SUPPORTED_SEQUENCE_VERSION
}

impl SequenceSpec {
    pub fn new(steps: Vec<StepDefinition>) -> Self {
        Self {
            version: SUPPORTED_SEQUENCE_VERSION,
            name: None,
            description: None,
            mode: ExecutionMode::Single,
            auto_execute: false,
            steps,
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read sequence file {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let spec = if ext == "yaml" || ext == "yml" {
            serde_yaml::from_str::<Self>(&raw)
                .with_context(|| format!("Invalid YAML sequence file {}", path.display()))?
        } else {
            serde_json::from_str::<Self>(&raw)
                .with_context(|| format!("Invalid JSON sequence file {}", path.display()))?
        };

        spec.validate()?;
        Ok(spec)
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("unnamed sequence")
    }

    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();
        self.collect_validation_issues(&mut issues);
        if issues.is_empty() {
            return Ok(());
        }

        let formatted = issues
            .into_iter()
            .enumerate()
            .map(|(idx, issue)| format!("  {}. {}", idx + 1, issue))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Sequence validation failed:\n{formatted}");
    }

    fn collect_validation_issues(&self, issues: &mut Vec<String>) {
        if self.version != SUPPORTED_SEQUENCE_VERSION {
            issues.push(format!(
                "unsupported version {} (expected {})",
                self.version, SUPPORTED_SEQUENCE_VERSION
            ));
        }
        if self.name.as_ref().is_some_and(|name| name.trim().is_empty()) {
            issues.push("name cannot be empty".to_string());
        }
        if self.steps.is_empty() {
            issues.push("steps must contain at least one entry".to_string());
        }

        for (idx, step) in self.steps.iter().enumerate() {
            let step_number = idx + 1;
            if step.title.trim().is_empty() {
                issues.push(format!("step {step_number} has an empty `title`"));
            }
            for (arg_idx, type_arg) in step.type_arguments.iter().enumerate() {
                if type_arg.trim().is_empty() {
                    issues.push(format!(
                        "step {step_number}: type argument {} is empty",
                        arg_idx + 1
                    ));
                }
            }
        }
    }

    /// Batch boundaries for `batch_size`, regardless of `mode`.
    pub fn plan(&self, batch_size: usize) -> Result<Vec<Batch>> {
        let planner = BatchPlanner::new(batch_size)?;
        Ok(planner.partition(&self.steps))
    }
}
