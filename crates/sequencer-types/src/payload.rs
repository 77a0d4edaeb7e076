//! Payloads handed to a ledger for evaluation or submission.
//!
//! A single step travels as an [`TransactionPayload::EntryFunction`]. A batch
//! travels as a [`TransactionPayload::Composite`] whose calls each carry an
//! explicit leading signer argument, followed by the step's own arguments.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::step::{OperationTarget, StepDefinition};

/// The callable part of a step, without its display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallUnit {
    pub target: OperationTarget,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

impl From<&StepDefinition> for CallUnit {
    fn from(step: &StepDefinition) -> Self {
        Self {
            target: step.target.clone(),
            type_arguments: step.type_arguments.clone(),
            arguments: step.arguments.clone(),
        }
    }
}

/// Argument of a call inside a composite payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ScriptArgument {
    /// The submitting account, passed as `&signer`.
    Signer(String),
    /// A plain value argument.
    Pure(Value),
}

/// One call inside a composite payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptCall {
    pub target: OperationTarget,
    /// Type arguments stay scoped to this call.
    pub type_arguments: Vec<String>,
    pub arguments: Vec<ScriptArgument>,
}

/// A payload ready for `evaluate` or `submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionPayload {
    EntryFunction(CallUnit),
    Composite { calls: Vec<ScriptCall> },
}

impl TransactionPayload {
    /// Number of remote calls this payload performs.
    pub fn call_count(&self) -> usize {
        match self {
            Self::EntryFunction(_) => 1,
            Self::Composite { calls } => calls.len(),
        }
    }

    /// Targets in call order.
    pub fn targets(&self) -> Vec<&OperationTarget> {
        match self {
            Self::EntryFunction(call) => vec![&call.target],
            Self::Composite { calls } => calls.iter().map(|call| &call.target).collect(),
        }
    }
}

impl fmt::Display for TransactionPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntryFunction(call) => write!(f, "{}", call.target),
            Self::Composite { calls } => {
                write!(f, "composite[{}]", calls.len())?;
                if let (Some(first), Some(last)) = (calls.first(), calls.last()) {
                    write!(f, " {} .. {}", first.target, last.target)?;
                }
                Ok(())
            }
        }
    }
}
