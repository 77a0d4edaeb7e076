//! Error taxonomy surfaced by the orchestration engine.
//!
//! Gateway and ledger plumbing works in `anyhow::Result`; everything that
//! crosses the engine boundary is translated into one of these kinds, each
//! carrying a message suitable for display.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum EngineError {
    /// The evaluate call could not complete (no signer, transport failure,
    /// malformed target, timeout). Retryable from the same cursor.
    Evaluation(String),

    /// The submit call failed (signer declined, broadcast rejected, network
    /// failure, timeout). The cursor is not advanced.
    Submission(String),

    /// Invalid engine configuration or a refused reconfiguration.
    Configuration(String),
}

impl EngineError {
    pub(crate) fn evaluation(err: anyhow::Error) -> Self {
        Self::Evaluation(format!("{err:#}"))
    }

    pub(crate) fn submission(err: anyhow::Error) -> Self {
        Self::Submission(format!("{err:#}"))
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Evaluation(_) => "evaluation",
            Self::Submission(_) => "submission",
            Self::Configuration(_) => "configuration",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Evaluation(message)
            | Self::Submission(message)
            | Self::Configuration(message) => message,
        }
    }

    /// Whether re-triggering the same unit is meaningful.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Evaluation(message) => write!(f, "EvaluationError: {}", message),
            Self::Submission(message) => write!(f, "SubmissionError: {}", message),
            Self::Configuration(message) => write!(f, "ConfigurationError: {}", message),
        }
    }
}

impl std::error::Error for EngineError {}
