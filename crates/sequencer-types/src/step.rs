//! Step definitions.
//!
//! A step is one remote Move call: a fully qualified target
//! (`address::module::function`), its type arguments and its value arguments.
//! Steps are immutable once built; the engine only ever reads them.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Maximum number of hex digits in an account address.
const MAX_ADDRESS_HEX_LEN: usize = 64;

/// Identifies a remote entry function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TargetRepr", into = "String")]
pub struct OperationTarget {
    /// Module address, `0x`-prefixed lowercase hex.
    pub address: String,
    pub module: String,
    pub function: String,
}

impl OperationTarget {
    pub fn new(address: &str, module: &str, function: &str) -> Result<Self> {
        let address = normalize_address(address)?;
        validate_identifier(module, "module")?;
        validate_identifier(function, "function")?;
        Ok(Self {
            address,
            module: module.to_string(),
            function: function.to_string(),
        })
    }

    /// `address::module`, the part shared by every function in the module.
    pub fn module_id(&self) -> String {
        format!("{}::{}", self.address, self.module)
    }
}

impl fmt::Display for OperationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.address, self.module, self.function)
    }
}

impl FromStr for OperationTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split("::").collect();
        match parts.as_slice() {
            [address, module, function] => Self::new(address, module, function),
            _ => Err(anyhow!(
                "invalid target `{}` (expected <ADDRESS>::<MODULE>::<FUNCTION>)",
                s
            )),
        }
    }
}

impl From<OperationTarget> for String {
    fn from(target: OperationTarget) -> Self {
        target.to_string()
    }
}

/// Targets may be written either as `0x1::coin::transfer` or as an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum TargetRepr {
    Literal(String),
    Parts {
        address: String,
        module: String,
        function: String,
    },
}

impl TryFrom<TargetRepr> for OperationTarget {
    type Error = anyhow::Error;

    fn try_from(repr: TargetRepr) -> Result<Self> {
        match repr {
            TargetRepr::Literal(raw) => raw.parse(),
            TargetRepr::Parts {
                address,
                module,
                function,
            } => Self::new(&address, &module, &function),
        }
    }
}

/// Normalize a `0x`-prefixed hex address to lowercase.
pub fn normalize_address(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("address `{}` must start with 0x", raw))?;
    if hex.is_empty() || hex.len() > MAX_ADDRESS_HEX_LEN {
        bail!(
            "address `{}` must have between 1 and {} hex digits",
            raw,
            MAX_ADDRESS_HEX_LEN
        );
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("address `{}` contains non-hex characters", raw);
    }
    Ok(format!("0x{}", hex.to_ascii_lowercase()))
}

fn validate_identifier(value: &str, what: &str) -> Result<()> {
    let mut chars = value.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid {} identifier `{}`", what, value);
    }
    Ok(())
}

/// One remote operation in a configured sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub target: OperationTarget,
    #[serde(default)]
    pub type_arguments: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl StepDefinition {
    pub fn new(title: impl Into<String>, target: OperationTarget) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            target,
            type_arguments: Vec::new(),
            arguments: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type_arguments(mut self, type_arguments: Vec<String>) -> Self {
        self.type_arguments = type_arguments;
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }
}
