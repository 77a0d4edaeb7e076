//! Fixture builders for sequences and identities.

use serde_json::json;
use std::io::Write;

use move_sequencer::types::{SignerIdentity, StepDefinition};

pub const SENDER: &str = "0xa11ce";

pub fn identity() -> SignerIdentity {
    SignerIdentity {
        address: SENDER.to_string(),
        public_key: "pk-alice".to_string(),
    }
}

/// A step calling `0x2::seq::<function>` with one numeric argument.
pub fn step(function: &str) -> StepDefinition {
    StepDefinition::new(
        format!("run {function}"),
        format!("0x2::seq::{function}")
            .parse()
            .expect("fixture target should parse"),
    )
    .with_arguments(vec![json!(1)])
}

/// `n` steps named `call_0` .. `call_{n-1}`.
pub fn steps(n: usize) -> Vec<StepDefinition> {
    (0..n).map(|i| step(&format!("call_{i}"))).collect()
}

/// Write `contents` to a temp file with the given extension.
pub fn write_sequence_file(extension: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(&format!(".{extension}"))
        .tempfile()
        .expect("create temp sequence file");
    file.write_all(contents.as_bytes())
        .expect("write temp sequence file");
    file
}
