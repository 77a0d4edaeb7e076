#![allow(dead_code)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: step lists, signer identities and sequence files
//! - `setup`: engine + sandbox ledger harness
//! - `assertions`: assertion helpers with readable failure messages

pub mod assertions;
pub mod fixtures;
pub mod setup;

pub use assertions::{assert_error_contains, assert_journal_order};
pub use fixtures::{identity, step, steps, write_sequence_file};
pub use setup::{fast_config, settle, wait_for, Harness, WAIT};
