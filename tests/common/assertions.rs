//! Custom assertion utilities for tests.

use move_sequencer::core::ledger::{JournalKind, SandboxLedger};

/// Assert that an error message contains expected text (case-insensitive).
pub fn assert_error_contains<E: std::fmt::Display>(error: E, expected_text: &str, context: &str) {
    let error_str = error.to_string().to_lowercase();
    let expected_lower = expected_text.to_lowercase();

    assert!(
        error_str.contains(&expected_lower),
        "{}: error message should contain '{}', got: {}",
        context,
        expected_text,
        error
    );
}

/// Assert the ledger saw exactly `expected` calls, in order, each as
/// `(kind, functions called)`.
pub fn assert_journal_order(ledger: &SandboxLedger, expected: &[(JournalKind, &[&str])]) {
    let actual: Vec<(JournalKind, Vec<String>)> = ledger
        .journal()
        .into_iter()
        .map(|entry| (entry.kind, entry.functions()))
        .collect();
    let expected: Vec<(JournalKind, Vec<String>)> = expected
        .iter()
        .map(|(kind, functions)| (*kind, functions.iter().map(|f| f.to_string()).collect()))
        .collect();
    assert_eq!(actual, expected, "ledger journal order");
}
