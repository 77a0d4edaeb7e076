//! Environment variable parsing utilities.
//!
//! Engine and CLI configuration can be overlaid from `SEQUENCER_*` variables.
//! These helpers keep that parsing in one place:
//!
//! ```
//! use sequencer_types::env_utils::{env_var, env_var_or};
//!
//! let batch_size: usize = env_var_or("SEQUENCER_BATCH_SIZE", 5);
//! let max_gas: Option<u64> = env_var("SEQUENCER_MAX_GAS");
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse an environment variable into a type that implements `FromStr`.
///
/// Returns `None` if the variable is not set or cannot be parsed.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse an environment variable with a default value.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

/// Check if an environment variable is set to a truthy value.
///
/// `1`, `true`, `yes` and `on` (case-insensitive) count as true.
pub fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Read a non-empty, trimmed string variable.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a millisecond count as a [`Duration`].
pub fn env_duration_ms(key: &str) -> Option<Duration> {
    env_var::<u64>(key).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_parsing() {
        std::env::set_var("SEQ_TEST_U64", " 42 ");
        let val: Option<u64> = env_var("SEQ_TEST_U64");
        assert_eq!(val, Some(42));

        let missing: Option<u64> = env_var("SEQ_NONEXISTENT_VAR_1");
        assert_eq!(missing, None);

        std::env::remove_var("SEQ_TEST_U64");
    }

    #[test]
    fn test_env_var_or_falls_back_on_garbage() {
        std::env::set_var("SEQ_TEST_GARBAGE", "not-a-number");
        let val: usize = env_var_or("SEQ_TEST_GARBAGE", 5);
        assert_eq!(val, 5);
        std::env::remove_var("SEQ_TEST_GARBAGE");
    }

    #[test]
    fn test_env_bool() {
        std::env::set_var("SEQ_TEST_BOOL_YES", "YES");
        std::env::set_var("SEQ_TEST_BOOL_NO", "0");

        assert!(env_bool("SEQ_TEST_BOOL_YES"));
        assert!(!env_bool("SEQ_TEST_BOOL_NO"));
        assert!(!env_bool("SEQ_NONEXISTENT_VAR_2"));

        std::env::remove_var("SEQ_TEST_BOOL_YES");
        std::env::remove_var("SEQ_TEST_BOOL_NO");
    }

    #[test]
    fn test_env_string_ignores_blank() {
        std::env::set_var("SEQ_TEST_BLANK", "   ");
        assert_eq!(env_string("SEQ_TEST_BLANK"), None);
        std::env::set_var("SEQ_TEST_BLANK", " https://explorer ");
        assert_eq!(
            env_string("SEQ_TEST_BLANK").as_deref(),
            Some("https://explorer")
        );
        std::env::remove_var("SEQ_TEST_BLANK");
    }

    #[test]
    fn test_env_duration_ms() {
        std::env::set_var("SEQ_TEST_DELAY", "250");
        assert_eq!(
            env_duration_ms("SEQ_TEST_DELAY"),
            Some(Duration::from_millis(250))
        );
        std::env::remove_var("SEQ_TEST_DELAY");
    }
}
