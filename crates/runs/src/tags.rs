//! Run tag protocol.
//!
//! Retry eligibility and lineage travel between processes as plain string
//! tags on runs. `RetryState` parses the retry-related tags once so the rest
//! of the code works with typed values; the string form only exists at this
//! edge.

use std::collections::BTreeMap;

use tracing::warn;

use crate::strategy::ReexecutionStrategy;

pub const SYSTEM_TAG_PREFIX: &str = "dagster/";

/// `"true"` when the run should be retried by the retry daemon.
pub const WILL_RETRY_TAG: &str = "dagster/will_retry";
/// Position of the run in its retry lineage (`"1"` for the first retry).
pub const RETRY_NUMBER_TAG: &str = "dagster/retry_number";
/// Re-execution strategy to use for retries of the run.
pub const RETRY_STRATEGY_TAG: &str = "dagster/retry_strategy";
/// Per-run override of the configured maximum number of retries.
pub const MAX_RETRIES_TAG: &str = "dagster/max_retries";
/// Per-run override of whether step failures are retried.
pub const RETRY_ON_ASSET_OR_OP_FAILURE_TAG: &str = "dagster/retry_on_asset_or_op_failure";
pub const PARENT_RUN_ID_TAG: &str = "dagster/parent_run_id";
pub const ROOT_RUN_ID_TAG: &str = "dagster/root_run_id";

/// Interpret an optional tag value as a boolean.
///
/// Missing tags yield `default`; `"false"`, `"none"`, `"0"` and `""` (any
/// case) are false; anything else is true.
pub fn get_boolean_tag_value(value: Option<&str>, default: bool) -> bool {
    match value {
        None => default,
        Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "false" | "none" | "0" | ""),
    }
}

/// Parse an optional non-negative integer tag, falling back to `default` on
/// missing or malformed values.
pub fn get_u32_tag_value(tags: &BTreeMap<String, String>, key: &str, default: u32) -> u32 {
    match tags.get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(tag = key, value = %raw, "ignoring malformed integer tag");
            default
        }),
    }
}

/// Raw state of the retry-strategy tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyTag {
    Absent,
    Known(ReexecutionStrategy),
    Unknown(String),
}

/// Retry-related state of a run, parsed from its tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// `WILL_RETRY` is set and true
    pub eligible: bool,
    /// Retry number of the run itself (0 for an original run)
    pub retry_number: u32,
    pub strategy: StrategyTag,
}

impl RetryState {
    pub fn from_tags(tags: &BTreeMap<String, String>) -> Self {
        let eligible = get_boolean_tag_value(tags.get(WILL_RETRY_TAG).map(String::as_str), false);
        let retry_number = get_u32_tag_value(tags, RETRY_NUMBER_TAG, 0);
        let strategy = match tags.get(RETRY_STRATEGY_TAG) {
            None => StrategyTag::Absent,
            Some(raw) => match raw.parse() {
                Ok(strategy) => StrategyTag::Known(strategy),
                Err(_) => StrategyTag::Unknown(raw.clone()),
            },
        };
        Self {
            eligible,
            retry_number,
            strategy,
        }
    }

    /// Retry number a retry of this run would carry.
    pub fn next_retry_number(&self) -> u32 {
        self.retry_number.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn boolean_tag_values() {
        assert!(get_boolean_tag_value(Some("true"), false));
        assert!(get_boolean_tag_value(Some("TRUE"), false));
        assert!(!get_boolean_tag_value(Some("false"), true));
        assert!(!get_boolean_tag_value(Some("0"), true));
        assert!(!get_boolean_tag_value(Some(""), true));
        assert!(get_boolean_tag_value(None, true));
        assert!(!get_boolean_tag_value(None, false));
    }

    #[test]
    fn retry_state_defaults() {
        let state = RetryState::from_tags(&BTreeMap::new());
        assert!(!state.eligible);
        assert_eq!(state.retry_number, 0);
        assert_eq!(state.strategy, StrategyTag::Absent);
        assert_eq!(state.next_retry_number(), 1);
    }

    #[test]
    fn retry_state_parses_all_tags() {
        let state = RetryState::from_tags(&tags(&[
            (WILL_RETRY_TAG, "true"),
            (RETRY_NUMBER_TAG, "2"),
            (RETRY_STRATEGY_TAG, "ALL_STEPS"),
        ]));
        assert!(state.eligible);
        assert_eq!(state.next_retry_number(), 3);
        assert_eq!(state.strategy, StrategyTag::Known(ReexecutionStrategy::AllSteps));
    }

    #[test]
    fn malformed_values_fall_back() {
        let state = RetryState::from_tags(&tags(&[
            (RETRY_NUMBER_TAG, "two"),
            (RETRY_STRATEGY_TAG, "SOMETIMES"),
        ]));
        assert_eq!(state.retry_number, 0);
        assert_eq!(state.strategy, StrategyTag::Unknown("SOMETIMES".to_string()));
    }
}
