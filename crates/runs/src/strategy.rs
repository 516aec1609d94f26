//! Re-execution strategies.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which steps a re-executed run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReexecutionStrategy {
    /// Only steps that failed or did not run in the parent
    #[default]
    FromFailure,
    /// Every step of the job
    AllSteps,
    /// Steps materializing assets that failed or were skipped in the parent
    FromAssetFailure,
}

impl ReexecutionStrategy {
    pub const ALL: [ReexecutionStrategy; 3] = [
        ReexecutionStrategy::FromFailure,
        ReexecutionStrategy::AllSteps,
        ReexecutionStrategy::FromAssetFailure,
    ];

    /// Tag value of this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReexecutionStrategy::FromFailure => "FROM_FAILURE",
            ReexecutionStrategy::AllSteps => "ALL_STEPS",
            ReexecutionStrategy::FromAssetFailure => "FROM_ASSET_FAILURE",
        }
    }
}

impl core::fmt::Display for ReexecutionStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A strategy tag value outside the known enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown re-execution strategy '{0}'")]
pub struct UnknownStrategy(pub String);

impl FromStr for ReexecutionStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_values_exactly() {
        for strategy in ReexecutionStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<ReexecutionStrategy>(), Ok(strategy));
        }
        assert_eq!(
            "from_failure".parse::<ReexecutionStrategy>(),
            Err(UnknownStrategy("from_failure".to_string()))
        );
    }

    #[test]
    fn default_is_from_failure() {
        assert_eq!(ReexecutionStrategy::default(), ReexecutionStrategy::FromFailure);
    }
}
