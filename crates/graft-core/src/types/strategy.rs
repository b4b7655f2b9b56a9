//! Merge strategy selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How two conflicting ranges for the same package are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Pick the range with the higher minimum version
    Highest,
    /// Pick the range with the lower minimum version
    Lowest,
    /// Only accept ranges that share a major or overlap
    Compatible,
    /// Heuristic pick with confidence scoring
    #[default]
    Smart,
    /// Never pick; a human decides
    Manual,
}

impl MergeStrategy {
    pub const ALL: [MergeStrategy; 5] = [
        MergeStrategy::Highest,
        MergeStrategy::Lowest,
        MergeStrategy::Compatible,
        MergeStrategy::Smart,
        MergeStrategy::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Highest => "highest",
            MergeStrategy::Lowest => "lowest",
            MergeStrategy::Compatible => "compatible",
            MergeStrategy::Smart => "smart",
            MergeStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == lowered)
            .ok_or_else(|| {
                format!(
                    "unknown merge strategy '{}', expected one of highest, lowest, compatible, smart, manual",
                    s
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_smart() {
        assert_eq!(MergeStrategy::default(), MergeStrategy::Smart);
    }

    #[test]
    fn test_parse() {
        assert_eq!("Highest".parse::<MergeStrategy>(), Ok(MergeStrategy::Highest));
        assert_eq!(" manual ".parse::<MergeStrategy>(), Ok(MergeStrategy::Manual));
        assert!("newest".parse::<MergeStrategy>().is_err());
    }
}
