//! Coarse congestion level from the total vehicle count across all lanes.

use serde::{Deserialize, Serialize};

/// Above this total the intersection is `High`.
pub const HIGH_THRESHOLD: u64 = 100;
/// Above this total the intersection is `Severe`.
pub const SEVERE_THRESHOLD: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionLevel {
    Normal,
    High,
    Severe,
}

impl std::fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::High => write!(f, "High"),
            Self::Severe => write!(f, "Severe"),
        }
    }
}

/// Classify a total vehicle count.
#[must_use]
pub fn classify(total: u64) -> CongestionLevel {
    if total > SEVERE_THRESHOLD {
        CongestionLevel::Severe
    } else if total > HIGH_THRESHOLD {
        CongestionLevel::High
    } else {
        CongestionLevel::Normal
    }
}
