//! Stage kind enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed stages of an analysis run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// The agent describes the database schema it can reach.
    Schema,
    /// The agent produces the market segment document.
    Market,
    /// One customer analysis per market segment.
    Customer,
    /// The final documents are written to storage.
    Persist,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema => write!(f, "schema"),
            Self::Market => write!(f, "market"),
            Self::Customer => write!(f, "customer"),
            Self::Persist => write!(f, "persist"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Schema.to_string(), "schema");
        assert_eq!(StageKind::Customer.to_string(), "customer");
    }

    #[test]
    fn test_stage_kind_serialization() {
        let json = serde_json::to_string(&StageKind::Market).unwrap();
        assert_eq!(json, "\"market\"");
    }
}
