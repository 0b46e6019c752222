//! Trip status lifecycle

use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing status of a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    /// Initial state, set at trip creation
    PendingAnalysis,
    /// Claimed by a worker
    Processing,
    /// Terminal, score persisted
    Completed,
    /// Terminal, no score persisted
    Failed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::PendingAnalysis => "PENDING_ANALYSIS",
            TripStatus::Processing => "PROCESSING",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: TripStatus) -> bool {
        matches!(
            (self, next),
            (TripStatus::PendingAnalysis, TripStatus::Processing)
                | (TripStatus::Processing, TripStatus::Completed)
                | (TripStatus::Processing, TripStatus::Failed)
        )
    }

    /// Validate a transition, returning the new status
    pub fn transition(self, next: TripStatus) -> Result<TripStatus, ModelError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ModelError::InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_ANALYSIS" => Ok(TripStatus::PendingAnalysis),
            "PROCESSING" => Ok(TripStatus::Processing),
            "COMPLETED" => Ok(TripStatus::Completed),
            "FAILED" => Ok(TripStatus::Failed),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TripStatus; 4] = [
        TripStatus::PendingAnalysis,
        TripStatus::Processing,
        TripStatus::Completed,
        TripStatus::Failed,
    ];

    #[test]
    fn test_forward_transitions() {
        assert!(TripStatus::PendingAnalysis.can_transition_to(TripStatus::Processing));
        assert!(TripStatus::Processing.can_transition_to(TripStatus::Completed));
        assert!(TripStatus::Processing.can_transition_to(TripStatus::Failed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [TripStatus::Completed, TripStatus::Failed] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_no_return_to_pending() {
        for from in ALL {
            assert!(!from.can_transition_to(TripStatus::PendingAnalysis));
        }
    }

    #[test]
    fn test_transition_error() {
        let err = TripStatus::Completed.transition(TripStatus::Processing).unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidTransition {
                from: TripStatus::Completed,
                to: TripStatus::Processing,
            }
        );
    }

    #[test]
    fn test_string_round_trip() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<TripStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<TripStatus>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TripStatus::PendingAnalysis).unwrap();
        assert_eq!(json, "\"PENDING_ANALYSIS\"");
    }
}
