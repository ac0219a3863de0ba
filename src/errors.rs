//! Error types for the round engine and its socket bridge.

use crate::game::types::RoundPhase;
use crate::store::StoreError;
use thiserror::Error;

/// How an error should be handled at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input; rejected immediately, no state mutated, caller-only.
    Validation,
    /// Operation attempted in the wrong round phase; rejected, no retry.
    Phase,
    /// Durable-store failure; in-memory state stays intact, write retried.
    Persistence,
    /// Engine unavailable (shutdown in progress).
    Internal,
}

/// Everything that can go wrong handling a player operation.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("multiplier must exceed 1")]
    InvalidMultiplier(f64),

    #[error("username must not be empty")]
    MissingUsername,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("insufficient balance: have {balance:.4}, need {required:.4}")]
    InsufficientBalance { balance: f64, required: f64 },

    #[error("user {0} already has an active bet this round")]
    BetAlreadyPlaced(String),

    #[error("no active bet for user {0}")]
    NoActiveBet(String),

    #[error("bet already cashed out")]
    AlreadyCashedOut,

    #[error("{action} not allowed during {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: RoundPhase,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("engine is shutting down")]
    EngineClosed,
}

impl GameError {
    /// Taxonomy class used for logging and boundary handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            GameError::InvalidAmount(_)
            | GameError::InvalidMultiplier(_)
            | GameError::MissingUsername
            | GameError::UserNotFound(_)
            | GameError::InsufficientBalance { .. }
            | GameError::BetAlreadyPlaced(_)
            | GameError::NoActiveBet(_)
            | GameError::AlreadyCashedOut => ErrorClass::Validation,
            GameError::InvalidPhase { .. } => ErrorClass::Phase,
            GameError::Storage(_) => ErrorClass::Persistence,
            GameError::EngineClosed => ErrorClass::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(GameError::InvalidAmount(-1.0).class(), ErrorClass::Validation);
        assert_eq!(
            GameError::InvalidPhase {
                action: "cashout",
                phase: RoundPhase::Settling,
            }
            .class(),
            ErrorClass::Phase
        );
        assert_eq!(
            GameError::Storage(StoreError::WriteFailed("disk full".to_string())).class(),
            ErrorClass::Persistence
        );
    }

    #[test]
    fn test_phase_error_display() {
        let err = GameError::InvalidPhase {
            action: "place_bet",
            phase: RoundPhase::Running,
        };
        assert_eq!(err.to_string(), "place_bet not allowed during running");
    }
}
