//! Persistence collaborator boundary.
//!
//! The engine talks to an opaque store through this trait: durable upserts
//! of rounds and bets, per-user balance mutation, and the carried-bet query
//! used for both crash recovery and round-to-round carry-forward. The
//! schema behind it is not part of this core.

pub mod memory;

pub use memory::MemoryStore;

use crate::game::types::{Bet, Round};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Persisted user record. Balance is non-negative, 4-decimal precision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("user already exists: {0}")]
    DuplicateUser(String),

    #[error("insufficient balance: have {balance:.4}, need {required:.4}")]
    InsufficientBalance { balance: f64, required: f64 },

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),
}

/// Durable storage for rounds, bets, and user balances.
///
/// Balance mutation must be serialized per user by the implementation; two
/// concurrent settlements must never race on a single read-modify-write.
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn create_user(&self, username: &str, balance: f64) -> Result<UserRecord, StoreError>;

    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    /// Subtract `amount` from the user's balance, failing if funds are
    /// short. Returns the new balance.
    async fn debit_balance(&self, id: Uuid, amount: f64) -> Result<f64, StoreError>;

    /// Add `amount` to the user's balance. Returns the new balance, never
    /// below zero (clamp-on-floor).
    async fn credit_balance(&self, id: Uuid, amount: f64) -> Result<f64, StoreError>;

    async fn upsert_round(&self, round: &Round) -> Result<(), StoreError>;

    async fn upsert_bet(&self, bet: &Bet) -> Result<(), StoreError>;

    /// All bets still flagged carried/pending, ordered by descending
    /// amount. Used on startup recovery and at each round boundary.
    async fn load_carried_bets(&self) -> Result<Vec<Bet>, StoreError>;
}
