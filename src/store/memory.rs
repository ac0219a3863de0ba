//! In-process store backed by sharded concurrent maps.
//!
//! The reference implementation of [`GameStore`]: development, tests, and
//! single-node deployments that accept losing history on restart. Per-user
//! balance mutation is serialized by the map's per-key entry lock.

use super::{GameStore, StoreError, UserRecord};
use crate::game::curve::round4;
use crate::game::types::{Bet, BetResult, Round};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, UserRecord>,
    users_by_name: DashMap<String, Uuid>,
    rounds: DashMap<Uuid, Round>,
    bets: DashMap<Uuid, Bet>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bet_count(&self) -> usize {
        self.bets.len()
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn get_bet(&self, id: Uuid) -> Option<Bet> {
        self.bets.get(&id).map(|entry| entry.clone())
    }

    pub fn get_round(&self, id: Uuid) -> Option<Round> {
        self.rounds.get(&id).map(|entry| entry.clone())
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn create_user(&self, username: &str, balance: f64) -> Result<UserRecord, StoreError> {
        if self.users_by_name.contains_key(username) {
            return Err(StoreError::DuplicateUser(username.to_string()));
        }
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            balance: round4(balance),
            created_at: Utc::now(),
        };
        self.users_by_name.insert(username.to_string(), user.id);
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let Some(id) = self.users_by_name.get(username).map(|entry| *entry) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|entry| entry.clone()))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.get(&id).map(|entry| entry.clone()))
    }

    async fn debit_balance(&self, id: Uuid, amount: f64) -> Result<f64, StoreError> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;
        if user.balance < amount {
            return Err(StoreError::InsufficientBalance {
                balance: user.balance,
                required: amount,
            });
        }
        user.balance = round4(user.balance - amount).max(0.0);
        Ok(user.balance)
    }

    async fn credit_balance(&self, id: Uuid, amount: f64) -> Result<f64, StoreError> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;
        user.balance = round4(user.balance + amount).max(0.0);
        Ok(user.balance)
    }

    async fn upsert_round(&self, round: &Round) -> Result<(), StoreError> {
        self.rounds.insert(round.id, round.clone());
        Ok(())
    }

    async fn upsert_bet(&self, bet: &Bet) -> Result<(), StoreError> {
        self.bets.insert(bet.id, bet.clone());
        Ok(())
    }

    async fn load_carried_bets(&self) -> Result<Vec<Bet>, StoreError> {
        let mut carried: Vec<Bet> = self
            .bets
            .iter()
            .filter(|entry| entry.carried && entry.result == BetResult::Pending)
            .map(|entry| entry.clone())
            .collect();
        carried.sort_by(|a, b| {
            b.amount
                .partial_cmp(&a.amount)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(carried)
    }
}
