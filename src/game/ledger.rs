//! Ordered set of active bets for the current round.
//!
//! Ordering invariant: descending stake amount, ties broken by insertion
//! order. No bet identity appears twice. The ledger is exclusively owned by
//! the engine task; nothing here is shared or locked.

use crate::errors::GameError;
use crate::game::curve::round4;
use crate::game::types::{Bet, LedgerEntry};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct BetLedger {
    bets: Vec<Bet>,
}

impl BetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    /// Insert preserving descending-amount order. A bet whose identity is
    /// already present is silently ignored. O(n), fine at expected round
    /// sizes of at most a few hundred bettors.
    pub fn insert(&mut self, bet: Bet) -> bool {
        if self.bets.iter().any(|existing| existing.id == bet.id) {
            debug!(bet_id = %bet.id, "ignoring duplicate ledger insert");
            return false;
        }
        let position = self
            .bets
            .iter()
            .position(|existing| existing.amount < bet.amount)
            .unwrap_or(self.bets.len());
        self.bets.insert(position, bet);
        true
    }

    /// Whether `user_id` already holds an unsettled bet. One active bet per
    /// user per round.
    pub fn has_active_bet(&self, user_id: Uuid) -> bool {
        self.bets.iter().any(|bet| bet.user_id == user_id)
    }

    /// Record a cashout on the user's active bet. The multiplier is set at
    /// most once; the win/lose tag is applied at settlement so a bet's
    /// result transitions exactly once.
    pub fn mark_cashout(
        &mut self,
        user_id: Uuid,
        username: &str,
        multiplier: f64,
    ) -> Result<Bet, GameError> {
        let bet = self
            .bets
            .iter_mut()
            .find(|bet| bet.user_id == user_id && !bet.forfeited)
            .ok_or_else(|| GameError::NoActiveBet(username.to_string()))?;

        if bet.cashout_at.is_some() {
            return Err(GameError::AlreadyCashedOut);
        }
        bet.cashout_at = Some(round4(multiplier));
        Ok(bet.clone())
    }

    /// Drop the cashout window for the bet tied to `session`. Returns the
    /// affected bet, if any. An already-cashed-out bet keeps its multiplier.
    pub fn forfeit_session(&mut self, session: Uuid) -> Option<Bet> {
        let bet = self
            .bets
            .iter_mut()
            .find(|bet| bet.session == Some(session) && bet.cashout_at.is_none())?;
        bet.forfeited = true;
        Some(bet.clone())
    }

    /// Bind every ledger bet to `round_id`, returning the bets whose
    /// binding changed so they can be re-persisted. A bet belongs to
    /// exactly one round once that round starts.
    pub fn assign_round(&mut self, round_id: Uuid) -> Vec<Bet> {
        self.bets
            .iter_mut()
            .filter(|bet| bet.round_id != Some(round_id))
            .map(|bet| {
                bet.round_id = Some(round_id);
                bet.clone()
            })
            .collect()
    }

    /// Return and clear the full ordered bet set.
    pub fn drain_for_settlement(&mut self) -> Vec<Bet> {
        std::mem::take(&mut self.bets)
    }

    /// Read-only projection for broadcast.
    pub fn snapshot(&self) -> Vec<LedgerEntry> {
        self.bets.iter().map(LedgerEntry::from).collect()
    }
}
