//! Bet resolution and balance credit at the end of a round.
//!
//! A win pays `amount * cashout_at` (4-decimal rounding); the losing stake
//! was already debited at placement. Every settled bet is persisted before
//! the next countdown opens. A write that fails stays queued and is retried
//! on the next sweep; losing a settlement record is the most serious
//! failure in this system, so it is surfaced at error level, never dropped.

use crate::game::curve::round4;
use crate::game::types::{Bet, BetResult, Round};
use crate::store::GameStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A durable write that failed and is awaiting retry.
#[derive(Debug, Clone)]
enum RetryOp {
    /// Re-upsert a bet record (balance already applied).
    PersistBet(Bet),
    /// Credit a win, then upsert the bet record.
    CreditAndPersist { credit: f64, bet: Bet },
    /// Re-upsert a round record.
    PersistRound(Round),
}

pub struct SettlementEngine {
    store: Arc<dyn GameStore>,
    retries: Vec<RetryOp>,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self {
            store,
            retries: Vec::new(),
        }
    }

    /// Apply result, realized crash, and settlement timestamp. The single
    /// pending-to-terminal transition for this bet.
    fn resolve(bet: &mut Bet, crash_point: f64) {
        bet.result = match bet.cashout_at {
            Some(cashout) if cashout <= crash_point => BetResult::Win,
            _ => BetResult::Lose,
        };
        bet.crash = Some(crash_point);
        bet.carried = false;
        bet.settled_at = Some(Utc::now());
    }

    /// Resolve and persist every drained bet. Outcomes are independent
    /// across bets; a failure on one never blocks the rest. Returns the
    /// settled bets for broadcast and targeted notification.
    pub async fn settle_round(&mut self, round: &Round, bets: Vec<Bet>) -> Vec<Bet> {
        self.flush_retries().await;

        let mut settled = Vec::with_capacity(bets.len());
        for mut bet in bets {
            Self::resolve(&mut bet, round.crash_point);

            if bet.result == BetResult::Win {
                let credit = round4(bet.amount * bet.cashout_at.unwrap_or(0.0));
                if let Err(e) = self.store.credit_balance(bet.user_id, credit).await {
                    error!(
                        bet_id = %bet.id, user = %bet.username, credit,
                        "failed to credit win, queued for retry: {}", e
                    );
                    self.retries.push(RetryOp::CreditAndPersist {
                        credit,
                        bet: bet.clone(),
                    });
                    settled.push(bet);
                    continue;
                }
            }

            if let Err(e) = self.store.upsert_bet(&bet).await {
                error!(
                    bet_id = %bet.id, user = %bet.username,
                    "failed to persist settlement record, queued for retry: {}", e
                );
                self.retries.push(RetryOp::PersistBet(bet.clone()));
            }
            settled.push(bet);
        }

        info!(
            round_id = %round.id,
            crash_point = round.crash_point,
            bets = settled.len(),
            wins = settled.iter().filter(|b| b.result == BetResult::Win).count(),
            "round settled"
        );
        settled
    }

    /// Queue a bet record whose write failed outside settlement.
    pub fn queue_bet_retry(&mut self, bet: Bet) {
        self.retries.push(RetryOp::PersistBet(bet));
    }

    /// Persist a round record, queueing on failure.
    pub async fn persist_round(&mut self, round: &Round) {
        if let Err(e) = self.store.upsert_round(round).await {
            error!(round_id = %round.id, "failed to persist round, queued for retry: {}", e);
            self.retries.push(RetryOp::PersistRound(round.clone()));
        }
    }

    /// Reconciliation sweep: replay queued writes. Still-failing entries
    /// stay queued for the next sweep.
    pub async fn flush_retries(&mut self) {
        if self.retries.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.retries);
        let count = pending.len();
        for op in pending {
            match op {
                RetryOp::PersistBet(bet) => {
                    if let Err(e) = self.store.upsert_bet(&bet).await {
                        warn!(bet_id = %bet.id, "settlement retry failed again: {}", e);
                        self.retries.push(RetryOp::PersistBet(bet));
                    }
                }
                RetryOp::CreditAndPersist { credit, bet } => {
                    match self.store.credit_balance(bet.user_id, credit).await {
                        Ok(_) => {
                            if let Err(e) = self.store.upsert_bet(&bet).await {
                                warn!(bet_id = %bet.id, "settlement retry failed again: {}", e);
                                self.retries.push(RetryOp::PersistBet(bet));
                            }
                        }
                        Err(e) => {
                            warn!(bet_id = %bet.id, "credit retry failed again: {}", e);
                            self.retries.push(RetryOp::CreditAndPersist { credit, bet });
                        }
                    }
                }
                RetryOp::PersistRound(round) => {
                    if let Err(e) = self.store.upsert_round(&round).await {
                        warn!(round_id = %round.id, "round retry failed again: {}", e);
                        self.retries.push(RetryOp::PersistRound(round));
                    }
                }
            }
        }
        if self.retries.is_empty() {
            info!(recovered = count, "settlement retry queue drained");
        } else {
            error!(
                remaining = self.retries.len(),
                "settlement records still unpersisted after retry sweep"
            );
        }
    }

    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GameStore, MemoryStore, StoreError, UserRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    /// Store wrapper that fails writes while the switch is on.
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                failing: AtomicBool::new(false),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StoreError::WriteFailed("injected failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl GameStore for FlakyStore {
        async fn create_user(&self, username: &str, balance: f64) -> Result<UserRecord, StoreError> {
            self.inner.create_user(username, balance).await
        }
        async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
            self.inner.find_user(username).await
        }
        async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
            self.inner.get_user(id).await
        }
        async fn debit_balance(&self, id: Uuid, amount: f64) -> Result<f64, StoreError> {
            self.check()?;
            self.inner.debit_balance(id, amount).await
        }
        async fn credit_balance(&self, id: Uuid, amount: f64) -> Result<f64, StoreError> {
            self.check()?;
            self.inner.credit_balance(id, amount).await
        }
        async fn upsert_round(&self, round: &Round) -> Result<(), StoreError> {
            self.check()?;
            self.inner.upsert_round(round).await
        }
        async fn upsert_bet(&self, bet: &Bet) -> Result<(), StoreError> {
            self.check()?;
            self.inner.upsert_bet(bet).await
        }
        async fn load_carried_bets(&self) -> Result<Vec<Bet>, StoreError> {
            self.inner.load_carried_bets().await
        }
    }

    fn round_with_crash(crash_point: f64) -> Round {
        let mut round = Round::create(1.0, 11.0);
        round.crash_point = crash_point;
        round
    }

    #[tokio::test]
    async fn test_cashout_below_crash_wins_exact_credit() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user("alice", 0.0).await.unwrap();
        let mut engine = SettlementEngine::new(store.clone());

        let round = round_with_crash(3.0);
        let mut bet = Bet::new(user.id, "alice".to_string(), 100.0, None);
        bet.cashout_at = Some(2.5);

        let settled = engine.settle_round(&round, vec![bet]).await;
        assert_eq!(settled[0].result, BetResult::Win);
        assert_eq!(settled[0].crash, Some(3.0));
        assert_eq!(
            store.get_user(user.id).await.unwrap().unwrap().balance,
            250.0
        );
    }

    #[tokio::test]
    async fn test_no_cashout_loses_without_extra_debit() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user("bob", 50.0).await.unwrap();
        let mut engine = SettlementEngine::new(store.clone());

        let round = round_with_crash(3.0);
        let bet = Bet::new(user.id, "bob".to_string(), 50.0, None);

        let settled = engine.settle_round(&round, vec![bet]).await;
        assert_eq!(settled[0].result, BetResult::Lose);
        assert_eq!(settled[0].crash, Some(3.0));
        // stake was debited at placement; settlement touches nothing
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().balance, 50.0);
    }

    #[tokio::test]
    async fn test_cashout_above_crash_loses() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user("carol", 0.0).await.unwrap();
        let mut engine = SettlementEngine::new(store.clone());

        let round = round_with_crash(2.0);
        let mut bet = Bet::new(user.id, "carol".to_string(), 100.0, None);
        bet.cashout_at = Some(2.5);

        let settled = engine.settle_round(&round, vec![bet]).await;
        assert_eq!(settled[0].result, BetResult::Lose);
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().balance, 0.0);
    }

    #[tokio::test]
    async fn test_cashout_equal_to_crash_wins() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user("dave", 0.0).await.unwrap();
        let mut engine = SettlementEngine::new(store.clone());

        let round = round_with_crash(2.5);
        let mut bet = Bet::new(user.id, "dave".to_string(), 10.0, None);
        bet.cashout_at = Some(2.5);

        let settled = engine.settle_round(&round, vec![bet]).await;
        assert_eq!(settled[0].result, BetResult::Win);
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().balance, 25.0);
    }

    #[tokio::test]
    async fn test_settled_bets_are_persisted_and_not_carried() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user("alice", 0.0).await.unwrap();
        let mut engine = SettlementEngine::new(store.clone());

        let round = round_with_crash(3.0);
        let bet = Bet::new(user.id, "alice".to_string(), 100.0, None);
        let bet_id = bet.id;

        engine.settle_round(&round, vec![bet]).await;

        let persisted = store.get_bet(bet_id).expect("bet persisted");
        assert_eq!(persisted.result, BetResult::Lose);
        assert!(!persisted.carried);
        assert!(persisted.settled_at.is_some());
        assert!(store.load_carried_bets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_queues_retry_and_recovers() {
        let store = Arc::new(FlakyStore::new());
        let user = store.create_user("alice", 0.0).await.unwrap();
        let mut engine = SettlementEngine::new(store.clone());

        let round = round_with_crash(3.0);
        let mut bet = Bet::new(user.id, "alice".to_string(), 100.0, None);
        bet.cashout_at = Some(2.0);

        store.set_failing(true);
        let settled = engine.settle_round(&round, vec![bet]).await;
        // the bet is still resolved in memory even though nothing persisted
        assert_eq!(settled[0].result, BetResult::Win);
        assert_eq!(engine.pending_retries(), 1);
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().balance, 0.0);

        store.set_failing(false);
        engine.flush_retries().await;
        assert_eq!(engine.pending_retries(), 0);
        // credit applied exactly once on retry
        assert_eq!(
            store.get_user(user.id).await.unwrap().unwrap().balance,
            200.0
        );
        assert_eq!(store.inner.bet_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_does_not_double_credit() {
        let store = Arc::new(FlakyStore::new());
        let user = store.create_user("alice", 0.0).await.unwrap();
        let mut engine = SettlementEngine::new(store.clone());

        let round = round_with_crash(3.0);
        let mut bet = Bet::new(user.id, "alice".to_string(), 100.0, None);
        bet.cashout_at = Some(2.0);

        let settled = engine.settle_round(&round, vec![bet]).await;
        assert_eq!(settled[0].result, BetResult::Win);
        assert_eq!(engine.pending_retries(), 0);

        // sweeping again must not re-apply the credit
        engine.flush_retries().await;
        assert_eq!(
            store.get_user(user.id).await.unwrap().unwrap().balance,
            200.0
        );
    }

    #[tokio::test]
    async fn test_balance_never_negative_after_settlement() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user("alice", 100.0).await.unwrap();
        store.debit_balance(user.id, 100.0).await.unwrap();
        let mut engine = SettlementEngine::new(store.clone());

        let round = round_with_crash(1.5);
        let bet = Bet::new(user.id, "alice".to_string(), 100.0, None);
        engine.settle_round(&round, vec![bet]).await;

        let balance = store.get_user(user.id).await.unwrap().unwrap().balance;
        assert!(balance >= 0.0);
    }
}
