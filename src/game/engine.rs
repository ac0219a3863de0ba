//! Round state machine: the single-writer owner of all round and ledger
//! state.
//!
//! Lifecycle: BETTING (countdown open) -> RUNNING (multiplier climbing) ->
//! SETTLING (resolving bets) -> BETTING. Every externally triggered
//! mutation (bet placement, cashout, crash tick) is serialized through one
//! task: player commands arrive on an mpsc queue and the multiplier timer
//! is an arm of the same select loop, so a cashout racing the crash tick is
//! either fully applied before the crash is processed or rejected after
//! it, never partially applied.

use crate::config::GameConfig;
use crate::errors::GameError;
use crate::feed::{FeedPublisher, GameEvent, SessionRegistry, TargetedEvent};
use crate::game::curve::round4;
use crate::game::ledger::BetLedger;
use crate::game::settlement::SettlementEngine;
use crate::game::types::{Bet, LedgerEntry, Round, RoundPhase};
use crate::store::{GameStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Mutations and queries serialized through the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    PlaceBet {
        username: String,
        amount: f64,
        session: Option<Uuid>,
        reply: oneshot::Sender<Result<Bet, GameError>>,
    },
    Cashout {
        username: String,
        multiplier: f64,
        reply: oneshot::Sender<Result<Bet, GameError>>,
    },
    /// A connection went away; forfeits the cashout window when configured.
    SessionClosed { session: Uuid },
    Phase {
        reply: oneshot::Sender<RoundPhase>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable sender side of the engine's command queue.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub async fn place_bet(
        &self,
        username: impl Into<String>,
        amount: f64,
        session: Option<Uuid>,
    ) -> Result<Bet, GameError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::PlaceBet {
                username: username.into(),
                amount,
                session,
                reply,
            })
            .await
            .map_err(|_| GameError::EngineClosed)?;
        rx.await.map_err(|_| GameError::EngineClosed)?
    }

    pub async fn cashout(
        &self,
        username: impl Into<String>,
        multiplier: f64,
    ) -> Result<Bet, GameError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Cashout {
                username: username.into(),
                multiplier,
                reply,
            })
            .await
            .map_err(|_| GameError::EngineClosed)?;
        rx.await.map_err(|_| GameError::EngineClosed)?
    }

    pub async fn phase(&self) -> Result<RoundPhase, GameError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Phase { reply })
            .await
            .map_err(|_| GameError::EngineClosed)?;
        rx.await.map_err(|_| GameError::EngineClosed)
    }

    /// Fire-and-forget disconnect notification.
    pub fn session_closed(&self, session: Uuid) {
        let _ = self.tx.try_send(EngineCommand::SessionClosed { session });
    }

    /// Stop the engine after draining in-flight settlement writes.
    pub async fn shutdown(&self) -> Result<(), GameError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Shutdown { reply })
            .await
            .map_err(|_| GameError::EngineClosed)?;
        rx.await.map_err(|_| GameError::EngineClosed)
    }
}

pub struct RoundEngine {
    config: GameConfig,
    store: Arc<dyn GameStore>,
    feed: FeedPublisher,
    sessions: SessionRegistry,
    ledger: BetLedger,
    settlement: SettlementEngine,
    phase: RoundPhase,
    round: Option<Round>,
    shutdown_reply: Option<oneshot::Sender<()>>,
}

impl RoundEngine {
    pub fn new(
        config: GameConfig,
        store: Arc<dyn GameStore>,
        feed: FeedPublisher,
        sessions: SessionRegistry,
    ) -> (Self, EngineHandle, mpsc::Receiver<EngineCommand>) {
        let (tx, rx) = mpsc::channel(config.command_buffer);
        let engine = Self {
            settlement: SettlementEngine::new(store.clone()),
            store,
            feed,
            sessions,
            config,
            ledger: BetLedger::new(),
            phase: RoundPhase::Betting,
            round: None,
            shutdown_reply: None,
        };
        (engine, EngineHandle { tx }, rx)
    }

    /// Spawn the engine task and return its handle.
    pub fn spawn(
        config: GameConfig,
        store: Arc<dyn GameStore>,
        feed: FeedPublisher,
        sessions: SessionRegistry,
    ) -> EngineHandle {
        let (engine, handle, rx) = Self::new(config, store, feed, sessions);
        tokio::spawn(engine.run(rx));
        handle
    }

    /// Drive rounds forever: init, run, teardown on shutdown.
    pub async fn run(mut self, mut commands: mpsc::Receiver<EngineCommand>) {
        self.recover().await;
        loop {
            if !self.betting_phase(&mut commands).await {
                break;
            }
            if !self.running_phase(&mut commands).await {
                break;
            }
            self.settle_current_round().await;
        }
        self.drain().await;
        if let Some(reply) = self.shutdown_reply.take() {
            let _ = reply.send(());
        }
        info!("round engine stopped");
    }

    /// Reload bets flagged still-active before opening BETTING, so a crash
    /// mid-round never strands money.
    async fn recover(&mut self) {
        match self.store.load_carried_bets().await {
            Ok(bets) if !bets.is_empty() => {
                info!(count = bets.len(), "recovered active bets from store");
                for bet in bets {
                    self.ledger.insert(bet);
                }
            }
            Ok(_) => {}
            Err(e) => error!("failed to load carried bets on startup: {}", e),
        }
    }

    /// Countdown window. Returns false on shutdown.
    async fn betting_phase(&mut self, commands: &mut mpsc::Receiver<EngineCommand>) -> bool {
        self.phase = RoundPhase::Betting;
        let round = Round::create(self.config.min_crash, self.config.max_crash);
        debug!(round_id = %round.id, crash_point = round.crash_point, "round created");
        self.settlement.persist_round(&round).await;
        self.rebind_ledger(round.id).await;
        self.round = Some(round);
        self.publish_leaderboard(false);

        let mut remaining = self.config.betting_window_secs;
        self.feed.publish(GameEvent::CountdownTick {
            seconds_remaining: remaining,
        });
        let mut ticker = interval(Duration::from_secs(1));
        ticker.tick().await; // the immediate first tick
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    remaining -= 1;
                    self.feed.publish(GameEvent::CountdownTick { seconds_remaining: remaining });
                    if remaining == 0 {
                        return true;
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
        }
    }

    /// Multiplier climb until the crash tick. Returns false on shutdown.
    async fn running_phase(&mut self, commands: &mut mpsc::Receiver<EngineCommand>) -> bool {
        let Some(round) = self.round.clone() else {
            error!("running phase entered without a round");
            return true;
        };
        self.phase = RoundPhase::Running;
        info!(round_id = %round.id, "round running");
        self.feed.publish(GameEvent::RoundStart {
            round_id: round.id,
            crash_point_internal: round.crash_point,
            commitment: round.commitment.clone(),
        });
        self.feed.publish(GameEvent::CashoutWindow { enabled: true });

        let started = Instant::now();
        let mut ticker = interval(self.config.tick_interval());
        // a late tick is skipped, never replayed, so multiplier events stay
        // strictly increasing and are never duplicated
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_published = 0.0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let multiplier = self.config.curve.multiplier_after(started.elapsed());
                    if multiplier >= round.crash_point {
                        // the crash tick, processed exactly once; every
                        // cashout from here on is rejected by phase
                        self.feed.publish(GameEvent::CashoutWindow { enabled: false });
                        self.feed.publish(GameEvent::RoundEnd {
                            round_id: round.id,
                            crash_point: round.crash_point,
                            nonce: round.nonce.clone(),
                        });
                        info!(round_id = %round.id, crash_point = round.crash_point, "round crashed");
                        return true;
                    }
                    if multiplier > last_published {
                        last_published = multiplier;
                        self.feed.publish(GameEvent::MultiplierTick { multiplier });
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
        }
    }

    /// Resolve and persist every bet, notify bettors, reload carry-forward.
    async fn settle_current_round(&mut self) {
        self.phase = RoundPhase::Settling;
        let Some(round) = self.round.take() else {
            return;
        };
        let bets = self.ledger.drain_for_settlement();
        let settled = self.settlement.settle_round(&round, bets).await;

        for bet in &settled {
            if let Some(session) = bet.session {
                self.sessions
                    .send_to(session, TargetedEvent::BetSettled { bet: bet.clone() });
            }
        }
        let entries: Vec<LedgerEntry> = settled.iter().map(LedgerEntry::from).collect();
        self.feed.publish(GameEvent::Leaderboard {
            entries,
            is_final: true,
        });

        // escape hatch: bets flagged to roll forward enter the next round
        match self.store.load_carried_bets().await {
            Ok(carried) => {
                for bet in carried {
                    self.ledger.insert(bet);
                }
            }
            Err(e) => error!("failed to reload carried bets: {}", e),
        }
    }

    /// Teardown: persist still-active bets as carried and flush the retry
    /// queue, so a restart recovers them.
    async fn drain(&mut self) {
        info!("draining round engine");
        for bet in self.ledger.drain_for_settlement() {
            if let Err(e) = self.store.upsert_bet(&bet).await {
                error!(bet_id = %bet.id, "failed to persist active bet during shutdown: {}", e);
            }
        }
        self.settlement.flush_retries().await;
    }

    async fn rebind_ledger(&mut self, round_id: Uuid) {
        for bet in self.ledger.assign_round(round_id) {
            if let Err(e) = self.store.upsert_bet(&bet).await {
                warn!(bet_id = %bet.id, "failed to persist round binding: {}", e);
                self.settlement.queue_bet_retry(bet);
            }
        }
    }

    fn publish_leaderboard(&self, is_final: bool) {
        self.feed.publish(GameEvent::Leaderboard {
            entries: self.ledger.snapshot(),
            is_final,
        });
    }

    /// Returns false when the engine should stop.
    async fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::PlaceBet {
                username,
                amount,
                session,
                reply,
            } => {
                let result = self.place_bet(&username, amount, session).await;
                let accepted = result.is_ok();
                let _ = reply.send(result);
                if accepted {
                    self.publish_leaderboard(false);
                }
            }
            EngineCommand::Cashout {
                username,
                multiplier,
                reply,
            } => {
                let result = self.cashout(&username, multiplier).await;
                let accepted = result.is_ok();
                let _ = reply.send(result);
                if accepted {
                    self.publish_leaderboard(false);
                }
            }
            EngineCommand::SessionClosed { session } => {
                if self.config.forfeit_on_disconnect {
                    if let Some(bet) = self.ledger.forfeit_session(session) {
                        info!(user = %bet.username, "cashout window forfeited on disconnect");
                    }
                }
            }
            EngineCommand::Phase { reply } => {
                let _ = reply.send(self.phase);
            }
            EngineCommand::Shutdown { reply } => {
                self.shutdown_reply = Some(reply);
                return false;
            }
        }
        true
    }

    async fn place_bet(
        &mut self,
        username: &str,
        amount: f64,
        session: Option<Uuid>,
    ) -> Result<Bet, GameError> {
        if username.is_empty() {
            return Err(GameError::MissingUsername);
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(GameError::InvalidAmount(amount));
        }
        if self.phase != RoundPhase::Betting {
            return Err(GameError::InvalidPhase {
                action: "place_bet",
                phase: self.phase,
            });
        }

        let user = match self.store.find_user(username).await? {
            Some(user) => user,
            None if self.config.auto_register => {
                self.store
                    .create_user(username, self.config.starting_balance)
                    .await?
            }
            None => return Err(GameError::UserNotFound(username.to_string())),
        };
        if self.ledger.has_active_bet(user.id) {
            return Err(GameError::BetAlreadyPlaced(username.to_string()));
        }

        match self.store.debit_balance(user.id, round4(amount)).await {
            Ok(_) => {}
            Err(StoreError::InsufficientBalance { balance, required }) => {
                return Err(GameError::InsufficientBalance { balance, required });
            }
            Err(e) => return Err(e.into()),
        }

        let mut bet = Bet::new(user.id, user.username, amount, session);
        bet.round_id = self.round.as_ref().map(|round| round.id);
        // placement is durable before the ack; a failed write keeps the
        // bet active in memory and queues the record for the retry sweep
        if let Err(e) = self.store.upsert_bet(&bet).await {
            warn!(bet_id = %bet.id, "bet accepted but not yet persisted: {}", e);
            self.settlement.queue_bet_retry(bet.clone());
        }
        self.ledger.insert(bet.clone());
        info!(user = %bet.username, amount = bet.amount, "bet placed");
        Ok(bet)
    }

    async fn cashout(&mut self, username: &str, multiplier: f64) -> Result<Bet, GameError> {
        if username.is_empty() {
            return Err(GameError::MissingUsername);
        }
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return Err(GameError::InvalidMultiplier(multiplier));
        }
        if self.phase != RoundPhase::Running {
            return Err(GameError::InvalidPhase {
                action: "cashout",
                phase: self.phase,
            });
        }

        let user = self
            .store
            .find_user(username)
            .await?
            .ok_or_else(|| GameError::UserNotFound(username.to_string()))?;
        let bet = self.ledger.mark_cashout(user.id, username, multiplier)?;

        // ack immediately; durability is reconciled at settlement, so the
        // tick cadence never waits on the store
        let store = self.store.clone();
        let record = bet.clone();
        tokio::spawn(async move {
            if let Err(e) = store.upsert_bet(&record).await {
                warn!(bet_id = %record.id, "deferred cashout write failed: {}", e);
            }
        });
        info!(
            user = %bet.username,
            multiplier = bet.cashout_at.unwrap_or(0.0),
            "cashout accepted"
        );
        Ok(bet)
    }
}
