//! Live feed: broadcast game events plus per-connection targeted messages.
//!
//! Broadcast-only with respect to game state; nothing here mutates the
//! round or the ledger. Observers subscribe to a broadcast channel; the
//! session registry routes private notifications to a single connection.

use crate::game::types::{Bet, LedgerEntry};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

/// Events broadcast to every observer.
///
/// `round_start` carries the crash point for internal replay; a compliant
/// client must not render it before `round_end` reveals it. The commitment
/// is what clients show pre-crash.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    RoundStart {
        round_id: Uuid,
        crash_point_internal: f64,
        commitment: String,
    },
    MultiplierTick {
        multiplier: f64,
    },
    RoundEnd {
        round_id: Uuid,
        crash_point: f64,
        nonce: String,
    },
    CountdownTick {
        seconds_remaining: u64,
    },
    CashoutWindow {
        enabled: bool,
    },
    Leaderboard {
        entries: Vec<LedgerEntry>,
        is_final: bool,
    },
}

/// Messages delivered only to the originating connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetedEvent {
    BetConfirmed { bet: LedgerEntry },
    CashoutConfirmed { bet: LedgerEntry },
    BetSettled { bet: Bet },
    Error { message: String },
}

/// Fan-out handle for [`GameEvent`]s.
#[derive(Clone)]
pub struct FeedPublisher {
    tx: broadcast::Sender<GameEvent>,
}

impl FeedPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: GameEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("no feed subscribers to receive event: {}", e);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Connected sessions keyed by session id, each with a private channel.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, mpsc::UnboundedSender<TargetedEvent>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Uuid, tx: mpsc::UnboundedSender<TargetedEvent>) {
        self.sessions.insert(session, tx);
    }

    pub fn unregister(&self, session: Uuid) {
        self.sessions.remove(&session);
    }

    /// Deliver a targeted event; a miss (disconnected session) is not an
    /// error.
    pub fn send_to(&self, session: Uuid, event: TargetedEvent) {
        if let Some(tx) = self.sessions.get(&session) {
            if tx.send(event).is_err() {
                debug!(%session, "targeted send to closed session channel");
            }
        }
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.len()
    }
}
