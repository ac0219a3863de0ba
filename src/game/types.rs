//! Core round and bet types shared across the engine, store, and feed.

use crate::game::crash::CrashDraw;
use crate::game::curve::round4;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Round lifecycle phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    /// Countdown open, bets accepted.
    Betting,
    /// Multiplier climbing, cashouts accepted.
    Running,
    /// Crash happened, bets being resolved.
    Settling,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPhase::Betting => write!(f, "betting"),
            RoundPhase::Running => write!(f, "running"),
            RoundPhase::Settling => write!(f, "settling"),
        }
    }
}

/// Terminal state of a bet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BetResult {
    Pending,
    Win,
    Lose,
}

/// One play cycle. Immutable once created; never deleted, retained for
/// history. Bets reference a round by id, they never own it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: Uuid,
    /// Fixed at creation, revealed to players only at crash.
    pub crash_point: f64,
    /// Revealed with the crash point so the commitment can be checked.
    pub nonce: String,
    /// sha256 commitment published at round start.
    pub commitment: String,
    pub created_at: DateTime<Utc>,
}

impl Round {
    /// Create a round with a freshly drawn crash point in `[min, max)`.
    pub fn create(min_crash: f64, max_crash: f64) -> Self {
        let id = Uuid::new_v4();
        let draw = CrashDraw::generate(id, min_crash, max_crash);
        Self {
            id,
            crash_point: draw.crash_point,
            nonce: draw.nonce,
            commitment: draw.commitment,
            created_at: Utc::now(),
        }
    }
}

/// A single wager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    /// Stake, debited from the user at placement.
    pub amount: f64,
    /// Set at most once, only while the round is live; never overwritten.
    pub cashout_at: Option<f64>,
    /// Realized crash point, copied from the round at settlement.
    pub crash: Option<f64>,
    pub result: BetResult,
    /// True from placement until settlement; the recovery/carry-forward flag.
    pub carried: bool,
    /// Set if a disconnect forfeited the cashout window for this bet.
    #[serde(default)]
    pub forfeited: bool,
    pub round_id: Option<Uuid>,
    /// Originating connection, for targeted notifications.
    pub session: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Bet {
    pub fn new(user_id: Uuid, username: String, amount: f64, session: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            username,
            amount: round4(amount),
            cashout_at: None,
            crash: None,
            result: BetResult::Pending,
            carried: true,
            forfeited: false,
            round_id: None,
            session,
            created_at: Utc::now(),
            settled_at: None,
        }
    }
}

/// Read-only ledger projection broadcast to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub username: String,
    pub amount: f64,
    pub cashout_at: Option<f64>,
}

impl From<&Bet> for LedgerEntry {
    fn from(bet: &Bet) -> Self {
        Self {
            id: bet.id,
            username: bet.username.clone(),
            amount: bet.amount,
            cashout_at: bet.cashout_at,
        }
    }
}
