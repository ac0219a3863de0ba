//! The round engine: crash generation, multiplier clock, bet ledger,
//! settlement, and the state machine that drives them.

pub mod crash;
pub mod curve;
pub mod engine;
pub mod ledger;
pub mod settlement;
pub mod types;

pub use curve::{round4, MultiplierCurve};
pub use engine::{EngineHandle, RoundEngine};
pub use ledger::BetLedger;
pub use settlement::SettlementEngine;
pub use types::{Bet, BetResult, LedgerEntry, Round, RoundPhase};
