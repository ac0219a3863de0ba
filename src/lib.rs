//! crashpoint - real-time crash-game round engine.
//!
//! A round advances a multiplier upward until a pre-committed crash point;
//! players bet during a countdown window and may cash out any time before
//! the crash. One engine task owns all round and ledger state, a broadcast
//! feed streams ticks and leaderboards to observers, and a pluggable store
//! keeps bets and balances durable across restarts.

pub mod api;
pub mod config;
pub mod errors;
pub mod feed;
pub mod game;
pub mod store;

pub use config::CrashConfig;
pub use errors::GameError;
pub use game::engine::{EngineHandle, RoundEngine};
