//! WebSocket-facing surface: server wiring and the connection bridge.

pub mod server;
pub mod ws;

pub use server::{create_router, AppState, GameServer};
