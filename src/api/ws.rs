//! WebSocket bridge between connections and the round engine.
//!
//! Each connection gets a session id and a private channel in the session
//! registry. One task fans broadcast feed events and targeted messages
//! into the socket; the receive loop parses player commands and hands them
//! to the engine. The bridge never touches game state directly.

use super::server::AppState;
use crate::errors::ErrorClass;
use crate::feed::{GameEvent, TargetedEvent};
use crate::game::types::LedgerEntry;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Player commands arriving over the wire.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    PlaceBet { username: String, amount: f64 },
    Cashout { username: String, multiplier: f64 },
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let session = Uuid::new_v4();
    let (targeted_tx, mut targeted_rx) = mpsc::unbounded_channel::<TargetedEvent>();
    state.sessions.register(session, targeted_tx.clone());
    info!(%session, connected = state.sessions.connected_count(), "client connected");

    let (mut sink, mut stream) = socket.split();
    let mut feed_rx = state.feed.subscribe();

    // fan broadcast + targeted events into the socket
    let send_task = tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                event = feed_rx.recv() => match event {
                    Ok(event) => serde_json::to_string(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%session, skipped, "slow consumer dropped feed events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = targeted_rx.recv() => match event {
                    Some(event) => serde_json::to_string(&event),
                    None => break,
                },
            };
            let text = match payload {
                Ok(text) => text,
                Err(e) => {
                    warn!(%session, "failed to serialize event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // player commands from the socket into the engine
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_client_message(&state, session, &targeted_tx, &text).await;
            }
            Ok(Message::Close(_)) => {
                debug!(%session, "client requested close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%session, "websocket error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    state.sessions.unregister(session);
    // the bet survives the disconnect unless the engine is configured to
    // forfeit it
    state.engine.session_closed(session);
    info!(%session, remaining = state.sessions.connected_count(), "client disconnected");
}

async fn handle_client_message(
    state: &AppState,
    session: Uuid,
    targeted: &mpsc::UnboundedSender<TargetedEvent>,
    text: &str,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(%session, "unparseable client message: {}", e);
            let _ = targeted.send(TargetedEvent::Error {
                message: "invalid message".to_string(),
            });
            return;
        }
    };

    match message {
        ClientMessage::PlaceBet { username, amount } => {
            match state.engine.place_bet(username, amount, Some(session)).await {
                Ok(bet) => {
                    let _ = targeted.send(TargetedEvent::BetConfirmed {
                        bet: LedgerEntry::from(&bet),
                    });
                }
                Err(e) => reject(session, targeted, "place_bet", e),
            }
        }
        ClientMessage::Cashout {
            username,
            multiplier,
        } => match state.engine.cashout(username, multiplier).await {
            Ok(bet) => {
                let _ = targeted.send(TargetedEvent::CashoutConfirmed {
                    bet: LedgerEntry::from(&bet),
                });
            }
            Err(e) => reject(session, targeted, "cashout", e),
        },
    }
}

/// Report a rejected operation to the originating connection only.
fn reject(
    session: Uuid,
    targeted: &mpsc::UnboundedSender<TargetedEvent>,
    action: &str,
    error: crate::errors::GameError,
) {
    match error.class() {
        ErrorClass::Validation | ErrorClass::Phase => {
            debug!(%session, action, "rejected: {}", error)
        }
        _ => warn!(%session, action, "failed: {}", error),
    }
    let _ = targeted.send(TargetedEvent::Error {
        message: error.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"place_bet","username":"alice","amount":25.5}"#)
                .unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::PlaceBet { ref username, amount } if username == "alice" && amount == 25.5
        ));

        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"cashout","username":"bob","multiplier":2.1}"#)
                .unwrap();
        assert!(matches!(parsed, ClientMessage::Cashout { .. }));
    }

    #[test]
    fn test_unknown_message_type_fails_parse() {
        let parsed: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"steal_funds","username":"mallory"}"#);
        assert!(parsed.is_err());
    }
}
