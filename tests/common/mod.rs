#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Shared test utilities for CrowdChess client integration tests.
//!
//! Provides a channel-driven [`ChannelTransport`] — the test side holds a
//! [`ServerHandle`] and pushes server messages at controlled points, which is
//! what scenario tests need (a pre-scripted queue would be consumed before
//! the test gets to act) — plus fixture builders for common server payloads.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crowdchess_client::protocol::{
    GameEndPayload, GameSummary, MoveResultPayload, ServerMessage, StatCounters, VoteUpdatePayload,
    Winner,
};
use crowdchess_client::{Connector, CrowdChessError, Side, Transport};

type Scripted = Option<Result<String, CrowdChessError>>;

// ── ChannelTransport ────────────────────────────────────────────────

/// A mock transport fed by the test through a [`ServerHandle`].
///
/// Push `Some(Ok(json))` to deliver a message, `None` to simulate a clean
/// server-side close. Everything the client sends is recorded in `sent`.
pub struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<Scripted>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// The test's side of a [`ChannelTransport`].
#[derive(Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<Scripted>,
    /// Messages the client sent over this transport.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether the client closed this transport.
    pub closed: Arc<AtomicBool>,
}

impl ChannelTransport {
    pub fn new() -> (Self, ServerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, ServerHandle { tx, sent, closed })
    }
}

impl ServerHandle {
    /// Deliver a typed server message to the client.
    pub fn push(&self, msg: &ServerMessage) {
        self.push_raw(serde_json::to_string(msg).expect("serialize server message"));
    }

    /// Deliver a raw JSON string to the client.
    pub fn push_raw(&self, json: String) {
        let _ = self.tx.send(Some(Ok(json)));
    }

    /// Simulate a transport-level receive error.
    pub fn push_error(&self, message: &str) {
        let _ = self
            .tx
            .send(Some(Err(CrowdChessError::TransportReceive(message.into()))));
    }

    /// Simulate the server closing the connection cleanly.
    pub fn close_connection(&self) {
        let _ = self.tx.send(None);
    }

    /// Messages the client has sent so far, deserialized.
    pub fn sent_messages(&self) -> Vec<crowdchess_client::ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).expect("parse sent message"))
            .collect()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<(), CrowdChessError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, CrowdChessError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // Test dropped the handle — treat as a clean close.
            None => None,
        }
    }

    async fn close(&mut self) -> Result<(), CrowdChessError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out transports in order; dialing past the end fails the attempt.
pub struct MockConnector {
    transports: VecDeque<ChannelTransport>,
}

impl MockConnector {
    pub fn new(transports: Vec<ChannelTransport>) -> Self {
        Self {
            transports: VecDeque::from(transports),
        }
    }

    /// A connector with one transport, plus its server handle.
    pub fn single() -> (Self, ServerHandle) {
        let (transport, server) = ChannelTransport::new();
        (Self::new(vec![transport]), server)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = ChannelTransport;

    async fn connect(&mut self) -> Result<ChannelTransport, CrowdChessError> {
        self.transports
            .pop_front()
            .ok_or(CrowdChessError::TransportClosed)
    }
}

// ── Fixture builders ────────────────────────────────────────────────

/// A `client_connected` identity assignment.
pub fn client_connected(client_id: &str) -> ServerMessage {
    ServerMessage::ClientConnected {
        client_id: client_id.into(),
    }
}

/// A `vote_update` carrying only the votes map.
pub fn vote_update(game_id: &str, votes: &[(&str, u32)]) -> ServerMessage {
    ServerMessage::VoteUpdate(Box::new(vote_update_payload(game_id, votes)))
}

pub fn vote_update_payload(game_id: &str, votes: &[(&str, u32)]) -> VoteUpdatePayload {
    VoteUpdatePayload {
        game_id: game_id.into(),
        votes: votes
            .iter()
            .map(|(id, count)| (id.to_string(), *count))
            .collect(),
        counters: StatCounters::default(),
    }
}

/// A bare `move_result` with optional turn/move-number updates.
pub fn move_result(
    game_id: &str,
    mv: &str,
    current_turn: Option<Side>,
    current_move: Option<u32>,
) -> ServerMessage {
    ServerMessage::MoveResult(Box::new(MoveResultPayload {
        game_id: game_id.into(),
        r#move: mv.into(),
        current_turn,
        current_move,
        counters: StatCounters::default(),
    }))
}

/// A `timer_tick`.
pub fn timer_tick(game_id: &str, seconds_left: u64) -> ServerMessage {
    ServerMessage::TimerTick {
        game_id: game_id.into(),
        seconds_left,
    }
}

/// A minimal lobby entry.
pub fn game_summary(id: &str, status: Option<crowdchess_client::GameStatus>) -> GameSummary {
    GameSummary {
        id: id.into(),
        status,
        ..GameSummary::default()
    }
}

/// A terminal `game_end` with the given winner.
pub fn game_end(game_id: &str, winner: Winner, reason: &str) -> ServerMessage {
    ServerMessage::GameEnd(Box::new(GameEndPayload {
        game_id: game_id.into(),
        winner,
        game_end_reason: reason.into(),
        current_move: None,
        player_votes: None,
        white_team_players: vec![],
        black_team_players: vec![],
        counters: StatCounters::default(),
    }))
}

/// A `player_status` response. `team: None` encodes "not in this game".
pub fn player_status(game_id: &str, wallet_address: &str, team: Option<Side>) -> ServerMessage {
    ServerMessage::PlayerStatus {
        game_id: game_id.into(),
        wallet_address: wallet_address.into(),
        team,
    }
}

/// The wire board grid for the standard starting position.
pub fn starting_grid() -> Vec<Vec<String>> {
    crowdchess_client::Board::starting().to_wire()
}
