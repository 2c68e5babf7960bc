//! # CrowdChess Client
//!
//! Transport-agnostic Rust client for the CrowdChess protocol — a
//! multiplayer, wager-based chess variant where many wallet-holding
//! participants per side propose and vote on candidate moves each round.
//!
//! This crate keeps a local mirror of authoritative game state consistent
//! with a stream of server-pushed deltas over one JSON-over-WebSocket
//! channel, and gates user actions (proposing a move, casting a vote)
//! against that mirrored state before anything reaches the wire. Move
//! legality, timers, vote tallying, pot accounting and matchmaking all live
//! in the backend; the client never predicts outcomes locally.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] and
//!   [`Connector`] traits for any backend
//! - **Wire-compatible** — all protocol types match the backend's JSON
//!   tagged-union format exactly
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   `WebSocketTransport` / `WebSocketConnector`
//! - **Self-healing** — automatic reconnect with exponential backoff, and
//!   the viewed game's `join_game` is replayed after every reopen
//! - **Event-driven** — receive typed [`CrowdChessEvent`]s via a channel,
//!   or register snapshot callbacks with RAII unsubscription
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crowdchess_client::{CrowdChessClient, CrowdChessConfig, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("wss://play.example.com/ws");
//! let (client, mut events) = CrowdChessClient::start(connector, CrowdChessConfig::new());
//!
//! client.set_wallet(Some("0xabc".into()));
//! client.begin_viewing("G1");
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         CrowdChessEvent::GameState(snapshot) => { /* render */ }
//!         CrowdChessEvent::ReconnectFailed { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod board;
pub mod client;
pub mod deeplink;
pub mod error;
pub mod event;
pub mod gatekeeper;
pub mod identity;
pub mod lobby;
pub mod mirror;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use board::{Board, MoveRef, Piece, PieceKind, Side, Square};
pub use client::{CrowdChessClient, CrowdChessConfig};
pub use error::CrowdChessError;
pub use event::CrowdChessEvent;
pub use gatekeeper::VoteRejection;
pub use lobby::{PlayerRole, StatusFilter};
pub use mirror::{GameMirror, GameSnapshot, PendingMove, ProposedMove};
pub use protocol::{ClientMessage, GameStatus, ServerMessage, Winner};
pub use registry::{SubscriberSet, Subscription};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::websocket::{WebSocketConnector, WebSocketTransport};
