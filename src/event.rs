//! Typed events delivered to the application.
//!
//! The client converts every inbound server message into a
//! [`CrowdChessEvent`] after routing it through the mirrors, so the
//! application always receives *post-application* state: `GameState` carries
//! the full updated snapshot, never a partial patch. Two synthetic variants
//! (`Connected`, `Disconnected`) report transport lifecycle; `Disconnected`
//! is always delivered even under backpressure.

use crate::board::Side;
use crate::mirror::GameSnapshot;
use crate::protocol::{GameEndPayload, GameSummary};

/// Events emitted on the channel returned by
/// [`CrowdChessClient::start`](crate::client::CrowdChessClient::start).
#[derive(Debug, Clone)]
pub enum CrowdChessEvent {
    /// The transport (re)opened.
    Connected,
    /// The transport dropped; the client retries with backoff while the
    /// attempt budget lasts.
    Disconnected { reason: Option<String> },
    /// The reconnect attempt budget is exhausted; the client stays
    /// disconnected until the process restarts it.
    ReconnectFailed { attempts: u32 },
    /// The backend assigned this connection its canonical identity.
    IdentityAssigned { client_id: String },
    /// Matchmaking produced a pairing.
    MatchFound {
        game_id: String,
        players: Vec<String>,
        assigned_side: Side,
    },
    /// The viewed game's snapshot changed (boxed: snapshots are large).
    GameState(Box<GameSnapshot>),
    /// The viewed game ended (boxed to reduce enum size).
    GameEnded(Box<GameEndPayload>),
    /// Full games-list replacement.
    LobbyUpdated { games: Vec<GameSummary> },
    /// Total connections currently online.
    PlayersOnline { total_connections: u32 },
    /// EIP-712 permit data to hand to the wallet for signing.
    PermitData { permit_data: serde_json::Value },
    /// Backend-reported error, passed through verbatim.
    ServerError { message: String },
}
