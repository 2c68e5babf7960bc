//! Wire-compatible protocol types for the CrowdChess backend.
//!
//! Every type in this module produces JSON identical to the backend's message
//! layer: messages are internally tagged unions (`"type"` discriminator in
//! `snake_case`) with payload fields inlined at the top level in `camelCase`.
//!
//! The backend pushes *sparse* deltas — `vote_update`, `move_result` and
//! `game_end` carry only the counters that changed. Every such field is
//! therefore `Option` (absent means "unchanged"), and the shared counter block
//! is factored into [`StatCounters`] so the merge policy lives in one place
//! (see [`crate::mirror`]).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::board::Side;

// ── Enums ───────────────────────────────────────────────────────────

/// Lifecycle status of a game as reported in lobby listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Active,
    Completed,
    Ended,
}

/// Outcome of a finished game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    White,
    Black,
    Draw,
}

// ── Structs ─────────────────────────────────────────────────────────

/// Per-player statistics reported when a game ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub wallet_address: String,
    #[serde(default)]
    pub total_votes: u64,
    #[serde(default)]
    pub total_spent: f64,
}

/// One entry in the lobby games list.
///
/// The backend replaces the whole list on every push, so entries carry no
/// patch semantics — whatever fields are absent simply default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Absent status is treated as "active" by lobby filtering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GameStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<Side>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_move: Option<u32>,
    pub white_players: u32,
    pub black_players: u32,
    pub spectators: u32,
    pub total_pot: f64,
    pub white_pot: f64,
    pub black_pot: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
}

/// The sparse counter block shared by `vote_update`, `move_result` and
/// `game_end` payloads. Absent fields mean "unchanged".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StatCounters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_players: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_players: Option<u32>,
    /// Current-round vote count for white.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_votes: Option<u64>,
    /// Current-round vote count for black.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_votes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_team_total_votes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_team_total_votes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pot: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_pot: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_pot: Option<f64>,
    /// Full replacement for the per-identifier "has voted this round" map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_voted_this_round: Option<HashMap<String, bool>>,
    /// Full replacement for the per-identifier lifetime vote counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_total_votes: Option<HashMap<String, u64>>,
    /// 8×8 character grid, row 0 = rank 8 (see [`crate::board`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<Vec<Vec<String>>>,
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload for the `vote_update` server message.
/// Boxed in `ServerMessage` to reduce enum size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteUpdatePayload {
    pub game_id: String,
    /// Full replacement for the proposed-move set: move id → vote count.
    #[serde(default)]
    pub votes: BTreeMap<String, u32>,
    #[serde(flatten)]
    pub counters: StatCounters,
}

/// Payload for the `move_result` server message.
/// Boxed in `ServerMessage` to reduce enum size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResultPayload {
    pub game_id: String,
    /// The executed move id, e.g. `"e2e4"`.
    pub r#move: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_move: Option<u32>,
    #[serde(flatten)]
    pub counters: StatCounters,
}

/// Payload for the `game_end` server message.
/// Boxed in `ServerMessage` to reduce enum size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndPayload {
    pub game_id: String,
    pub winner: Winner,
    pub game_end_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_move: Option<u32>,
    /// Lifetime vote count of the receiving player, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_votes: Option<u64>,
    #[serde(default)]
    pub white_team_players: Vec<PlayerStats>,
    #[serde(default)]
    pub black_team_players: Vec<PlayerStats>,
    #[serde(flatten)]
    pub counters: StatCounters,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a game as a participant; the server responds with the current
    /// state via the regular delta stream.
    JoinGame { game_id: String },
    /// Vote for a move. Submitting an id that is not yet proposed implicitly
    /// creates the proposal — the backend treats "propose" and "vote"
    /// identically.
    VoteMove {
        game_id: String,
        r#move: String,
        player_id: String,
    },
    /// Join one side of a game.
    JoinTeam {
        game_id: String,
        team: Side,
        player_id: String,
    },
    /// Watch a game as a read-only spectator.
    WatchGame { game_id: String },
    /// Enter the matchmaking queue.
    JoinMatchmaking { wallet_address: String },
    /// Leave the matchmaking queue.
    LeaveMatchmaking,
    /// Request the full games list (the response is always unfiltered;
    /// filtering is client-side).
    RequestGamesList,
    /// Ask which team, if any, a wallet occupies in a game.
    CheckPlayerStatus {
        game_id: String,
        wallet_address: String,
    },
    /// Request the legal moves for the current position (display hints only).
    GetValidMoves { game_id: String },
    /// Request the EIP-712 typed data to sign for stake approval.
    RequestPermit { wallet_address: String },
    /// Submit the wallet's signature over previously requested permit data.
    SubmitPermitSignature {
        wallet_address: String,
        signature: String,
    },
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Canonical connection identity assignment, sent once early in the
    /// connection lifecycle. Supersedes the client's provisional identifier.
    ClientConnected { client_id: String },
    /// Matchmaking produced a pairing.
    MatchFound {
        game_id: String,
        players: Vec<String>,
        assigned_side: Side,
    },
    /// Vote tallies changed (boxed to reduce enum size).
    VoteUpdate(Box<VoteUpdatePayload>),
    /// A move was executed; a new round begins (boxed to reduce enum size).
    MoveResult(Box<MoveResultPayload>),
    /// Round countdown tick.
    TimerTick { game_id: String, seconds_left: u64 },
    /// Full games list (response to `request_games_list`).
    GamesList { games_list: Vec<GameSummary> },
    /// Unsolicited full games-list replacement.
    GamesListUpdate { games_list: Vec<GameSummary> },
    /// Total connections currently online.
    NumberOfPlayers { total_connections: u32 },
    /// Response to `check_player_status`. `team` is empty when the wallet
    /// occupies no side in the game.
    PlayerStatus {
        game_id: String,
        wallet_address: String,
        #[serde(with = "side_or_empty")]
        team: Option<Side>,
    },
    /// Legal moves for the current position.
    ValidMovesResponse {
        game_id: String,
        #[serde(default)]
        valid_moves: Vec<String>,
    },
    /// EIP-712 typed data for the wallet to sign (opaque to this client).
    PermitData { permit_data: serde_json::Value },
    /// Terminal game result (boxed to reduce enum size).
    GameEnd(Box<GameEndPayload>),
    /// Error message, passed through to the application verbatim.
    Error { error: String },
}

/// Serde adapter for the backend's `team` field, which encodes "no team" as
/// an empty string rather than `null`.
mod side_or_empty {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::board::Side;

    pub fn serialize<S: Serializer>(side: &Option<Side>, ser: S) -> Result<S::Ok, S::Error> {
        match side {
            Some(Side::White) => ser.serialize_str("white"),
            Some(Side::Black) => ser.serialize_str("black"),
            None => ser.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Side>, D::Error> {
        let raw = String::deserialize(de)?;
        match raw.as_str() {
            "white" => Ok(Some(Side::White)),
            "black" => Ok(Some(Side::Black)),
            _ => Ok(None),
        }
    }
}
