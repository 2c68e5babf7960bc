//! Client-side mirror of one game's authoritative state.
//!
//! The [`GameMirror`] holds exactly one [`GameSnapshot`] — the shadow of the
//! game currently being viewed — and mutates it only by applying server
//! deltas. The client never predicts move outcomes locally; it does not know
//! chess legality. Each `apply_*` method returns `true` when the delta was
//! accepted so the caller can republish the full snapshot to subscribers.
//!
//! Merge-vs-replace policy per field lives in exactly two places:
//! [`GameSnapshot::merge_counters`] (the sparse counter block — every field
//! overwritten only when present) and the individual `apply_*` methods
//! (proposed-move set: full replace; timer: overwrite; round reset: clear).
//! Once a snapshot reaches `Ended`, further deltas for that game are ignored
//! and logged as anomalies.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, warn};

use crate::board::{Board, MoveRef, Piece, Side, Square};
use crate::protocol::{
    GameEndPayload, GameStatus, MoveResultPayload, PlayerStats, StatCounters, VoteUpdatePayload,
    Winner,
};

/// Default voting-round length in milliseconds.
pub const DEFAULT_TURN_TIME_LIMIT_MS: u64 = 10_000;

/// A candidate move open for voting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedMove {
    /// Backend move id, e.g. `"e2e4"` (promotion suffix retained verbatim).
    pub id: String,
    pub mv: MoveRef,
    pub votes: u32,
}

/// An uncommitted move proposal the user has selected but not yet confirmed.
///
/// At most one exists per snapshot; staging a new one overwrites it. Cleared
/// on confirm, cancel, round reset and context switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMove {
    pub from: Square,
    pub to: Square,
    pub piece: Piece,
}

/// The locally held mirror of one game's authoritative state.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    pub game_id: String,
    pub status: GameStatus,
    pub current_turn: Side,
    /// 1-based move counter.
    pub current_move: u32,
    pub turn_time_limit_ms: u64,
    pub time_remaining_ms: u64,
    pub round_started_at: Instant,
    pub board: Board,
    pub last_move: Option<MoveRef>,
    /// Candidate moves for the current round, ordered by descending vote
    /// count then move id (the wire carries an unordered map).
    pub proposed_moves: Vec<ProposedMove>,
    /// Legal-move hints from the backend, display only.
    pub valid_moves: Vec<String>,
    pub white_players: u32,
    pub black_players: u32,
    pub white_round_votes: u64,
    pub black_round_votes: u64,
    pub white_total_votes: u64,
    pub black_total_votes: u64,
    pub total_pot: f64,
    pub white_pot: f64,
    pub black_pot: f64,
    pub player_voted_this_round: HashMap<String, bool>,
    pub player_total_votes: HashMap<String, u64>,
    // Terminal fields, populated only once status becomes Ended.
    pub winner: Option<Winner>,
    pub end_reason: Option<String>,
    pub white_team_players: Vec<PlayerStats>,
    pub black_team_players: Vec<PlayerStats>,
}

impl GameSnapshot {
    /// A fresh default snapshot: standard starting board, white to move,
    /// full round clock. Gives the UI something to render before the first
    /// server push arrives.
    pub fn new(game_id: impl Into<String>) -> Self {
        Self::with_turn_limit(game_id, DEFAULT_TURN_TIME_LIMIT_MS)
    }

    pub fn with_turn_limit(game_id: impl Into<String>, turn_time_limit_ms: u64) -> Self {
        Self {
            game_id: game_id.into(),
            status: GameStatus::Waiting,
            current_turn: Side::White,
            current_move: 1,
            turn_time_limit_ms,
            time_remaining_ms: turn_time_limit_ms,
            round_started_at: Instant::now(),
            board: Board::starting(),
            last_move: None,
            proposed_moves: Vec::new(),
            valid_moves: Vec::new(),
            white_players: 0,
            black_players: 0,
            white_round_votes: 0,
            black_round_votes: 0,
            white_total_votes: 0,
            black_total_votes: 0,
            total_pot: 0.0,
            white_pot: 0.0,
            black_pot: 0.0,
            player_voted_this_round: HashMap::new(),
            player_total_votes: HashMap::new(),
            winner: None,
            end_reason: None,
            white_team_players: Vec::new(),
            black_team_players: Vec::new(),
        }
    }

    /// Whether `identifier` has already voted in the current round.
    pub fn has_voted(&self, identifier: &str) -> bool {
        self.player_voted_this_round
            .get(identifier)
            .copied()
            .unwrap_or(false)
    }

    /// Lifetime vote count for `identifier`.
    pub fn total_votes_for(&self, identifier: &str) -> u64 {
        self.player_total_votes
            .get(identifier)
            .copied()
            .unwrap_or(0)
    }

    pub fn is_ended(&self) -> bool {
        self.status == GameStatus::Ended
    }

    /// Overwrite every field the sparse counter block carries; leave absent
    /// fields untouched. This is the single merge table for partial updates —
    /// do not merge counter fields anywhere else.
    fn merge_counters(&mut self, counters: &StatCounters) {
        if let Some(v) = counters.white_players {
            self.white_players = v;
        }
        if let Some(v) = counters.black_players {
            self.black_players = v;
        }
        if let Some(v) = counters.white_votes {
            self.white_round_votes = v;
        }
        if let Some(v) = counters.black_votes {
            self.black_round_votes = v;
        }
        if let Some(v) = counters.white_team_total_votes {
            self.white_total_votes = v;
        }
        if let Some(v) = counters.black_team_total_votes {
            self.black_total_votes = v;
        }
        if let Some(v) = counters.total_pot {
            self.total_pot = v;
        }
        if let Some(v) = counters.white_pot {
            self.white_pot = v;
        }
        if let Some(v) = counters.black_pot {
            self.black_pot = v;
        }
        if let Some(map) = &counters.player_voted_this_round {
            self.player_voted_this_round = map.clone();
        }
        if let Some(map) = &counters.player_total_votes {
            self.player_total_votes = map.clone();
        }
        if let Some(grid) = &counters.board {
            self.board = Board::from_wire(grid);
        }
    }
}

/// Owns the current [`GameSnapshot`] and the pending move, and applies
/// server deltas to them.
#[derive(Debug)]
pub struct GameMirror {
    snapshot: GameSnapshot,
    pending: Option<PendingMove>,
}

impl GameMirror {
    pub fn new(snapshot: GameSnapshot) -> Self {
        Self {
            snapshot,
            pending: None,
        }
    }

    pub fn snapshot(&self) -> &GameSnapshot {
        &self.snapshot
    }

    pub fn game_id(&self) -> &str {
        &self.snapshot.game_id
    }

    pub fn pending(&self) -> Option<PendingMove> {
        self.pending
    }

    /// Stage a proposal, overwriting any existing one.
    pub fn stage(&mut self, pending: PendingMove) {
        self.pending = Some(pending);
    }

    /// Clear the pending move, returning what was staged.
    pub fn take_pending(&mut self) -> Option<PendingMove> {
        self.pending.take()
    }

    /// Replace the proposed-move set wholesale and merge the sparse counters.
    pub fn apply_vote_update(&mut self, payload: &VoteUpdatePayload) -> bool {
        if !self.accepts(&payload.game_id, "vote_update") {
            return false;
        }
        let mut proposals: Vec<ProposedMove> = payload
            .votes
            .iter()
            .filter_map(|(id, votes)| match id.parse::<MoveRef>() {
                Ok(mv) => Some(ProposedMove {
                    id: id.clone(),
                    mv,
                    votes: *votes,
                }),
                Err(err) => {
                    warn!(game_id = %payload.game_id, %err, "dropping unparseable proposal id");
                    None
                }
            })
            .collect();
        proposals.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.id.cmp(&b.id)));
        self.snapshot.proposed_moves = proposals;
        self.snapshot.merge_counters(&payload.counters);
        true
    }

    /// Overwrite time-remaining; nothing else changes.
    pub fn apply_timer_tick(&mut self, game_id: &str, seconds_left: u64) -> bool {
        if !self.accepts(game_id, "timer_tick") {
            return false;
        }
        self.snapshot.time_remaining_ms = seconds_left.saturating_mul(1000);
        true
    }

    /// A move was executed: a new round begins. Clears the proposed-move set
    /// and the pending move, resets the round clock, and merges whatever
    /// scalars the payload carries.
    pub fn apply_move_result(&mut self, payload: &MoveResultPayload) -> bool {
        if !self.accepts(&payload.game_id, "move_result") {
            return false;
        }
        self.snapshot.proposed_moves.clear();
        self.snapshot.valid_moves.clear();
        self.pending = None;

        self.snapshot.merge_counters(&payload.counters);
        if let Some(turn) = payload.current_turn {
            self.snapshot.current_turn = turn;
        }
        if let Some(move_number) = payload.current_move {
            self.snapshot.current_move = move_number;
        }
        match payload.r#move.parse::<MoveRef>() {
            Ok(mv) => self.snapshot.last_move = Some(mv),
            Err(err) => {
                warn!(game_id = %payload.game_id, %err, "unparseable executed move id")
            }
        }
        self.snapshot.time_remaining_ms = self.snapshot.turn_time_limit_ms;
        self.snapshot.round_started_at = Instant::now();
        true
    }

    /// One-way transition into the terminal state.
    pub fn apply_game_end(&mut self, payload: &GameEndPayload) -> bool {
        if !self.accepts(&payload.game_id, "game_end") {
            return false;
        }
        self.snapshot.status = GameStatus::Ended;
        self.snapshot.winner = Some(payload.winner);
        self.snapshot.end_reason = Some(payload.game_end_reason.clone());
        if let Some(move_number) = payload.current_move {
            self.snapshot.current_move = move_number;
        }
        self.snapshot.white_team_players = payload.white_team_players.clone();
        self.snapshot.black_team_players = payload.black_team_players.clone();
        self.snapshot.merge_counters(&payload.counters);
        self.pending = None;
        true
    }

    /// Store valid-move hints for the current position.
    pub fn apply_valid_moves(&mut self, game_id: &str, valid_moves: &[String]) -> bool {
        if !self.accepts(game_id, "valid_moves_response") {
            return false;
        }
        self.snapshot.valid_moves = valid_moves.to_vec();
        true
    }

    /// Shared gate for every delta: the id must match the viewed game (the
    /// transport is a single multiplexed channel) and the snapshot must not
    /// already be terminal.
    fn accepts(&self, game_id: &str, kind: &str) -> bool {
        if game_id != self.snapshot.game_id {
            debug!(
                viewed = %self.snapshot.game_id,
                delta = %game_id,
                kind,
                "ignoring delta for another game"
            );
            return false;
        }
        if self.snapshot.is_ended() {
            warn!(game_id, kind, "delta for ended game ignored");
            return false;
        }
        true
    }
}

// ── Tests ───────────────────────────────────────────────────────────
