//! Lobby list mirror and client-side filtering.
//!
//! The backend never filters the games list: every `games_list` /
//! `games_list_update` push is a full replacement, and any status filtering
//! is a pure function over the held list, recomputed on every update and on
//! every filter change without a network round trip.

use std::collections::HashMap;

use crate::board::Side;
use crate::protocol::{GameStatus, GameSummary};

/// Status filter applied client-side to the full games list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    /// Games in play. Entries with no status are treated as active.
    Active,
    Ended,
}

/// Pure filter over a games list; the underlying list is never mutated.
pub fn filter_games(games: &[GameSummary], filter: StatusFilter) -> Vec<GameSummary> {
    games
        .iter()
        .filter(|game| match filter {
            StatusFilter::All => true,
            StatusFilter::Active => {
                matches!(game.status, Some(GameStatus::Active) | None)
            }
            StatusFilter::Ended => game.status == Some(GameStatus::Ended),
        })
        .cloned()
        .collect()
}

/// Holds the most recent full games list pushed by the backend.
#[derive(Debug, Default)]
pub struct LobbyMirror {
    games: Vec<GameSummary>,
}

impl LobbyMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire held collection. Entries are never patched
    /// individually.
    pub fn replace(&mut self, games: Vec<GameSummary>) {
        self.games = games;
    }

    pub fn games(&self) -> &[GameSummary] {
        &self.games
    }

    pub fn filtered(&self, filter: StatusFilter) -> Vec<GameSummary> {
        filter_games(&self.games, filter)
    }

    pub fn get(&self, game_id: &str) -> Option<&GameSummary> {
        self.games.iter().find(|game| game.id == game_id)
    }
}

/// The viewer's relationship to one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerRole {
    Team(Side),
    Spectator,
    /// Known to occupy no side (a cached negative answer).
    None,
}

impl PlayerRole {
    /// The side this role plays for, if any.
    pub fn side(self) -> Option<Side> {
        match self {
            PlayerRole::Team(side) => Some(side),
            _ => None,
        }
    }
}

/// Cache of "my status in this game", keyed per `(game, identifier)` pair.
///
/// Negative answers are cached too — the backend's reply is idempotent, so a
/// concurrent duplicate query at worst overwrites an identical value.
#[derive(Debug, Default)]
pub struct RoleCache {
    entries: HashMap<(String, String), PlayerRole>,
}

impl RoleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, game_id: &str, identifier: &str) -> Option<PlayerRole> {
        self.entries
            .get(&(game_id.to_string(), identifier.to_string()))
            .copied()
    }

    pub fn insert(&mut self, game_id: &str, identifier: &str, role: PlayerRole) {
        self.entries
            .insert((game_id.to_string(), identifier.to_string()), role);
    }
}

// ── Tests ───────────────────────────────────────────────────────────
