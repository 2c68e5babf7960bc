//! Local precondition checks for user-initiated actions.
//!
//! Every propose/vote action is validated against the mirrored snapshot
//! *before* any network traffic. Rejections are ordinary values, not faults:
//! they come back as `Err(VoteRejection)` with a human-readable reason and are
//! never sent to the backend, logged as errors, or panicked on.
//!
//! The check order is part of the contract (wallet → game ready → turn →
//! clock → already-voted → source square) so the caller always sees the most
//! fundamental missing precondition first.

use std::fmt;

use crate::board::{Piece, Side, Square};
use crate::mirror::GameSnapshot;

/// Why a propose/vote action was rejected locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteRejection {
    /// No wallet is connected; voting requires a stakeable identity.
    WalletNotConnected,
    /// No game snapshot is current (not viewing a game yet).
    GameNotReady,
    /// The snapshot's side-to-move is not the caller's side.
    NotYourTurn { current_turn: Side },
    /// The round clock has run out.
    TimeExpired,
    /// The caller already voted this round.
    AlreadyVoted,
    /// The board has no piece on the proposal's source square.
    NoPieceAtSource { square: Square },
    /// `confirm_pending_move` was called with nothing staged.
    NothingToConfirm,
}

impl fmt::Display for VoteRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WalletNotConnected => write!(f, "wallet not connected"),
            Self::GameNotReady => write!(f, "game not ready"),
            Self::NotYourTurn { current_turn } => {
                write!(f, "not your turn (currently {current_turn} to move)")
            }
            Self::TimeExpired => write!(f, "time is up"),
            Self::AlreadyVoted => write!(f, "already voted this round"),
            Self::NoPieceAtSource { square } => write!(f, "no piece at {square}"),
            Self::NothingToConfirm => write!(f, "nothing to confirm"),
        }
    }
}

impl std::error::Error for VoteRejection {}

/// Everything the gatekeeper needs to know about the caller and the viewed
/// game, borrowed for the duration of one check.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub wallet_connected: bool,
    /// The current snapshot, if a game is being viewed.
    pub snapshot: Option<&'a GameSnapshot>,
    /// The caller's assigned side in the viewed game, if any.
    pub side: Option<Side>,
    /// The identifier stamped on outgoing requests.
    pub identifier: &'a str,
}

impl<'a> ActionContext<'a> {
    /// Preconditions shared by proposing and voting: wallet, game ready,
    /// turn, clock, already-voted — in that order.
    pub fn check_vote(&self) -> Result<&'a GameSnapshot, VoteRejection> {
        if !self.wallet_connected {
            return Err(VoteRejection::WalletNotConnected);
        }
        let snapshot = self.snapshot.ok_or(VoteRejection::GameNotReady)?;
        if self.side != Some(snapshot.current_turn) {
            return Err(VoteRejection::NotYourTurn {
                current_turn: snapshot.current_turn,
            });
        }
        if snapshot.time_remaining_ms == 0 {
            return Err(VoteRejection::TimeExpired);
        }
        if snapshot.has_voted(self.identifier) {
            return Err(VoteRejection::AlreadyVoted);
        }
        Ok(snapshot)
    }

    /// All vote preconditions plus the source-square check for a brand-new
    /// proposal. Returns the piece that would move.
    pub fn check_propose(&self, from: Square) -> Result<Piece, VoteRejection> {
        let snapshot = self.check_vote()?;
        snapshot
            .board
            .piece_at(from)
            .ok_or(VoteRejection::NoPieceAtSource { square: from })
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::GameStatus;

    fn ready_snapshot() -> GameSnapshot {
        let mut snapshot = GameSnapshot::new("G1");
        snapshot.status = GameStatus::Active;
        snapshot
    }

    fn context<'a>(snapshot: &'a GameSnapshot, side: Side) -> ActionContext<'a> {
        ActionContext {
            wallet_connected: true,
            snapshot: Some(snapshot),
            side: Some(side),
            identifier: "0xabc",
        }
    }

    #[test]
    fn happy_path_returns_the_moving_piece() {
        let snapshot = ready_snapshot();
        let ctx = context(&snapshot, Side::White);
        let piece = ctx.check_propose("e2".parse().unwrap()).unwrap();
        assert_eq!(piece.side, Side::White);
    }

    #[test]
    fn wallet_check_comes_first_regardless_of_other_state() {
        // Everything else is also wrong: wrong turn, expired clock, already
        // voted, empty source square. The wallet rejection must still win.
        let mut snapshot = ready_snapshot();
        snapshot.current_turn = Side::Black;
        snapshot.time_remaining_ms = 0;
        snapshot
            .player_voted_this_round
            .insert("0xabc".into(), true);
        let ctx = ActionContext {
            wallet_connected: false,
            ..context(&snapshot, Side::White)
        };
        assert_eq!(
            ctx.check_propose("e4".parse().unwrap()),
            Err(VoteRejection::WalletNotConnected)
        );
        assert_eq!(ctx.check_vote().unwrap_err(), VoteRejection::WalletNotConnected);
    }

    #[test]
    fn missing_snapshot_rejects_before_turn_checks() {
        let ctx = ActionContext {
            wallet_connected: true,
            snapshot: None,
            side: Some(Side::White),
            identifier: "0xabc",
        };
        assert_eq!(ctx.check_vote().unwrap_err(), VoteRejection::GameNotReady);
    }

    #[test]
    fn wrong_turn_is_rejected_with_the_current_owner() {
        let snapshot = ready_snapshot();
        let ctx = context(&snapshot, Side::Black);
        assert_eq!(
            ctx.check_vote().unwrap_err(),
            VoteRejection::NotYourTurn {
                current_turn: Side::White
            }
        );
    }

    #[test]
    fn spectators_have_no_turn() {
        let snapshot = ready_snapshot();
        let ctx = ActionContext {
            side: None,
            ..context(&snapshot, Side::White)
        };
        assert!(matches!(
            ctx.check_vote().unwrap_err(),
            VoteRejection::NotYourTurn { .. }
        ));
    }

    #[test]
    fn expired_clock_rejects_before_vote_state() {
        let mut snapshot = ready_snapshot();
        snapshot.time_remaining_ms = 0;
        snapshot
            .player_voted_this_round
            .insert("0xabc".into(), true);
        let ctx = context(&snapshot, Side::White);
        assert_eq!(ctx.check_vote().unwrap_err(), VoteRejection::TimeExpired);
    }

    #[test]
    fn already_voted_gates_both_paths_until_round_reset() {
        let mut snapshot = ready_snapshot();
        snapshot
            .player_voted_this_round
            .insert("0xabc".into(), true);
        let ctx = context(&snapshot, Side::White);
        assert_eq!(ctx.check_vote().unwrap_err(), VoteRejection::AlreadyVoted);
        assert_eq!(
            ctx.check_propose("e2".parse().unwrap()).unwrap_err(),
            VoteRejection::AlreadyVoted
        );

        // A round reset (empty voted map, as move_result delivers) reopens it.
        snapshot.player_voted_this_round.clear();
        let ctx = context(&snapshot, Side::White);
        assert!(ctx.check_vote().is_ok());
    }

    #[test]
    fn empty_source_square_is_rejected_last() {
        let snapshot = ready_snapshot();
        let ctx = context(&snapshot, Side::White);
        let square: Square = "e4".parse().unwrap();
        assert_eq!(
            ctx.check_propose(square).unwrap_err(),
            VoteRejection::NoPieceAtSource { square }
        );
        // Voting for an existing proposal performs no source-square check.
        assert!(ctx.check_vote().is_ok());
    }

    #[test]
    fn rejection_messages_are_human_readable() {
        assert_eq!(
            VoteRejection::WalletNotConnected.to_string(),
            "wallet not connected"
        );
        assert_eq!(
            VoteRejection::NotYourTurn {
                current_turn: Side::Black
            }
            .to_string(),
            "not your turn (currently black to move)"
        );
        assert_eq!(
            VoteRejection::NoPieceAtSource {
                square: "e4".parse().unwrap()
            }
            .to_string(),
            "no piece at e4"
        );
    }
}
