//! Chess board data model and wire conversion.
//!
//! The backend ships the board as an 8×8 grid of single-character codes
//! (uppercase = white, lowercase = black, `P/R/N/B/Q/K`, empty string = empty
//! square) with row 0 corresponding to rank 8. This module owns the mapping
//! between that wire grid, the typed [`Board`], and algebraic square notation.
//!
//! The coordinate invariant every conversion must preserve:
//! `rank = 8 - row`, `file = 'a' + col`, in both directions. The client never
//! computes move legality — a corrupted mapping here would silently poison the
//! source-square checks downstream, which is why the round-trips are tested
//! exhaustively.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two sides of a game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// The side that moves after this one.
    pub fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => write!(f, "white"),
            Side::Black => write!(f, "black"),
        }
    }
}

/// Kind of a chess piece.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Rook,
    Knight,
    Bishop,
    Queen,
    King,
}

/// A piece occupying one square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub side: Side,
    pub square: Square,
}

/// A board coordinate, stored as `(row, col)` with both in `0..8`.
///
/// Row 0 is rank 8 (the black back rank), column 0 is file `a`. The algebraic
/// form (`"e4"`) is available via [`Display`](fmt::Display) and [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Square {
    row: u8,
    col: u8,
}

impl Square {
    /// Create a square from array coordinates. Returns `None` unless both
    /// `row` and `col` are in `0..8`.
    pub fn from_coords(row: u8, col: u8) -> Option<Self> {
        if row < 8 && col < 8 {
            Some(Self { row, col })
        } else {
            None
        }
    }

    /// Array row, `0..8`, top to bottom (row 0 = rank 8).
    pub fn row(self) -> u8 {
        self.row
    }

    /// Array column, `0..8`, left to right (col 0 = file `a`).
    pub fn col(self) -> u8 {
        self.col
    }

    /// Chess rank, `1..=8`.
    pub fn rank(self) -> u8 {
        8 - self.row
    }

    /// Chess file as a lowercase letter, `'a'..='h'`.
    pub fn file(self) -> char {
        (b'a' + self.col) as char
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file(), self.rank())
    }
}

/// Error returned when parsing an algebraic square or move string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSquareError(String);

impl fmt::Display for ParseSquareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid square notation: {:?}", self.0)
    }
}

impl std::error::Error for ParseSquareError {}

impl FromStr for Square {
    type Err = ParseSquareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (file, rank) = match (chars.next(), chars.next(), chars.next()) {
            (Some(f), Some(r), None) => (f, r),
            _ => return Err(ParseSquareError(s.to_string())),
        };
        let col = (file as u32).wrapping_sub('a' as u32);
        let rank_num = rank.to_digit(10).unwrap_or(0);
        if col >= 8 || !(1..=8).contains(&rank_num) {
            return Err(ParseSquareError(s.to_string()));
        }
        // rank 8 is row 0; cast is safe after the range checks above.
        Ok(Self {
            row: (8 - rank_num) as u8,
            col: col as u8,
        })
    }
}

/// A source/destination square pair, wire-encoded as e.g. `"e2e4"`.
///
/// The backend identifies proposals by this four-character id; a trailing
/// promotion letter (`"e7e8q"`) is accepted and retained verbatim in the
/// original id string wherever one is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRef {
    pub from: Square,
    pub to: Square,
}

impl fmt::Display for MoveRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)
    }
}

impl FromStr for MoveRef {
    type Err = ParseSquareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 4 || !s.is_char_boundary(2) || !s.is_char_boundary(4) {
            return Err(ParseSquareError(s.to_string()));
        }
        let (from_part, rest) = s.split_at(2);
        let (to_part, _promotion) = rest.split_at(2);
        Ok(Self {
            from: from_part.parse()?,
            to: to_part.parse()?,
        })
    }
}

/// An 8×8 board of optional pieces, row 0 = rank 8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    squares: [[Option<Piece>; 8]; 8],
}

impl Board {
    /// An empty board.
    pub fn empty() -> Self {
        Self {
            squares: [[None; 8]; 8],
        }
    }

    /// The standard chess starting position.
    pub fn starting() -> Self {
        use PieceKind::*;
        let back_rank = [Rook, Knight, Bishop, Queen, King, Bishop, Knight, Rook];

        let mut board = Self::empty();
        for (col, kind) in back_rank.into_iter().enumerate() {
            let col = col as u8;
            board.place(Side::Black, kind, 0, col);
            board.place(Side::Black, Pawn, 1, col);
            board.place(Side::White, Pawn, 6, col);
            board.place(Side::White, kind, 7, col);
        }
        board
    }

    fn place(&mut self, side: Side, kind: PieceKind, row: u8, col: u8) {
        if let Some(square) = Square::from_coords(row, col) {
            if let Some(cell) = self
                .squares
                .get_mut(usize::from(row))
                .and_then(|r| r.get_mut(usize::from(col)))
            {
                *cell = Some(Piece { kind, side, square });
            }
        }
    }

    /// The piece at `square`, if any.
    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.squares
            .get(usize::from(square.row()))
            .and_then(|r| r.get(usize::from(square.col())))
            .copied()
            .flatten()
    }

    /// Iterate over all occupied squares.
    pub fn pieces(&self) -> impl Iterator<Item = Piece> + '_ {
        self.squares.iter().flatten().filter_map(|cell| *cell)
    }

    /// Build a board from the backend's character grid.
    ///
    /// Rows beyond the eighth, cells beyond the eighth column, empty strings
    /// and unrecognized codes all yield empty squares — a malformed grid
    /// degrades to missing pieces rather than an error, matching how the
    /// backend treats the grid as display data.
    pub fn from_wire(rows: &[Vec<String>]) -> Self {
        let mut board = Self::empty();
        for (row, cells) in rows.iter().take(8).enumerate() {
            for (col, code) in cells.iter().take(8).enumerate() {
                if let Some((kind, side)) = piece_from_code(code) {
                    board.place(side, kind, row as u8, col as u8);
                }
            }
        }
        board
    }

    /// Encode this board back into the backend's character grid.
    pub fn to_wire(&self) -> Vec<Vec<String>> {
        self.squares
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Some(piece) => piece_code(piece.kind, piece.side).to_string(),
                        None => String::new(),
                    })
                    .collect()
            })
            .collect()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::starting()
    }
}

fn piece_from_code(code: &str) -> Option<(PieceKind, Side)> {
    use PieceKind::*;
    match code {
        "P" => Some((Pawn, Side::White)),
        "R" => Some((Rook, Side::White)),
        "N" => Some((Knight, Side::White)),
        "B" => Some((Bishop, Side::White)),
        "Q" => Some((Queen, Side::White)),
        "K" => Some((King, Side::White)),
        "p" => Some((Pawn, Side::Black)),
        "r" => Some((Rook, Side::Black)),
        "n" => Some((Knight, Side::Black)),
        "b" => Some((Bishop, Side::Black)),
        "q" => Some((Queen, Side::Black)),
        "k" => Some((King, Side::Black)),
        _ => None,
    }
}

fn piece_code(kind: PieceKind, side: Side) -> &'static str {
    use PieceKind::*;
    match (kind, side) {
        (Pawn, Side::White) => "P",
        (Rook, Side::White) => "R",
        (Knight, Side::White) => "N",
        (Bishop, Side::White) => "B",
        (Queen, Side::White) => "Q",
        (King, Side::White) => "K",
        (Pawn, Side::Black) => "p",
        (Rook, Side::Black) => "r",
        (Knight, Side::Black) => "n",
        (Bishop, Side::Black) => "b",
        (Queen, Side::Black) => "q",
        (King, Side::Black) => "k",
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn coords_round_trip_every_square() {
        for row in 0u8..8 {
            for col in 0u8..8 {
                let square = Square::from_coords(row, col).unwrap();
                assert_eq!(square.row(), row);
                assert_eq!(square.col(), col);

                let notation = square.to_string();
                let reparsed: Square = notation.parse().unwrap();
                assert_eq!(reparsed, square, "round trip failed for {notation}");
            }
        }
    }

    #[test]
    fn notation_round_trip_every_square() {
        for file in 'a'..='h' {
            for rank in 1u8..=8 {
                let notation = format!("{file}{rank}");
                let square: Square = notation.parse().unwrap();
                assert_eq!(square.to_string(), notation);
                assert_eq!(square.rank(), rank);
                assert_eq!(square.file(), file);
            }
        }
    }

    #[test]
    fn rank_and_row_are_mirrored() {
        let e2: Square = "e2".parse().unwrap();
        assert_eq!(e2.row(), 6);
        assert_eq!(e2.col(), 4);

        let a8: Square = "a8".parse().unwrap();
        assert_eq!(a8.row(), 0);
        assert_eq!(a8.col(), 0);

        let h1: Square = "h1".parse().unwrap();
        assert_eq!(h1.row(), 7);
        assert_eq!(h1.col(), 7);
    }

    #[test]
    fn invalid_squares_fail_to_parse() {
        for bad in ["", "e", "e9", "i4", "e44", "44", "4e", "♔4"] {
            assert!(bad.parse::<Square>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn move_ref_round_trip() {
        let mv: MoveRef = "e2e4".parse().unwrap();
        assert_eq!(mv.from.to_string(), "e2");
        assert_eq!(mv.to.to_string(), "e4");
        assert_eq!(mv.to_string(), "e2e4");
    }

    #[test]
    fn move_ref_accepts_promotion_suffix() {
        let mv: MoveRef = "e7e8q".parse().unwrap();
        assert_eq!(mv.from.to_string(), "e7");
        assert_eq!(mv.to.to_string(), "e8");
    }

    #[test]
    fn move_ref_rejects_short_and_invalid() {
        assert!("e2".parse::<MoveRef>().is_err());
        assert!("e2e9".parse::<MoveRef>().is_err());
        assert!("♔♔♔♔".parse::<MoveRef>().is_err());
    }

    #[test]
    fn starting_board_has_expected_pieces() {
        let board = Board::starting();
        assert_eq!(board.pieces().count(), 32);

        let e2 = board.piece_at("e2".parse().unwrap()).unwrap();
        assert_eq!(e2.kind, PieceKind::Pawn);
        assert_eq!(e2.side, Side::White);

        let d8 = board.piece_at("d8".parse().unwrap()).unwrap();
        assert_eq!(d8.kind, PieceKind::Queen);
        assert_eq!(d8.side, Side::Black);

        assert!(board.piece_at("e4".parse().unwrap()).is_none());
    }

    #[test]
    fn wire_round_trip_reproduces_grid_exactly() {
        let grid = Board::starting().to_wire();
        assert_eq!(grid.len(), 8);
        assert_eq!(grid[0][0], "r");
        assert_eq!(grid[7][4], "K");
        assert_eq!(grid[4][4], "");

        let rebuilt = Board::from_wire(&grid);
        assert_eq!(rebuilt.to_wire(), grid);
        assert_eq!(rebuilt, Board::starting());
    }

    #[test]
    fn from_wire_ignores_unknown_codes_and_ragged_rows() {
        let grid = vec![
            vec!["X".to_string(), "k".to_string()],
            vec!["Q".to_string()],
        ];
        let board = Board::from_wire(&grid);
        assert!(board.piece_at(Square::from_coords(0, 0).unwrap()).is_none());
        let king = board.piece_at(Square::from_coords(0, 1).unwrap()).unwrap();
        assert_eq!(king.kind, PieceKind::King);
        assert_eq!(king.side, Side::Black);
        let queen = board.piece_at(Square::from_coords(1, 0).unwrap()).unwrap();
        assert_eq!(queen.side, Side::White);
        assert_eq!(board.pieces().count(), 2);
    }

    #[test]
    fn piece_square_matches_position() {
        let board = Board::starting();
        for piece in board.pieces() {
            assert_eq!(board.piece_at(piece.square), Some(piece));
        }
    }

    #[test]
    fn side_serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&Side::White).unwrap(), "\"white\"");
        let side: Side = serde_json::from_str("\"black\"").unwrap();
        assert_eq!(side, Side::Black);
    }

    #[test]
    fn opponent_flips() {
        assert_eq!(Side::White.opponent(), Side::Black);
        assert_eq!(Side::Black.opponent(), Side::White);
    }
}
