//! Board representation: a 0x88 mailbox with copy-make semantics.
//!
//! `do_move` returns the successor position instead of mutating in place.
//! Shared-search workers each copy the split position and play their own
//! lines on the copy, so there is no undo stack to keep consistent across
//! threads.

use std::error::Error;
use std::fmt;

use crate::piece::{Color, Piece, PieceType};
use crate::moves::{Move, MoveKind};
use crate::square::{Square, all_squares};
use crate::constants::START_FEN;

pub const WHITE_OO: u8 = 1;
pub const WHITE_OOO: u8 = 2;
pub const BLACK_OO: u8 = 4;
pub const BLACK_OOO: u8 = 8;

pub const KNIGHT_DELTAS: [i16; 8] = [-33, -31, -18, -14, 14, 18, 31, 33];
pub const KING_DELTAS: [i16; 8] = [-17, -16, -15, -1, 1, 15, 16, 17];
pub const BISHOP_DELTAS: [i16; 4] = [-17, -15, 15, 17];
pub const ROOK_DELTAS: [i16; 4] = [-16, -1, 1, 16];

#[inline(always)]
const fn is_diagonal(delta: i16) -> bool {
    matches!(delta, -17 | -15 | 15 | 17)
}

/// Castling rights removed when a piece moves from or to `sq`.
fn castling_mask(sq: Square) -> u8 {
    match sq {
        Square::E1 => WHITE_OO | WHITE_OOO,
        Square::A1 => WHITE_OOO,
        Square::H1 => WHITE_OO,
        Square::E8 => BLACK_OO | BLACK_OOO,
        Square::A8 => BLACK_OOO,
        Square::H8 => BLACK_OO,
        _ => 0,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum FenError {
    BadBoard,
    BadSideToMove,
    BadCastling,
    BadEnPassant,
    BadCounter,
    MissingKing,
}

impl fmt::Display for FenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FenError::BadBoard => "malformed piece placement field",
            FenError::BadSideToMove => "side to move must be 'w' or 'b'",
            FenError::BadCastling => "malformed castling field",
            FenError::BadEnPassant => "malformed en passant field",
            FenError::BadCounter => "malformed move counter",
            FenError::MissingKing => "each side needs exactly one king",
        };
        write!(f, "{msg}")
    }
}

impl Error for FenError {}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Position {
    board: [Option<Piece>; 128],
    side: Color,
    castling: u8,
    ep_square: Option<Square>,
    halfmove_clock: u16,
    fullmove_number: u16,
    king_sq: [Square; 2],
}

impl Position {
    /// The standard starting position.
    pub fn startpos() -> Position {
        // START_FEN is well-formed.
        Position::from_fen(START_FEN).unwrap()
    }

    pub fn from_fen(fen: &str) -> Result<Position, FenError> {
        let mut fields = fen.split_whitespace();

        let board_field = fields.next().ok_or(FenError::BadBoard)?;
        let mut board = [None; 128];
        let mut kings = [None, None];
        let mut rank = 7i16;
        let mut file = 0i16;
        for c in board_field.chars() {
            match c {
                '/' => {
                    if file != 8 || rank == 0 {
                        return Err(FenError::BadBoard);
                    }
                    rank -= 1;
                    file = 0;
                }
                '1'..='8' => file += c as i16 - '0' as i16,
                _ => {
                    let piece = Piece::from_char(c).ok_or(FenError::BadBoard)?;
                    if file >= 8 {
                        return Err(FenError::BadBoard);
                    }
                    let sq = Square::new(file as u8, rank as u8);
                    if piece.kind == PieceType::King {
                        if kings[piece.color.index()].is_some() {
                            return Err(FenError::MissingKing);
                        }
                        kings[piece.color.index()] = Some(sq);
                    }
                    board[sq.index()] = Some(piece);
                    file += 1;
                }
            }
            if file > 8 {
                return Err(FenError::BadBoard);
            }
        }
        if rank != 0 || file != 8 {
            return Err(FenError::BadBoard);
        }
        let (Some(wk), Some(bk)) = (kings[0], kings[1]) else {
            return Err(FenError::MissingKing);
        };

        let side = match fields.next().ok_or(FenError::BadSideToMove)? {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(FenError::BadSideToMove),
        };

        let castling_field = fields.next().ok_or(FenError::BadCastling)?;
        let mut castling = 0;
        if castling_field != "-" {
            for c in castling_field.chars() {
                castling |= match c {
                    'K' => WHITE_OO,
                    'Q' => WHITE_OOO,
                    'k' => BLACK_OO,
                    'q' => BLACK_OOO,
                    _ => return Err(FenError::BadCastling),
                };
            }
        }

        let ep_field = fields.next().unwrap_or("-");
        let ep_square = if ep_field == "-" {
            None
        } else {
            Some(Square::from_algebraic(ep_field).ok_or(FenError::BadEnPassant)?)
        };

        let halfmove_clock = match fields.next() {
            Some(s) => s.parse().map_err(|_| FenError::BadCounter)?,
            None => 0,
        };
        let fullmove_number = match fields.next() {
            Some(s) => s.parse().map_err(|_| FenError::BadCounter)?,
            None => 1,
        };

        Ok(Position {
            board,
            side,
            castling,
            ep_square,
            halfmove_clock,
            fullmove_number,
            king_sq: [wk, bk],
        })
    }

    pub fn to_fen(&self) -> String {
        let mut fen = String::new();
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.board[Square::new(file, rank).index()] {
                    Some(piece) => {
                        if empty > 0 {
                            fen.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        fen.push(piece.to_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                fen.push((b'0' + empty) as char);
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(if self.side == Color::White { 'w' } else { 'b' });

        fen.push(' ');
        if self.castling == 0 {
            fen.push('-');
        } else {
            for (bit, c) in [
                (WHITE_OO, 'K'),
                (WHITE_OOO, 'Q'),
                (BLACK_OO, 'k'),
                (BLACK_OOO, 'q'),
            ] {
                if self.castling & bit != 0 {
                    fen.push(c);
                }
            }
        }

        match self.ep_square {
            Some(sq) => fen.push_str(&format!(" {sq}")),
            None => fen.push_str(" -"),
        }

        fen.push_str(&format!(" {} {}", self.halfmove_clock, self.fullmove_number));
        fen
    }

    #[inline(always)]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.board[sq.index()]
    }

    #[inline(always)]
    pub fn side_to_move(&self) -> Color {
        self.side
    }

    #[inline(always)]
    pub fn castling_rights(&self) -> u8 {
        self.castling
    }

    #[inline(always)]
    pub fn ep_square(&self) -> Option<Square> {
        self.ep_square
    }

    #[inline(always)]
    pub fn halfmove_clock(&self) -> u16 {
        self.halfmove_clock
    }

    #[inline(always)]
    pub fn fullmove_number(&self) -> u16 {
        self.fullmove_number
    }

    #[inline(always)]
    pub fn king_square(&self, color: Color) -> Square {
        self.king_sq[color.index()]
    }

    /// True when any piece of `by` attacks `sq`.
    pub fn square_attacked(&self, sq: Square, by: Color) -> bool {
        // Pawns: reverse the attack deltas of the attacking color.
        let pawn_deltas: [i16; 2] = match by {
            Color::White => [-15, -17],
            Color::Black => [15, 17],
        };
        for delta in pawn_deltas {
            if let Some(from) = sq.offset(delta) {
                if self.board[from.index()] == Some(Piece::new(by, PieceType::Pawn)) {
                    return true;
                }
            }
        }

        for delta in KNIGHT_DELTAS {
            if let Some(from) = sq.offset(delta) {
                if self.board[from.index()] == Some(Piece::new(by, PieceType::Knight)) {
                    return true;
                }
            }
        }

        for delta in KING_DELTAS {
            if let Some(from) = sq.offset(delta) {
                if self.board[from.index()] == Some(Piece::new(by, PieceType::King)) {
                    return true;
                }
            }
        }

        // Sliders: walk each ray to the first occupied square.
        for delta in KING_DELTAS {
            let mut from = sq.offset(delta);
            while let Some(cur) = from {
                if let Some(piece) = self.board[cur.index()] {
                    if piece.color == by
                        && (piece.kind == PieceType::Queen
                            || piece.kind
                                == if is_diagonal(delta) {
                                    PieceType::Bishop
                                } else {
                                    PieceType::Rook
                                })
                    {
                        return true;
                    }
                    break;
                }
                from = cur.offset(delta);
            }
        }

        false
    }

    /// True when the side to move is in check.
    #[inline]
    pub fn in_check(&self) -> bool {
        self.square_attacked(self.king_square(self.side), !self.side)
    }

    /// True when `m` takes an enemy piece (including en passant).
    #[inline]
    pub fn is_capture(&self, m: Move) -> bool {
        self.board[m.to.index()].is_some() || m.kind == MoveKind::EnPassant
    }

    /// Null-move gate: with only king and pawns, zugzwang is too common for
    /// the null search to be trusted.
    pub fn has_non_pawn_material(&self, color: Color) -> bool {
        all_squares().any(|sq| {
            self.board[sq.index()].is_some_and(|p| {
                p.color == color && !matches!(p.kind, PieceType::Pawn | PieceType::King)
            })
        })
    }

    /// Plays `m` and returns the resulting position.
    pub fn do_move(&self, m: Move) -> Position {
        let mut pos = *self;
        let us = self.side;
        let piece = self.board[m.from.index()].expect("move origin must be occupied");
        debug_assert_eq!(piece.color, us);

        let capture = self.is_capture(m);
        pos.halfmove_clock = if capture || piece.kind == PieceType::Pawn {
            0
        } else {
            pos.halfmove_clock + 1
        };
        pos.ep_square = None;

        pos.board[m.from.index()] = None;
        match m.kind {
            MoveKind::Normal => {
                pos.board[m.to.index()] = Some(piece);
            }
            MoveKind::DoublePush => {
                pos.board[m.to.index()] = Some(piece);
                pos.ep_square = Some(Square::new(m.from.file(), (m.from.rank() + m.to.rank()) / 2));
            }
            MoveKind::EnPassant => {
                pos.board[m.to.index()] = Some(piece);
                let victim = Square::new(m.to.file(), m.from.rank());
                pos.board[victim.index()] = None;
            }
            MoveKind::Castle => {
                pos.board[m.to.index()] = Some(piece);
                let rank = m.from.rank();
                let (rook_from, rook_to) = if m.to.file() == 6 {
                    (Square::new(7, rank), Square::new(5, rank))
                } else {
                    (Square::new(0, rank), Square::new(3, rank))
                };
                let rook = pos.board[rook_from.index()];
                pos.board[rook_from.index()] = None;
                pos.board[rook_to.index()] = rook;
            }
            MoveKind::Promotion(kind) => {
                pos.board[m.to.index()] = Some(Piece::new(us, kind));
            }
        }

        if piece.kind == PieceType::King {
            pos.king_sq[us.index()] = m.to;
        }
        pos.castling &= !(castling_mask(m.from) | castling_mask(m.to));

        pos.side = !us;
        if us == Color::Black {
            pos.fullmove_number += 1;
        }
        pos
    }

    /// Passes the turn. Only the side to move and the en passant square
    /// change; used by null-move pruning.
    pub fn do_null_move(&self) -> Position {
        debug_assert!(!self.in_check());
        let mut pos = *self;
        pos.side = !self.side;
        pos.ep_square = None;
        pos.halfmove_clock += 1;
        pos
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({})", self.to_fen())
    }
}
