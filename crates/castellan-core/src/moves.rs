//! Moves and their UCI text form.

use std::fmt;

use crate::piece::PieceType;
use crate::square::Square;

/// Distinguishes moves whose execution differs from "pick up a piece, put it
/// down"; everything a make routine needs beyond the two squares.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MoveKind {
    Normal,
    /// Pawn two-square advance; sets the en passant square behind it.
    DoublePush,
    /// Capture of the pawn that just double-pushed; the victim is not on `to`.
    EnPassant,
    /// King move of two files; the rook hop is implied.
    Castle,
    Promotion(PieceType),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub kind: MoveKind,
}

impl Move {
    #[inline(always)]
    pub const fn new(from: Square, to: Square, kind: MoveKind) -> Move {
        Move { from, to, kind }
    }

    #[inline(always)]
    pub const fn is_promotion(self) -> bool {
        matches!(self.kind, MoveKind::Promotion(_))
    }

    /// Long algebraic notation as used by UCI: `e2e4`, `e7e8q`.
    pub fn to_uci(self) -> String {
        match self.kind {
            MoveKind::Promotion(kind) => {
                format!("{}{}{}", self.from, self.to, kind.promotion_char())
            }
            _ => format!("{}{}", self.from, self.to),
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uci())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uci_notation() {
        let quiet = Move::new(Square::from_algebraic("e2").unwrap(),
                              Square::from_algebraic("e4").unwrap(),
                              MoveKind::DoublePush);
        assert_eq!(quiet.to_uci(), "e2e4");

        let promo = Move::new(Square::from_algebraic("e7").unwrap(),
                              Square::from_algebraic("e8").unwrap(),
                              MoveKind::Promotion(PieceType::Queen));
        assert_eq!(promo.to_uci(), "e7e8q");

        let castle = Move::new(Square::E1, Square::G1, MoveKind::Castle);
        assert_eq!(castle.to_uci(), "e1g1");
    }
}
