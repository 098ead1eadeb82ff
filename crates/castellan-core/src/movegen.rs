//! Move generation.
//!
//! Generation is pseudo-legal; legality is settled by playing the move on a
//! copy and testing whether the mover's king can be taken. Castling is the
//! exception and is generated fully legal, since its no-attacked-squares
//! condition is part of the move's definition rather than a pin question.

use crate::move_list::MoveList;
use crate::moves::{Move, MoveKind};
use crate::piece::{Color, Piece, PieceType};
use crate::position::{
    BISHOP_DELTAS, BLACK_OO, BLACK_OOO, KING_DELTAS, KNIGHT_DELTAS, Position, ROOK_DELTAS,
    WHITE_OO, WHITE_OOO,
};
use crate::square::{Square, all_squares};

const PROMOTION_KINDS: [PieceType; 4] = [
    PieceType::Queen,
    PieceType::Rook,
    PieceType::Bishop,
    PieceType::Knight,
];

/// Generates pseudo-legal moves for the side to move. With `captures_only`,
/// restricts output to captures and promotions (the qsearch move set).
pub fn generate(pos: &Position, list: &mut MoveList, captures_only: bool) {
    let us = pos.side_to_move();

    for from in all_squares() {
        let Some(piece) = pos.piece_on(from) else {
            continue;
        };
        if piece.color != us {
            continue;
        }

        match piece.kind {
            PieceType::Pawn => generate_pawn_moves(pos, from, us, list, captures_only),
            PieceType::Knight => {
                generate_leaper_moves(pos, from, us, &KNIGHT_DELTAS, list, captures_only)
            }
            PieceType::King => {
                generate_leaper_moves(pos, from, us, &KING_DELTAS, list, captures_only)
            }
            PieceType::Bishop => {
                generate_slider_moves(pos, from, us, &BISHOP_DELTAS, list, captures_only)
            }
            PieceType::Rook => {
                generate_slider_moves(pos, from, us, &ROOK_DELTAS, list, captures_only)
            }
            PieceType::Queen => {
                generate_slider_moves(pos, from, us, &KING_DELTAS, list, captures_only)
            }
        }
    }

    if !captures_only {
        generate_castling(pos, us, list);
    }
}

fn push_pawn_move(list: &mut MoveList, from: Square, to: Square, us: Color, kind: MoveKind) {
    if to.rank() == us.promotion_rank() {
        for promo in PROMOTION_KINDS {
            list.push(Move::new(from, to, MoveKind::Promotion(promo)));
        }
    } else {
        list.push(Move::new(from, to, kind));
    }
}

fn generate_pawn_moves(
    pos: &Position,
    from: Square,
    us: Color,
    list: &mut MoveList,
    captures_only: bool,
) {
    let forward = us.forward();

    // Pushes. A promotion counts as a capture-like move for the qsearch.
    if let Some(to) = from.offset(forward) {
        if pos.piece_on(to).is_none() {
            if !captures_only || to.rank() == us.promotion_rank() {
                push_pawn_move(list, from, to, us, MoveKind::Normal);
            }
            if !captures_only && from.rank() == us.pawn_rank() {
                if let Some(to2) = to.offset(forward) {
                    if pos.piece_on(to2).is_none() {
                        list.push(Move::new(from, to2, MoveKind::DoublePush));
                    }
                }
            }
        }
    }

    for delta in [forward - 1, forward + 1] {
        let Some(to) = from.offset(delta) else {
            continue;
        };
        if let Some(target) = pos.piece_on(to) {
            if target.color != us {
                push_pawn_move(list, from, to, us, MoveKind::Normal);
            }
        } else if pos.ep_square() == Some(to) {
            list.push(Move::new(from, to, MoveKind::EnPassant));
        }
    }
}

fn generate_leaper_moves(
    pos: &Position,
    from: Square,
    us: Color,
    deltas: &[i16],
    list: &mut MoveList,
    captures_only: bool,
) {
    for &delta in deltas {
        let Some(to) = from.offset(delta) else {
            continue;
        };
        match pos.piece_on(to) {
            Some(target) if target.color != us => list.push(Move::new(from, to, MoveKind::Normal)),
            Some(_) => {}
            None if !captures_only => list.push(Move::new(from, to, MoveKind::Normal)),
            None => {}
        }
    }
}

fn generate_slider_moves(
    pos: &Position,
    from: Square,
    us: Color,
    deltas: &[i16],
    list: &mut MoveList,
    captures_only: bool,
) {
    for &delta in deltas {
        let mut cursor = from.offset(delta);
        while let Some(to) = cursor {
            match pos.piece_on(to) {
                Some(target) => {
                    if target.color != us {
                        list.push(Move::new(from, to, MoveKind::Normal));
                    }
                    break;
                }
                None => {
                    if !captures_only {
                        list.push(Move::new(from, to, MoveKind::Normal));
                    }
                    cursor = to.offset(delta);
                }
            }
        }
    }
}

fn generate_castling(pos: &Position, us: Color, list: &mut MoveList) {
    let them = !us;
    let rights = pos.castling_rights();
    let (oo, ooo, king_from) = match us {
        Color::White => (WHITE_OO, WHITE_OOO, Square::E1),
        Color::Black => (BLACK_OO, BLACK_OOO, Square::E8),
    };
    if rights & (oo | ooo) == 0 {
        return;
    }
    debug_assert_eq!(
        pos.piece_on(king_from),
        Some(Piece::new(us, PieceType::King))
    );
    let rank = king_from.rank();

    if rights & oo != 0
        && pos.piece_on(Square::new(5, rank)).is_none()
        && pos.piece_on(Square::new(6, rank)).is_none()
        && !pos.square_attacked(king_from, them)
        && !pos.square_attacked(Square::new(5, rank), them)
        && !pos.square_attacked(Square::new(6, rank), them)
    {
        list.push(Move::new(king_from, Square::new(6, rank), MoveKind::Castle));
    }

    if rights & ooo != 0
        && pos.piece_on(Square::new(1, rank)).is_none()
        && pos.piece_on(Square::new(2, rank)).is_none()
        && pos.piece_on(Square::new(3, rank)).is_none()
        && !pos.square_attacked(king_from, them)
        && !pos.square_attacked(Square::new(3, rank), them)
        && !pos.square_attacked(Square::new(2, rank), them)
    {
        list.push(Move::new(king_from, Square::new(2, rank), MoveKind::Castle));
    }
}

/// True when the pseudo-legal `m` does not leave the mover's king en prise.
#[inline]
pub fn is_legal(pos: &Position, m: Move) -> bool {
    let us = pos.side_to_move();
    let next = pos.do_move(m);
    !next.square_attacked(next.king_square(us), next.side_to_move())
}

/// All strictly legal moves; the root enumeration.
pub fn legal_moves(pos: &Position) -> MoveList {
    let mut pseudo = MoveList::new();
    generate(pos, &mut pseudo, false);

    let mut legal = MoveList::new();
    for &m in pseudo.iter() {
        if is_legal(pos, m) {
            legal.push(m);
        }
    }
    legal
}
