//! Move ordering and concurrent hand-out.
//!
//! A picker scores and sorts a node's moves once, then serves them through an
//! atomic cursor. That makes one picker shareable between the master and the
//! slaves of a split point: every move is handed out exactly once without
//! holding the split-point lock across the fetch.

use std::sync::atomic::{AtomicUsize, Ordering};

use arrayvec::ArrayVec;

use crate::constants::MAX_MOVES;
use crate::eval;
use crate::move_list::MoveList;
use crate::movegen;
use crate::moves::{Move, MoveKind};
use crate::piece::PieceType;
use crate::position::Position;
use crate::types::Value;

const QUEEN_PROMOTION_SCORE: i32 = 3_000_000;
const CAPTURE_SCORE: i32 = 2_000_000;
const KILLER_SCORE: i32 = 1_000_000;
const THREAT_EVASION_SCORE: i32 = 100_000;

struct ScoredMove {
    mv: Move,
    score: i32,
}

pub struct MovePicker {
    moves: ArrayVec<ScoredMove, MAX_MOVES>,
    cursor: AtomicUsize,
}

impl MovePicker {
    /// Picker over all pseudo-legal moves of `pos`, best first.
    pub fn new(pos: &Position, killers: [Option<Move>; 2], threat: Option<Move>) -> MovePicker {
        let mut list = MoveList::new();
        movegen::generate(pos, &mut list, false);
        MovePicker::from_list(pos, &list, killers, threat)
    }

    /// Picker over captures and promotions only (the qsearch move set).
    pub fn captures(pos: &Position) -> MovePicker {
        let mut list = MoveList::new();
        movegen::generate(pos, &mut list, true);
        MovePicker::from_list(pos, &list, [None; 2], None)
    }

    fn from_list(
        pos: &Position,
        list: &MoveList,
        killers: [Option<Move>; 2],
        threat: Option<Move>,
    ) -> MovePicker {
        let mut moves: ArrayVec<ScoredMove, MAX_MOVES> = list
            .iter()
            .map(|&mv| ScoredMove {
                mv,
                score: score_move(pos, mv, killers, threat),
            })
            .collect();
        moves.sort_unstable_by_key(|sm| -sm.score);

        MovePicker {
            moves,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Hands out the next move together with its 1-based pick count.
    /// Returns `None` once every move has been claimed.
    pub fn next(&self) -> Option<(Move, usize)> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.moves.get(index).map(|sm| (sm.mv, index + 1))
    }

    /// Moves not yet handed out. Advisory: concurrent `next` calls may have
    /// claimed more by the time the caller acts on it.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.moves
            .len()
            .saturating_sub(self.cursor.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

fn score_move(pos: &Position, mv: Move, killers: [Option<Move>; 2], threat: Option<Move>) -> i32 {
    if let MoveKind::Promotion(kind) = mv.kind {
        // Underpromotions are almost never right; search them late.
        let base = if kind == PieceType::Queen {
            QUEEN_PROMOTION_SCORE
        } else {
            -eval::QUEEN_VALUE
        };
        return base + victim_value(pos, mv);
    }

    if pos.is_capture(mv) {
        // MVV/LVA: most valuable victim first, cheapest attacker breaking ties.
        let attacker = pos
            .piece_on(mv.from)
            .map_or(0, |p| eval::piece_value(p.kind));
        return CAPTURE_SCORE + 16 * victim_value(pos, mv) - attacker;
    }

    if killers[0] == Some(mv) {
        return KILLER_SCORE + 1;
    }
    if killers[1] == Some(mv) {
        return KILLER_SCORE;
    }

    let mut score = 0;
    if let Some(threat) = threat {
        // Occupying the refutation's target square blocks or pre-empts it.
        if mv.to == threat.to {
            score += THREAT_EVASION_SCORE;
        }
    }
    if let Some(piece) = pos.piece_on(mv.from) {
        score += eval::piece_square(piece.color, piece.kind, mv.to)
            - eval::piece_square(piece.color, piece.kind, mv.from);
    }
    score
}

fn victim_value(pos: &Position, mv: Move) -> Value {
    if mv.kind == MoveKind::EnPassant {
        eval::PAWN_VALUE
    } else {
        pos.piece_on(mv.to).map_or(0, |p| eval::piece_value(p.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn captures_come_before_quiet_moves() {
        let pos =
            Position::from_fen("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 4 4")
                .unwrap();
        let picker = MovePicker::new(&pos, [None; 2], None);
        let mut last_score = i32::MAX;
        while let Some((mv, _)) = picker.next() {
            let score = score_move(&pos, mv, [None; 2], None);
            assert!(score <= last_score);
            last_score = score;
        }
    }

    #[test]
    fn every_move_is_handed_out_exactly_once() {
        let pos = Position::startpos();
        let picker = Arc::new(MovePicker::new(&pos, [None; 2], None));
        let total = picker.len();
        assert_eq!(total, 20);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let picker = picker.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some((mv, count)) = picker.next() {
                        seen.push((mv, count));
                    }
                    seen
                })
            })
            .collect();

        let mut all: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert_eq!(all.len(), total);
        all.sort_by_key(|&(_, count)| count);
        for (i, &(_, count)) in all.iter().enumerate() {
            assert_eq!(count, i + 1);
        }
        assert_eq!(picker.remaining(), 0);
    }

    #[test]
    fn killers_rank_above_other_quiets() {
        let pos = Position::startpos();
        let killer = Move::new(
            crate::square::Square::from_algebraic("b1").unwrap(),
            crate::square::Square::from_algebraic("c3").unwrap(),
            MoveKind::Normal,
        );
        let picker = MovePicker::new(&pos, [Some(killer), None], None);
        let (first, count) = picker.next().unwrap();
        assert_eq!(count, 1);
        assert_eq!(first, killer);
    }
}
