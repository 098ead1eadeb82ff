//! Perft node counting, the movegen acceptance test.

use crate::movegen;
use crate::position::Position;

/// Counts leaf nodes of the legal move tree to the given depth.
pub fn perft(pos: &Position, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let moves = movegen::legal_moves(pos);
    if depth == 1 {
        return moves.len() as u64;
    }
    moves
        .iter()
        .map(|&m| perft(&pos.do_move(m), depth - 1))
        .sum()
}

/// Per-move breakdown at the root, handy when chasing a generation bug.
pub fn perft_divide(pos: &Position, depth: u32) -> Vec<(String, u64)> {
    debug_assert!(depth >= 1);
    movegen::legal_moves(pos)
        .iter()
        .map(|&m| (m.to_uci(), perft(&pos.do_move(m), depth - 1)))
        .collect()
}
