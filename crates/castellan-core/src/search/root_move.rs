use crate::moves::Move;
use crate::types::{VALUE_INFINITE, Value};

/// A root move with its search results across iterations.
#[derive(Clone, Debug)]
pub struct RootMove {
    pub mv: Move,
    /// Best score in the current iteration.
    pub score: Value,
    /// Score from the previous iteration; partial iterations fall back to it.
    pub previous_score: Value,
    /// Principal variation starting with `mv`.
    pub pv: Vec<Move>,
}

impl RootMove {
    pub fn new(mv: Move) -> RootMove {
        RootMove {
            mv,
            score: -VALUE_INFINITE,
            previous_score: -VALUE_INFINITE,
            pv: vec![mv],
        }
    }
}
