//! Time allocation for clock-driven searches.

use std::time::Instant;

use crate::piece::Color;
use crate::search::Limits;

/// Safety margin kept in hand to post the move before the flag falls.
const MOVE_OVERHEAD_MS: u64 = 50;

/// Moves assumed left in the game when the GUI does not say.
const DEFAULT_MOVES_TO_GO: u64 = 30;

/// Computes how long the current move may think, from the limits the GUI
/// sent. Two numbers come out of it: an optimum (stop starting new
/// iterations past this) and a maximum (the hard interrupt, enforced by the
/// timer thread through `check_time`).
#[derive(Debug)]
pub struct TimeManager {
    start: Instant,
    optimum_ms: u64,
    maximum_ms: u64,
}

impl TimeManager {
    pub fn new(limits: &Limits, us: Color, start: Instant) -> TimeManager {
        if !limits.use_time_management() {
            return TimeManager {
                start,
                optimum_ms: u64::MAX,
                maximum_ms: u64::MAX,
            };
        }

        let time = limits.time[us.index()];
        let inc = limits.inc[us.index()];
        let moves_to_go = if limits.movestogo > 0 {
            (limits.movestogo as u64).min(DEFAULT_MOVES_TO_GO)
        } else {
            DEFAULT_MOVES_TO_GO
        };

        let usable = time.saturating_sub(MOVE_OVERHEAD_MS);
        let optimum = (usable / moves_to_go + inc * 3 / 4).max(1);
        let maximum = (optimum * 4).min(usable * 4 / 5).max(1);

        TimeManager {
            start,
            optimum_ms: optimum.min(maximum),
            maximum_ms: maximum,
        }
    }

    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    #[inline]
    pub fn optimum_ms(&self) -> u64 {
        self.optimum_ms
    }

    #[inline]
    pub fn maximum_ms(&self) -> u64 {
        self.maximum_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock_limits(time_ms: u64, inc_ms: u64) -> Limits {
        Limits {
            time: [time_ms, time_ms],
            inc: [inc_ms, inc_ms],
            ..Limits::default()
        }
    }

    #[test]
    fn more_time_on_the_clock_means_more_time_per_move() {
        let short = TimeManager::new(&clock_limits(10_000, 0), Color::White, Instant::now());
        let long = TimeManager::new(&clock_limits(60_000, 0), Color::White, Instant::now());
        assert!(long.optimum_ms() > short.optimum_ms());
        assert!(long.maximum_ms() >= long.optimum_ms());
    }

    #[test]
    fn increment_extends_the_allocation() {
        let flat = TimeManager::new(&clock_limits(30_000, 0), Color::White, Instant::now());
        let fischer = TimeManager::new(&clock_limits(30_000, 2_000), Color::White, Instant::now());
        assert!(fischer.optimum_ms() > flat.optimum_ms());
    }

    #[test]
    fn maximum_never_exceeds_the_clock() {
        let tm = TimeManager::new(&clock_limits(200, 0), Color::White, Instant::now());
        assert!(tm.maximum_ms() <= 200);
    }

    #[test]
    fn unmanaged_limits_never_time_out() {
        let limits = Limits {
            depth: 6,
            ..Limits::default()
        };
        let tm = TimeManager::new(&limits, Color::White, Instant::now());
        assert_eq!(tm.maximum_ms(), u64::MAX);
    }
}
