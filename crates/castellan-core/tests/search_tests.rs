use castellan_core::options::Options;
use castellan_core::position::Position;
use castellan_core::search::Limits;
use castellan_core::search::threading::ThreadPool;
use castellan_core::types::{VALUE_MATE_IN_MAX_PLY, Value};

fn pool_with_threads(threads: usize) -> ThreadPoolHandle {
    let mut options = Options::default();
    options.set("Threads", &threads.to_string()).unwrap();
    ThreadPoolHandle {
        pool: ThreadPool::new(&options),
    }
}

struct ThreadPoolHandle {
    pool: std::sync::Arc<ThreadPool>,
}

impl Drop for ThreadPoolHandle {
    fn drop(&mut self) {
        self.pool.exit();
    }
}

fn search_to_depth(pool: &ThreadPool, fen: &str, depth: i32) -> (String, Value) {
    let pos = Position::from_fen(fen).unwrap();
    let limits = Limits {
        depth,
        ..Limits::default()
    };
    pool.start_thinking(&pos, &limits, &[]);
    pool.wait_for_think_finished();

    let state = pool.search_state().lock().unwrap();
    let best = state.root_moves.first().expect("position has legal moves");
    (best.mv.to_uci(), best.score)
}

#[test]
fn finds_a_back_rank_mate_in_one() {
    let handle = pool_with_threads(1);
    let (best, score) = search_to_depth(&handle.pool, "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 4);
    assert_eq!(best, "a1a8");
    assert!(score >= VALUE_MATE_IN_MAX_PLY, "score was {score}");
}

#[test]
fn takes_a_hanging_queen() {
    let handle = pool_with_threads(1);
    let (best, score) = search_to_depth(&handle.pool, "k7/8/8/3q4/4P3/8/8/7K w - - 0 1", 4);
    assert_eq!(best, "e4d5");
    assert!(score > 300);
}

#[test]
fn mate_in_one_survives_parallel_search() {
    let handle = pool_with_threads(4);
    let (best, score) = search_to_depth(&handle.pool, "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 6);
    assert_eq!(best, "a1a8");
    assert!(score >= VALUE_MATE_IN_MAX_PLY);
}

#[test]
fn stalemate_terminates_with_no_root_moves() {
    let handle = pool_with_threads(1);
    // Black to move has no legal moves and is not in check.
    let pos = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
    let limits = Limits {
        depth: 5,
        ..Limits::default()
    };
    handle.pool.start_thinking(&pos, &limits, &[]);
    handle.pool.wait_for_think_finished();

    let state = handle.pool.search_state().lock().unwrap();
    assert!(state.root_moves.is_empty());
}

#[test]
fn checkmated_side_terminates_immediately() {
    let handle = pool_with_threads(1);
    // Back-rank mate already delivered; black to move.
    let pos = Position::from_fen("R5k1/5ppp/8/8/8/8/8/6K1 b - - 0 1").unwrap();
    assert!(pos.in_check());
    let limits = Limits {
        depth: 5,
        ..Limits::default()
    };
    handle.pool.start_thinking(&pos, &limits, &[]);
    handle.pool.wait_for_think_finished();

    let state = handle.pool.search_state().lock().unwrap();
    assert!(state.root_moves.is_empty());
}

#[test]
fn fifty_move_rule_scores_a_draw() {
    let handle = pool_with_threads(1);
    // Halfmove clock at 99: every quiet reply hits the draw adjudication.
    let (_, score) = search_to_depth(
        &handle.pool,
        "4k3/8/8/8/8/8/1R6/4K3 w - - 99 80",
        4,
    );
    assert_eq!(score, 0);
}
