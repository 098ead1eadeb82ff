use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use castellan_core::movegen;
use castellan_core::options::Options;
use castellan_core::position::Position;
use castellan_core::search::Limits;
use castellan_core::search::threading::ThreadPool;

fn options_with(threads: usize, min_split_depth: i64) -> Options {
    let mut options = Options::default();
    options.set("Threads", &threads.to_string()).unwrap();
    options
        .set("Min Split Depth", &min_split_depth.to_string())
        .unwrap();
    options
}

fn depth_limits(depth: i32) -> Limits {
    Limits {
        depth,
        ..Limits::default()
    }
}

fn best_root_move(pool: &ThreadPool) -> Option<String> {
    let state = pool.search_state().lock().unwrap();
    state.root_moves.first().map(|rm| rm.mv.to_uci())
}

#[test]
fn single_thread_pool_runs_the_search_on_main() {
    let pool = ThreadPool::new(&options_with(1, 4));
    assert_eq!(pool.size(), 1);

    let pos = Position::startpos();
    pool.start_thinking(&pos, &depth_limits(5), &[]);
    pool.wait_for_think_finished();

    let main = pool.main();
    assert!(!main.thinking());
    assert!(!main.searching());
    assert!(pool.nodes_searched() > 0);

    let best = best_root_move(&pool).unwrap();
    assert!(
        movegen::legal_moves(&pos)
            .iter()
            .any(|m| m.to_uci() == best)
    );

    pool.exit();
}

#[test]
fn four_thread_search_with_forced_splits_terminates_cleanly() {
    // A split depth of 2 forces sharing at almost every interior node.
    let pool = ThreadPool::new(&options_with(4, 2));
    assert_eq!(pool.size(), 4);

    let pos = Position::from_fen(
        "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
    )
    .unwrap();
    pool.start_thinking(&pos, &depth_limits(6), &[]);
    pool.wait_for_think_finished();

    // Quiescent pool: every worker parked, every split stack unwound.
    for thread in pool.threads() {
        assert!(!thread.searching(), "thread {} still searching", thread.idx());
        assert_eq!(
            thread.split_points_size(),
            0,
            "thread {} left split points behind",
            thread.idx()
        );
    }

    let best = best_root_move(&pool).unwrap();
    assert!(
        movegen::legal_moves(&pos)
            .iter()
            .any(|m| m.to_uci() == best)
    );

    pool.exit();
}

#[test]
fn consecutive_searches_serialize_on_the_thinking_flag() {
    let pool = ThreadPool::new(&options_with(2, 2));
    let pos = Position::startpos();

    // The second start_thinking must block until the first search drained;
    // both must leave consistent results behind.
    pool.start_thinking(&pos, &depth_limits(5), &[]);
    pool.start_thinking(&pos, &depth_limits(3), &[]);
    pool.wait_for_think_finished();

    assert!(!pool.main().thinking());
    assert!(best_root_move(&pool).is_some());

    pool.exit();
}

#[test]
fn searchmoves_restricts_the_root() {
    let pool = ThreadPool::new(&options_with(1, 4));
    let pos = Position::startpos();

    let allowed: Vec<_> = movegen::legal_moves(&pos)
        .iter()
        .copied()
        .filter(|m| m.to_uci() == "e2e4")
        .collect();
    assert_eq!(allowed.len(), 1);

    pool.start_thinking(&pos, &depth_limits(4), &allowed);
    pool.wait_for_think_finished();

    assert_eq!(best_root_move(&pool).as_deref(), Some("e2e4"));
    {
        let state = pool.search_state().lock().unwrap();
        assert_eq!(state.root_moves.len(), 1);
    }

    pool.exit();
}

#[test]
fn resize_grows_and_shrinks_with_dense_indices() {
    let mut options = options_with(2, 4);
    let pool = ThreadPool::new(&options);
    assert_eq!(pool.size(), 2);

    let main_before = pool.main();

    // Same value: a no-op that keeps worker identities.
    pool.read_uci_options(&options);
    assert_eq!(pool.size(), 2);
    assert!(Arc::ptr_eq(&main_before, &pool.main()));

    options.set("Threads", "5").unwrap();
    pool.read_uci_options(&options);
    assert_eq!(pool.size(), 5);
    let indices: Vec<_> = pool.threads().iter().map(|t| t.idx()).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    options.set("Threads", "1").unwrap();
    pool.read_uci_options(&options);
    assert_eq!(pool.size(), 1);
    assert!(Arc::ptr_eq(&main_before, &pool.main()));

    // Up and back down leaves the size where it started.
    options.set("Threads", "2").unwrap();
    pool.read_uci_options(&options);
    assert_eq!(pool.size(), 2);

    pool.exit();
}

#[test]
fn pool_exit_is_idempotent_and_leaves_nothing_behind() {
    let pool = ThreadPool::new(&options_with(3, 4));
    assert_eq!(pool.size(), 3);

    pool.exit();
    assert_eq!(pool.size(), 0);
    assert!(pool.timer().is_none());

    // A second exit must be a no-op.
    pool.exit();
    assert_eq!(pool.size(), 0);
}

#[test]
fn timer_fires_the_check_time_hook_at_its_interval() {
    let counter = Arc::new(AtomicUsize::new(0));
    let observed = counter.clone();
    let pool = ThreadPool::with_check_time(
        &options_with(1, 4),
        Box::new(move |_pool| {
            observed.fetch_add(1, Ordering::Relaxed);
        }),
    );

    let timer = pool.timer().unwrap();
    timer.set_timer_interval(50);
    timer.notify_one();

    std::thread::sleep(Duration::from_millis(260));
    let fired = counter.load(Ordering::Relaxed);
    assert!((2..=8).contains(&fired), "timer fired {fired} times");

    // Disarmed, the timer sleeps indefinitely.
    timer.set_timer_interval(0);
    std::thread::sleep(Duration::from_millis(120));
    let after_disarm = counter.load(Ordering::Relaxed);
    assert!(after_disarm <= fired + 1);
    std::thread::sleep(Duration::from_millis(120));
    assert_eq!(counter.load(Ordering::Relaxed), after_disarm);

    pool.exit();
}

#[test]
fn infinite_search_stops_only_on_request() {
    let pool = ThreadPool::new(&options_with(2, 2));
    let pos = Position::startpos();

    let limits = Limits {
        infinite: true,
        ..Limits::default()
    };
    pool.start_thinking(&pos, &limits, &[]);

    // Give it a moment to get going, then ask it to stop.
    std::thread::sleep(Duration::from_millis(100));
    assert!(pool.main().thinking());
    pool.stop_search();

    let waited = Instant::now();
    pool.wait_for_think_finished();
    assert!(waited.elapsed() < Duration::from_secs(5));
    assert!(!pool.main().thinking());

    pool.exit();
}

#[test]
fn movetime_is_respected_within_scheduling_slack() {
    let pool = ThreadPool::new(&options_with(2, 2));
    let pos = Position::startpos();

    let limits = Limits {
        movetime: 200,
        ..Limits::default()
    };
    let started = Instant::now();
    pool.start_thinking(&pos, &limits, &[]);
    pool.wait_for_think_finished();

    assert!(
        started.elapsed() < Duration::from_millis(2_000),
        "movetime overrun: {:?}",
        started.elapsed()
    );

    pool.exit();
}

#[test]
fn node_budget_terminates_the_search() {
    let pool = ThreadPool::new(&options_with(1, 4));
    let pos = Position::startpos();

    let limits = Limits {
        nodes: 20_000,
        ..Limits::default()
    };
    pool.start_thinking(&pos, &limits, &[]);
    pool.wait_for_think_finished();

    // The budget is enforced by the timer at ~10ms granularity, so allow a
    // generous burst factor.
    assert!(pool.nodes_searched() < 5_000_000);

    pool.exit();
}
