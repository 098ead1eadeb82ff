//! Fixed-suite search benchmark.

use std::time::Instant;

use castellan_core::options::Options;
use castellan_core::position::Position;
use castellan_core::search::Limits;
use castellan_core::search::threading::ThreadPool;

const BENCH_POSITIONS: [&str; 5] = [
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
];

pub fn run(depth: i32, threads: Option<usize>) {
    let mut options = Options::default();
    if let Some(threads) = threads {
        options
            .set("Threads", &threads.to_string())
            .expect("Threads is registered");
    }
    let pool = ThreadPool::new(&options);

    let limits = Limits {
        depth,
        ..Limits::default()
    };

    let started = Instant::now();
    let mut total_nodes = 0u64;

    for (i, fen) in BENCH_POSITIONS.iter().enumerate() {
        let pos = Position::from_fen(fen).expect("bench FEN is valid");
        eprintln!("position {}/{}: {fen}", i + 1, BENCH_POSITIONS.len());

        pool.start_thinking(&pos, &limits, &[]);
        pool.wait_for_think_finished();
        total_nodes += pool.nodes_searched();
    }

    let elapsed = started.elapsed();
    let elapsed_ms = elapsed.as_millis().max(1) as u64;
    eprintln!("===========================");
    eprintln!("total time (ms) : {elapsed_ms}");
    eprintln!("nodes searched  : {total_nodes}");
    eprintln!("nodes/second    : {}", total_nodes * 1000 / elapsed_ms);

    pool.exit();
}
