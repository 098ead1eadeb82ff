use criterion::{Criterion, black_box, criterion_group, criterion_main};

use castellan_core::perft::perft;
use castellan_core::position::Position;

fn bench_perft(c: &mut Criterion) {
    let startpos = Position::startpos();
    c.bench_function("perft_startpos_4", |b| {
        b.iter(|| perft(black_box(&startpos), 4))
    });

    let kiwipete =
        Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
            .unwrap();
    c.bench_function("perft_kiwipete_3", |b| {
        b.iter(|| perft(black_box(&kiwipete), 3))
    });
}

fn bench_movegen(c: &mut Criterion) {
    let kiwipete =
        Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
            .unwrap();
    c.bench_function("legal_moves_kiwipete", |b| {
        b.iter(|| castellan_core::movegen::legal_moves(black_box(&kiwipete)))
    });
}

criterion_group!(benches, bench_perft, bench_movegen);
criterion_main!(benches);
