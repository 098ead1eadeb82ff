//! The search: iterative deepening driver, alpha-beta body, and the
//! split-point share that woken workers execute.

pub mod node_type;
pub mod root_move;
pub mod threading;
pub mod time_control;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::constants::MAX_PLY;
use crate::eval;
use crate::move_picker::MovePicker;
use crate::movegen;
use crate::moves::Move;
use crate::position::Position;
use crate::types::{
    Depth, VALUE_DRAW, VALUE_INFINITE, VALUE_MATE_IN_MAX_PLY, VALUE_ZERO, Value, mate_in,
    mated_in, uci_score,
};

use node_type::NodeType;
use root_move::RootMove;
use threading::{SplitPoint, Thread, ThreadPool};
use time_control::TimeManager;

/// Root score drop that counts as failing low for time-management purposes.
const FAIL_LOW_MARGIN: Value = 30;

/// Abort and shutdown flags shared by every search participant. All three
/// are monotone within one search; readers may observe them late.
pub struct Signals {
    pub stop: AtomicBool,
    pub stop_on_ponder_hit: AtomicBool,
    pub failed_low_at_root: AtomicBool,
}

impl Signals {
    pub fn new() -> Signals {
        Signals {
            stop: AtomicBool::new(false),
            stop_on_ponder_hit: AtomicBool::new(false),
            failed_low_at_root: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    pub fn stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

impl Default for Signals {
    fn default() -> Signals {
        Signals::new()
    }
}

/// What the GUI allowed for the current search.
#[derive(Clone, Debug, Default)]
pub struct Limits {
    /// Remaining clock per color, milliseconds.
    pub time: [u64; 2],
    /// Increment per color, milliseconds.
    pub inc: [u64; 2],
    pub movestogo: u32,
    pub depth: Depth,
    pub nodes: u64,
    pub movetime: u64,
    pub infinite: bool,
    pub ponder: bool,
}

impl Limits {
    /// True when the clock, not an explicit budget, bounds the search.
    pub fn use_time_management(&self) -> bool {
        self.movetime == 0 && self.depth == 0 && self.nodes == 0 && !self.infinite
    }
}

/// Root search inputs and results, owned by the pool and handed to the main
/// thread through `start_thinking`.
pub struct SearchState {
    pub root_pos: Position,
    pub limits: Limits,
    pub root_moves: Vec<RootMove>,
    pub start_time: Instant,
}

impl SearchState {
    pub fn new() -> SearchState {
        SearchState {
            root_pos: Position::startpos(),
            limits: Limits::default(),
            root_moves: Vec::new(),
            start_time: Instant::now(),
        }
    }
}

impl Default for SearchState {
    fn default() -> SearchState {
        SearchState::new()
    }
}

/// Per-ply frame of the search stack.
#[derive(Clone, Copy)]
struct Frame {
    current_move: Option<Move>,
    killers: [Option<Move>; 2],
    pv_len: usize,
    pv: [Option<Move>; MAX_PLY],
}

impl Frame {
    const EMPTY: Frame = Frame {
        current_move: None,
        killers: [None; 2],
        pv_len: 0,
        pv: [None; MAX_PLY],
    };
}

/// Thread-local search context: one per `think` call and one per split-point
/// share. Slaves start with fresh frames at the split ply.
struct SearchContext<'a> {
    pool: &'a Arc<ThreadPool>,
    thread: &'a Arc<Thread>,
    /// Nodes searched under this context, nested split points included: a
    /// retiring share deposits it into the split point, and a join folds the
    /// split point's total back into the caller's context.
    nodes: u64,
    stack: Box<[Frame; MAX_PLY + 2]>,
}

impl<'a> SearchContext<'a> {
    fn new(pool: &'a Arc<ThreadPool>, thread: &'a Arc<Thread>) -> SearchContext<'a> {
        SearchContext {
            pool,
            thread,
            nodes: 0,
            stack: Box::new([Frame::EMPTY; MAX_PLY + 2]),
        }
    }

    /// Counts a visited node, both here and on the thread's live counter.
    #[inline]
    fn visit_node(&mut self, ply: usize) {
        self.nodes += 1;
        self.thread.visit_node(ply);
    }

    /// Prepends `mv` at `ply` to the child's principal variation.
    fn update_pv(&mut self, ply: usize, mv: Move) {
        let (head, tail) = self.stack.split_at_mut(ply + 1);
        let frame = &mut head[ply];
        let child = &tail[0];
        let len = child.pv_len.min(MAX_PLY - 1);
        frame.pv[0] = Some(mv);
        frame.pv[1..=len].copy_from_slice(&child.pv[..len]);
        frame.pv_len = len + 1;
    }
}

fn uci_println(line: &str) {
    use std::io::Write;
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    let _ = writeln!(lock, "{line}");
    let _ = lock.flush();
}

/// Runs one top-level search on the pool's recorded root position until the
/// stop signal or natural termination. Executes on the main thread, out of
/// its idle loop; recursion below it may fan out through `pool.split`.
pub fn think(pool: &Arc<ThreadPool>, thread: &Arc<Thread>) {
    let (root_pos, limits, mut root_moves, start_time) = {
        let state = pool.search_state().lock().unwrap();
        (
            state.root_pos,
            state.limits.clone(),
            state.root_moves.clone(),
            state.start_time,
        )
    };
    let signals = pool.signals();

    let tm = Arc::new(TimeManager::new(&limits, root_pos.side_to_move(), start_time));
    pool.set_time_manager(Some(tm.clone()));

    if root_moves.is_empty() {
        uci_println(&format!(
            "info depth 0 score {}",
            if root_pos.in_check() { "mate 0" } else { "cp 0" }
        ));
        if !signals.stop() && (limits.infinite || limits.ponder) {
            signals.stop_on_ponder_hit.store(true, Ordering::Release);
            thread.wait_for(&signals.stop);
        }
        uci_println("bestmove (none)");
        pool.set_time_manager(None);
        return;
    }

    // Arm the watchdog. It rechecks the clock every interval and raises the
    // stop signal through check_time(); 0 disarms it again.
    if let Some(timer) = pool.timer() {
        let interval = if limits.use_time_management() {
            (tm.optimum_ms() / 16).clamp(5, 100)
        } else if limits.movetime > 0 {
            (limits.movetime / 16).clamp(5, 100)
        } else if limits.nodes > 0 {
            10
        } else {
            100
        };
        timer.set_timer_interval(interval);
        timer.notify_one();
    }

    let mut ctx = SearchContext::new(pool, thread);
    let max_depth = if limits.depth > 0 {
        limits.depth
    } else {
        (MAX_PLY - 2) as Depth
    };

    for depth in 1..=max_depth {
        if signals.stop() {
            break;
        }

        for rm in root_moves.iter_mut() {
            rm.previous_score = rm.score;
        }
        let previous_best = root_moves[0].previous_score;

        let mut alpha = -VALUE_INFINITE;
        let beta = VALUE_INFINITE;
        let mut completed = true;

        for i in 0..root_moves.len() {
            let mv = root_moves[i].mv;
            ctx.stack[0].current_move = Some(mv);
            let next = root_pos.do_move(mv);

            let mut value;
            if i == 0 {
                value = -search(&mut ctx, &next, 1, -beta, -alpha, depth - 1, NodeType::Pv, None);
            } else {
                value = -search(
                    &mut ctx,
                    &next,
                    1,
                    -(alpha + 1),
                    -alpha,
                    depth - 1,
                    NodeType::NonPv,
                    None,
                );
                if value > alpha {
                    value =
                        -search(&mut ctx, &next, 1, -beta, -alpha, depth - 1, NodeType::Pv, None);
                }
            }

            if signals.stop() {
                completed = false;
                break;
            }

            // A zero-width fail low is only an upper bound; keep the score
            // from the previous iteration so ordering stays meaningful.
            if value > alpha {
                alpha = value;
                root_moves[i].score = value;
                let mut pv = vec![mv];
                pv.extend(
                    ctx.stack[1].pv[..ctx.stack[1].pv_len]
                        .iter()
                        .flatten()
                        .copied(),
                );
                root_moves[i].pv = pv;
            }
        }

        if !completed {
            // A half-searched iteration is worthless; keep the last one.
            for rm in root_moves.iter_mut() {
                rm.score = rm.previous_score;
            }
            break;
        }

        root_moves.sort_by(|a, b| b.score.cmp(&a.score));
        let best_score = root_moves[0].score;

        signals.failed_low_at_root.store(
            depth > 1
                && previous_best > -VALUE_INFINITE
                && best_score + FAIL_LOW_MARGIN <= previous_best,
            Ordering::Release,
        );

        let elapsed = tm.elapsed_ms().max(1);
        // All splits of a completed iteration have joined, so the root
        // context's tally is the whole tree.
        let nodes = ctx.nodes;
        uci_println(&format!(
            "info depth {} seldepth {} score {} nodes {} nps {} time {} pv {}",
            depth,
            pool.max_ply_reached(),
            uci_score(best_score),
            nodes,
            nodes * 1000 / elapsed,
            elapsed,
            root_moves[0]
                .pv
                .iter()
                .map(|m| m.to_uci())
                .collect::<Vec<_>>()
                .join(" "),
        ));

        pool.search_state().lock().unwrap().root_moves = root_moves.clone();

        // Past half the optimum there is no room for another full iteration.
        if limits.use_time_management() && tm.elapsed_ms() * 2 >= tm.optimum_ms() {
            break;
        }
    }

    if let Some(timer) = pool.timer() {
        timer.set_timer_interval(0);
    }

    pool.search_state().lock().unwrap().root_moves = root_moves.clone();

    // In infinite or ponder mode the protocol forbids answering before the
    // GUI says stop (or ponderhit converts the search); park until then.
    if !signals.stop() && (limits.infinite || limits.ponder) {
        signals.stop_on_ponder_hit.store(true, Ordering::Release);
        thread.wait_for(&signals.stop);
    }

    let best = &root_moves[0];
    let mut line = format!("bestmove {}", best.mv.to_uci());
    if best.pv.len() >= 2 {
        line.push_str(&format!(" ponder {}", best.pv[1].to_uci()));
    }
    uci_println(&line);

    pool.set_time_manager(None);
}

/// The timer thread's hook: polices clock, movetime and node budget.
pub fn check_time(pool: &ThreadPool) {
    let signals = pool.signals();
    if signals.stop() {
        return;
    }
    let Some(tm) = pool.time_manager() else {
        return;
    };
    let limits = pool.search_state().lock().unwrap().limits.clone();
    let elapsed = tm.elapsed_ms();

    let mut out_of_time = false;
    if limits.use_time_management() {
        // A root fail-low buys time up to the hard maximum.
        let past_optimum = elapsed >= tm.optimum_ms()
            && !signals.failed_low_at_root.load(Ordering::Acquire);
        out_of_time = past_optimum || elapsed >= tm.maximum_ms();
    }
    if limits.movetime > 0 && elapsed >= limits.movetime {
        out_of_time = true;
    }
    if limits.nodes > 0 && pool.nodes_searched() >= limits.nodes {
        out_of_time = true;
    }

    if out_of_time {
        if limits.ponder {
            // While pondering we must not answer; remember to stop the
            // moment the GUI converts the search.
            signals.stop_on_ponder_hit.store(true, Ordering::Release);
        } else {
            pool.stop_search();
        }
    }
}

/// Negamax alpha-beta with PVS re-searches. Returns a value in (alpha, beta)
/// semantics of fail-soft; aborted searches return garbage that every caller
/// discards behind a stop/cut-off check.
#[allow(clippy::too_many_arguments)]
fn search(
    ctx: &mut SearchContext,
    pos: &Position,
    ply: usize,
    mut alpha: Value,
    mut beta: Value,
    depth: Depth,
    node_type: NodeType,
    mut threat_move: Option<Move>,
) -> Value {
    debug_assert!(-VALUE_INFINITE <= alpha && alpha < beta && beta <= VALUE_INFINITE);

    if depth <= 0 {
        return qsearch(ctx, pos, ply, alpha, beta);
    }

    let pool = ctx.pool;
    let thread = ctx.thread;

    ctx.visit_node(ply);

    if pool.signals().stop() || thread.cutoff_occurred() {
        return VALUE_ZERO;
    }

    if ply >= MAX_PLY - 2 {
        return eval::evaluate(pos);
    }

    if pos.halfmove_clock() >= 100 {
        return VALUE_DRAW;
    }

    // Mate distance pruning.
    alpha = alpha.max(mated_in(ply));
    beta = beta.min(mate_in(ply + 1));
    if alpha >= beta {
        return alpha;
    }

    let in_check = pos.in_check();

    // Null move: hand the opponent a free shot. Refutation failing low
    // exposes their threat, which then seeds move ordering and the split.
    if node_type == NodeType::NonPv
        && !in_check
        && depth >= 2
        && pos.has_non_pawn_material(pos.side_to_move())
        && eval::evaluate(pos) >= beta
    {
        ctx.stack[ply].current_move = None;
        let reduction = 3 + depth / 4;
        let null_pos = pos.do_null_move();
        let value = -search(
            ctx,
            &null_pos,
            ply + 1,
            -beta,
            -beta + 1,
            depth - 1 - reduction,
            NodeType::NonPv,
            None,
        );
        if pool.signals().stop() || thread.cutoff_occurred() {
            return VALUE_ZERO;
        }
        if value >= beta {
            return if value >= VALUE_MATE_IN_MAX_PLY { beta } else { value };
        }
        threat_move = ctx.stack[ply + 1].current_move;
    }

    if node_type.is_pv() {
        ctx.stack[ply].pv_len = 0;
    }
    if ply + 2 < ctx.stack.len() {
        ctx.stack[ply + 2].killers = [None; 2];
    }

    let killers = ctx.stack[ply].killers;
    let picker = Arc::new(MovePicker::new(pos, killers, threat_move));

    let mut best_value = -VALUE_INFINITE;
    let mut best_move: Option<Move> = None;
    let mut move_count: u32 = 0;

    while let Some((mv, _)) = picker.next() {
        if !movegen::is_legal(pos, mv) {
            continue;
        }
        move_count += 1;
        ctx.stack[ply].current_move = Some(mv);

        let next = pos.do_move(mv);
        let gives_check = next.in_check();
        let new_depth = if gives_check { depth } else { depth - 1 };
        let is_quiet = !pos.is_capture(mv) && !mv.is_promotion();

        let mut value;
        if move_count == 1 {
            value = -search(ctx, &next, ply + 1, -beta, -alpha, new_depth, node_type, None);
        } else {
            // Late quiet moves get a reduced look first.
            let mut reduced = new_depth;
            if depth >= 3 && move_count > 3 && is_quiet && !gives_check && !in_check {
                reduced = new_depth - 1;
            }
            value = -search(
                ctx,
                &next,
                ply + 1,
                -(alpha + 1),
                -alpha,
                reduced,
                NodeType::NonPv,
                None,
            );
            if value > alpha && reduced < new_depth {
                value = -search(
                    ctx,
                    &next,
                    ply + 1,
                    -(alpha + 1),
                    -alpha,
                    new_depth,
                    NodeType::NonPv,
                    None,
                );
            }
            if node_type.is_pv() && value > alpha {
                value = -search(ctx, &next, ply + 1, -beta, -alpha, new_depth, NodeType::Pv, None);
            }
        }

        if pool.signals().stop() || thread.cutoff_occurred() {
            return VALUE_ZERO;
        }

        if value > best_value {
            best_value = value;
            if value > alpha {
                best_move = Some(mv);
                if node_type.is_pv() {
                    ctx.update_pv(ply, mv);
                }
                if value >= beta {
                    if is_quiet && ctx.stack[ply].killers[0] != Some(mv) {
                        ctx.stack[ply].killers[1] = ctx.stack[ply].killers[0];
                        ctx.stack[ply].killers[0] = Some(mv);
                    }
                    break;
                }
                alpha = value;
            }
        }

        // Work sharing: with depth to spare and an idle colleague in sight,
        // publish this node and let the pool drain the remaining moves.
        if depth >= pool.min_split_depth()
            && picker.remaining() > 0
            && thread.split_points_size() < threading::MAX_SPLITPOINTS_PER_THREAD
            && pool.slave_available(thread)
        {
            debug_assert!(best_value < beta);
            best_value = pool.split::<false>(
                thread,
                pos,
                ply,
                alpha,
                beta,
                best_value,
                &mut best_move,
                &mut ctx.nodes,
                depth,
                threat_move,
                move_count,
                &picker,
                node_type,
            );
            if pool.signals().stop() || thread.cutoff_occurred() {
                return VALUE_ZERO;
            }
            if best_value >= beta {
                break;
            }
        }
    }

    if move_count == 0 {
        return if in_check { mated_in(ply) } else { VALUE_DRAW };
    }

    best_value
}

/// Capture search with stand-pat; evasions when in check.
fn qsearch(ctx: &mut SearchContext, pos: &Position, ply: usize, mut alpha: Value, beta: Value) -> Value {
    let pool = ctx.pool;
    let thread = ctx.thread;

    ctx.visit_node(ply);
    ctx.stack[ply].pv_len = 0;

    if pool.signals().stop() || thread.cutoff_occurred() {
        return VALUE_ZERO;
    }

    if ply >= MAX_PLY - 2 {
        return eval::evaluate(pos);
    }

    if pos.halfmove_clock() >= 100 {
        return VALUE_DRAW;
    }

    let in_check = pos.in_check();

    let mut best_value = if in_check {
        -VALUE_INFINITE
    } else {
        let stand_pat = eval::evaluate(pos);
        if stand_pat >= beta {
            return stand_pat;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }
        stand_pat
    };

    let picker = if in_check {
        MovePicker::new(pos, [None; 2], None)
    } else {
        MovePicker::captures(pos)
    };

    let mut move_count = 0;
    while let Some((mv, _)) = picker.next() {
        if !movegen::is_legal(pos, mv) {
            continue;
        }
        move_count += 1;

        let next = pos.do_move(mv);
        let value = -qsearch(ctx, &next, ply + 1, -beta, -alpha);

        if value > best_value {
            best_value = value;
            if value > alpha {
                if value >= beta {
                    return value;
                }
                alpha = value;
            }
        }
    }

    if in_check && move_count == 0 {
        return mated_in(ply);
    }

    best_value
}

/// One worker's share of a split point. Entered from the generic idle loop
/// with the split point locked; the lock is dropped around child searches
/// and re-taken to publish results, and is held again when this returns.
/// Returns the share's node count for the retire-time deposit into the
/// split point.
pub(crate) fn search_split_point(
    pool: &Arc<ThreadPool>,
    thread: &Arc<Thread>,
    sp: &Arc<SplitPoint>,
) -> u64 {
    let (pos, ply, depth, node_type, beta) = {
        let data = sp.data();
        (data.pos, data.ply, data.depth, data.node_type, data.beta)
    };
    let picker = sp
        .data()
        .picker
        .clone()
        .expect("live split point has a picker");

    let mut ctx = SearchContext::new(pool, thread);
    let in_check = pos.in_check();

    while let Some((mv, _)) = picker.next() {
        sp.unlock();

        if pool.signals().stop() || thread.cutoff_occurred() {
            sp.lock();
            return ctx.nodes;
        }

        if !movegen::is_legal(&pos, mv) {
            sp.lock();
            continue;
        }

        let legal_count = {
            sp.lock();
            let data = sp.data_mut();
            data.move_count += 1;
            let count = data.move_count;
            sp.unlock();
            count
        };

        ctx.stack[ply].current_move = Some(mv);
        let next = pos.do_move(mv);
        let gives_check = next.in_check();
        let new_depth = if gives_check { depth } else { depth - 1 };
        let is_quiet = !pos.is_capture(mv) && !mv.is_promotion();

        // Every split share runs through the zero-width window first: the
        // first move of the node was searched before the split happened.
        let alpha = sp.alpha();
        let mut reduced = new_depth;
        if depth >= 3 && legal_count > 3 && is_quiet && !gives_check && !in_check {
            reduced = new_depth - 1;
        }
        let mut value = -search(
            &mut ctx,
            &next,
            ply + 1,
            -(alpha + 1),
            -alpha,
            reduced,
            NodeType::NonPv,
            None,
        );
        if value > alpha && reduced < new_depth {
            let alpha = sp.alpha();
            value = -search(
                &mut ctx,
                &next,
                ply + 1,
                -(alpha + 1),
                -alpha,
                new_depth,
                NodeType::NonPv,
                None,
            );
        }
        if node_type.is_pv() && value > sp.alpha() {
            let alpha = sp.alpha();
            value = -search(&mut ctx, &next, ply + 1, -beta, -alpha, new_depth, NodeType::Pv, None);
        }

        sp.lock();

        // Never publish out of an aborted line.
        if pool.signals().stop() || thread.cutoff_occurred() {
            return ctx.nodes;
        }

        if value > sp.best_value() {
            sp.set_best_value(value);
            if value > sp.alpha() {
                sp.data_mut().best_move = Some(mv);
                if value >= beta {
                    sp.set_cutoff();
                    return ctx.nodes;
                }
                sp.set_alpha(value);
            }
        }
    }

    ctx.nodes
}
