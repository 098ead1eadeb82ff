//! The worker pool and its work-sharing protocol.
//!
//! One host thread per `Thread`. A thread that reaches a node with enough
//! depth and spare colleagues publishes the node as a [`SplitPoint`] and
//! recruits idle threads to help drain its move picker; the recruiter is the
//! split point's *master*, the recruits its *slaves*. The master searches its
//! own share through the same path as the slaves, and a master parked waiting
//! for stragglers may itself be recruited — but only by threads working under
//! its own topmost split point, so it can never end up blocked on a subtree
//! that is waiting on it ("young brothers wait").
//!
//! Locking is two-level and strictly ordered: the pool state lock is always
//! taken before a split point's spinlock, and a thread's sleep mutex is never
//! held while acquiring either. Cut-off flags are read without any lock; a
//! stale `false` costs at most a short burst of wasted nodes.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use lock_api::RawMutex as _;

use crate::constants::{MAX_PLY, MAX_THREADS};
use crate::move_picker::MovePicker;
use crate::movegen;
use crate::moves::Move;
use crate::options::Options;
use crate::position::Position;
use crate::search::node_type::NodeType;
use crate::search::root_move::RootMove;
use crate::search::{self, Limits, SearchState, Signals};
use crate::types::{Depth, ONE_PLY, VALUE_INFINITE, Value};
use crate::util::bitset::AtomicBitSet;
use crate::util::spinlock::RawSpinLock;

/// Maximum number of split points a single thread can be master of at once.
pub const MAX_SPLITPOINTS_PER_THREAD: usize = 8;

/// Worker stacks carry deep recursion plus a search context per nested split
/// participation; the platform default is too tight.
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Hook the timer thread fires to police the clock.
pub type CheckTimeFn = Box<dyn Fn(&ThreadPool) + Send + Sync>;

/// Inputs and results of one shared node, guarded by the split point's lock.
///
/// Everything lock-free readers need lives as atomics on [`SplitPoint`]
/// itself; this record is only ever touched with the lock held, or by the
/// master in phases where the protocol guarantees exclusivity.
pub struct SplitPointData {
    /// Thread that created this split point.
    pub master: Weak<Thread>,
    pub master_idx: usize,
    /// Split point that was the master's active one at creation time.
    pub parent: Option<Arc<SplitPoint>>,

    // Search inputs, copied by value when the split point is set up.
    pub pos: Position,
    pub ply: usize,
    pub depth: Depth,
    pub beta: Value,
    pub threat_move: Option<Move>,
    pub node_type: NodeType,

    // Shared results.
    pub best_move: Option<Move>,
    pub move_count: u32,
    pub picker: Option<Arc<MovePicker>>,
}

/// One shared node of the search tree.
pub struct SplitPoint {
    mutex: RawSpinLock,

    /// Threads working here, the master's bit included for the whole life of
    /// the split point. Mutated only under the lock; read freely.
    pub slaves_mask: AtomicBitSet,

    /// Beta cut-off happened here; monotone once set. Relaxed on purpose:
    /// late readers only search a few extra nodes.
    cutoff: AtomicBool,

    alpha: AtomicI32,
    best_value: AtomicI32,

    /// Nodes searched by all participants at this split point.
    pub nodes: AtomicU64,

    data: UnsafeCell<SplitPointData>,
}

// Access to `data` follows the split/join protocol (lock held, or a phase
// where the master is alone); the raw pointer dance is contained here.
unsafe impl Sync for SplitPoint {}

impl Default for SplitPoint {
    fn default() -> SplitPoint {
        SplitPoint {
            mutex: RawSpinLock::INIT,
            slaves_mask: AtomicBitSet::new(),
            cutoff: AtomicBool::new(false),
            alpha: AtomicI32::new(0),
            best_value: AtomicI32::new(0),
            nodes: AtomicU64::new(0),
            data: UnsafeCell::new(SplitPointData {
                master: Weak::new(),
                master_idx: 0,
                parent: None,
                pos: Position::startpos(),
                ply: 0,
                depth: 0,
                beta: 0,
                threat_move: None,
                node_type: NodeType::NonPv,
                best_move: None,
                move_count: 0,
                picker: None,
            }),
        }
    }
}

impl SplitPoint {
    #[inline]
    pub fn lock(&self) {
        self.mutex.lock();
    }

    #[inline]
    pub fn unlock(&self) {
        unsafe { self.mutex.unlock() };
    }

    #[inline]
    pub fn data(&self) -> &SplitPointData {
        unsafe { &*self.data.get() }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn data_mut(&self) -> &mut SplitPointData {
        unsafe { &mut *self.data.get() }
    }

    #[inline]
    pub fn alpha(&self) -> Value {
        self.alpha.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_alpha(&self, value: Value) {
        self.alpha.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn best_value(&self) -> Value {
        self.best_value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_best_value(&self, value: Value) {
        self.best_value.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn cutoff(&self) -> bool {
        self.cutoff.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_cutoff(&self) {
        self.cutoff.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn master_index(&self) -> usize {
        self.data().master_idx
    }

    #[inline]
    pub fn parent(&self) -> Option<Arc<SplitPoint>> {
        self.data().parent.clone()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadKind {
    Generic,
    Main,
    Timer,
}

/// A worker of the pool: a parked host thread plus the state other workers
/// need to recruit it.
pub struct Thread {
    idx: usize,
    kind: ThreadKind,

    /// Sleep mutex and condvar; held only for the micro-sections around
    /// parking and waking.
    sleep_mutex: Mutex<()>,
    sleep_cond: Condvar,

    searching: AtomicBool,
    exit: AtomicBool,

    /// Main only: a search has been requested and has not finished.
    thinking: AtomicBool,

    /// Timer only: rearm interval in milliseconds, 0 parks it indefinitely.
    /// Single writer, single reader, latency-tolerant; written bare.
    timer_msec: AtomicU64,

    /// Nodes this thread visited in the current search.
    pub nodes: AtomicU64,
    /// Deepest ply this thread reached in the current search.
    pub max_ply: AtomicUsize,

    /// How many entries of `split_points` are live. Written only by this
    /// thread (under the pool lock); other threads snapshot it once before
    /// indexing the arena, because it can drop under their feet.
    split_points_size: AtomicUsize,

    /// Arena of split points this thread is master of. The slots are
    /// allocated once and recycled by stack level; an `Arc` keeps any slot a
    /// peer still looks at alive.
    split_points: [Arc<SplitPoint>; MAX_SPLITPOINTS_PER_THREAD],

    /// Deepest split point this thread currently participates in. Written by
    /// the thread itself while searching, or by a recruiting master (under
    /// the pool lock) while it is not; never both at once.
    active_split_point: UnsafeCell<Option<Arc<SplitPoint>>>,

    pool: Weak<ThreadPool>,
}

unsafe impl Sync for Thread {}

impl Thread {
    fn new(idx: usize, kind: ThreadKind, pool: Weak<ThreadPool>) -> Thread {
        Thread {
            idx,
            kind,
            sleep_mutex: Mutex::new(()),
            sleep_cond: Condvar::new(),
            searching: AtomicBool::new(false),
            exit: AtomicBool::new(false),
            thinking: AtomicBool::new(false),
            timer_msec: AtomicU64::new(0),
            nodes: AtomicU64::new(0),
            max_ply: AtomicUsize::new(0),
            split_points_size: AtomicUsize::new(0),
            split_points: std::array::from_fn(|_| Arc::new(SplitPoint::default())),
            active_split_point: UnsafeCell::new(None),
            pool,
        }
    }

    #[inline]
    pub fn idx(&self) -> usize {
        self.idx
    }

    #[inline]
    pub fn kind(&self) -> ThreadKind {
        self.kind
    }

    #[inline]
    pub fn searching(&self) -> bool {
        self.searching.load(Ordering::Acquire)
    }

    /// Main thread only: a requested search has not finished yet.
    #[inline]
    pub fn thinking(&self) -> bool {
        self.thinking.load(Ordering::Acquire)
    }

    #[inline]
    pub fn split_points_size(&self) -> usize {
        self.split_points_size.load(Ordering::Relaxed)
    }

    #[inline]
    fn active_split_point(&self) -> Option<Arc<SplitPoint>> {
        unsafe { (*self.active_split_point.get()).clone() }
    }

    #[inline]
    fn set_active_split_point(&self, sp: Option<Arc<SplitPoint>>) {
        unsafe { *self.active_split_point.get() = sp };
    }

    /// Bumps the node counter and the deepest-ply watermark.
    #[inline]
    pub fn visit_node(&self, ply: usize) {
        self.nodes.fetch_add(1, Ordering::Relaxed);
        if ply > self.max_ply.load(Ordering::Relaxed) {
            self.max_ply.store(ply, Ordering::Relaxed);
        }
    }

    /// Wakes the thread if it is parked. Taking the sleep mutex first is what
    /// rules out the lost wake-up where the sleeper tests its predicate
    /// between our flag write and the signal.
    pub fn notify_one(&self) {
        let _guard = self.sleep_mutex.lock().unwrap();
        self.sleep_cond.notify_one();
    }

    /// Parks the calling thread until another party sets `flag`. The setter
    /// is expected to follow up with `notify_one()`.
    pub fn wait_for(&self, flag: &AtomicBool) {
        let mut guard = self.sleep_mutex.lock().unwrap();
        while !flag.load(Ordering::Acquire) {
            guard = self.sleep_cond.wait(guard).unwrap();
        }
    }

    /// Timer rearm; a plain store, see `timer_msec`.
    pub fn set_timer_interval(&self, msec: u64) {
        debug_assert_eq!(self.kind, ThreadKind::Timer);
        self.timer_msec.store(msec, Ordering::Relaxed);
    }

    /// Walks the active split point's parent chain looking for a beta
    /// cut-off above us. Lock-free; stale reads are fine (§ module docs).
    pub fn cutoff_occurred(&self) -> bool {
        let mut current = self.active_split_point();
        while let Some(sp) = current {
            if sp.cutoff() {
                return true;
            }
            current = sp.parent();
        }
        false
    }

    /// Whether this thread may be recruited as a slave by `master`.
    ///
    /// An idle thread with no split points of its own helps anyone. A thread
    /// that is itself master of active split points only helps the threads
    /// currently slaving at the top of its own split stack — the helpful
    /// master rule; anything looser could park it under a subtree that is
    /// transitively waiting on it.
    pub fn is_available_to(&self, master: &Thread) -> bool {
        if self.searching.load(Ordering::Acquire) {
            return false;
        }

        // Snapshot once: the size may drop to zero under our feet, and the
        // arena read below must stay in bounds.
        let size = self.split_points_size.load(Ordering::Relaxed);

        size == 0 || self.split_points[size - 1].slaves_mask.test(master.idx)
    }

    /// Entry point of the host thread; dispatches on the worker kind.
    fn idle_loop(self: &Arc<Thread>) {
        match self.kind {
            ThreadKind::Generic => self.generic_idle_loop(),
            ThreadKind::Main => self.main_idle_loop(),
            ThreadKind::Timer => self.timer_idle_loop(),
        }
    }

    /// The generic park/search loop. Also re-entered by `split` on the
    /// master — deliberately this version regardless of the thread's kind —
    /// so the master searches its own share and then waits for its slaves
    /// here.
    fn generic_idle_loop(self: &Arc<Thread>) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };

        // Set only when called from split(): we are that split point's
        // master, and we leave once every slave has retired from it.
        let this_sp = if self.split_points_size() > 0 {
            self.active_split_point()
        } else {
            None
        };
        debug_assert!(this_sp.is_none() || self.searching());

        loop {
            // Park while there is nothing to do. Retesting under the sleep
            // mutex closes the race with a master that books us and fires
            // notify_one() before we reach the wait.
            while (!self.searching.load(Ordering::Acquire) && pool.sleep_while_idle())
                || self.exit.load(Ordering::Acquire)
            {
                if self.exit.load(Ordering::Acquire) {
                    debug_assert!(this_sp.is_none());
                    return;
                }

                let guard = self.sleep_mutex.lock().unwrap();

                // Master with no slaves left: exit the loop instead of
                // sleeping through our own join.
                if let Some(sp) = &this_sp {
                    if sp.slaves_mask.only(self.idx) {
                        drop(guard);
                        break;
                    }
                }

                if !self.searching.load(Ordering::Acquire)
                    && !self.exit.load(Ordering::Acquire)
                {
                    let _guard = self.sleep_cond.wait(guard).unwrap();
                }
            }

            if self.searching.load(Ordering::Acquire) {
                debug_assert!(!self.exit.load(Ordering::Relaxed));

                // The pool lock orders this read after the recruiting
                // master's writes to our assignment.
                let sp = {
                    let _pool_guard = pool.state.read().unwrap();
                    self.active_split_point()
                        .expect("woken to search without a split point")
                };

                // The body runs with the split point locked on entry and on
                // exit; it drops the lock itself around child searches.
                sp.lock();
                let share_nodes = search::search_split_point(&pool, self, &sp);

                self.searching.store(false, Ordering::Release);
                sp.nodes.fetch_add(share_nodes, Ordering::Relaxed);

                let master_idx = sp.master_index();
                if self.idx != master_idx {
                    sp.slaves_mask.reset(self.idx);

                    // Last slave out wakes the master. Unconditionally: the
                    // master may still be searching its own share, in which
                    // case the signal is spurious but a skipped one could be
                    // a lost wake-up.
                    if pool.sleep_while_idle() && sp.slaves_mask.only(master_idx) {
                        if let Some(master) = sp.data().master.upgrade() {
                            master.notify_one();
                        }
                    }
                }
                // Past this unlock the split point can be joined and its
                // slot recycled under our feet; hands off.
                sp.unlock();
            } else if !pool.sleep_while_idle() && !self.exit.load(Ordering::Acquire) {
                std::thread::yield_now();
            }

            // Master exit: every slave has retired from our split point.
            if let Some(sp) = &this_sp {
                if sp.slaves_mask.only(self.idx) {
                    sp.lock();
                    let finished = sp.slaves_mask.only(self.idx);
                    sp.unlock();
                    if finished {
                        return;
                    }
                }
            }
        }
    }

    /// Main thread loop: separates "a search was requested" (`thinking`)
    /// from "this thread is executing search code" (`searching`). The
    /// controller handshake lives on `thinking`.
    fn main_idle_loop(self: &Arc<Thread>) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };

        loop {
            let mut guard = self.sleep_mutex.lock().unwrap();
            self.thinking.store(false, Ordering::Release);

            while !self.thinking.load(Ordering::Acquire) && !self.exit.load(Ordering::Acquire) {
                // The controller waits on the pool condvar holding our sleep
                // mutex; tell it `thinking` just went false.
                pool.sleep_cond.notify_one();
                guard = self.sleep_cond.wait(guard).unwrap();
            }
            drop(guard);

            if self.exit.load(Ordering::Acquire) {
                return;
            }

            self.searching.store(true, Ordering::Release);
            search::think(&pool, self);
            debug_assert!(self.searching());
            self.searching.store(false, Ordering::Release);
        }
    }

    /// Timer loop: a timed park followed by the external time check. An
    /// interval of 0 parks indefinitely until `notify_one` rearms it.
    fn timer_idle_loop(self: &Arc<Thread>) {
        while !self.exit.load(Ordering::Acquire) {
            {
                let guard = self.sleep_mutex.lock().unwrap();
                let msec = self.timer_msec.load(Ordering::Relaxed);
                if !self.exit.load(Ordering::Acquire) {
                    if msec != 0 {
                        let _ = self
                            .sleep_cond
                            .wait_timeout(guard, Duration::from_millis(msec))
                            .unwrap();
                    } else {
                        let _guard = self.sleep_cond.wait(guard).unwrap();
                    }
                }
            }

            if self.timer_msec.load(Ordering::Relaxed) != 0 {
                if let Some(pool) = self.pool.upgrade() {
                    pool.run_check_time();
                }
            }
        }
    }
}

struct PoolState {
    threads: Vec<Arc<Thread>>,
    handles: Vec<JoinHandle<()>>,
}

/// Process-wide coordinator: owns the workers and the timer, arbitrates
/// slave allocation, and drives the controller handshake.
pub struct ThreadPool {
    /// The pool lock. Split creation/join and resize hold it exclusively;
    /// advisory scans take it shared.
    state: RwLock<PoolState>,

    /// Controller handshake condvar. Waited on while holding the *main
    /// thread's* sleep mutex — its predicate (`main.thinking`) is guarded by
    /// that mutex, so this is the correct pairing even though it looks odd.
    sleep_cond: Condvar,

    timer: Mutex<Option<(Arc<Thread>, JoinHandle<()>)>>,

    sleep_while_idle: AtomicBool,
    min_split_depth: AtomicI32,
    max_threads_per_split_point: AtomicUsize,

    signals: Signals,
    search_state: Mutex<SearchState>,
    time_manager: Mutex<Option<Arc<super::time_control::TimeManager>>>,
    check_time: CheckTimeFn,
}

impl ThreadPool {
    /// Creates and initializes a pool: timer first, main thread at index 0,
    /// then the option-driven workers. Two-phase on purpose — worker threads
    /// must not come up before the process is done initializing.
    pub fn new(options: &Options) -> Arc<ThreadPool> {
        ThreadPool::with_check_time(options, Box::new(search::check_time))
    }

    /// Same as [`ThreadPool::new`] with a custom time-check hook; the tests
    /// use this to observe the timer.
    pub fn with_check_time(options: &Options, check_time: CheckTimeFn) -> Arc<ThreadPool> {
        let pool = Arc::new(ThreadPool {
            state: RwLock::new(PoolState {
                threads: Vec::new(),
                handles: Vec::new(),
            }),
            sleep_cond: Condvar::new(),
            timer: Mutex::new(None),
            sleep_while_idle: AtomicBool::new(true),
            min_split_depth: AtomicI32::new(4 * ONE_PLY),
            max_threads_per_split_point: AtomicUsize::new(5),
            signals: Signals::new(),
            search_state: Mutex::new(SearchState::new()),
            time_manager: Mutex::new(None),
            check_time,
        });
        pool.init(options);
        pool
    }

    fn init(self: &Arc<ThreadPool>, options: &Options) {
        self.sleep_while_idle.store(true, Ordering::Relaxed);

        let timer = Arc::new(Thread::new(
            usize::MAX,
            ThreadKind::Timer,
            Arc::downgrade(self),
        ));
        let handle = spawn_host_thread("timer", timer.clone());
        *self.timer.lock().unwrap() = Some((timer, handle));

        {
            let mut state = self.state.write().unwrap();
            self.spawn_worker(&mut state, ThreadKind::Main);
        }

        self.read_uci_options(options);
    }

    fn spawn_worker(self: &Arc<ThreadPool>, state: &mut PoolState, kind: ThreadKind) {
        let idx = state.threads.len();
        debug_assert!(idx < MAX_THREADS);
        let thread = Arc::new(Thread::new(idx, kind, Arc::downgrade(self)));
        let name = match kind {
            ThreadKind::Main => "main".to_string(),
            _ => format!("worker-{idx}"),
        };
        let handle = spawn_host_thread(&name, thread.clone());
        state.threads.push(thread);
        state.handles.push(handle);
    }

    /// Terminates the pool: the timer first (its time check reads pool
    /// state), then every worker in index order. Idempotent. The running
    /// workers keep the pool allocation alive through their back-references,
    /// so this must be called explicitly; `Drop` only covers the
    /// already-drained case.
    pub fn exit(&self) {
        if let Some((timer, handle)) = self.timer.lock().unwrap().take() {
            destroy_worker(timer, handle);
        }

        let mut state = self.state.write().unwrap();
        let threads: Vec<_> = state.threads.drain(..).collect();
        let handles: Vec<_> = state.handles.drain(..).collect();
        drop(state);

        for (thread, handle) in threads.into_iter().zip(handles) {
            destroy_worker(thread, handle);
        }
    }

    /// Applies the configuration surface: split tuning plus the requested
    /// worker count, growing or shrinking the pool at the tail. Must not be
    /// called with a search in flight.
    pub fn read_uci_options(self: &Arc<ThreadPool>, options: &Options) {
        self.max_threads_per_split_point.store(
            options.spin("Max Threads per Split Point") as usize,
            Ordering::Relaxed,
        );
        self.min_split_depth.store(
            options.spin("Min Split Depth") as Depth * ONE_PLY,
            Ordering::Relaxed,
        );
        self.sleep_while_idle
            .store(options.check("Use Sleeping Threads"), Ordering::Relaxed);

        let requested = options.spin("Threads").clamp(1, MAX_THREADS as i64) as usize;
        debug_assert!(!self.thinking());

        let mut state = self.state.write().unwrap();
        while state.threads.len() < requested {
            self.spawn_worker(&mut state, ThreadKind::Generic);
        }
        while state.threads.len() > requested {
            let thread = state.threads.pop().unwrap();
            let handle = state.handles.pop().unwrap();
            destroy_worker(thread, handle);
        }
    }

    pub fn size(&self) -> usize {
        self.state.read().unwrap().threads.len()
    }

    /// The main thread (index 0).
    pub fn main(&self) -> Arc<Thread> {
        self.state.read().unwrap().threads[0].clone()
    }

    /// The timer thread, while the pool is live.
    pub fn timer(&self) -> Option<Arc<Thread>> {
        self.timer.lock().unwrap().as_ref().map(|(t, _)| t.clone())
    }

    /// Snapshot of the worker list, for inspection.
    pub fn threads(&self) -> Vec<Arc<Thread>> {
        self.state.read().unwrap().threads.clone()
    }

    #[inline]
    pub fn sleep_while_idle(&self) -> bool {
        self.sleep_while_idle.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn min_split_depth(&self) -> Depth {
        self.min_split_depth.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    pub fn search_state(&self) -> &Mutex<SearchState> {
        &self.search_state
    }

    pub fn time_manager(&self) -> Option<Arc<super::time_control::TimeManager>> {
        self.time_manager.lock().unwrap().clone()
    }

    pub fn set_time_manager(&self, tm: Option<Arc<super::time_control::TimeManager>>) {
        *self.time_manager.lock().unwrap() = tm;
    }

    fn thinking(&self) -> bool {
        let state = self.state.read().unwrap();
        state
            .threads
            .first()
            .is_some_and(|main| main.thinking.load(Ordering::Acquire))
    }

    /// Total nodes of the current search. Every thread counts the nodes it
    /// visits itself, so the sum is exact even while splits are in flight.
    pub fn nodes_searched(&self) -> u64 {
        let state = self.state.read().unwrap();
        state.threads.iter().map(|t| t.nodes.load(Ordering::Relaxed)).sum()
    }

    /// Deepest ply any worker reached in the current search.
    pub fn max_ply_reached(&self) -> usize {
        let state = self.state.read().unwrap();
        state
            .threads
            .iter()
            .map(|t| t.max_ply.load(Ordering::Relaxed))
            .max()
            .unwrap_or(0)
    }

    fn run_check_time(self: &Arc<ThreadPool>) {
        (self.check_time)(self);
    }

    /// Advisory scan: is any worker recruitable by `master` right now? No
    /// result stability is implied; `split` re-checks under the pool lock.
    pub fn slave_available(&self, master: &Thread) -> bool {
        let state = self.state.read().unwrap();
        state.threads.iter().any(|t| t.is_available_to(master))
    }

    /// Hands a search to the pool and returns immediately. Any previous
    /// search is drained first; the clock is read before anything else so
    /// time management charges setup to the right side.
    pub fn start_thinking(&self, pos: &Position, limits: &Limits, search_moves: &[Move]) {
        self.wait_for_think_finished();

        let start_time = Instant::now();

        self.signals.stop.store(false, Ordering::Release);
        self.signals.stop_on_ponder_hit.store(false, Ordering::Release);
        self.signals.failed_low_at_root.store(false, Ordering::Release);

        {
            let mut search_state = self.search_state.lock().unwrap();
            search_state.start_time = start_time;
            search_state.root_pos = *pos;
            search_state.limits = limits.clone();
            search_state.root_moves.clear();
            for &mv in movegen::legal_moves(pos).iter() {
                if search_moves.is_empty() || search_moves.contains(&mv) {
                    search_state.root_moves.push(RootMove::new(mv));
                }
            }
        }

        {
            let state = self.state.read().unwrap();
            for thread in &state.threads {
                thread.nodes.store(0, Ordering::Relaxed);
                thread.max_ply.store(0, Ordering::Relaxed);
            }
        }

        let main = self.main();
        main.thinking.store(true, Ordering::Release);
        main.notify_one();
    }

    /// Blocks the controller until the main thread has gone back to sleep.
    /// This is the one cross-thread use of the pool condvar; see its field
    /// docs for why it pairs with main's sleep mutex.
    pub fn wait_for_think_finished(&self) {
        let main = self.main();
        let mut guard = main.sleep_mutex.lock().unwrap();
        while main.thinking.load(Ordering::Acquire) {
            guard = self.sleep_cond.wait(guard).unwrap();
        }
    }

    /// Asks the current search to stop and wakes main in case it is parked
    /// waiting for a stop in infinite or ponder mode.
    pub fn stop_search(&self) {
        self.signals.stop.store(true, Ordering::Release);
        self.main().notify_one();
    }

    /// The GUI played the move we were pondering on: the search converts to
    /// a normal clocked search, or stops at once if its time already ran out.
    pub fn ponder_hit(&self) {
        self.search_state.lock().unwrap().limits.ponder = false;
        if self.signals.stop_on_ponder_hit.load(Ordering::Acquire) {
            self.stop_search();
        }
    }

    /// Shares the remaining moves of a node between the calling thread and
    /// recruited slaves, and returns once all of them are done.
    ///
    /// With `FAKE`, or when nobody is recruitable after all, the master
    /// still searches its share through the generic idle loop, so the
    /// degenerate cases stay on the common path. Returns the node's best
    /// value; the best move and the split point's node total come back
    /// through the out-parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn split<const FAKE: bool>(
        self: &Arc<ThreadPool>,
        master: &Arc<Thread>,
        pos: &Position,
        ply: usize,
        alpha: Value,
        beta: Value,
        best_value: Value,
        best_move: &mut Option<Move>,
        nodes: &mut u64,
        depth: Depth,
        threat_move: Option<Move>,
        move_count: u32,
        picker: &Arc<MovePicker>,
        node_type: NodeType,
    ) -> Value {
        debug_assert!(best_value > -VALUE_INFINITE);
        debug_assert!(best_value <= alpha && alpha < beta && beta <= VALUE_INFINITE);
        debug_assert!(depth > 0);
        debug_assert!(ply < MAX_PLY);
        debug_assert!(master.searching());

        let size = master.split_points_size();
        if size >= MAX_SPLITPOINTS_PER_THREAD {
            // Out of split stack; the caller keeps searching sequentially.
            return best_value;
        }

        let sp = master.split_points[size].clone();

        // Creation: pool lock, then split point lock — that order, always.
        {
            let state = self.state.write().unwrap();

            sp.lock();
            {
                let data = sp.data_mut();
                data.master = Arc::downgrade(master);
                data.master_idx = master.idx;
                data.parent = master.active_split_point();
                data.pos = *pos;
                data.ply = ply;
                data.depth = depth;
                data.beta = beta;
                data.threat_move = threat_move;
                data.node_type = node_type;
                data.best_move = *best_move;
                data.move_count = move_count;
                data.picker = Some(picker.clone());
            }
            sp.slaves_mask.clear();
            sp.slaves_mask.set(master.idx);
            sp.cutoff.store(false, Ordering::Relaxed);
            sp.set_alpha(alpha);
            sp.set_best_value(best_value);
            sp.nodes.store(0, Ordering::Relaxed);

            master.set_active_split_point(Some(sp.clone()));

            let mut slaves_cnt = 0;
            if !FAKE {
                let max_per_split_point =
                    self.max_threads_per_split_point.load(Ordering::Relaxed);
                for thread in &state.threads {
                    if thread.is_available_to(master) {
                        sp.slaves_mask.set(thread.idx);
                        thread.set_active_split_point(Some(sp.clone()));
                        // This is what makes the slave leave its idle loop.
                        thread.searching.store(true, Ordering::Release);
                        thread.notify_one();

                        slaves_cnt += 1;
                        if slaves_cnt + 1 >= max_per_split_point {
                            break;
                        }
                    }
                }
            }

            master.split_points_size.store(size + 1, Ordering::Relaxed);

            sp.unlock();
        }

        // Participation: the master re-enters the generic idle loop, which
        // immediately dives into the search body because `searching` is
        // still set, then returns once the slave mask collapses to us.
        master.generic_idle_loop();
        debug_assert!(!master.searching());

        // Join: under both locks again, to not race is_available_to().
        let result;
        {
            let _state = self.state.write().unwrap();
            sp.lock();

            master.searching.store(true, Ordering::Release);
            master.split_points_size.store(size, Ordering::Relaxed);
            master.set_active_split_point(sp.parent());

            result = sp.best_value();
            *best_move = sp.data().best_move;
            // Fold the split point's work into the caller's node counter so
            // the count keeps flowing up through enclosing split points.
            *nodes += sp.nodes.load(Ordering::Relaxed);
            // Drop the picker; the arena slot itself is recycled, not freed.
            sp.data_mut().picker = None;

            sp.unlock();
        }
        result
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.exit();
    }
}

fn spawn_host_thread(name: &str, thread: Arc<Thread>) -> JoinHandle<()> {
    let idx = thread.idx;
    std::thread::Builder::new()
        .name(name.to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || thread.idle_loop())
        .unwrap_or_else(|err| {
            // Dense, contiguous indices are assumed everywhere; there is no
            // partial-pool recovery.
            eprintln!("failed to create worker thread {idx}: {err}");
            std::process::exit(1);
        })
}

fn destroy_worker(thread: Arc<Thread>, handle: JoinHandle<()>) {
    {
        let _guard = thread.sleep_mutex.lock().unwrap();
        thread.exit.store(true, Ordering::Release);
    }
    thread.notify_one();
    if handle.join().is_err() {
        eprintln!("worker thread {} panicked during shutdown", thread.idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_thread(idx: usize) -> Arc<Thread> {
        Arc::new(Thread::new(idx, ThreadKind::Generic, Weak::new()))
    }

    #[test]
    fn idle_thread_without_split_points_helps_anyone() {
        let master = bare_thread(0);
        let helper = bare_thread(1);
        assert!(helper.is_available_to(&master));
    }

    #[test]
    fn searching_thread_is_never_available() {
        let master = bare_thread(0);
        let helper = bare_thread(1);
        helper.searching.store(true, Ordering::Release);
        assert!(!helper.is_available_to(&master));
    }

    #[test]
    fn helpful_master_rule() {
        // Thread 1 is master of a split point whose slaves are {1, 2}.
        let master_a = bare_thread(0);
        let master_b = bare_thread(2);
        let busy = bare_thread(1);

        busy.split_points[0].slaves_mask.set(1);
        busy.split_points[0].slaves_mask.set(2);
        busy.split_points_size.store(1, Ordering::Relaxed);

        // Thread 2 slaves under thread 1's top split point, so 1 may help 2;
        // thread 0 does not, so 1 must not help 0.
        assert!(busy.is_available_to(&master_b));
        assert!(!busy.is_available_to(&master_a));
    }

    #[test]
    fn cutoff_propagates_through_the_parent_chain() {
        let thread = bare_thread(0);
        let parent = thread.split_points[0].clone();
        let child = thread.split_points[1].clone();
        child.data_mut().parent = Some(parent.clone());
        thread.set_active_split_point(Some(child.clone()));

        assert!(!thread.cutoff_occurred());
        parent.set_cutoff();
        assert!(thread.cutoff_occurred());

        thread.set_active_split_point(None);
        child.data_mut().parent = None;
    }

    #[test]
    fn full_split_stack_fails_fast() {
        let mut options = Options::default();
        options.set("Threads", "1").unwrap();
        let pool = ThreadPool::new(&options);

        let main = pool.main();
        main.searching.store(true, Ordering::Release);
        main.split_points_size
            .store(MAX_SPLITPOINTS_PER_THREAD, Ordering::Relaxed);

        let pos = Position::startpos();
        let picker = Arc::new(MovePicker::new(&pos, [None; 2], None));
        let mut best_move = None;
        let mut nodes = 0;
        let value = pool.split::<false>(
            &main, &pos, 0, -50, 50, -50, &mut best_move, &mut nodes, 6, None, 1, &picker,
            NodeType::NonPv,
        );

        assert_eq!(value, -50);
        assert_eq!(best_move, None);
        assert_eq!(nodes, 0);

        main.split_points_size.store(0, Ordering::Relaxed);
        main.searching.store(false, Ordering::Release);
        pool.exit();
    }

    #[test]
    fn fake_split_searches_the_share_on_the_calling_thread() {
        let mut options = Options::default();
        options.set("Threads", "1").unwrap();
        let pool = ThreadPool::new(&options);

        let main = pool.main();
        main.searching.store(true, Ordering::Release);

        let pos = Position::startpos();
        let picker = Arc::new(MovePicker::new(&pos, [None; 2], None));
        let mut best_move = None;
        let mut nodes = 0;
        let value = pool.split::<true>(
            &main,
            &pos,
            0,
            -VALUE_INFINITE + 1,
            VALUE_INFINITE - 1,
            -VALUE_INFINITE + 1,
            &mut best_move,
            &mut nodes,
            2,
            None,
            0,
            &picker,
            NodeType::Pv,
        );

        // The degenerate split drained the whole picker on this thread.
        assert_eq!(picker.remaining(), 0);
        assert!(value > -VALUE_INFINITE + 1);
        assert!(best_move.is_some());
        assert!(nodes > 0);
        assert_eq!(main.split_points_size(), 0);
        assert!(main.searching());
        assert!(main.split_points[0].slaves_mask.only(main.idx()));

        main.searching.store(false, Ordering::Release);
        pool.exit();
    }
}
