use std::{
    any::Any,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};

use nalgebra::{Point2, Vector2};
use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

/// Ordinal of the thread executing a loop body.
/// 0 is the thread that called `parallel_for`, pool workers are numbered from 1.
pub type ThreadIndex = usize;

pub type GridPoint = Point2<usize>;
pub type GridSize = Vector2<usize>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum WorkerCount {
    #[default]
    Auto,
    Manual(NonZeroUsize),
}

impl WorkerCount {
    /// 0 means autodetect.
    pub fn from_thread_count(thread_count: usize) -> WorkerCount {
        match NonZeroUsize::new(thread_count) {
            Some(n) => WorkerCount::Manual(n),
            None => WorkerCount::Auto,
        }
    }

    /// Total number of threads working on a loop, including the calling one.
    pub fn resolve(self) -> usize {
        match self {
            WorkerCount::Auto => num_system_cores(),
            WorkerCount::Manual(n) => n.get(),
        }
    }
}

pub fn num_system_cores() -> usize {
    num_cpus::get().max(1)
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Parallel for loops over a persistent pool of worker threads.
///
/// Loops are published in a work list shared with the pool, workers claim chunks of
/// indices from it. The calling thread helps with its own loop instead of idling, so a
/// scheduler with a thread count of N spawns N - 1 workers.
///
/// The pool is started lazily by the first loop that needs it and stays alive until
/// `terminate` is called or the scheduler is dropped.
pub struct Scheduler {
    thread_count: usize,
    pin_workers: bool,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    work_list: Mutex<WorkList>,
    condition: Condvar,
}

#[derive(Default)]
struct WorkList {
    /// Loops that still have unclaimed indices, most recently published last
    loops: Vec<Arc<ParallelForLoop>>,
    shutdown: bool,
}

type LoopBody = dyn Fn(usize, ThreadIndex) + Sync;

struct ParallelForLoop {
    /// Borrowed from the `parallel_for` call that owns the loop.
    /// Only dereferenced while the loop is unfinished, which the owning call waits out.
    body: *const LoopBody,
    max_index: usize,
    chunk_size: usize,

    // Only modified with the work list locked.
    next_index: AtomicUsize,
    active_workers: AtomicUsize,

    panic: Mutex<Option<Box<dyn Any + Send>>>,
}

// The body is Sync and outlives all uses of the pointer.
unsafe impl Send for ParallelForLoop {}
unsafe impl Sync for ParallelForLoop {}

impl ParallelForLoop {
    fn new(body: &(dyn Fn(usize, ThreadIndex) + Sync + '_), max_index: usize, chunk_size: usize) -> Self {
        let body: *const (dyn Fn(usize, ThreadIndex) + Sync + '_) = body;
        // SAFETY: Only erases the lifetime, see the `body` field.
        let body = unsafe { std::mem::transmute::<_, *const LoopBody>(body) };
        ParallelForLoop {
            body,
            max_index,
            chunk_size,
            next_index: AtomicUsize::new(0),
            active_workers: AtomicUsize::new(0),
            panic: Mutex::new(None),
        }
    }

    fn has_unclaimed(&self) -> bool {
        self.next_index.load(Ordering::Relaxed) < self.max_index
    }

    /// All indices were claimed and none is being executed any more.
    fn is_finished(&self) -> bool {
        self.next_index.load(Ordering::Relaxed) == self.max_index
            && self.active_workers.load(Ordering::Relaxed) == 0
    }

    fn run(&self, range: std::ops::Range<usize>, thread_index: ThreadIndex) {
        // SAFETY: The loop is claimed and unfinished, the owning call is still waiting.
        let body = unsafe { &*self.body };
        for i in range {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| body(i, thread_index))) {
                let mut slot = self.panic.lock();
                if slot.is_none() {
                    *slot = Some(payload);
                }
            }
        }
    }
}

/// Claim the next chunk of the loop and run it with the lock released.
/// The loop must have unclaimed indices.
fn run_chunk(
    work_list: &mut MutexGuard<WorkList>,
    parallel_loop: &Arc<ParallelForLoop>,
    thread_index: ThreadIndex,
) {
    let start = parallel_loop.next_index.load(Ordering::Relaxed);
    let end = (start + parallel_loop.chunk_size).min(parallel_loop.max_index);
    debug_assert!(start < end);

    parallel_loop.next_index.store(end, Ordering::Relaxed);
    parallel_loop.active_workers.fetch_add(1, Ordering::Relaxed);
    if end == parallel_loop.max_index {
        work_list
            .loops
            .retain(|other| !Arc::ptr_eq(other, parallel_loop));
    }

    MutexGuard::unlocked(work_list, || parallel_loop.run(start..end, thread_index));

    parallel_loop.active_workers.fetch_sub(1, Ordering::Relaxed);
}

fn worker_main(shared: Arc<Shared>, thread_index: ThreadIndex) {
    let mut work_list = shared.work_list.lock();
    while !work_list.shutdown {
        let Some(parallel_loop) = work_list.loops.last().cloned() else {
            shared.condition.wait(&mut work_list);
            continue;
        };

        run_chunk(&mut work_list, &parallel_loop, thread_index);

        if parallel_loop.is_finished() {
            shared.condition.notify_all();
        }
    }
}

impl Scheduler {
    pub fn new(worker_count: WorkerCount) -> Scheduler {
        Scheduler {
            thread_count: worker_count.resolve(),
            pin_workers: false,
            shared: Arc::new(Shared {
                work_list: Mutex::new(WorkList::default()),
                condition: Condvar::new(),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Pin each pool thread to its own CPU core.
    pub fn with_pinned_workers(mut self) -> Scheduler {
        self.pin_workers = true;
        self
    }

    /// Number of threads working on a loop, including the calling one.
    /// Every thread index passed to a loop body is lower than this.
    pub fn max_thread_index(&self) -> usize {
        self.thread_count
    }

    /// Spawn the worker pool if it is not running yet.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut workers = self.workers.lock();
        if !workers.is_empty() || self.thread_count == 1 {
            return Ok(());
        }

        self.shared.work_list.lock().shutdown = false;

        let cores = if self.pin_workers {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        for thread_index in 1..self.thread_count {
            let shared = Arc::clone(&self.shared);
            let core = (!cores.is_empty()).then(|| cores[thread_index % cores.len()]);

            let handle = thread::Builder::new()
                .name(format!("worker{thread_index}"))
                .spawn(move || {
                    if let Some(core) = core {
                        core_affinity::set_for_current(core);
                    }
                    worker_main(shared, thread_index);
                })?;
            workers.push(handle);
        }

        Ok(())
    }

    /// Stop and join all worker threads.
    /// Must not be called while a loop is running. The pool is started again by the next loop.
    pub fn terminate(&self) {
        let mut workers = self.workers.lock();
        if workers.is_empty() {
            return;
        }

        self.shared.work_list.lock().shutdown = true;
        self.shared.condition.notify_all();

        for handle in workers.drain(..) {
            // Loop bodies run under catch_unwind, workers don't panic.
            let _ = handle.join();
        }
    }

    /// Call `body` once for every index in `0..count`, in parallel.
    /// Indices are handed out in chunks of `chunk_size` consecutive values, `body` also gets
    /// the index of the thread running it.
    ///
    /// Blocks until all indices are processed. If the body panics, the remaining indices are
    /// still processed and the first panic is then resumed in the calling thread.
    ///
    /// Panics if the worker pool can't be started.
    pub fn parallel_for<F>(&self, count: usize, chunk_size: NonZeroUsize, body: F)
    where
        F: Fn(usize, ThreadIndex) + Sync,
    {
        let chunk_size = chunk_size.get();
        if self.thread_count == 1 || count < chunk_size {
            for i in 0..count {
                body(i, 0);
            }
            return;
        }

        self.run_loop(count, chunk_size, &body);
    }

    /// Call `body` once for every point of the grid, in parallel.
    /// Each point is a separate unit of work.
    pub fn parallel_for_2d<F>(&self, extent: GridSize, body: F)
    where
        F: Fn(GridPoint, ThreadIndex) + Sync,
    {
        let count = extent.x * extent.y;
        let to_point = |i: usize| GridPoint::new(i % extent.x, i / extent.x);

        if self.thread_count == 1 || count <= 1 {
            for i in 0..count {
                body(to_point(i), 0);
            }
            return;
        }

        self.run_loop(count, 1, &|i, thread_index| body(to_point(i), thread_index));
    }

    fn run_loop(&self, count: usize, chunk_size: usize, body: &(dyn Fn(usize, ThreadIndex) + Sync)) {
        if let Err(e) = self.start() {
            panic!("Can't start the worker pool: {e}");
        }

        let parallel_loop = Arc::new(ParallelForLoop::new(body, count, chunk_size));

        let mut work_list = self.shared.work_list.lock();
        work_list.loops.push(Arc::clone(&parallel_loop));
        self.shared.condition.notify_all();

        while !parallel_loop.is_finished() {
            if parallel_loop.has_unclaimed() {
                run_chunk(&mut work_list, &parallel_loop, 0);
            } else {
                self.shared.condition.wait(&mut work_list);
            }
        }
        drop(work_list);

        if let Some(payload) = parallel_loop.panic.lock().take() {
            panic::resume_unwind(payload);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new(WorkerCount::Auto)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("thread_count", &self.thread_count)
            .field("pin_workers", &self.pin_workers)
            .field("running_workers", &self.workers.lock().len())
            .finish()
    }
}
