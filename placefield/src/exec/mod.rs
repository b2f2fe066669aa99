//! Isolated, deadline-bounded batch execution
//!
//! Each dispatched [`Batch`] runs on its own worker thread, which owns the
//! compiled [`Function`] and an immutable snapshot of the grid parameters.
//! The only state shared with the host is the (read-only) renderer and a
//! [`CancelToken`].
//!
//! ```
//! use placefield::{
//!     exec::{Batch, Executor, ExecutorConfig},
//!     expr::compile,
//!     render::{GridRequest, GridSize, Sampler},
//!     Error,
//! };
//!
//! let renderer = |s: &Sampler, r: &GridRequest| -> Result<String, Error> {
//!     Ok(format!("{}", s.sample(r.place as f64, 0.0)?))
//! };
//! let exec = Executor::new(ExecutorConfig::default(), renderer);
//! let f = compile("x * 2", ["x", "y"])?;
//! let out = exec.run_batch(f, Batch::new(3, GridSize::new(1, 1), 0, 0))?;
//! assert_eq!(out.get(3), Some("6"));
//! # Ok::<(), placefield::Error>(())
//! ```
mod cancel;

pub use cancel::CancelToken;
pub(crate) use cancel::Watchdog;

use cancel::LiveGuard;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use log::{debug, warn};
use rayon::prelude::*;

use crate::{
    Error,
    expr::Function,
    render::{GridRenderer, GridRequest, GridSize, Sampler},
};
use std::{
    num::NonZeroUsize,
    ops::RangeInclusive,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

/// Stack size for worker threads
///
/// Evaluation recurses over the expression tree, whose depth is bounded by
/// [`MAX_DEPTH`](crate::expr::MAX_DEPTH) and
/// [`MAX_CHAIN`](crate::expr::MAX_CHAIN).
const WORKER_STACK_SIZE: usize = 8 << 20;

/// Default wall-clock budget for one batch
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(2000);

/// Settings for an [`Executor`]
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Wall-clock budget for a batch, starting at dispatch
    pub deadline: Duration,

    /// Threads used to render places in parallel within one batch
    ///
    /// If `None`, places are rendered one after another on the worker thread.
    /// Otherwise, each worker builds its own pool, which is torn down along
    /// with the worker.
    pub threads: Option<NonZeroUsize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            threads: None,
        }
    }
}

/// Immutable snapshot of everything a worker needs besides the function
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Batch {
    /// Highest place to render; places are `1..=max_place`
    pub max_place: u32,
    /// Grid size in cells
    pub grid: GridSize,
    /// Horizontal pan offset
    pub x_offset: i64,
    /// Vertical pan offset
    pub y_offset: i64,
}

impl Batch {
    /// Builds a new batch
    pub fn new(
        max_place: u32,
        grid: GridSize,
        x_offset: i64,
        y_offset: i64,
    ) -> Self {
        Self {
            max_place,
            grid,
            x_offset,
            y_offset,
        }
    }

    /// Returns the places covered by this batch
    pub fn places(&self) -> RangeInclusive<u32> {
        1..=self.max_place
    }

    fn request(&self, place: u32) -> GridRequest {
        GridRequest {
            height: self.grid.height,
            width: self.grid.width,
            place,
            y_offset: self.y_offset,
            x_offset: self.x_offset,
        }
    }
}

/// Complete set of rendered frames for one batch, indexed by place
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResultSet {
    frames: Vec<String>,
}

impl ResultSet {
    /// Returns the frame for a place in `1..=len()`
    pub fn get(&self, place: u32) -> Option<&str> {
        let i = (place as usize).checked_sub(1)?;
        self.frames.get(i).map(String::as_str)
    }

    /// Returns the number of frames, which equals the batch's `max_place`
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Checks whether there are no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterates over `(place, frame)` pairs in place order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        (1..).zip(self.frames.iter().map(String::as_str))
    }
}

type WorkerResult = Result<Vec<String>, Error>;

/// Spawns isolated workers that render batches
pub struct Executor {
    config: ExecutorConfig,
    renderer: Arc<dyn GridRenderer>,
    live: Arc<AtomicUsize>,
    spawned: AtomicU64,
}

impl Executor {
    /// Builds a new executor around a renderer
    pub fn new<R: GridRenderer + 'static>(
        config: ExecutorConfig,
        renderer: R,
    ) -> Self {
        Self::from_shared(config, Arc::new(renderer))
    }

    /// Builds a new executor around a shared renderer
    pub fn from_shared(
        config: ExecutorConfig,
        renderer: Arc<dyn GridRenderer>,
    ) -> Self {
        Self {
            config,
            renderer,
            live: Arc::new(AtomicUsize::new(0)),
            spawned: AtomicU64::new(0),
        }
    }

    /// Returns the executor's configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Returns the number of worker contexts that have not yet exited
    pub fn live_contexts(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Starts rendering a batch on a new worker, without blocking
    ///
    /// The deadline starts now.  The returned handle owns the worker's
    /// cancel token; dropping the handle cancels the worker.
    pub fn dispatch(
        &self,
        function: Function,
        batch: Batch,
    ) -> Result<JobHandle, Error> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let token = CancelToken::new();
        let deadline = Instant::now() + self.config.deadline;

        let guard = LiveGuard::new(self.live.clone());
        let renderer = self.renderer.clone();
        let threads = self.config.threads;
        let worker_token = token.clone();
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);

        std::thread::Builder::new()
            .name(format!("placefield-worker-{id}"))
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || {
                let _guard = guard;
                let start = Instant::now();
                let out = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    render_batch(
                        renderer.as_ref(),
                        &function,
                        &batch,
                        threads,
                        &worker_token,
                        deadline,
                    )
                }))
                .unwrap_or_else(|e| Err(Error::WorkerPanic(panic_message(e))));

                // A late result is no result
                let out = match out {
                    Ok(..) if Instant::now() >= deadline => {
                        Err(Error::Interrupted)
                    }
                    out => out,
                };
                debug!(
                    "worker {id} finished in {:?} ({})",
                    start.elapsed(),
                    if out.is_ok() { "ok" } else { "error" }
                );
                // The handle may already be gone, in which case nobody cares
                let _ = tx.send(out);
            })
            .map_err(|e| Error::Spawn(e.to_string()))?;

        debug!(
            "dispatched worker {id}: {} place(s) on a {}x{} grid",
            batch.max_place, batch.grid.width, batch.grid.height
        );
        Ok(JobHandle {
            rx,
            token,
            deadline,
            timeout: self.config.deadline,
        })
    }

    /// Renders a batch on a new worker, blocking until it finishes
    ///
    /// Returns [`Error::Timeout`] if the deadline passes first.
    pub fn run_batch(
        &self,
        function: Function,
        batch: Batch,
    ) -> Result<ResultSet, Error> {
        self.dispatch(function, batch)?.wait()
    }
}

/// Handle to an in-flight batch
///
/// Dropping the handle cancels the worker (best-effort; the worker stops the
/// next time it samples the function).
pub struct JobHandle {
    rx: Receiver<WorkerResult>,
    token: CancelToken,
    deadline: Instant,
    timeout: Duration,
}

impl JobHandle {
    /// Returns the instant at which this job times out
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Asks the worker to stop early
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Checks whether the job has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Checks for a result without blocking
    ///
    /// Returns `None` while the worker is still running and `now` is before
    /// the deadline.  Once this returns `Some`, the handle is spent.
    pub fn try_finish(&self, now: Instant) -> Option<Result<ResultSet, Error>> {
        match self.rx.try_recv() {
            Ok(r) => Some(self.finish(r)),
            Err(TryRecvError::Empty) if now >= self.deadline => {
                self.token.cancel();
                Some(Err(Error::Timeout(self.timeout)))
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::WorkerLost)),
        }
    }

    /// Blocks until the worker reports or the deadline passes
    pub fn wait(self) -> Result<ResultSet, Error> {
        match self.rx.recv_deadline(self.deadline) {
            Ok(r) => self.finish(r),
            Err(RecvTimeoutError::Timeout) => {
                self.token.cancel();
                Err(Error::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerLost),
        }
    }

    fn finish(&self, r: WorkerResult) -> Result<ResultSet, Error> {
        match r {
            Ok(frames) => Ok(ResultSet { frames }),
            Err(Error::Interrupted) => Err(Error::Timeout(self.timeout)),
            Err(e) => Err(e),
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Renders every place in the batch, in place order
fn render_batch(
    renderer: &dyn GridRenderer,
    function: &Function,
    batch: &Batch,
    threads: Option<NonZeroUsize>,
    token: &CancelToken,
    deadline: Instant,
) -> WorkerResult {
    let render_one = |place: u32| -> Result<String, Error> {
        let dog = Watchdog::new(token.clone(), Some(deadline));
        dog.check()?;
        let sampler = Sampler::with_watchdog(function, dog);
        renderer.render(&sampler, &batch.request(place))
    };
    match threads {
        None => batch.places().map(render_one).collect(),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n.get())
                .stack_size(WORKER_STACK_SIZE)
                .build()
                .map_err(|e| Error::Spawn(e.to_string()))?;
            pool.install(|| {
                batch.places().into_par_iter().map(render_one).collect()
            })
        }
    }
}

fn panic_message(e: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = e.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = e.downcast_ref::<String>() {
        s.clone()
    } else {
        warn!("worker panicked with a non-string payload");
        "unknown panic".to_owned()
    }
}
