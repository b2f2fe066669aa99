//! Decides when to recompute, and which results to keep
//!
//! Every parameter mutation marks the [`Coordinator`] as dirty.  On the next
//! [`poll`](Coordinator::poll), all pending mutations collapse into a single
//! job, tagged with a fresh [`Generation`].  Completions are only committed if
//! they belong to the newest dispatched generation, so a slow stale job can
//! never overwrite a fast new one.
use crate::{
    Error, ErrorKind,
    exec::{Batch, Executor, ExecutorConfig, JobHandle, ResultSet},
    expr::Expression,
    render::{GridRenderer, GridSize},
};
use log::{debug, info, warn};
use std::{
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

/// Monotonically increasing job counter
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Returns the raw counter value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inputs to a recompute, plus the playback interval
#[derive(Clone, Debug, PartialEq)]
pub struct RenderParameters {
    /// Expression and its free variable names
    pub expression: Expression,
    /// Grid size in cells
    pub grid: GridSize,
    /// Highest place, at least 1
    pub max_place: u32,
    /// Horizontal pan offset
    pub x_offset: i64,
    /// Vertical pan offset
    pub y_offset: i64,
    /// Time between playback steps
    ///
    /// This is not a recompute input; changing it never dispatches a job.
    pub interval: Duration,
}

/// Default number of places
pub const DEFAULT_MAX_PLACE: u32 = 9;

/// Default time between playback steps
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

impl Default for RenderParameters {
    fn default() -> Self {
        Self {
            expression: Expression::default(),
            grid: GridSize::default(),
            max_place: DEFAULT_MAX_PLACE,
            x_offset: 0,
            y_offset: 0,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl RenderParameters {
    fn batch(&self) -> Batch {
        Batch::new(self.max_place, self.grid, self.x_offset, self.y_offset)
    }
}

/// Settings for a [`Coordinator`]
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Wall-clock budget for each batch
    pub deadline: Duration,

    /// Threads used to render places within one batch
    pub threads: Option<NonZeroUsize>,

    /// Minimum time between dispatches
    ///
    /// Mutations arriving faster than this (e.g. during a drag) are held and
    /// collapsed into the next dispatch.
    pub min_dispatch_interval: Duration,
}

/// Default minimum time between dispatches
pub const DEFAULT_MIN_DISPATCH_INTERVAL: Duration = Duration::from_millis(50);

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let exec = ExecutorConfig::default();
        Self {
            deadline: exec.deadline,
            threads: exec.threads,
            min_dispatch_interval: DEFAULT_MIN_DISPATCH_INTERVAL,
        }
    }
}

/// Outcome of the most recently committed generation
#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    /// Nothing has been committed yet
    Empty,
    /// A new [`ResultSet`] was published
    Ready(Generation),
    /// The expression failed to compile or faulted while running
    Invalid(Generation, Error),
    /// The batch ran past its deadline
    TimedOut(Generation, Error),
}

/// In-flight job record
struct Job {
    generation: Generation,
    handle: JobHandle,
}

/// Owns the render parameters and the table of in-flight jobs
pub struct Coordinator {
    params: RenderParameters,
    executor: Executor,
    min_dispatch_interval: Duration,

    /// Set by mutations, cleared by dispatch
    dirty: bool,
    last_dispatch: Option<Instant>,

    next_generation: u64,
    latest: Option<Generation>,
    jobs: Vec<Job>,

    results: Option<(Generation, Arc<ResultSet>)>,
    status: Status,
}

impl Coordinator {
    /// Builds a coordinator with default parameters
    ///
    /// The initial parameters are dirty, so the first usable `poll` will
    /// dispatch a job.
    pub fn new<R: GridRenderer + 'static>(
        config: CoordinatorConfig,
        renderer: R,
    ) -> Self {
        Self::with_params(config, renderer, RenderParameters::default())
    }

    /// Builds a coordinator with the given initial parameters
    pub fn with_params<R: GridRenderer + 'static>(
        config: CoordinatorConfig,
        renderer: R,
        mut params: RenderParameters,
    ) -> Self {
        params.max_place = params.max_place.max(1);
        let exec = ExecutorConfig {
            deadline: config.deadline,
            threads: config.threads,
        };
        Self {
            params,
            executor: Executor::new(exec, renderer),
            min_dispatch_interval: config.min_dispatch_interval,
            dirty: true,
            last_dispatch: None,
            next_generation: 1,
            latest: None,
            jobs: vec![],
            results: None,
            status: Status::Empty,
        }
    }

    /// Returns the current parameters
    pub fn params(&self) -> &RenderParameters {
        &self.params
    }

    /// Replaces the expression
    pub fn set_expression(&mut self, expression: Expression) {
        if self.params.expression != expression {
            self.params.expression = expression;
            self.dirty = true;
        }
    }

    /// Replaces both pan offsets
    pub fn set_offsets(&mut self, x_offset: i64, y_offset: i64) {
        let prev = (self.params.x_offset, self.params.y_offset);
        if prev != (x_offset, y_offset) {
            self.params.x_offset = x_offset;
            self.params.y_offset = y_offset;
            self.dirty = true;
        }
    }

    /// Sets the number of places; values below 1 are clamped to 1
    pub fn set_max_place(&mut self, max_place: u32) {
        let max_place = max_place.max(1);
        if self.params.max_place != max_place {
            self.params.max_place = max_place;
            self.dirty = true;
        }
    }

    /// Sets the grid size
    pub fn set_grid(&mut self, grid: GridSize) {
        if self.params.grid != grid {
            self.params.grid = grid;
            self.dirty = true;
        }
    }

    /// Sets the playback interval, which does not trigger a recompute
    pub fn set_interval(&mut self, interval: Duration) {
        self.params.interval = interval;
    }

    /// Checks whether mutations are waiting to be dispatched
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the number of jobs dispatched so far
    ///
    /// Generations that failed to compile count too, since they consume a
    /// generation number and commit a result.
    pub fn jobs_dispatched(&self) -> u64 {
        self.next_generation - 1
    }

    /// Returns the newest dispatched generation
    pub fn latest_generation(&self) -> Option<Generation> {
        self.latest
    }

    /// Returns the number of jobs still being tracked
    pub fn jobs_in_flight(&self) -> usize {
        self.jobs.len()
    }

    /// Returns the number of worker contexts still alive
    pub fn live_contexts(&self) -> usize {
        self.executor.live_contexts()
    }

    /// Returns the most recently published result set and its generation
    ///
    /// A failed generation does not clear this; hosts can keep showing the
    /// last good frames while flagging the error from [`status`](Self::status).
    pub fn results(&self) -> Option<(Generation, &Arc<ResultSet>)> {
        self.results.as_ref().map(|(g, r)| (*g, r))
    }

    /// Returns the outcome of the most recently committed generation
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Returns the earliest instant at which `poll` has work to do
    ///
    /// Hosts that sleep between events can use this to schedule a wakeup.
    pub fn next_wakeup(&self) -> Option<Instant> {
        let dispatch = if self.dirty {
            Some(
                self.last_dispatch
                    .map(|t| t + self.min_dispatch_interval)
                    .unwrap_or_else(Instant::now),
            )
        } else {
            None
        };
        let deadline = self.jobs.iter().map(|j| j.handle.deadline()).min();
        match (dispatch, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Collects finished jobs, then dispatches a new one if needed
    ///
    /// Returns `true` if anything was committed (results or an error).
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut committed = self.collect(now);
        if self.dirty && self.may_dispatch(now) {
            committed |= self.dispatch(now);
        }
        committed
    }

    fn may_dispatch(&self, now: Instant) -> bool {
        if self.params.grid.is_empty() {
            return false;
        }
        match self.last_dispatch {
            Some(t) => {
                now.saturating_duration_since(t) >= self.min_dispatch_interval
            }
            None => true,
        }
    }

    /// Drains finished jobs from the table, committing the newest one
    fn collect(&mut self, now: Instant) -> bool {
        let mut committed = false;
        let mut i = 0;
        while i < self.jobs.len() {
            let Some(out) = self.jobs[i].handle.try_finish(now) else {
                i += 1;
                continue;
            };
            let job = self.jobs.swap_remove(i);
            if Some(job.generation) == self.latest {
                self.commit(job.generation, out);
                committed = true;
            } else {
                debug!(
                    "discarding stale generation {} (latest is {:?})",
                    job.generation, self.latest
                );
            }
        }
        committed
    }

    /// Starts a job for the current parameters
    ///
    /// Returns `true` if the generation was committed immediately (i.e. it
    /// failed to compile or to spawn).
    fn dispatch(&mut self, now: Instant) -> bool {
        let generation = Generation(self.next_generation);
        self.next_generation += 1;
        self.latest = Some(generation);
        self.dirty = false;
        self.last_dispatch = Some(now);

        // Older jobs can never be committed now; ask them to stop early
        for job in &self.jobs {
            job.handle.cancel();
        }

        let function = match self.params.expression.compile() {
            Ok(f) => f,
            Err(e) => {
                self.commit(generation, Err(e));
                return true;
            }
        };
        let batch = self.params.batch();
        match self.executor.dispatch(function, batch) {
            Ok(handle) => {
                debug!(
                    "dispatched generation {generation} for `{}`",
                    self.params.expression.text()
                );
                self.jobs.push(Job { generation, handle });
                false
            }
            Err(e) => {
                self.commit(generation, Err(e));
                true
            }
        }
    }

    fn commit(
        &mut self,
        generation: Generation,
        out: Result<ResultSet, Error>,
    ) {
        self.status = match out {
            Ok(results) => {
                info!(
                    "generation {generation}: published {} place(s)",
                    results.len()
                );
                self.results = Some((generation, Arc::new(results)));
                Status::Ready(generation)
            }
            Err(e) => {
                warn!("generation {generation} failed: {e}");
                match e.kind() {
                    ErrorKind::Syntax | ErrorKind::RuntimeFault => {
                        Status::Invalid(generation, e)
                    }
                    ErrorKind::Timeout => Status::TimedOut(generation, e),
                }
            }
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::render::{GridRequest, Sampler};

    fn renderer(s: &Sampler, r: &GridRequest) -> Result<String, Error> {
        let v = s.sample(r.x_offset as f64, r.y_offset as f64)?;
        Ok(format!("{}@{v}", r.place))
    }

    fn coordinator() -> Coordinator {
        let params = RenderParameters {
            grid: GridSize::new(4, 3),
            max_place: 5,
            expression: Expression::new("x + y"),
            ..Default::default()
        };
        Coordinator::with_params(CoordinatorConfig::default(), renderer, params)
    }

    /// Polls until something is committed or `timeout` passes
    fn settle(c: &mut Coordinator, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if c.poll(Instant::now()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_first_poll_dispatches() {
        let mut c = coordinator();
        assert!(c.is_dirty());
        assert_eq!(c.status(), &Status::Empty);
        assert!(settle(&mut c, Duration::from_secs(2)));
        assert_eq!(c.jobs_dispatched(), 1);
        assert_eq!(c.status(), &Status::Ready(Generation(1)));
        let (g, r) = c.results().unwrap();
        assert_eq!(g, Generation(1));
        assert_eq!(r.len(), 5);
        assert_eq!(r.get(1), Some("1@0"));
    }

    #[test]
    fn test_empty_grid_holds_dispatch() {
        let mut c = Coordinator::new(CoordinatorConfig::default(), renderer);
        assert!(!c.poll(Instant::now()));
        assert_eq!(c.jobs_dispatched(), 0);
        assert!(c.is_dirty());

        c.set_grid(GridSize::new(2, 2));
        assert!(settle(&mut c, Duration::from_secs(2)));
        assert_eq!(c.jobs_dispatched(), 1);
    }

    #[test]
    fn test_collapse() {
        let mut c = coordinator();
        for i in 0..10 {
            c.set_offsets(i, -i);
        }
        c.set_expression(Expression::new("x - y"));
        assert!(settle(&mut c, Duration::from_secs(2)));
        assert_eq!(c.jobs_dispatched(), 1);
        let (_, r) = c.results().unwrap();
        assert_eq!(r.get(2), Some("2@18"));
    }

    #[test]
    fn test_no_op_mutations() {
        let mut c = coordinator();
        assert!(settle(&mut c, Duration::from_secs(2)));
        c.set_offsets(0, 0);
        c.set_max_place(5);
        c.set_grid(GridSize::new(4, 3));
        c.set_expression(Expression::new("x + y"));
        c.set_interval(Duration::from_millis(10));
        assert!(!c.is_dirty());
        assert_eq!(c.params().interval, Duration::from_millis(10));
    }

    #[test]
    fn test_syntax_error_commits_immediately() {
        let mut c = coordinator();
        c.set_expression(Expression::new("x +* y"));
        assert!(c.poll(Instant::now()));
        assert_eq!(c.jobs_in_flight(), 0);
        let Status::Invalid(g, e) = c.status() else {
            panic!("expected invalid status, got {:?}", c.status());
        };
        assert_eq!(*g, Generation(1));
        assert_eq!(e.kind(), ErrorKind::Syntax);
        assert!(c.results().is_none());

        // A later, valid generation still goes through
        c.set_expression(Expression::new("x * y"));
        let later = Instant::now() + Duration::from_millis(60);
        c.poll(later);
        assert!(settle(&mut c, Duration::from_secs(2)));
        assert_eq!(c.status(), &Status::Ready(Generation(2)));
    }

    #[test]
    fn test_runtime_fault_keeps_old_results() {
        let mut c = coordinator();
        assert!(settle(&mut c, Duration::from_secs(2)));

        c.set_expression(Expression::new("x + nothing"));
        let later = Instant::now() + Duration::from_millis(60);
        c.poll(later);
        assert!(settle(&mut c, Duration::from_secs(2)));
        let Status::Invalid(g, e) = c.status() else {
            panic!("expected invalid status, got {:?}", c.status());
        };
        assert_eq!(*g, Generation(2));
        assert_eq!(e, &Error::UnknownVariable("nothing".to_owned()));
        assert_eq!(c.results().unwrap().0, Generation(1));
    }

    #[test]
    fn test_rate_limit() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.poll(t0);
        assert_eq!(c.jobs_dispatched(), 1);

        c.set_offsets(1, 1);
        c.poll(t0 + Duration::from_millis(10));
        assert_eq!(c.jobs_dispatched(), 1);
        assert!(c.is_dirty());
        assert!(c.next_wakeup().unwrap() <= t0 + Duration::from_millis(50));

        c.poll(t0 + Duration::from_millis(50));
        assert_eq!(c.jobs_dispatched(), 2);
        assert!(!c.is_dirty());
    }
}
