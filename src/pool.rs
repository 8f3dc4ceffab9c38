use crate::error::{PoolError, TaskError};
use crate::gatherer::{gather, Gathered};
use crate::scheduler::{can_block_within, new_scheduler, Bootstrap, SchedulingContext};
use crate::task::{task, Completed, Task};
use crate::wrapper::run_wrapped;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Capacity of the result channel when none is given.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Lifecycle of a pool. Moves forward only: `Idle -> Running -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
  Idle = 0,
  Running = 1,
  Done = 2,
}

impl Phase {
  fn from_u8(raw: u8) -> Self {
    match raw {
      0 => Phase::Idle,
      1 => Phase::Running,
      _ => Phase::Done,
    }
  }
}

struct PoolInner<T> {
  tasks: Option<Vec<Task<T>>>,
  bootstrap: Option<Bootstrap>,
  /// Outcomes kept back from the caller when a run surfaces a failure.
  retained: Option<Gathered<T>>,
}

/// Runs a fixed, ordered set of tasks concurrently, exactly once, and
/// gathers every outcome before returning.
///
/// Results come back in completion order. If any task fails, the first
/// failure to reach the gatherer is returned and every other outcome is
/// kept inside the pool.
pub struct TaskPool<T: Send + 'static> {
  pool_id: u64,
  pool_name: Arc<String>,
  channel_capacity: usize,
  task_count: usize,
  phase: AtomicU8,
  inner: Mutex<PoolInner<T>>,
}

impl<T: Send + 'static> TaskPool<T> {
  pub fn new(pool_name: &str, tasks: Vec<Task<T>>) -> Self {
    Self::with_channel_capacity(pool_name, DEFAULT_CHANNEL_CAPACITY, tasks)
  }

  /// Like [`TaskPool::new`] with an explicit result channel capacity
  /// (clamped to at least 1).
  pub fn with_channel_capacity(pool_name: &str, channel_capacity: usize, tasks: Vec<Task<T>>) -> Self {
    let pool_id = NEXT_POOL_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let task_count = tasks.len();
    debug!(pool_name = %pool_name, pool_id, task_count, "Task pool created.");

    Self {
      pool_id,
      pool_name: Arc::new(pool_name.to_string()),
      channel_capacity: channel_capacity.max(1),
      task_count,
      phase: AtomicU8::new(Phase::Idle as u8),
      inner: Mutex::new(PoolInner {
        tasks: Some(tasks),
        bootstrap: None,
        retained: None,
      }),
    }
  }

  /// Builds a pool from plain closures, boxing each one with [`task`].
  pub fn from_fns<I, F, Fut>(pool_name: &str, fns: I) -> Self
  where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<T>, TaskError>> + Send + 'static,
  {
    Self::new(pool_name, fns.into_iter().map(task).collect())
  }

  pub fn id(&self) -> u64 {
    self.pool_id
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn task_count(&self) -> usize {
    self.task_count
  }

  pub fn channel_capacity(&self) -> usize {
    self.channel_capacity
  }

  pub fn phase(&self) -> Phase {
    Phase::from_u8(self.phase.load(AtomicOrdering::Acquire))
  }

  /// The bootstrap path taken by the run, once one has started.
  pub fn bootstrap(&self) -> Option<Bootstrap> {
    self.inner.lock().bootstrap
  }

  /// Runs every task and blocks the calling thread until all have reported.
  ///
  /// Outside a Tokio runtime a fresh current-thread scheduler is built and
  /// driven to completion. Inside a multi-thread runtime the tasks are
  /// spawned onto it and this thread blocks in place while they run.
  ///
  /// # Errors
  /// Returns `PoolError::IllegalState` if the pool has already been run.
  /// Returns `PoolError::TaskFailed` with the first failure to arrive if any task failed.
  /// Returns `PoolError::BlockingInsideScheduler` when called from a thread that is
  /// driving a current-thread runtime; use [`TaskPool::run_async`] there. The pool
  /// is left untouched and can still be run.
  pub fn run(&self) -> Result<Vec<Completed<T>>, PoolError> {
    if self.phase() != Phase::Idle {
      return Err(self.illegal_state());
    }

    let context = SchedulingContext::detect();
    if let SchedulingContext::Active(handle) = &context {
      if !can_block_within(handle) {
        error!(
          pool_name = %*self.pool_name,
          pool_id = self.pool_id,
          "Blocking run requested from inside a current-thread runtime. Refusing to start."
        );
        return Err(PoolError::BlockingInsideScheduler);
      }
    }

    self.begin()?;
    let tasks = self.take_tasks();

    let gathered = match context {
      SchedulingContext::Active(handle) => {
        self.record_bootstrap(Bootstrap::ExistingContext);
        tokio::task::block_in_place(|| handle.block_on(self.spawn_and_gather(&handle, tasks)))
      }
      SchedulingContext::Absent => self.run_on_fresh_scheduler(tasks),
    };

    self.conclude(gathered)
  }

  /// Runs every task and resolves once all have reported.
  ///
  /// Inside a Tokio runtime the tasks are spawned onto it; no new scheduler
  /// is created. When polled outside any Tokio runtime this falls back to
  /// driving a fresh scheduler on the polling thread.
  ///
  /// # Errors
  /// Same as [`TaskPool::run`], minus `BlockingInsideScheduler`.
  pub async fn run_async(&self) -> Result<Vec<Completed<T>>, PoolError> {
    self.begin()?;
    let tasks = self.take_tasks();

    let gathered = match SchedulingContext::detect() {
      SchedulingContext::Active(handle) => {
        self.record_bootstrap(Bootstrap::ExistingContext);
        self.spawn_and_gather(&handle, tasks).await
      }
      SchedulingContext::Absent => self.run_on_fresh_scheduler(tasks),
    };

    self.conclude(gathered)
  }

  fn begin(&self) -> Result<(), PoolError> {
    match self.phase.compare_exchange(
      Phase::Idle as u8,
      Phase::Running as u8,
      AtomicOrdering::AcqRel,
      AtomicOrdering::Acquire,
    ) {
      Ok(_) => {
        info!(
          pool_name = %*self.pool_name,
          pool_id = self.pool_id,
          task_count = self.task_count,
          "Pool run started."
        );
        Ok(())
      }
      Err(_) => Err(self.illegal_state()),
    }
  }

  fn illegal_state(&self) -> PoolError {
    warn!(
      pool_name = %*self.pool_name,
      pool_id = self.pool_id,
      phase = ?self.phase(),
      "Run requested on a pool that has already been run."
    );
    PoolError::IllegalState {
      pool_name: self.pool_name.to_string(),
    }
  }

  fn take_tasks(&self) -> Vec<Task<T>> {
    self.inner.lock().tasks.take().unwrap_or_default()
  }

  fn record_bootstrap(&self, bootstrap: Bootstrap) {
    debug!(pool_name = %*self.pool_name, pool_id = self.pool_id, ?bootstrap, "Bootstrap decided.");
    self.inner.lock().bootstrap = Some(bootstrap);
  }

  fn run_on_fresh_scheduler(&self, tasks: Vec<Task<T>>) -> Result<Gathered<T>, PoolError> {
    self.record_bootstrap(Bootstrap::FreshScheduler);
    let scheduler = new_scheduler(&self.pool_name)?;
    let handle = scheduler.handle().clone();
    scheduler.block_on(self.spawn_and_gather(&handle, tasks))
  }

  /// Spawns one wrapper per task plus the gatherer onto `handle` and waits
  /// until every one of those units has exited.
  async fn spawn_and_gather(&self, handle: &TokioHandle, tasks: Vec<Task<T>>) -> Result<Gathered<T>, PoolError> {
    let expected = tasks.len();
    let (results_tx, results_rx) = mpsc::channel(self.channel_capacity);

    let mut units = Vec::with_capacity(expected);
    for (index, task) in tasks.into_iter().enumerate() {
      let unit = run_wrapped(self.pool_name.clone(), index, task, results_tx.clone()).instrument(info_span!(
        "pool_task",
        pool_name = %*self.pool_name,
        pool_id = self.pool_id,
        task_index = index
      ));
      units.push(handle.spawn(unit));
    }
    // Only the wrappers hold senders from here on.
    drop(results_tx);
    debug!(pool_name = %*self.pool_name, pool_id = self.pool_id, spawned = expected, "Spawned task wrappers.");

    let gatherer = handle.spawn(gather(self.pool_name.clone(), results_rx, expected).instrument(info_span!(
      "pool_gatherer",
      pool_name = %*self.pool_name,
      pool_id = self.pool_id
    )));

    let gathered = gatherer.await.map_err(|join_error| {
      error!(pool_name = %*self.pool_name, pool_id = self.pool_id, "Error joining gatherer: {:?}", join_error);
      PoolError::Join(join_error.to_string())
    })?;

    for unit in units {
      unit.await.map_err(|join_error| {
        error!(pool_name = %*self.pool_name, pool_id = self.pool_id, "Error joining task wrapper: {:?}", join_error);
        PoolError::Join(join_error.to_string())
      })?;
    }

    if gathered.missing > 0 {
      return Err(PoolError::ResultChannelClosed {
        missing: gathered.missing,
      });
    }
    Ok(gathered)
  }

  fn conclude(&self, gathered: Result<Gathered<T>, PoolError>) -> Result<Vec<Completed<T>>, PoolError> {
    let outcome = match gathered {
      Ok(mut gathered) if !gathered.failures.is_empty() => {
        // TODO: surface every failure through one aggregate error instead of only the first.
        let first = gathered.failures.remove(0);
        warn!(
          pool_name = %*self.pool_name,
          pool_id = self.pool_id,
          task_index = first.index(),
          suppressed_failures = gathered.failures.len(),
          discarded_successes = gathered.results.len(),
          "Pool run finished with failures. Surfacing the first one."
        );
        self.inner.lock().retained = Some(gathered);
        Err(PoolError::TaskFailed(first))
      }
      Ok(gathered) => {
        info!(
          pool_name = %*self.pool_name,
          pool_id = self.pool_id,
          results = gathered.results.len(),
          "Pool run finished successfully."
        );
        Ok(gathered.results)
      }
      Err(pool_error) => Err(pool_error),
    };

    self.phase.store(Phase::Done as u8, AtomicOrdering::Release);
    outcome
  }
}

impl<T: Send + 'static> fmt::Debug for TaskPool<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock();
    let (retained_results, retained_failures) = inner
      .retained
      .as_ref()
      .map_or((0, 0), |g| (g.results.len(), g.failures.len()));

    f.debug_struct("TaskPool")
      .field("pool_id", &self.pool_id)
      .field("pool_name", &self.pool_name)
      .field("task_count", &self.task_count)
      .field("channel_capacity", &self.channel_capacity)
      .field("phase", &self.phase())
      .field("bootstrap", &inner.bootstrap)
      .field("retained_results", &retained_results)
      .field("retained_failures", &retained_failures)
      .finish()
  }
}
