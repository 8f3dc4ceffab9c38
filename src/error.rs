use thiserror::Error;

/// The error type a task body may fail with.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A task failure, captured by the task wrapper and carried through the
/// result channel as ordinary data.
#[derive(Error, Debug)]
pub enum TaskFailure {
  #[error("Task {index} returned an error: {source}")]
  Errored {
    index: usize,
    #[source]
    source: TaskError,
  },

  #[error("Task {index} panicked: {message}")]
  Panicked { index: usize, message: String },
}

impl TaskFailure {
  /// Submission index of the task that failed.
  pub fn index(&self) -> usize {
    match self {
      TaskFailure::Errored { index, .. } | TaskFailure::Panicked { index, .. } => *index,
    }
  }

  /// The error the task returned, if it returned one rather than panicking.
  pub fn task_error(&self) -> Option<&TaskError> {
    match self {
      TaskFailure::Errored { source, .. } => Some(source),
      TaskFailure::Panicked { .. } => None,
    }
  }
}

/// Errors that can occur within the `futures_fanout` pool.
#[derive(Error, Debug)]
pub enum PoolError {
  #[error("Pool '{pool_name}' cannot be run twice")]
  IllegalState { pool_name: String },

  #[error(transparent)]
  TaskFailed(#[from] TaskFailure),

  #[error("Cannot block inside a current-thread runtime; use `run_async` instead")]
  BlockingInsideScheduler,

  #[error("Failed to start a scheduler for the pool: {0}")]
  SchedulerStart(#[source] std::io::Error),

  #[error("Result channel closed with {missing} task outcome(s) still outstanding")]
  ResultChannelClosed { missing: usize },

  #[error("A pool unit could not be joined (it panicked or its runtime shut down): {0}")]
  Join(String),
}
