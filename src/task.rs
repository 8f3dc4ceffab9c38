use crate::error::{TaskError, TaskFailure};

use std::future::Future;
use std::pin::Pin;

/// The future a task produces once invoked.
/// `Ok(None)` means the task finished without an explicit value.
pub type TaskToExecute<T> = Pin<Box<dyn Future<Output = Result<Option<T>, TaskError>> + Send + 'static>>;

/// A zero-argument unit of work, invoked exactly once by the pool.
pub type Task<T> = Box<dyn FnOnce() -> TaskToExecute<T> + Send + 'static>;

/// Boxes a closure returning a future into a [`Task`].
pub fn task<T, F, Fut>(f: F) -> Task<T>
where
  F: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<Option<T>, TaskError>> + Send + 'static,
{
  Box::new(move || Box::pin(f()) as TaskToExecute<T>)
}

/// A successful task result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completed<T> {
  /// The task returned a value.
  Value(T),
  /// The task finished without returning anything.
  NoValue,
}

impl<T> Completed<T> {
  /// Borrows the returned value, if there is one.
  pub fn value(&self) -> Option<&T> {
    match self {
      Completed::Value(v) => Some(v),
      Completed::NoValue => None,
    }
  }

  /// Consumes the result, yielding the returned value if there is one.
  pub fn into_value(self) -> Option<T> {
    match self {
      Completed::Value(v) => Some(v),
      Completed::NoValue => None,
    }
  }

  /// True for a task that finished without returning anything.
  pub fn is_no_value(&self) -> bool {
    matches!(self, Completed::NoValue)
  }
}

impl<T> From<Option<T>> for Completed<T> {
  fn from(value: Option<T>) -> Self {
    value.map_or(Completed::NoValue, Completed::Value)
  }
}

/// What a task wrapper posts to the result channel.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
  Success(Completed<T>),
  Failure(TaskFailure),
}
