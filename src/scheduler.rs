//! The pool's view of the Tokio runtime: detecting an active scheduling
//! context and building a fresh scheduler when there is none.

use crate::error::PoolError;

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::runtime::{Builder, Handle as TokioHandle, Runtime, RuntimeFlavor};
use tracing::debug;

lazy_static::lazy_static! {
  static ref SCHEDULERS_STARTED: AtomicU64 = AtomicU64::new(0);
}

/// Which bootstrap path a pool run took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
  /// Units were spawned onto the runtime the caller was already running in.
  ExistingContext,
  /// A fresh current-thread scheduler was built and driven to completion.
  FreshScheduler,
}

pub(crate) enum SchedulingContext {
  Active(TokioHandle),
  Absent,
}

impl SchedulingContext {
  pub(crate) fn detect() -> Self {
    match TokioHandle::try_current() {
      Ok(handle) => SchedulingContext::Active(handle),
      Err(_) => SchedulingContext::Absent,
    }
  }
}

/// Whether the caller's thread may be parked on `handle` without starving it.
///
/// A multi-thread runtime can always hand its worker off. A current-thread
/// runtime can only be blocked on from a thread that is not driving it, such
/// as a `spawn_blocking` thread.
pub(crate) fn can_block_within(handle: &TokioHandle) -> bool {
  match handle.runtime_flavor() {
    RuntimeFlavor::MultiThread => true,
    _ => {
      if tokio::task::try_id().is_some() {
        return false;
      }
      // Outside a task the thread may still be inside `block_on`. Tokio has no
      // query for that; `block_in_place` refuses it before running anything.
      std::panic::catch_unwind(|| tokio::task::block_in_place(|| ())).is_ok()
    }
  }
}

pub(crate) fn new_scheduler(pool_name: &str) -> Result<Runtime, PoolError> {
  let runtime = Builder::new_current_thread()
    .enable_all()
    .build()
    .map_err(PoolError::SchedulerStart)?;
  let started = SCHEDULERS_STARTED.fetch_add(1, AtomicOrdering::Relaxed) + 1;
  debug!(pool_name = %pool_name, schedulers_started = started, "Built fresh current-thread scheduler.");
  Ok(runtime)
}

/// Number of fresh schedulers pools in this process have built so far.
pub fn schedulers_started() -> u64 {
  SCHEDULERS_STARTED.load(AtomicOrdering::Relaxed)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_no_context_outside_runtime() {
    assert!(matches!(SchedulingContext::detect(), SchedulingContext::Absent));
  }

  #[tokio::test]
  async fn test_context_detected_inside_runtime() {
    match SchedulingContext::detect() {
      SchedulingContext::Active(handle) => assert!(!can_block_within(&handle)),
      SchedulingContext::Absent => panic!("Expected an active scheduling context inside #[tokio::test]"),
    }
  }

  #[tokio::test]
  async fn test_task_on_current_thread_runtime_cannot_block() {
    let from_task = tokio::spawn(async { can_block_within(&TokioHandle::current()) })
      .await
      .unwrap();
    assert!(!from_task);
  }

  #[tokio::test]
  async fn test_blocking_thread_of_current_thread_runtime_can_block() {
    let from_blocking_thread = tokio::task::spawn_blocking(|| can_block_within(&TokioHandle::current()))
      .await
      .unwrap();
    assert!(from_blocking_thread);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_multi_thread_context_can_block() {
    let handle = TokioHandle::current();
    assert!(can_block_within(&handle));
  }

  #[test]
  fn test_new_scheduler_bumps_counter() {
    let before = schedulers_started();
    let runtime = new_scheduler("counter_test").unwrap();
    assert_eq!(runtime.block_on(async { 1 + 1 }), 2);
    assert!(schedulers_started() > before);
  }
}
