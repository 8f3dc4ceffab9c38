use crate::error::TaskFailure;
use crate::task::{Completed, Outcome};

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// Everything the gatherer collected during one run, in arrival order.
#[derive(Debug)]
pub(crate) struct Gathered<T> {
  pub(crate) results: Vec<Completed<T>>,
  pub(crate) failures: Vec<TaskFailure>,
  /// Outcomes that never arrived because the channel closed first.
  pub(crate) missing: usize,
}

/// Drains `results_rx` until `expected` outcomes have arrived.
///
/// Never receives more than `expected` times. The receiver is dropped on
/// return, so a wrapper that somehow reports late observes a closed channel
/// instead of blocking forever.
pub(crate) async fn gather<T: Send + 'static>(
  pool_name: Arc<String>,
  mut results_rx: mpsc::Receiver<Outcome<T>>,
  expected: usize,
) -> Gathered<T> {
  let mut gathered = Gathered {
    results: Vec::with_capacity(expected),
    failures: Vec::new(),
    missing: 0,
  };
  let mut remaining = expected;

  while remaining > 0 {
    match results_rx.recv().await {
      Some(Outcome::Success(value)) => {
        trace!(pool_name = %*pool_name, remaining, "Gathered a success.");
        gathered.results.push(value);
      }
      Some(Outcome::Failure(failure)) => {
        trace!(pool_name = %*pool_name, remaining, task_index = failure.index(), "Gathered a failure.");
        gathered.failures.push(failure);
      }
      None => {
        error!(
          pool_name = %*pool_name,
          remaining,
          "Result channel closed before every task reported."
        );
        gathered.missing = remaining;
        break;
      }
    }
    remaining -= 1;
  }

  debug!(
    pool_name = %*pool_name,
    successes = gathered.results.len(),
    failures = gathered.failures.len(),
    "Gatherer finished."
  );
  gathered
}
