use crate::error::TaskFailure;
use crate::task::{Outcome, Task};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{error, trace, warn};

/// Runs one task and posts exactly one outcome to `results_tx`, whether the
/// task returns a value, returns an error, or panics.
pub(crate) async fn run_wrapped<T: Send + 'static>(
  pool_name: Arc<String>,
  index: usize,
  task: Task<T>,
  results_tx: mpsc::Sender<Outcome<T>>,
) {
  // Invoking the closure happens inside the guarded future so a panic while
  // building the task future is caught as well.
  let guarded = AssertUnwindSafe(async move { task().await }).catch_unwind();

  let outcome = match guarded.await {
    Ok(Ok(value)) => {
      trace!(pool_name = %*pool_name, task_index = index, "Task executed successfully.");
      Outcome::Success(value.into())
    }
    Ok(Err(source)) => {
      warn!(pool_name = %*pool_name, task_index = index, "Task returned an error: {}", source);
      Outcome::Failure(TaskFailure::Errored { index, source })
    }
    Err(panic_payload) => {
      let message = panic_message(panic_payload.as_ref());
      error!(pool_name = %*pool_name, task_index = index, "Task panicked during execution: {}", message);
      Outcome::Failure(TaskFailure::Panicked { index, message })
    }
  };

  if results_tx.send(outcome).await.is_err() {
    warn!(
      pool_name = %*pool_name,
      task_index = index,
      "Result gatherer is gone. Task outcome was lost."
    );
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
