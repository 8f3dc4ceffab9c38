use futures_fanout::{PoolError, TaskError, TaskPool};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- First Failure Example ---");

  let pool = TaskPool::from_fns(
    "failing_pool",
    (0..4u64).map(|i| {
      move || async move {
        tokio::time::sleep(Duration::from_millis(50 * (4 - i))).await;
        if i % 2 == 1 {
          return Err(TaskError::from(format!("task {} gave up", i)));
        }
        Ok(Some(i))
      }
    }),
  );

  // Already inside a runtime: the tasks are spawned onto it.
  match pool.run_async().await {
    Ok(results) => info!("Unexpected success: {:?}", results),
    Err(PoolError::TaskFailed(failure)) => {
      info!("Pool surfaced the first failure to arrive: {}", failure);
    }
    Err(e) => info!("Pool error: {}", e),
  }

  match pool.run_async().await {
    Err(PoolError::IllegalState { pool_name }) => info!("Pool '{}' refused a second run.", pool_name),
    other => info!("Unexpected second run outcome: {:?}", other),
  }

  info!("--- First Failure Example End ---");
}
