use futures_fanout::{task, Completed, Task, TaskPool};
use std::time::Duration;
use tracing::info;

async fn my_task_fn(id: usize, delay_ms: u64) -> String {
  info!("Task {} starting, will sleep for {}ms", id, delay_ms);
  tokio::time::sleep(Duration::from_millis(delay_ms)).await;
  let result = format!("Task {} finished successfully after {}ms", id, delay_ms);
  info!("{}", result);
  result
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Basic Fan-Out Example ---");

  let mut tasks: Vec<Task<String>> = Vec::new();
  for i in 0..5 {
    // Alternate sleep times so completion order differs from submission order.
    let sleep_duration: u64 = 500 - (i as u64 % 3 * 200);
    tasks.push(task(move || async move { Ok(Some(my_task_fn(i, sleep_duration).await)) }));
  }
  // A task with nothing to return still counts as a success.
  tasks.push(task(|| async {
    info!("Silent task done.");
    Ok(None)
  }));

  // No runtime here: the pool builds its own scheduler and blocks until done.
  let pool = TaskPool::new("basic_pool", tasks);
  match pool.run() {
    Ok(results) => {
      for result in results {
        match result {
          Completed::Value(text) => info!("Result: {}", text),
          Completed::NoValue => info!("Result: <no value>"),
        }
      }
    }
    Err(e) => tracing::error!("Pool failed: {}", e),
  }

  info!("Bootstrap used: {:?}", pool.bootstrap());
  info!("--- Basic Fan-Out Example End ---");
}
