//! A Tokio-based fan-out/fan-in pool: runs a fixed set of futures
//! concurrently, exactly once, and gathers every outcome before returning.

mod error;
mod gatherer;
mod pool;
mod scheduler;
mod task;
mod wrapper;

pub use error::{PoolError, TaskError, TaskFailure};
pub use pool::{Phase, TaskPool, DEFAULT_CHANNEL_CAPACITY};
pub use scheduler::{schedulers_started, Bootstrap};
pub use task::{task, Completed, Task, TaskToExecute};
