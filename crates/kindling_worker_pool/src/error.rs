use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
  #[error("The worker pool was stopped")]
  Stopped,

  #[error("Worker crashed: {message}")]
  WorkerCrashed { message: String },

  #[error("Failed to spawn a worker thread: {message}")]
  Spawn { message: String },

  #[error("Worker pools need a tokio runtime to answer parent calls")]
  NoRuntime,

  #[error("Unknown parent function {name:?}")]
  UnknownParentFunction { name: String },

  #[error("Parent function {name:?} failed: {message}")]
  ParentFunction { name: String, message: String },

  #[error(transparent)]
  Task(#[from] anyhow::Error),
}
