use std::any::Any;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::parent::ParentBridge;
use crate::ParentCall;
use crate::PoolError;

pub type WorkerId = usize;

/// The function every worker of a pool runs
pub type TaskFn<A, R> = Arc<dyn Fn(A, &WorkerContext) -> anyhow::Result<R> + Send + Sync>;

pub(crate) struct Job<A, R> {
  pub args: A,
  pub reply: oneshot::Sender<Result<R, PoolError>>,
}

impl<A, R> Job<A, R> {
  pub fn reject(self, error: PoolError) {
    let _ = self.reply.send(Err(error));
  }
}

pub(crate) enum WorkerMessage<A, R> {
  Run(Job<A, R>),
  Stop,
}

pub(crate) struct WorkerHandle<A, R> {
  pub id: WorkerId,
  pub tx: Sender<WorkerMessage<A, R>>,
}

impl<A, R> Clone for WorkerHandle<A, R> {
  fn clone(&self) -> Self {
    Self {
      id: self.id,
      tx: self.tx.clone(),
    }
  }
}

/// What a task can reach from inside its worker thread
pub struct WorkerContext {
  worker_id: WorkerId,
  parent: Arc<ParentBridge>,
}

impl WorkerContext {
  pub(crate) fn new(worker_id: WorkerId, parent: Arc<ParentBridge>) -> Self {
    Self { worker_id, parent }
  }

  pub fn worker_id(&self) -> WorkerId {
    self.worker_id
  }

  /// Ask the coordinator to run a parent function. Call [`ParentCall::wait`] for the result.
  pub fn call_parent(&self, name: &str, args: Value) -> ParentCall {
    tracing::trace!(worker_id = self.worker_id, name, "Calling parent function");
    self.parent.call(name, args)
  }
}

/// Run the task, turning a panic into [`PoolError::WorkerCrashed`]
pub(crate) fn run_task<A, R>(task: &TaskFn<A, R>, args: A, ctx: &WorkerContext) -> Result<R, PoolError> {
  match panic::catch_unwind(AssertUnwindSafe(|| task(args, ctx))) {
    Ok(result) => result.map_err(PoolError::from),
    Err(payload) => {
      let message = panic_message(payload.as_ref());
      tracing::error!(worker_id = ctx.worker_id, "Worker crashed: {message}");

      Err(PoolError::WorkerCrashed { message })
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    String::from("unknown panic")
  }
}

pub(crate) type WorkerReceiver<A, R> = Receiver<WorkerMessage<A, R>>;
