use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::PoolError;

pub type ParentFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// An async function workers can call on the coordinating runtime
pub type ParentFunction = Arc<dyn Fn(Value) -> ParentFuture + Send + Sync>;

/// Named functions exposed to workers through [`crate::WorkerContext::call_parent`]
#[derive(Clone, Default)]
pub struct ParentFunctions {
  functions: HashMap<String, ParentFunction>,
}

impl ParentFunctions {
  pub fn with<F, Fut>(mut self, name: impl Into<String>, function: F) -> Self
  where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
  {
    self.functions.insert(
      name.into(),
      Arc::new(move |args| Box::pin(function(args)) as ParentFuture),
    );
    self
  }

  fn get(&self, name: &str) -> Option<ParentFunction> {
    self.functions.get(name).cloned()
  }
}

type CallReply = crossbeam_channel::Sender<Result<Value, PoolError>>;

type PendingCalls = Arc<Mutex<HashMap<u64, CallReply>>>;

struct ParentRequest {
  call_id: u64,
  name: String,
  args: Value,
}

/// Routes calls from worker threads to parent functions running on tokio.
///
/// Every call gets its own id and reply channel, so any number of calls may be outstanding and
/// each resolves as soon as its function does.
pub(crate) struct ParentBridge {
  requests: mpsc::UnboundedSender<ParentRequest>,
  calls: PendingCalls,
  next_call_id: AtomicU64,
}

impl ParentBridge {
  pub fn start(functions: ParentFunctions) -> Result<Self, PoolError> {
    let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
    let (requests, mut rx) = mpsc::unbounded_channel::<ParentRequest>();
    let calls = PendingCalls::default();

    runtime.spawn({
      let calls = calls.clone();
      async move {
        while let Some(ParentRequest {
          call_id,
          name,
          args,
        }) = rx.recv().await
        {
          let Some(function) = functions.get(&name) else {
            tracing::warn!(call_id, %name, "Worker called an unknown parent function");
            resolve(&calls, call_id, Err(PoolError::UnknownParentFunction { name }));
            continue;
          };

          let calls = calls.clone();
          tokio::spawn(async move {
            let result = function(args)
              .await
              .map_err(|error| PoolError::ParentFunction {
                name,
                message: format!("{error:#}"),
              });

            resolve(&calls, call_id, result);
          });
        }

        tracing::debug!("Parent bridge closed");
      }
    });

    Ok(Self {
      requests,
      calls,
      next_call_id: AtomicU64::new(0),
    })
  }

  pub fn call(&self, name: &str, args: Value) -> ParentCall {
    let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
    let (reply, rx) = crossbeam_channel::bounded(1);
    self.calls.lock().insert(call_id, reply);

    let request = ParentRequest {
      call_id,
      name: name.to_string(),
      args,
    };

    if self.requests.send(request).is_err() {
      resolve(&self.calls, call_id, Err(PoolError::Stopped));
    }

    ParentCall { call_id, rx }
  }
}

fn resolve(calls: &PendingCalls, call_id: u64, result: Result<Value, PoolError>) {
  if let Some(reply) = calls.lock().remove(&call_id) {
    let _ = reply.send(result);
  }
}

/// A call to a parent function that may still be running
#[derive(Debug)]
pub struct ParentCall {
  call_id: u64,
  rx: crossbeam_channel::Receiver<Result<Value, PoolError>>,
}

impl ParentCall {
  pub fn call_id(&self) -> u64 {
    self.call_id
  }

  /// Block the worker thread until the parent function completes
  pub fn wait(self) -> Result<Value, PoolError> {
    self.rx.recv().unwrap_or(Err(PoolError::Stopped))
  }
}
