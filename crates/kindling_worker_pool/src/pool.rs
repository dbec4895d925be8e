use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::parent::ParentBridge;
use crate::worker::run_task;
use crate::worker::Job;
use crate::worker::TaskFn;
use crate::worker::WorkerHandle;
use crate::worker::WorkerId;
use crate::worker::WorkerMessage;
use crate::worker::WorkerReceiver;
use crate::ParentFunctions;
use crate::PoolError;
use crate::WorkerContext;

/// Leave one core for the coordinating runtime
pub fn default_max_workers() -> usize {
  num_cpus::get().saturating_sub(1).max(1)
}

#[derive(Clone, Default)]
pub struct WorkerPoolOptions {
  /// Defaults to [`default_max_workers`]
  pub max_workers: Option<usize>,
  pub parent_functions: ParentFunctions,
}

enum Dispatch<A, R> {
  Idle(WorkerHandle<A, R>, Job<A, R>),
  Spawn(Job<A, R>),
  Queued,
}

struct PoolState<A, R> {
  idle: Vec<WorkerHandle<A, R>>,
  busy: usize,
  queue: VecDeque<Job<A, R>>,
  next_worker_id: WorkerId,
  stopped: bool,
}

struct Inner<A, R> {
  max_workers: usize,
  parent: Arc<ParentBridge>,
  state: Mutex<PoolState<A, R>>,
  task: TaskFn<A, R>,
}

/// Runs one task function on a bounded set of OS threads.
///
/// Idle workers are reused before new ones are spawned, and once `max_workers` are busy further
/// runs wait in a FIFO queue. A worker finishing a job takes the next queued one directly.
pub struct WorkerPool<A, R> {
  inner: Arc<Inner<A, R>>,
}

impl<A, R> WorkerPool<A, R>
where
  A: Send + 'static,
  R: Send + 'static,
{
  /// Must be called from within a tokio runtime, which answers parent calls
  pub fn new<F>(options: WorkerPoolOptions, task: F) -> Result<Self, PoolError>
  where
    F: Fn(A, &WorkerContext) -> anyhow::Result<R> + Send + Sync + 'static,
  {
    let max_workers = options.max_workers.unwrap_or_else(default_max_workers).max(1);
    let parent = Arc::new(ParentBridge::start(options.parent_functions)?);

    tracing::debug!(max_workers, "Created worker pool");

    Ok(Self {
      inner: Arc::new(Inner {
        max_workers,
        parent,
        state: Mutex::new(PoolState {
          idle: Vec::new(),
          busy: 0,
          queue: VecDeque::new(),
          next_worker_id: 0,
          stopped: false,
        }),
        task: Arc::new(task),
      }),
    })
  }

  pub fn max_workers(&self) -> usize {
    self.inner.max_workers
  }

  /// Number of runs waiting for a worker
  pub fn queued(&self) -> usize {
    self.inner.state.lock().queue.len()
  }

  pub async fn run(&self, args: A) -> Result<R, PoolError> {
    let (reply, rx) = oneshot::channel();
    let job = Job { args, reply };

    let dispatch = {
      let mut state = self.inner.state.lock();
      if state.stopped {
        return Err(PoolError::Stopped);
      }

      if let Some(worker) = state.idle.pop() {
        state.busy += 1;
        Dispatch::Idle(worker, job)
      } else if state.busy < self.inner.max_workers {
        state.busy += 1;
        Dispatch::Spawn(job)
      } else {
        state.queue.push_back(job);
        Dispatch::Queued
      }
    };

    match dispatch {
      Dispatch::Idle(worker, job) => {
        if let Err(error) = worker.tx.send(WorkerMessage::Run(job)) {
          tracing::debug!(worker_id = worker.id, "Idle worker is gone, spawning another");
          if let WorkerMessage::Run(job) = error.into_inner() {
            self.inner.spawn_worker(job);
          }
        }
      }
      Dispatch::Spawn(job) => self.inner.spawn_worker(job),
      Dispatch::Queued => {}
    }

    rx.await.unwrap_or(Err(PoolError::Stopped))
  }

  /// Stop accepting work without waiting for workers.
  ///
  /// Queued runs are rejected, runs in flight still complete.
  pub fn stop(&self) {
    self.inner.stop();
  }
}

impl<A, R> Drop for WorkerPool<A, R> {
  fn drop(&mut self) {
    self.inner.stop();
  }
}

impl<A, R> Inner<A, R> {
  fn stop(&self) {
    let (idle, queued) = {
      let mut state = self.state.lock();
      if state.stopped {
        return;
      }

      state.stopped = true;
      (
        std::mem::take(&mut state.idle),
        std::mem::take(&mut state.queue),
      )
    };

    tracing::debug!(queued = queued.len(), "Stopping worker pool");

    for job in queued {
      job.reject(PoolError::Stopped);
    }

    for worker in idle {
      let _ = worker.tx.send(WorkerMessage::Stop);
    }
  }
}

impl<A, R> Inner<A, R>
where
  A: Send + 'static,
  R: Send + 'static,
{
  /// Start a worker for `job`, which must already be counted as busy
  fn spawn_worker(self: &Arc<Self>, job: Job<A, R>) {
    let worker_id = {
      let mut state = self.state.lock();
      let worker_id = state.next_worker_id;
      state.next_worker_id += 1;
      worker_id
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = WorkerHandle { id: worker_id, tx };
    let ctx = WorkerContext::new(worker_id, self.parent.clone());

    let inner = self.clone();
    let spawned = std::thread::Builder::new()
      .name(format!("kindling-worker-{worker_id}"))
      .spawn({
        let handle = handle.clone();
        move || inner.work(handle, rx, ctx)
      });

    if let Err(error) = spawned {
      tracing::error!(worker_id, %error, "Failed to spawn worker thread");
      self.state.lock().busy -= 1;
      job.reject(PoolError::Spawn {
        message: error.to_string(),
      });
      return;
    }

    tracing::debug!(worker_id, "Spawned worker");

    if let Err(error) = handle.tx.send(WorkerMessage::Run(job)) {
      if let WorkerMessage::Run(job) = error.into_inner() {
        job.reject(PoolError::WorkerCrashed {
          message: String::from("Worker exited before receiving its first job"),
        });
      }
    }
  }

  fn work(self: Arc<Self>, handle: WorkerHandle<A, R>, rx: WorkerReceiver<A, R>, ctx: WorkerContext) {
    let mut next = receive(&rx);

    while let Some(Job { args, reply }) = next.take() {
      let outcome = run_task(&self.task, args, &ctx);

      // Settle where this worker goes before replying, so a caller that runs again right away
      // finds it idle
      let after = {
        let mut state = self.state.lock();

        match &outcome {
          Err(PoolError::WorkerCrashed { .. }) => match state.queue.pop_front() {
            Some(job) if !state.stopped => After::Replace(job),
            _ => {
              state.busy -= 1;
              After::Exit
            }
          },
          _ if state.stopped => {
            state.busy -= 1;
            After::Exit
          }
          _ => match state.queue.pop_front() {
            Some(job) => After::Next(job),
            None => {
              state.busy -= 1;
              state.idle.push(handle.clone());
              After::Wait
            }
          },
        }
      };

      let _ = reply.send(outcome);

      match after {
        After::Exit => break,
        After::Replace(job) => {
          self.spawn_worker(job);
          break;
        }
        After::Next(job) => next = Some(job),
        After::Wait => next = receive(&rx),
      }
    }

    tracing::debug!(worker_id = handle.id, "Worker stopped");
  }
}

enum After<A, R> {
  Exit,
  /// Crashed with work waiting, hand it to a replacement
  Replace(Job<A, R>),
  Next(Job<A, R>),
  Wait,
}

fn receive<A, R>(rx: &WorkerReceiver<A, R>) -> Option<Job<A, R>> {
  match rx.recv() {
    Ok(WorkerMessage::Run(job)) => Some(job),
    Ok(WorkerMessage::Stop) | Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;
  use std::sync::atomic::AtomicBool;
  use std::sync::atomic::AtomicUsize;
  use std::sync::atomic::Ordering;
  use std::time::Duration;

  use pretty_assertions::assert_eq;
  use serde_json::json;
  use serde_json::Value;

  use super::*;

  fn options(max_workers: usize) -> WorkerPoolOptions {
    WorkerPoolOptions {
      max_workers: Some(max_workers),
      ..WorkerPoolOptions::default()
    }
  }

  async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
      if condition() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }

    panic!("Timed out waiting for the pool");
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn reuses_idle_workers() {
    let pool = WorkerPool::new(options(4), |n: usize, ctx: &WorkerContext| {
      Ok((n * 2, ctx.worker_id()))
    })
    .unwrap();

    let mut workers = HashSet::new();
    for n in 0..5 {
      let (doubled, worker_id) = pool.run(n).await.unwrap();
      assert_eq!(doubled, n * 2);
      workers.insert(worker_id);
    }

    assert_eq!(workers, HashSet::from([0]));
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn never_runs_more_than_max_workers_at_once() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let pool = Arc::new(
      WorkerPool::new(options(2), {
        let running = running.clone();
        let peak = peak.clone();
        move |_: (), ctx: &WorkerContext| {
          let now = running.fetch_add(1, Ordering::SeqCst) + 1;
          peak.fetch_max(now, Ordering::SeqCst);
          std::thread::sleep(Duration::from_millis(20));
          running.fetch_sub(1, Ordering::SeqCst);
          Ok(ctx.worker_id())
        }
      })
      .unwrap(),
    );

    let runs = (0..6)
      .map(|_| {
        let pool = pool.clone();
        tokio::spawn(async move { pool.run(()).await })
      })
      .collect::<Vec<_>>();

    let mut workers = HashSet::new();
    for run in runs {
      workers.insert(run.await.unwrap().unwrap());
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(workers.len() <= 2);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn queued_runs_are_served_in_order() {
    let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let started = Arc::new(AtomicBool::new(false));

    let pool = Arc::new(
      WorkerPool::new(options(1), {
        let order = order.clone();
        let started = started.clone();
        move |n: usize, _: &WorkerContext| {
          if n == 0 {
            started.store(true, Ordering::SeqCst);
            let _ = release_rx.recv();
          }
          order.lock().push(n);
          Ok(n)
        }
      })
      .unwrap(),
    );

    let mut runs = Vec::new();
    for n in 0..4 {
      let pool_for_run = pool.clone();
      runs.push(tokio::spawn(async move { pool_for_run.run(n).await }));

      if n == 0 {
        let started = started.clone();
        wait_for(move || started.load(Ordering::SeqCst)).await;
      } else {
        let pool = pool.clone();
        wait_for(move || pool.queued() == n).await;
      }
    }

    release_tx.send(()).unwrap();
    for run in runs {
      run.await.unwrap().unwrap();
    }

    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn a_crashing_task_only_fails_its_own_run() {
    let pool = WorkerPool::new(options(1), |input: &'static str, ctx: &WorkerContext| {
      if input == "boom" {
        panic!("task exploded");
      }
      Ok(ctx.worker_id())
    })
    .unwrap();

    assert_eq!(pool.run("ok").await.unwrap(), 0);

    let error = pool.run("boom").await.unwrap_err();
    assert_eq!(error.to_string(), "Worker crashed: task exploded");

    assert_eq!(pool.run("ok").await.unwrap(), 1);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn task_errors_are_returned() {
    let pool = WorkerPool::new(options(1), |_: (), _: &WorkerContext| -> anyhow::Result<()> {
      Err(anyhow::anyhow!("bad input"))
    })
    .unwrap();

    assert_eq!(pool.run(()).await.unwrap_err().to_string(), "bad input");
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn stop_rejects_queued_runs_but_finishes_running_ones() {
    let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
    let started = Arc::new(AtomicBool::new(false));
    let pool = Arc::new(
      WorkerPool::new(options(1), {
        let started = started.clone();
        move |n: usize, _: &WorkerContext| {
          if n == 0 {
            started.store(true, Ordering::SeqCst);
            let _ = release_rx.recv();
          }
          Ok(n)
        }
      })
      .unwrap(),
    );

    let running = tokio::spawn({
      let pool = pool.clone();
      async move { pool.run(0).await }
    });

    wait_for({
      let started = started.clone();
      move || started.load(Ordering::SeqCst)
    })
    .await;
    let queued = tokio::spawn({
      let pool = pool.clone();
      async move { pool.run(1).await }
    });

    wait_for({
      let pool = pool.clone();
      move || pool.queued() == 1
    })
    .await;

    pool.stop();

    assert!(matches!(
      queued.await.unwrap(),
      Err(PoolError::Stopped)
    ));
    assert!(matches!(pool.run(2).await, Err(PoolError::Stopped)));

    release_tx.send(()).unwrap();
    assert_eq!(running.await.unwrap().unwrap(), 0);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn workers_call_parent_functions() {
    let pool = WorkerPool::new(
      WorkerPoolOptions {
        max_workers: Some(1),
        parent_functions: ParentFunctions::default()
          .with("double", |args: Value| async move {
            let n = args.as_u64().unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(json!(n * 2))
          })
          .with("fail", |_| async { Err(anyhow::anyhow!("parent said no")) }),
      },
      |n: u64, ctx: &WorkerContext| {
        // Both calls are outstanding before either is awaited
        let slow = ctx.call_parent("double", json!(n));
        let fast = ctx.call_parent("double", json!(n + 1));
        assert_ne!(slow.call_id(), fast.call_id());

        let results = (fast.wait()?, slow.wait()?);
        let unknown = ctx.call_parent("missing", Value::Null).wait();
        let failed = ctx.call_parent("fail", Value::Null).wait();

        Ok((results, unknown.err(), failed.err()))
      },
    )
    .unwrap();

    let ((fast, slow), unknown, failed) = pool.run(5).await.unwrap();

    assert_eq!(fast, json!(12));
    assert_eq!(slow, json!(10));
    assert!(matches!(
      unknown,
      Some(PoolError::UnknownParentFunction { name }) if name == "missing"
    ));
    assert_eq!(
      failed.map(|error| error.to_string()),
      Some(String::from("Parent function \"fail\" failed: parent said no"))
    );
  }

  #[test]
  fn requires_a_runtime() {
    let pool = WorkerPool::new(options(1), |_: (), _: &WorkerContext| Ok(()));

    assert!(matches!(pool, Err(PoolError::NoRuntime)));
  }

  #[test]
  fn default_max_workers_leaves_a_core_free() {
    assert_eq!(
      default_max_workers(),
      num_cpus::get().saturating_sub(1).max(1)
    );
  }
}
