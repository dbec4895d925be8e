use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use kindling_core::types::TransformArtifact;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::PipelineError;

pub(crate) type TransformResult = Result<Arc<TransformArtifact>, PipelineError>;

pub(crate) struct PendingTransform {
  tx: broadcast::Sender<TransformResult>,
  /// Clock value when the computation started, used to tell if it predates an invalidation
  started_at: u64,
}

pub(crate) enum Registration {
  /// Another caller is already computing a result that is still valid
  Join(broadcast::Receiver<TransformResult>),
  /// This caller must compute the result and broadcast it
  Own(broadcast::Sender<TransformResult>),
}

#[derive(Default)]
struct State {
  transforms: HashMap<String, PendingTransform>,
  /// Module ids each transform in flight is waiting on through nested requests
  waiting_on: HashMap<String, Vec<String>>,
}

impl State {
  /// Whether `from` waits on `to`, directly or through other transforms
  fn waits_on(&self, from: &str, to: &str) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![from];

    while let Some(current) = stack.pop() {
      if current == to {
        return true;
      }

      if !visited.insert(current) {
        continue;
      }

      if let Some(ids) = self.waiting_on.get(current) {
        stack.extend(ids.iter().map(String::as_str));
      }
    }

    false
  }
}

/// In-flight transforms by module id, plus which of them wait on each other
#[derive(Default)]
pub(crate) struct PendingTransforms {
  state: Mutex<State>,
}

impl PendingTransforms {
  /// Join the in-flight computation for `id` if it started after `last_invalidation`, or
  /// register a new one.
  pub fn register(&self, id: &str, last_invalidation: u64, started_at: u64) -> Registration {
    let mut state = self.state.lock();
    let pending = &mut state.transforms;

    if let Some(existing) = pending.get(id) {
      if existing.started_at > last_invalidation {
        return Registration::Join(existing.tx.subscribe());
      }
    }

    let (tx, _) = broadcast::channel(1);
    pending.insert(
      id.to_string(),
      PendingTransform {
        tx: tx.clone(),
        started_at,
      },
    );

    Registration::Own(tx)
  }

  /// Record that the transform of `waiter` is about to wait on the module `id`.
  ///
  /// Returns `None` when `id` already waits on `waiter`, as waiting would never finish. The
  /// returned guard removes the record when dropped.
  pub fn wait_for<'a>(&'a self, waiter: &str, id: &str) -> Option<WaitGuard<'a>> {
    let mut state = self.state.lock();
    if state.waits_on(id, waiter) {
      return None;
    }

    state
      .waiting_on
      .entry(waiter.to_string())
      .or_default()
      .push(id.to_string());

    Some(WaitGuard {
      pending: self,
      waiter: waiter.to_string(),
      id: id.to_string(),
    })
  }

  /// Remove the registration if it is still the one that started at `started_at`
  pub fn complete(&self, id: &str, started_at: u64) {
    let mut state = self.state.lock();
    let pending = &mut state.transforms;
    if pending
      .get(id)
      .is_some_and(|existing| existing.started_at == started_at)
    {
      pending.remove(id);
    }
  }

  fn stop_waiting(&self, waiter: &str, id: &str) {
    let mut state = self.state.lock();
    let Some(ids) = state.waiting_on.get_mut(waiter) else {
      return;
    };

    if let Some(position) = ids.iter().position(|waited| waited == id) {
      ids.swap_remove(position);
    }

    if ids.is_empty() {
      state.waiting_on.remove(waiter);
    }
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.state.lock().transforms.len()
  }
}

pub(crate) struct WaitGuard<'a> {
  pending: &'a PendingTransforms,
  waiter: String,
  id: String,
}

impl Drop for WaitGuard<'_> {
  fn drop(&mut self) {
    self.pending.stop_waiting(&self.waiter, &self.id);
  }
}

/// Clears a registration when the computing future completes or is dropped, so that joiners of
/// an abandoned computation start over rather than wait forever.
pub(crate) struct PendingGuard<'a> {
  pub pending: &'a PendingTransforms,
  pub id: &'a str,
  pub started_at: u64,
}

impl Drop for PendingGuard<'_> {
  fn drop(&mut self) {
    self.pending.complete(self.id, self.started_at);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn joins_computations_started_after_the_last_invalidation() {
    let pending = PendingTransforms::default();

    assert!(matches!(pending.register("/a.js", 0, 5), Registration::Own(_)));
    assert!(matches!(pending.register("/a.js", 4, 6), Registration::Join(_)));
    assert_eq!(pending.len(), 1);
  }

  #[test]
  fn stale_computations_are_replaced() {
    let pending = PendingTransforms::default();

    assert!(matches!(pending.register("/a.js", 0, 5), Registration::Own(_)));
    assert!(matches!(pending.register("/a.js", 7, 8), Registration::Own(_)));

    // The stale computation finishing must not clear the fresh registration
    pending.complete("/a.js", 5);
    assert_eq!(pending.len(), 1);

    pending.complete("/a.js", 8);
    assert_eq!(pending.len(), 0);
  }

  #[test]
  fn guard_clears_the_registration_on_drop() {
    let pending = PendingTransforms::default();
    let _ = pending.register("/a.js", 0, 1);

    {
      let _guard = PendingGuard {
        pending: &pending,
        id: "/a.js",
        started_at: 1,
      };
    }

    assert_eq!(pending.len(), 0);
  }

  #[test]
  fn refuses_to_wait_in_a_circle() {
    let pending = PendingTransforms::default();

    let a_on_b = pending.wait_for("/a.js", "/b.js");
    let _b_on_c = pending.wait_for("/b.js", "/c.js");

    assert!(a_on_b.is_some());
    assert!(pending.wait_for("/c.js", "/a.js").is_none());
    assert!(pending.wait_for("/b.js", "/a.js").is_none());

    drop(a_on_b);
    assert!(pending.wait_for("/b.js", "/a.js").is_some());
  }
}
