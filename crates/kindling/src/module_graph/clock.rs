use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Graph-wide source of invalidation timestamps.
///
/// Values are wall-clock milliseconds when possible, but every value is strictly greater than the
/// previous one even if the system clock stalls or goes backwards.
#[derive(Clone, Debug, Default)]
pub struct Clock {
  last: Arc<AtomicU64>,
}

impl Clock {
  pub fn next_timestamp(&self) -> u64 {
    let now = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|elapsed| elapsed.as_millis() as u64)
      .unwrap_or_default();

    let mut last = self.last.load(Ordering::SeqCst);
    loop {
      let next = now.max(last + 1);
      match self
        .last
        .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
      {
        Ok(_) => return next,
        Err(actual) => last = actual,
      }
    }
  }

  /// The most recently issued timestamp
  pub fn last(&self) -> u64 {
    self.last.load(Ordering::SeqCst)
  }
}
