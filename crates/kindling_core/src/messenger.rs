use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// One end of a connection between the dev server and a client
#[cfg_attr(test, mockall::automock)]
pub trait HmrTransport: Send + Sync {
  /// Whether the underlying connection can accept messages right now
  fn is_ready(&self) -> bool;

  fn send(&self, message: String) -> anyhow::Result<()>;
}

pub type HmrTransportRef = Arc<dyn HmrTransport>;

/// Buffers outbound messages until the transport is ready, then delivers them in order.
pub struct HmrMessenger {
  transport: HmrTransportRef,
  queue: Mutex<VecDeque<String>>,
}

impl HmrMessenger {
  pub fn new(transport: HmrTransportRef) -> Self {
    Self {
      transport,
      queue: Mutex::new(VecDeque::new()),
    }
  }

  pub fn send(&self, message: String) {
    self.queue.lock().push_back(message);
    self.flush();
  }

  /// Deliver every queued message if the transport is ready.
  ///
  /// Delivery stops at the first failure and the failed message stays at the head of the queue.
  pub fn flush(&self) {
    let mut queue = self.queue.lock();

    if !self.transport.is_ready() {
      return;
    }

    while let Some(message) = queue.pop_front() {
      if let Err(error) = self.transport.send(message.clone()) {
        tracing::warn!(%error, "Failed to deliver message, it will be retried on next flush");
        queue.push_front(message);
        return;
      }
    }
  }

  pub fn queued(&self) -> usize {
    self.queue.lock().len()
  }
}
