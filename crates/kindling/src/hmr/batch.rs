use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::mpsc;

use crate::WatchEvent;

/// Where the engine is in processing a batch of file events
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BatchState {
  #[default]
  Idle,
  /// Waiting out the debounce window for more events
  Collecting,
  /// Looking up affected modules and re-running the pipeline for them
  Resolving,
  /// Searching the graph for accepting boundaries
  Walking,
  /// Sending payloads to clients
  Dispatching,
}

/// Gather every event that arrives within `window` of the first one.
///
/// Repeated events for a file collapse into one entry that keeps the position of the first
/// event and the kind of the last.
pub async fn collect_batch(
  first: WatchEvent,
  events: &mut mpsc::Receiver<WatchEvent>,
  window: Duration,
) -> Vec<WatchEvent> {
  let mut batch = IndexMap::new();
  batch.insert(first.path.clone(), first);

  let deadline = tokio::time::Instant::now() + window;
  loop {
    tokio::select! {
      _ = tokio::time::sleep_until(deadline) => break,
      event = events.recv() => match event {
        Some(event) => {
          batch.insert(event.path.clone(), event);
        }
        None => break,
      },
    }
  }

  batch.into_values().collect()
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[tokio::test(flavor = "multi_thread")]
  async fn collapses_events_in_first_detection_order() {
    let (tx, mut rx) = mpsc::channel(16);

    tx.send(WatchEvent::update("/app/b.js")).await.unwrap();
    tx.send(WatchEvent::update("/app/a.js")).await.unwrap();
    tx.send(WatchEvent::delete("/app/b.js")).await.unwrap();

    let batch = collect_batch(
      WatchEvent::update("/app/c.js"),
      &mut rx,
      Duration::from_millis(20),
    )
    .await;

    assert_eq!(
      batch,
      vec![
        WatchEvent::update("/app/c.js"),
        WatchEvent::delete("/app/b.js"),
        WatchEvent::update("/app/a.js"),
      ]
    );
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn events_after_the_window_start_a_new_batch() {
    let (tx, mut rx) = mpsc::channel(16);

    let sender = tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(200)).await;
      tx.send(WatchEvent::update("/app/late.js")).await.unwrap();
    });

    let batch = collect_batch(
      WatchEvent::update("/app/a.js"),
      &mut rx,
      Duration::from_millis(10),
    )
    .await;

    assert_eq!(batch, vec![WatchEvent::update("/app/a.js")]);

    sender.await.unwrap();
    assert_eq!(rx.recv().await, Some(WatchEvent::update("/app/late.js")));
  }
}
