use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;
use kindling_core::hmr_payload::ClientMessage;
use kindling_core::hmr_payload::HmrPayload;
use kindling_core::messenger::HmrMessenger;
use kindling_core::messenger::HmrTransportRef;
use parking_lot::RwLock;
use serde_json::Value;

pub type ClientId = u64;

pub type CustomEventHandler = Arc<dyn Fn(ClientId, Value) + Send + Sync>;

pub type HotChannelRef = Arc<HotChannel>;

/// The server side of the hot update protocol.
///
/// Keeps every connected client behind an outbound queue, so payloads sent before a client's
/// transport is ready are delivered in order once it is.
#[derive(Default)]
pub struct HotChannel {
  clients: RwLock<IndexMap<ClientId, Arc<HmrMessenger>>>,
  handlers: RwLock<HashMap<String, Vec<CustomEventHandler>>>,
  next_client_id: AtomicU64,
}

impl HotChannel {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a connection and queue the `connected` greeting for it
  pub fn register_client(&self, transport: HmrTransportRef) -> ClientId {
    let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
    let messenger = Arc::new(HmrMessenger::new(transport));

    if let Some(message) = encode(&HmrPayload::Connected) {
      messenger.send(message);
    }

    self.clients.write().insert(client_id, messenger);
    tracing::debug!(client_id, "Client connected");

    client_id
  }

  pub fn remove_client(&self, client_id: ClientId) {
    if self.clients.write().shift_remove(&client_id).is_some() {
      tracing::debug!(client_id, "Client disconnected");
    }
  }

  pub fn client_count(&self) -> usize {
    self.clients.read().len()
  }

  /// Deliver anything queued for a client, e.g. once its transport became ready
  pub fn flush_client(&self, client_id: ClientId) {
    let messenger = self.clients.read().get(&client_id).cloned();
    if let Some(messenger) = messenger {
      messenger.flush();
    }
  }

  /// Send a payload to every connected client
  pub fn send(&self, payload: &HmrPayload) {
    let Some(message) = encode(payload) else {
      return;
    };

    let clients = self.clients.read().values().cloned().collect::<Vec<_>>();
    tracing::debug!(clients = clients.len(), "Sending {message}");

    for messenger in clients {
      messenger.send(message.clone());
    }
  }

  /// Send a payload to a single client
  pub fn send_to(&self, client_id: ClientId, payload: &HmrPayload) {
    let messenger = self.clients.read().get(&client_id).cloned();
    if let (Some(messenger), Some(message)) = (messenger, encode(payload)) {
      messenger.send(message);
    }
  }

  /// Listen for `custom` messages with the given event name
  pub fn on(&self, event: impl Into<String>, handler: CustomEventHandler) {
    self
      .handlers
      .write()
      .entry(event.into())
      .or_default()
      .push(handler);
  }

  /// Parse and dispatch one inbound message.
  ///
  /// Malformed messages are logged and dropped without affecting the connection.
  pub fn handle_client_message(&self, client_id: ClientId, message: &str) {
    let message = match ClientMessage::from_json(message) {
      Ok(message) => message,
      Err(error) => {
        tracing::warn!(client_id, %error, "Dropping malformed client message");
        return;
      }
    };

    match message {
      ClientMessage::Custom { event, data } => {
        let handlers = self
          .handlers
          .read()
          .get(&event)
          .cloned()
          .unwrap_or_default();

        if handlers.is_empty() {
          tracing::debug!(client_id, %event, "No handler for custom event");
        }

        for handler in handlers {
          handler(client_id, data.clone());
        }
      }
    }
  }
}

fn encode(payload: &HmrPayload) -> Option<String> {
  match payload.to_json() {
    Ok(message) => Some(message),
    Err(error) => {
      tracing::error!(%error, "Failed to encode payload");
      None
    }
  }
}
