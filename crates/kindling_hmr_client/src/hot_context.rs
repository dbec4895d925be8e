use std::future::Future;
use std::sync::Arc;

use kindling_core::hmr_payload::InvalidatePayload;
use kindling_core::hmr_payload::INVALIDATE_EVENT;
use serde_json::Value;

use crate::registry::HotCallback;
use crate::BoxFuture;
use crate::HmrClient;
use crate::HotData;
use crate::ListenerId;
use crate::ModuleNamespace;

/// The hot update API handed to one evaluated module instance.
///
/// Created through [`HmrClient::hot_context`], which drops whatever the previous instance of the
/// same module registered.
#[derive(Clone)]
pub struct HotContext {
  owner: String,
  client: HmrClient,
}

impl HotContext {
  pub(crate) fn new(owner: String, client: HmrClient) -> Self {
    Self { owner, client }
  }

  pub fn owner(&self) -> &str {
    &self.owner
  }

  /// Data persisted for this module across updates
  pub fn data(&self) -> HotData {
    self.client.registry().lock().data(&self.owner)
  }

  /// Accept updates of this module without reacting to them
  pub fn accept(&self) {
    self.register(vec![self.owner.clone()], |_| {});
  }

  /// Accept updates of this module, receiving each new instance
  pub fn accept_with<F>(&self, callback: F)
  where
    F: Fn(Option<&ModuleNamespace>) + Send + Sync + 'static,
  {
    self.register(vec![self.owner.clone()], move |modules| {
      callback(modules.first().and_then(Option::as_ref))
    });
  }

  /// Accept updates of the given dependencies.
  ///
  /// The callback receives one slot per dependency, filled only for the one that was updated.
  pub fn accept_deps<F>(&self, deps: &[&str], callback: F)
  where
    F: Fn(&[Option<ModuleNamespace>]) + Send + Sync + 'static,
  {
    self.register(deps.iter().map(|dep| dep.to_string()).collect(), callback);
  }

  /// Accept updates of this module as long as only the listed exports are used by importers.
  ///
  /// Which importers are spared is decided on the server, so on the client this behaves like a
  /// plain self accept.
  pub fn accept_exports(&self, exports: &[&str]) {
    tracing::trace!(owner = %self.owner, ?exports, "Accepting exports");
    self.accept();
  }

  /// Run before this module is replaced or pruned, with the data handed to the next instance
  pub fn dispose<F, Fut>(&self, handler: F)
  where
    F: Fn(HotData) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self
      .client
      .registry()
      .lock()
      .dispose_handlers
      .insert(
        self.owner.clone(),
        Arc::new(move |data| -> BoxFuture { Box::pin(handler(data)) }),
      );
  }

  /// Run once this module is no longer imported by the page
  pub fn prune<F, Fut>(&self, handler: F)
  where
    F: Fn(HotData) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self
      .client
      .registry()
      .lock()
      .prune_handlers
      .insert(
        self.owner.clone(),
        Arc::new(move |data| -> BoxFuture { Box::pin(handler(data)) }),
      );
  }

  /// Listen for custom events from the server
  pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
  where
    F: Fn(&Value) + Send + Sync + 'static,
  {
    self
      .client
      .registry()
      .lock()
      .add_listener(event, &self.owner, Arc::new(listener))
  }

  pub fn off(&self, event: &str, id: ListenerId) {
    self.client.registry().lock().remove_listener(event, id);
  }

  /// Send a custom event to the server
  pub fn send(&self, event: &str, data: Value) {
    self.client.send_custom(event, data);
  }

  /// Ask the server to propagate this module's update to its importers instead
  pub fn invalidate(&self, message: Option<&str>) {
    let payload = InvalidatePayload {
      path: self.owner.clone(),
      message: message.map(String::from),
    };

    match serde_json::to_value(&payload) {
      Ok(data) => {
        tracing::debug!(owner = %self.owner, "Invalidating");
        self.send(INVALIDATE_EVENT, data);
      }
      Err(error) => tracing::error!(%error, "Failed to encode invalidation"),
    }
  }

  fn register<F>(&self, deps: Vec<String>, callback: F)
  where
    F: Fn(&[Option<ModuleNamespace>]) + Send + Sync + 'static,
  {
    self
      .client
      .registry()
      .lock()
      .callbacks
      .entry(self.owner.clone())
      .or_default()
      .push(HotCallback {
        deps,
        callback: Arc::new(callback),
      });
  }
}
