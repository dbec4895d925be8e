use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::HotData;
use crate::ModuleNamespace;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Receives the fresh instance of every dependency the callback was registered for, `None`
/// for dependencies the current update did not touch
pub type AcceptCallback = Arc<dyn Fn(&[Option<ModuleNamespace>]) + Send + Sync>;

pub type DataHandler = Arc<dyn Fn(HotData) -> BoxFuture + Send + Sync>;

pub type CustomListener = Arc<dyn Fn(&Value) + Send + Sync>;

pub type ListenerId = u64;

#[derive(Clone)]
pub(crate) struct HotCallback {
  pub deps: Vec<String>,
  pub callback: AcceptCallback,
}

pub(crate) struct Listener {
  pub id: ListenerId,
  pub owner: String,
  pub callback: CustomListener,
}

/// Everything modules registered through their hot contexts, keyed by module url
#[derive(Default)]
pub(crate) struct Registry {
  pub callbacks: HashMap<String, Vec<HotCallback>>,
  pub dispose_handlers: HashMap<String, DataHandler>,
  pub prune_handlers: HashMap<String, DataHandler>,
  pub listeners: HashMap<String, Vec<Listener>>,
  data: HashMap<String, HotData>,
  next_listener_id: ListenerId,
}

impl Registry {
  pub fn data(&mut self, owner: &str) -> HotData {
    self.data.entry(owner.to_string()).or_default().clone()
  }

  /// Forget what the previous instance of a module registered, keeping its data
  pub fn reset_owner(&mut self, owner: &str) {
    self.callbacks.remove(owner);
    self.dispose_handlers.remove(owner);
    self.prune_handlers.remove(owner);

    for listeners in self.listeners.values_mut() {
      listeners.retain(|listener| listener.owner != owner);
    }
    self.listeners.retain(|_, listeners| !listeners.is_empty());
  }

  pub fn add_listener(&mut self, event: &str, owner: &str, callback: CustomListener) -> ListenerId {
    let id = self.next_listener_id;
    self.next_listener_id += 1;

    self
      .listeners
      .entry(event.to_string())
      .or_default()
      .push(Listener {
        id,
        owner: owner.to_string(),
        callback,
      });

    id
  }

  pub fn remove_listener(&mut self, event: &str, id: ListenerId) {
    if let Some(listeners) = self.listeners.get_mut(event) {
      listeners.retain(|listener| listener.id != id);
    }
  }

  pub fn listeners_for(&self, event: &str) -> Vec<CustomListener> {
    self
      .listeners
      .get(event)
      .map(|listeners| {
        listeners
          .iter()
          .map(|listener| listener.callback.clone())
          .collect()
      })
      .unwrap_or_default()
  }
}
