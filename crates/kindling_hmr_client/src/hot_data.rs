use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Map;
use serde_json::Value;

/// State a module hands to its next instance across hot updates
#[derive(Clone, Debug, Default)]
pub struct HotData {
  values: Arc<Mutex<Map<String, Value>>>,
}

impl HotData {
  pub fn get(&self, key: &str) -> Option<Value> {
    self.values.lock().get(key).cloned()
  }

  pub fn set(&self, key: impl Into<String>, value: Value) {
    self.values.lock().insert(key.into(), value);
  }

  pub fn remove(&self, key: &str) -> Option<Value> {
    self.values.lock().remove(key)
  }
}
