use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CachedTransform;
use super::TransformCache;

/// Keeps bincode-encoded transform output in memory for the lifetime of the server
#[derive(Default)]
pub struct InMemoryTransformCache {
  store: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryTransformCache {
  pub async fn entry_count(&self) -> usize {
    self.store.read().await.len()
  }
}

#[async_trait]
impl TransformCache for InMemoryTransformCache {
  async fn get(&self, key: &str) -> anyhow::Result<Option<CachedTransform>> {
    Ok(match self.store.read().await.get(key) {
      Some(bytes) => Some(bincode::deserialize(bytes)?),
      None => None,
    })
  }

  async fn set(&self, key: &str, value: &CachedTransform) -> anyhow::Result<()> {
    let bytes = bincode::serialize(value)?;
    self.store.write().await.insert(key.to_string(), bytes);
    Ok(())
  }
}
