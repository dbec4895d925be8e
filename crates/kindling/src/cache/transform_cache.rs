use std::sync::Arc;

use async_trait::async_trait;
use kindling_core::hash::hash_string;
use kindling_core::types::ModuleMeta;
use serde::Deserialize;
use serde::Serialize;

/// The transform stage output for one version of a module's source
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CachedTransform {
  pub code: String,
  pub maps: Vec<String>,
  pub meta: ModuleMeta,
}

/// Keys entries by module id and loaded content, so edits miss the cache without any
/// explicit invalidation
pub fn transform_cache_key(id: &str, code: &str) -> String {
  format!("{}:{}", hash_string(id), hash_string(code))
}

/// Read-through, write-through storage for transform stage output
#[async_trait]
pub trait TransformCache: Send + Sync {
  async fn get(&self, key: &str) -> anyhow::Result<Option<CachedTransform>>;

  async fn set(&self, key: &str, value: &CachedTransform) -> anyhow::Result<()>;
}

pub type TransformCacheRef = Arc<dyn TransformCache>;
