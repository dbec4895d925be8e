use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;

use super::ResolvedId;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadResult {
  pub code: String,
  pub map: Option<String>,
}

impl From<String> for LoadResult {
  fn from(code: String) -> Self {
    LoadResult { code, map: None }
  }
}

/// Produces the source of a resolved module
///
/// Loaders run in a pipeline until one of them return a result. When none do, the module's file
/// is read from the file system.
///
#[async_trait]
pub trait LoaderPlugin: Any + Debug + Send + Sync {
  async fn load(&self, resolved: &ResolvedId) -> Result<Option<LoadResult>, anyhow::Error>;
}
