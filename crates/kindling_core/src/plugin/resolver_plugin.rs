use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::hash::IdentifierHasher;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolveContext {
  /// The specifier as written in the importing module, or the requested url for entries
  pub specifier: String,
  /// Id of the importing module, `None` for entry requests
  pub importer: Option<String>,
  /// Backing file of the importing module
  pub importer_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedId {
  /// The stable module identity, including any variant query
  pub id: String,
  /// The file that backs the module, `None` for virtual modules
  pub file: Option<PathBuf>,
}

/// Converts a specifier into a module id that will be loaded and transformed
///
/// Resolvers run in a pipeline until one of them return a result.
///
#[async_trait]
pub trait ResolverPlugin: Any + Debug + Send + Sync {
  /// Unique ID for this resolver
  fn id(&self) -> u64 {
    let mut hasher = IdentifierHasher::new();
    self.type_id().hash(&mut hasher);
    hasher.finish()
  }

  /// Determines what the specifier resolves to, `None` defers to the next resolver
  async fn resolve(&self, ctx: &ResolveContext) -> Result<Option<ResolvedId>, anyhow::Error>;
}
