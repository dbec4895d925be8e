use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use kindling_core::types::HotUpdatePolicy;
use kindling_core::types::TransformArtifact;

/// A module served by the dev server, keyed by its resolved id
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleNode {
  /// Resolved identity, including any variant query but never the timestamp query
  pub id: String,

  /// Public url the module was first requested under
  pub url: String,

  /// Backing file, `None` for virtual modules
  pub file: Option<PathBuf>,

  /// Ids of imported modules whose updates this module accepts
  pub accepted_hmr_deps: HashSet<String>,

  /// Export names this module accepts updates for on behalf of its importers
  pub accepted_hmr_exports: Option<HashSet<String>>,

  /// Binding names imported, per imported module id
  pub imported_bindings: HashMap<String, HashSet<String>>,

  pub is_self_accepting: bool,

  pub hot_update_policy: HotUpdatePolicy,

  pub transform_result: Option<Arc<TransformArtifact>>,

  pub last_invalidation_timestamp: u64,
}

impl ModuleNode {
  pub fn new(id: String, url: String) -> Self {
    ModuleNode {
      id,
      url,
      ..ModuleNode::default()
    }
  }

  pub fn accepts_dep(&self, id: &str) -> bool {
    self.accepted_hmr_deps.contains(id)
  }

  /// Whether every binding `importer` takes from this module is covered by `hot.acceptExports`
  pub fn accepts_all_bindings_of(&self, importer: &ModuleNode) -> bool {
    let (Some(accepted), Some(bindings)) = (
      &self.accepted_hmr_exports,
      importer.imported_bindings.get(&self.id),
    ) else {
      return false;
    };

    !bindings.is_empty() && bindings.iter().all(|binding| accepted.contains(binding))
  }
}
