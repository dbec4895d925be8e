use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::HotUpdatePolicy;
use super::SourceMapChain;

/// The complete output of running a module through the resolve, load and transform stages.
///
/// Artifacts are immutable once produced. A module's artifact is only ever replaced as a whole.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformArtifact {
  pub id: String,
  pub url: String,
  pub file: Option<PathBuf>,
  pub code: String,
  pub map: SourceMapChain,
  /// Resolved ids of every module this one imports, in source order
  pub imported_ids: Vec<String>,
  /// Backing files of imported modules that have one, by resolved id
  pub imported_files: BTreeMap<String, PathBuf>,
  /// Binding names imported per resolved id
  pub imported_bindings: BTreeMap<String, Vec<String>>,
  /// Resolved ids of imports that never propagate updates
  pub soft_imported_ids: Vec<String>,
  /// Resolved ids this module accepts updates for
  pub accepted_hmr_deps: Vec<String>,
  pub accepted_hmr_exports: Option<Vec<String>>,
  pub is_self_accepting: bool,
  pub hot_update_policy: HotUpdatePolicy,
}

/// What a module gets back when it asks the pipeline for another module's artifact
#[derive(Clone, Debug, PartialEq)]
pub enum ModuleRef {
  Ready(Arc<TransformArtifact>),
  /// The requested module is already being transformed further up this request chain, so it is
  /// returned by id only and must be linked once the chain completes.
  Deferred { id: String },
}

impl ModuleRef {
  pub fn id(&self) -> &str {
    match self {
      ModuleRef::Ready(artifact) => &artifact.id,
      ModuleRef::Deferred { id } => id,
    }
  }

  pub fn artifact(&self) -> Option<&Arc<TransformArtifact>> {
    match self {
      ModuleRef::Ready(artifact) => Some(artifact),
      ModuleRef::Deferred { .. } => None,
    }
  }
}
