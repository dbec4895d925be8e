use serde::Deserialize;
use serde::Serialize;

/// How a module reacts to its own change when nothing accepts it.
///
/// Declared per transformer so that whole module types (e.g. style sheets) can opt into being
/// swapped in place, rather than special-casing file names in the propagation engine.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HotUpdatePolicy {
  /// Walk importers looking for an accepting boundary
  #[default]
  Propagate,
  /// Side-effect free leaf content that can always be replaced on its own
  LeafSwap,
}

/// One import statement discovered by a transformer
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSpecifier {
  /// The specifier as written, resolved later through the resolver chain
  pub specifier: String,
  /// Binding names imported from the module, `*` for namespace imports
  pub bindings: Vec<String>,
  /// Metadata-only dependency; changes behind it never propagate to this module
  pub soft: bool,
}

impl ImportSpecifier {
  pub fn new(specifier: impl Into<String>) -> Self {
    ImportSpecifier {
      specifier: specifier.into(),
      ..ImportSpecifier::default()
    }
  }

  pub fn with_bindings<I, S>(mut self, bindings: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.bindings = bindings.into_iter().map(Into::into).collect();
    self
  }

  pub fn soft(mut self) -> Self {
    self.soft = true;
    self
  }
}

/// Side-channel metadata a transformer attaches to its output
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMeta {
  pub imports: Vec<ImportSpecifier>,
  /// Specifiers passed to `hot.accept(...)`
  pub accepted_deps: Vec<String>,
  /// Export names passed to `hot.acceptExports(...)`
  pub accepted_exports: Option<Vec<String>>,
  pub self_accepting: bool,
  pub hot_update_policy: Option<HotUpdatePolicy>,
}

impl ModuleMeta {
  /// Fold the metadata of a later transformer into this one
  pub fn merge(&mut self, other: ModuleMeta) {
    for import in other.imports {
      if !self.imports.contains(&import) {
        self.imports.push(import);
      }
    }

    for dep in other.accepted_deps {
      if !self.accepted_deps.contains(&dep) {
        self.accepted_deps.push(dep);
      }
    }

    if let Some(exports) = other.accepted_exports {
      let current = self.accepted_exports.get_or_insert_with(Vec::new);
      for export in exports {
        if !current.contains(&export) {
          current.push(export);
        }
      }
    }

    self.self_accepting |= other.self_accepting;

    if other.hot_update_policy.is_some() {
      self.hot_update_policy = other.hot_update_policy;
    }
  }
}
