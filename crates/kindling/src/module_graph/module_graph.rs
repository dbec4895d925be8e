use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use kindling_core::types::remove_timestamp_query;
use kindling_core::types::HotUpdatePolicy;
use kindling_core::types::TransformArtifact;
use petgraph::stable_graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::Dfs;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tokio::sync::RwLock;

use super::Clock;
use super::ModuleNode;

pub type ModuleIndex = NodeIndex;

pub type ModuleGraphRef = Arc<RwLock<ModuleGraph>>;

/// An edge from an importer to an imported module
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportEdge {
  /// Metadata-only dependency that never propagates invalidation or hot updates
  pub soft: bool,
}

/// Everything a transform discovered about a module, with imports already in the graph
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleInfo {
  pub imports: Vec<(ModuleIndex, ImportEdge)>,
  pub imported_bindings: HashMap<String, HashSet<String>>,
  pub accepted_hmr_deps: HashSet<String>,
  pub accepted_hmr_exports: Option<HashSet<String>>,
  pub is_self_accepting: bool,
  pub hot_update_policy: HotUpdatePolicy,
}

/// The live dependency graph of every module served so far.
///
/// Importers are the incoming edges of a node and imported modules its outgoing edges, so the two
/// views can never disagree. All mutation goes through `&mut self` methods, which callers hold a
/// single write guard of [`ModuleGraphRef`] for.
#[derive(Debug, Default)]
pub struct ModuleGraph {
  graph: StableDiGraph<ModuleNode, ImportEdge>,
  id_to_module: HashMap<String, ModuleIndex>,
  url_to_module: HashMap<String, ModuleIndex>,
  file_to_modules: HashMap<PathBuf, Vec<ModuleIndex>>,
  clock: Clock,
}

impl ModuleGraph {
  pub fn new(clock: Clock) -> Self {
    ModuleGraph {
      clock,
      ..ModuleGraph::default()
    }
  }

  pub fn clock(&self) -> &Clock {
    &self.clock
  }

  pub fn next_timestamp(&self) -> u64 {
    self.clock.next_timestamp()
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn modules(&self) -> impl Iterator<Item = ModuleIndex> + '_ {
    self.graph.node_indices()
  }

  pub fn node(&self, index: ModuleIndex) -> Option<&ModuleNode> {
    self.graph.node_weight(index)
  }

  /// Get or create the node for `id`, registering the url and file it was seen under
  pub fn ensure_node(&mut self, url: &str, id: &str, file: Option<PathBuf>) -> ModuleIndex {
    let url = remove_timestamp_query(url);
    let id = remove_timestamp_query(id);

    let index = match self.id_to_module.get(&id) {
      Some(index) => *index,
      None => {
        let index = self
          .graph
          .add_node(ModuleNode::new(id.clone(), url.clone()));

        tracing::trace!(%id, "Created module node");
        self.id_to_module.insert(id, index);
        index
      }
    };

    if let Some(file) = file {
      self.register_file(index, file);
    }

    self.url_to_module.entry(url).or_insert(index);

    index
  }

  fn register_file(&mut self, index: ModuleIndex, file: PathBuf) {
    let previous = match self.graph.node_weight_mut(index) {
      Some(node) if node.file.as_ref() != Some(&file) => node.file.replace(file.clone()),
      _ => return,
    };

    if let Some(previous) = previous {
      self.unregister_file(index, &previous);
    }

    self.file_to_modules.entry(file).or_default().push(index);
  }

  fn unregister_file(&mut self, index: ModuleIndex, file: &Path) {
    if let Some(modules) = self.file_to_modules.get_mut(file) {
      modules.retain(|module| *module != index);
      if modules.is_empty() {
        self.file_to_modules.remove(file);
      }
    }
  }

  pub fn get_module_by_id(&self, id: &str) -> Option<ModuleIndex> {
    self
      .id_to_module
      .get(&remove_timestamp_query(id))
      .copied()
  }

  pub fn get_module_by_url(&self, url: &str) -> Option<ModuleIndex> {
    self
      .url_to_module
      .get(&remove_timestamp_query(url))
      .copied()
  }

  /// One file can back several modules, e.g. `/src/a.vue` and `/src/a.vue?type=style`
  pub fn get_modules_by_file(&self, file: &Path) -> Vec<ModuleIndex> {
    self.file_to_modules.get(file).cloned().unwrap_or_default()
  }

  /// Importers of a module with the edge they import through, in creation order
  pub fn importer_edges(&self, index: ModuleIndex) -> Vec<(ModuleIndex, ImportEdge)> {
    let mut edges = self
      .graph
      .edges_directed(index, Direction::Incoming)
      .map(|edge| (edge.source(), edge.weight().clone()))
      .collect::<Vec<_>>();

    edges.sort_by_key(|(importer, _)| *importer);
    edges
  }

  pub fn importers(&self, index: ModuleIndex) -> Vec<ModuleIndex> {
    self
      .importer_edges(index)
      .into_iter()
      .map(|(importer, _)| importer)
      .collect()
  }

  pub fn imported_modules(&self, index: ModuleIndex) -> Vec<ModuleIndex> {
    let mut imported = self
      .graph
      .neighbors_directed(index, Direction::Outgoing)
      .collect::<Vec<_>>();

    imported.sort();
    imported
  }

  /// Replace the imports and hot update metadata of a module.
  ///
  /// Returns the modules that were imported before but no longer are.
  pub fn update_module_info(&mut self, index: ModuleIndex, info: ModuleInfo) -> Vec<ModuleIndex> {
    if self.graph.node_weight(index).is_none() {
      return Vec::new();
    }

    let previous = self
      .graph
      .edges_directed(index, Direction::Outgoing)
      .map(|edge| (edge.id(), edge.target()))
      .collect::<Vec<_>>();

    for (edge, _) in &previous {
      self.graph.remove_edge(*edge);
    }

    // A module imported both softly and for real propagates like any other import
    let mut imports = HashMap::<ModuleIndex, ImportEdge>::new();
    let mut order = Vec::new();
    for (imported, edge) in info.imports {
      if self.graph.node_weight(imported).is_none() {
        continue;
      }

      match imports.get_mut(&imported) {
        Some(existing) => existing.soft &= edge.soft,
        None => {
          order.push(imported);
          imports.insert(imported, edge);
        }
      }
    }

    for imported in order {
      if let Some(edge) = imports.remove(&imported) {
        self.graph.add_edge(index, imported, edge);
      }
    }

    let mut no_longer_imported = Vec::new();
    for (_, target) in previous {
      if !self.graph.contains_edge(index, target) && !no_longer_imported.contains(&target) {
        no_longer_imported.push(target);
      }
    }

    let node = &mut self.graph[index];
    node.imported_bindings = info.imported_bindings;
    node.accepted_hmr_deps = info.accepted_hmr_deps;
    node.accepted_hmr_exports = info.accepted_hmr_exports;
    node.is_self_accepting = info.is_self_accepting;
    node.hot_update_policy = info.hot_update_policy;

    no_longer_imported
  }

  /// Link a module to the modules its artifact imports, creating nodes for new imports.
  pub fn link_artifact(
    &mut self,
    index: ModuleIndex,
    artifact: &TransformArtifact,
  ) -> Vec<ModuleIndex> {
    let soft = artifact
      .soft_imported_ids
      .iter()
      .map(String::as_str)
      .collect::<HashSet<_>>();

    let imports = artifact
      .imported_ids
      .iter()
      .map(|id| {
        let file = artifact.imported_files.get(id).cloned();
        let imported = self.ensure_node(id, id, file);
        let edge = ImportEdge {
          soft: soft.contains(id.as_str()),
        };

        (imported, edge)
      })
      .collect();

    let info = ModuleInfo {
      imports,
      imported_bindings: artifact
        .imported_bindings
        .iter()
        .map(|(id, bindings)| (id.clone(), bindings.iter().cloned().collect()))
        .collect(),
      accepted_hmr_deps: artifact.accepted_hmr_deps.iter().cloned().collect(),
      accepted_hmr_exports: artifact
        .accepted_hmr_exports
        .as_ref()
        .map(|exports| exports.iter().cloned().collect()),
      is_self_accepting: artifact.is_self_accepting,
      hot_update_policy: artifact.hot_update_policy,
    };

    self.update_module_info(index, info)
  }

  pub fn set_transform_result(
    &mut self,
    index: ModuleIndex,
    artifact: Option<Arc<TransformArtifact>>,
  ) {
    if let Some(node) = self.graph.node_weight_mut(index) {
      node.transform_result = artifact;
    }
  }

  /// Store a fresh artifact for a module and link its imports
  pub fn commit_artifact(
    &mut self,
    index: ModuleIndex,
    artifact: Arc<TransformArtifact>,
  ) -> Vec<ModuleIndex> {
    let no_longer_imported = self.link_artifact(index, &artifact);
    self.set_transform_result(index, Some(artifact));
    no_longer_imported
  }

  /// Drop the transform result of a module and of every importer that does not accept it.
  ///
  /// `seen` is shared across one batch so modules reached from several changes are only
  /// invalidated once, and cycles terminate.
  pub fn invalidate_module(
    &mut self,
    index: ModuleIndex,
    seen: &mut HashSet<ModuleIndex>,
    timestamp: u64,
  ) {
    let mut stack = vec![index];

    while let Some(current) = stack.pop() {
      if !seen.insert(current) {
        continue;
      }

      let Some(node) = self.graph.node_weight_mut(current) else {
        continue;
      };

      node.transform_result = None;
      node.last_invalidation_timestamp = timestamp.max(node.last_invalidation_timestamp + 1);

      let id = node.id.clone();
      for (importer, edge) in self.importer_edges(current) {
        if edge.soft || self.graph[importer].accepts_dep(&id) {
          continue;
        }

        stack.push(importer);
      }
    }
  }

  /// Everything reachable from a module nothing imports, leaving out `candidates`
  fn reachable_from_roots(&self, candidates: &HashSet<ModuleIndex>) -> HashSet<ModuleIndex> {
    let mut reachable = HashSet::new();
    let mut dfs = Dfs::empty(&self.graph);

    for root in self.graph.node_indices() {
      let is_imported = self
        .graph
        .edges_directed(root, Direction::Incoming)
        .next()
        .is_some();

      if is_imported || candidates.contains(&root) {
        continue;
      }

      dfs.move_to(root);
      while let Some(index) = dfs.next(&self.graph) {
        reachable.insert(index);
      }
    }

    reachable
  }

  /// Remove candidates that lost their last importer, along with anything only they kept alive.
  ///
  /// Candidates are modules a change stopped importing. Any other module without importers is a
  /// root of some page, and whatever it reaches is kept, so shared modules and modules still
  /// imported elsewhere survive. Cycles cut off from every root are removed as a whole.
  pub fn prune(&mut self, candidates: Vec<ModuleIndex>) -> Vec<ModuleNode> {
    if candidates.is_empty() {
      return Vec::new();
    }

    let candidate_set = candidates.iter().copied().collect::<HashSet<_>>();
    let reachable = self.reachable_from_roots(&candidate_set);
    let mut visited = HashSet::new();
    let mut stack = candidates;
    let mut removed = Vec::new();

    while let Some(index) = stack.pop() {
      if !visited.insert(index) || reachable.contains(&index) {
        continue;
      }

      stack.extend(self.imported_modules(index));

      if let Some(node) = self.remove_node(index) {
        tracing::debug!(id = %node.id, "Pruned module");
        removed.push(node);
      }
    }

    removed
  }

  /// Remove modules regardless of their importers, then prune what they kept alive.
  pub fn remove_modules(&mut self, modules: Vec<ModuleIndex>) -> Vec<ModuleNode> {
    let mut candidates = Vec::new();
    let mut removed = Vec::new();

    for index in modules {
      candidates.extend(self.imported_modules(index));
      if let Some(node) = self.remove_node(index) {
        removed.push(node);
      }
    }

    removed.extend(self.prune(candidates));
    removed
  }

  fn remove_node(&mut self, index: ModuleIndex) -> Option<ModuleNode> {
    let node = self.graph.remove_node(index)?;

    if self.id_to_module.get(&node.id) == Some(&index) {
      self.id_to_module.remove(&node.id);
    }

    self.url_to_module.retain(|_, module| *module != index);

    if let Some(file) = &node.file {
      self.unregister_file(index, file);
    }

    Some(node)
  }
}
