use std::collections::HashSet;
use std::collections::VecDeque;

use indexmap::IndexSet;
use kindling_core::hmr_payload::PendingUpdate;
use kindling_core::types::HotUpdatePolicy;

use crate::module_graph::ModuleGraph;
use crate::module_graph::ModuleIndex;

/// Outcome of searching the graph for modules that can take a change in place
#[derive(Clone, Debug, PartialEq)]
pub enum Propagation {
  /// Updates to apply, one per module that was reached and the boundary accepting it
  Boundaries(Vec<PendingUpdate>),
  /// Some path from the change reached a module nothing accepts
  FullReload,
}

/// Walk importers from a changed module until every path ends at an accepting boundary.
///
/// Soft edges are never followed. Reaching a module that is not a boundary itself and has no
/// importers besides soft ones turns the whole change into a full reload.
pub fn propagate_update(graph: &ModuleGraph, start: ModuleIndex, timestamp: u64) -> Propagation {
  let Some(module) = graph.node(start) else {
    return Propagation::Boundaries(Vec::new());
  };

  if module.hot_update_policy == HotUpdatePolicy::LeafSwap || module.is_self_accepting {
    return Propagation::Boundaries(vec![PendingUpdate::reload(
      &module.url,
      &module.url,
      timestamp,
    )]);
  }

  let mut updates = IndexSet::new();
  if module.accepted_hmr_exports.is_some() {
    updates.insert(PendingUpdate::reload(&module.url, &module.url, timestamp));
  }

  let mut visited = HashSet::from([start]);
  let mut queue = VecDeque::from([start]);
  let mut walked_hard_edge = false;

  while let Some(current) = queue.pop_front() {
    let Some(current_node) = graph.node(current) else {
      continue;
    };

    let importers = graph
      .importer_edges(current)
      .into_iter()
      .filter(|(_, edge)| !edge.soft)
      .map(|(importer, _)| importer)
      .collect::<Vec<_>>();

    if importers.is_empty() {
      tracing::debug!(id = %current_node.id, "Update reached a module nothing accepts");
      return Propagation::FullReload;
    }

    for importer in importers {
      let Some(importer_node) = graph.node(importer) else {
        continue;
      };

      // Importers only using accepted exports keep their bindings
      if current == start && module.accepts_all_bindings_of(importer_node) {
        continue;
      }

      walked_hard_edge = true;

      if importer_node.is_self_accepting || importer_node.accepts_dep(&current_node.id) {
        updates.insert(PendingUpdate::reload(
          &current_node.url,
          &importer_node.url,
          timestamp,
        ));
      } else if visited.insert(importer) {
        queue.push_back(importer);
      }
    }
  }

  // Every importer path looped back on itself
  if updates.is_empty() && walked_hard_edge {
    return Propagation::FullReload;
  }

  Propagation::Boundaries(updates.into_iter().collect())
}

/// Propagate a change a module could not accept itself to the modules importing it
pub fn propagate_to_importers(
  graph: &ModuleGraph,
  index: ModuleIndex,
  timestamp: u64,
) -> Propagation {
  let importers = graph
    .importer_edges(index)
    .into_iter()
    .filter(|(_, edge)| !edge.soft)
    .map(|(importer, _)| importer)
    .collect::<Vec<_>>();

  if importers.is_empty() {
    return Propagation::FullReload;
  }

  let mut updates = IndexSet::new();
  for importer in importers {
    match propagate_update(graph, importer, timestamp) {
      Propagation::Boundaries(boundaries) => updates.extend(boundaries),
      Propagation::FullReload => return Propagation::FullReload,
    }
  }

  Propagation::Boundaries(updates.into_iter().collect())
}
