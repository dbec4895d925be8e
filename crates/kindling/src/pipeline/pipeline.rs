use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use kindling_core::diagnostic::Diagnostic;
use kindling_core::plugin::LoadResult;
use kindling_core::plugin::ResolveContext;
use kindling_core::plugin::ResolvedId;
use kindling_core::plugin::TransformInput;
use kindling_core::types::remove_timestamp_query;
use kindling_core::types::ModuleMeta;
use kindling_core::types::SourceLocation;
use kindling_core::types::SourceMapChain;
use kindling_core::types::TransformArtifact;
use kindling_filesystem::FileSystemRef;

use super::context::RequestContext;
use super::pending::PendingGuard;
use super::pending::PendingTransforms;
use super::pending::Registration;
use super::resolve::resolve_from_file_system;
use super::PipelineError;
use super::Plugins;
use crate::cache::transform_cache_key;
use crate::cache::CachedTransform;
use crate::cache::TransformCacheRef;
use crate::module_graph::ModuleGraphRef;
use crate::module_graph::ModuleIndex;
use crate::module_graph::ModuleNode;
use crate::KindlingOptions;

pub type TransformPipelineRef = Arc<TransformPipeline>;

/// Turns request urls into transformed modules and keeps the module graph in sync with what
/// was served.
///
/// Each module id has at most one transform in flight. Concurrent requests for the same id wait
/// for that transform and all receive the same artifact.
pub struct TransformPipeline {
  graph: ModuleGraphRef,
  file_system: FileSystemRef,
  options: Arc<KindlingOptions>,
  plugins: Plugins,
  cache: Option<TransformCacheRef>,
  pending: PendingTransforms,
}

impl TransformPipeline {
  pub fn new(
    graph: ModuleGraphRef,
    file_system: FileSystemRef,
    options: Arc<KindlingOptions>,
    plugins: Plugins,
  ) -> Self {
    Self {
      graph,
      file_system,
      options,
      plugins,
      cache: None,
      pending: PendingTransforms::default(),
    }
  }

  pub fn with_cache(mut self, cache: TransformCacheRef) -> Self {
    self.cache = Some(cache);
    self
  }

  pub fn graph(&self) -> &ModuleGraphRef {
    &self.graph
  }

  pub(super) fn pending(&self) -> &PendingTransforms {
    &self.pending
  }

  /// Serve a module requested without an importer, e.g. a script tag of the page
  #[tracing::instrument(level = "debug", skip(self))]
  pub async fn request(&self, url: &str) -> Result<Arc<TransformArtifact>, PipelineError> {
    let resolved = self.resolve(url, None).await?;
    let chain = vec![resolved.id.clone()];

    self.transform_request(&resolved, url, &chain).await
  }

  /// Run the resolver plugins in order, then fall back to the file system
  pub(crate) async fn resolve(
    &self,
    specifier: &str,
    importer: Option<&ResolvedId>,
  ) -> Result<ResolvedId, PipelineError> {
    let ctx = ResolveContext {
      specifier: specifier.to_string(),
      importer: importer.map(|importer| importer.id.clone()),
      importer_file: importer.and_then(|importer| importer.file.clone()),
    };

    let resolution_error = || PipelineError::Resolution {
      specifier: ctx.specifier.clone(),
      importer: ctx.importer.clone(),
    };

    for resolver in &self.plugins.resolvers {
      match resolver.resolve(&ctx).await {
        Ok(Some(resolved)) => {
          return Ok(ResolvedId {
            id: remove_timestamp_query(&resolved.id),
            file: resolved.file,
          })
        }
        Ok(None) => {}
        Err(error) => {
          tracing::warn!(?resolver, specifier, "Resolver failed: {error:#}");
          return Err(resolution_error());
        }
      }
    }

    resolve_from_file_system(self.file_system.as_ref(), &self.options, &ctx)
      .ok_or_else(resolution_error)
  }

  pub(crate) async fn transform_request(
    &self,
    resolved: &ResolvedId,
    url: &str,
    chain: &[String],
  ) -> Result<Arc<TransformArtifact>, PipelineError> {
    loop {
      let (last_invalidation, started_at) = {
        let mut graph = self.graph.write().await;
        let index = graph.ensure_node(url, &resolved.id, resolved.file.clone());

        let node = graph.node(index);
        if let Some(artifact) = node.and_then(|node| node.transform_result.clone()) {
          return Ok(artifact);
        }

        let last_invalidation = node
          .map(|node| node.last_invalidation_timestamp)
          .unwrap_or_default();

        (last_invalidation, graph.next_timestamp())
      };

      match self
        .pending
        .register(&resolved.id, last_invalidation, started_at)
      {
        Registration::Join(mut rx) => match rx.recv().await {
          Ok(result) => return result,
          Err(_) => {
            tracing::debug!(id = %resolved.id, "In-flight transform was abandoned, retrying");
          }
        },
        Registration::Own(tx) => {
          let guard = PendingGuard {
            pending: &self.pending,
            id: &resolved.id,
            started_at,
          };

          let result = self.compute(resolved, url, chain).await.map(Arc::new);

          // Order matters; first we store the result, then we broadcast.
          if let Ok(artifact) = &result {
            self.store(artifact, started_at).await;
          }

          drop(guard);

          // Ignore errors here, there are only receivers when something is waiting on the result
          let _ = tx.send(result.clone());

          return result;
        }
      }
    }
  }

  /// Cache an artifact on its node unless the module was invalidated while it was computed
  async fn store(&self, artifact: &Arc<TransformArtifact>, started_at: u64) {
    let mut graph = self.graph.write().await;

    let Some(index) = graph.get_module_by_id(&artifact.id) else {
      return;
    };

    let is_fresh = graph
      .node(index)
      .is_some_and(|node| node.last_invalidation_timestamp < started_at);

    if !is_fresh {
      tracing::debug!(id = %artifact.id, "Transform result went stale while in flight");
      return;
    }

    let no_longer_imported = graph.commit_artifact(index, artifact.clone());
    if !no_longer_imported.is_empty() {
      tracing::debug!(
        id = %artifact.id,
        count = no_longer_imported.len(),
        "Module dropped some of its imports"
      );
    }
  }

  /// Re-run the pipeline for a module already in the graph without storing the result
  #[tracing::instrument(level = "debug", skip(self))]
  pub async fn refresh(&self, id: &str) -> Result<Arc<TransformArtifact>, PipelineError> {
    let module = {
      let graph = self.graph.read().await;
      graph
        .get_module_by_id(id)
        .and_then(|index| graph.node(index))
        .map(|node| {
          let resolved = ResolvedId {
            id: node.id.clone(),
            file: node.file.clone(),
          };

          (resolved, node.url.clone())
        })
    };

    let Some((resolved, url)) = module else {
      return Err(PipelineError::Load {
        id: id.to_string(),
        message: String::from("Module is not part of the module graph"),
      });
    };

    let chain = vec![resolved.id.clone()];
    self.compute(&resolved, &url, &chain).await.map(Arc::new)
  }

  /// Apply refreshed artifacts under one write guard.
  ///
  /// Every changed module and its non-accepting importers are invalidated first, then the fresh
  /// artifacts are stored and linked. Modules that are no longer reachable are pruned and
  /// returned.
  pub async fn commit(
    &self,
    artifacts: Vec<(ModuleIndex, Arc<TransformArtifact>)>,
    timestamp: u64,
  ) -> Vec<ModuleNode> {
    let mut graph = self.graph.write().await;
    let mut seen = HashSet::new();

    for (index, _) in &artifacts {
      graph.invalidate_module(*index, &mut seen, timestamp);
    }

    let mut no_longer_imported = Vec::new();
    for (index, artifact) in artifacts {
      no_longer_imported.extend(graph.commit_artifact(index, artifact));
    }

    graph.prune(no_longer_imported)
  }

  async fn compute(
    &self,
    resolved: &ResolvedId,
    url: &str,
    chain: &[String],
  ) -> Result<TransformArtifact, PipelineError> {
    tracing::debug!(id = %resolved.id, "Transforming module");

    let loaded = self.load(resolved).await?;

    let mut map = SourceMapChain::new();
    if let Some(loaded_map) = loaded.map {
      map.push(loaded_map);
    }

    let transformed = self
      .transform_cached(resolved, loaded.code, &map, chain)
      .await?;

    for transformed_map in transformed.maps {
      map.push(transformed_map);
    }

    let meta = transformed.meta;

    let mut imported_ids = Vec::<String>::new();
    let mut imported_files = BTreeMap::new();
    let mut imported_bindings = BTreeMap::<String, Vec<String>>::new();
    let mut hard_imported_ids = HashSet::new();
    let mut soft_imported_ids = Vec::<String>::new();

    for import in &meta.imports {
      let dependency = self.resolve(&import.specifier, Some(resolved)).await?;

      if !imported_ids.contains(&dependency.id) {
        imported_ids.push(dependency.id.clone());
      }

      if let Some(file) = &dependency.file {
        imported_files.insert(dependency.id.clone(), file.clone());
      }

      if import.soft {
        if !soft_imported_ids.contains(&dependency.id) {
          soft_imported_ids.push(dependency.id.clone());
        }
      } else {
        hard_imported_ids.insert(dependency.id.clone());
      }

      if !import.bindings.is_empty() {
        let bindings = imported_bindings.entry(dependency.id).or_default();
        for binding in &import.bindings {
          if !bindings.contains(binding) {
            bindings.push(binding.clone());
          }
        }
      }
    }

    soft_imported_ids.retain(|id| !hard_imported_ids.contains(id));

    let mut accepted_hmr_deps = Vec::<String>::new();
    for specifier in &meta.accepted_deps {
      let dependency = self.resolve(specifier, Some(resolved)).await?;
      if !accepted_hmr_deps.contains(&dependency.id) {
        accepted_hmr_deps.push(dependency.id);
      }
    }

    Ok(TransformArtifact {
      id: resolved.id.clone(),
      url: remove_timestamp_query(url),
      file: resolved.file.clone(),
      code: transformed.code,
      map,
      imported_ids,
      imported_files,
      imported_bindings,
      soft_imported_ids,
      accepted_hmr_deps,
      accepted_hmr_exports: meta.accepted_exports,
      is_self_accepting: meta.self_accepting,
      hot_update_policy: meta.hot_update_policy.unwrap_or_default(),
    })
  }

  async fn load(&self, resolved: &ResolvedId) -> Result<LoadResult, PipelineError> {
    let load_error = |message: String| PipelineError::Load {
      id: resolved.id.clone(),
      message,
    };

    for loader in &self.plugins.loaders {
      match loader.load(resolved).await {
        Ok(Some(result)) => return Ok(result),
        Ok(None) => {}
        Err(error) => return Err(load_error(format!("{error:#}"))),
      }
    }

    let Some(file) = &resolved.file else {
      return Err(load_error(String::from(
        "No loader produced code for this virtual module",
      )));
    };

    self
      .file_system
      .read_to_string(file)
      .map(LoadResult::from)
      .map_err(|error| load_error(error.to_string()))
  }

  async fn transform_cached(
    &self,
    resolved: &ResolvedId,
    code: String,
    map: &SourceMapChain,
    chain: &[String],
  ) -> Result<CachedTransform, PipelineError> {
    let Some(cache) = &self.cache else {
      return self.transform(resolved, code, map, chain).await;
    };

    let key = transform_cache_key(&resolved.id, &code);
    match cache.get(&key).await {
      Ok(Some(cached)) => {
        tracing::trace!(id = %resolved.id, "Transform cache hit");
        return Ok(cached);
      }
      Ok(None) => {}
      Err(error) => tracing::warn!(id = %resolved.id, "Failed to read transform cache: {error:#}"),
    }

    let transformed = self.transform(resolved, code, map, chain).await?;

    if let Err(error) = cache.set(&key, &transformed).await {
      tracing::warn!(id = %resolved.id, "Failed to write transform cache: {error:#}");
    }

    Ok(transformed)
  }

  async fn transform(
    &self,
    resolved: &ResolvedId,
    code: String,
    map: &SourceMapChain,
    chain: &[String],
  ) -> Result<CachedTransform, PipelineError> {
    let context = RequestContext {
      pipeline: self,
      module: resolved,
      chain,
    };

    let mut result = CachedTransform {
      code,
      maps: Vec::new(),
      meta: ModuleMeta::default(),
    };

    for transformer in &self.plugins.transformers {
      let input = TransformInput {
        id: resolved.id.clone(),
        file: resolved.file.clone(),
        code: result.code.clone(),
      };

      match transformer.transform(input, &context).await {
        Ok(Some(output)) => {
          result.code = output.code;
          if let Some(output_map) = output.map {
            result.maps.push(output_map);
          }
          result.meta.merge(output.meta);
        }
        Ok(None) => {}
        Err(error) => {
          let mut maps = map.clone();
          for applied in &result.maps {
            maps.push(applied.clone());
          }

          return Err(transform_error(resolved, transformer.name(), &error, &maps));
        }
      }
    }

    Ok(result)
  }
}

/// Describe a transformer failure, tracing any reported position back to the original source
/// through the maps of the stages that already ran
fn transform_error(
  resolved: &ResolvedId,
  plugin: &str,
  error: &anyhow::Error,
  maps: &SourceMapChain,
) -> PipelineError {
  let diagnostic = error.downcast_ref::<Diagnostic>();
  let frame = diagnostic.and_then(|diagnostic| diagnostic.primary_frame().cloned());

  let loc = frame
    .as_ref()
    .and_then(|frame| frame.code_highlights.first())
    .and_then(|highlight| maps.original_position(highlight.start.line, highlight.start.column))
    .map(|loc| SourceLocation {
      file: loc.file.or_else(|| {
        resolved
          .file
          .as_ref()
          .map(|file| file.display().to_string())
      }),
      ..loc
    });

  PipelineError::Transform {
    id: resolved.id.clone(),
    plugin: plugin.to_string(),
    message: diagnostic
      .map(|diagnostic| diagnostic.message.clone())
      .unwrap_or_else(|| format!("{error:#}")),
    loc,
    frame,
  }
}
