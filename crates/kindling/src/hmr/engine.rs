use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexSet;
use kindling_core::hmr_payload::ErrorPayload;
use kindling_core::hmr_payload::HmrPayload;
use kindling_core::hmr_payload::InvalidatePayload;
use kindling_core::hmr_payload::INVALIDATE_EVENT;
use kindling_core::hmr_payload::PendingUpdate;
use kindling_core::types::TransformArtifact;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::collect_batch;
use super::propagate_to_importers;
use super::propagate_update;
use super::BatchState;
use super::Propagation;
use crate::hot_channel::ClientId;
use crate::hot_channel::HotChannelRef;
use crate::module_graph::ModuleGraphRef;
use crate::module_graph::ModuleIndex;
use crate::pipeline::PipelineError;
use crate::pipeline::TransformPipelineRef;
use crate::KindlingError;
use crate::KindlingOptions;
use crate::WatchEvent;
use crate::WatchEventType;

/// Decides what connected clients need to do about a batch of file changes
#[derive(Debug, Default)]
struct UpdatePlan {
  updates: IndexSet<PendingUpdate>,
  pruned: Vec<String>,
  full_reload: Option<Option<String>>,
}

impl UpdatePlan {
  fn full_reload(&mut self, path: Option<String>) {
    if self.full_reload.is_none() {
      self.full_reload = Some(path);
    }
  }

  fn add(&mut self, propagation: Propagation) {
    match propagation {
      Propagation::Boundaries(updates) => self.updates.extend(updates),
      Propagation::FullReload => self.full_reload(None),
    }
  }

  fn into_payloads(self) -> Vec<HmrPayload> {
    if let Some(path) = self.full_reload {
      return vec![HmrPayload::FullReload { path }];
    }

    let mut payloads = Vec::new();
    if !self.updates.is_empty() {
      payloads.push(HmrPayload::Update {
        updates: self.updates.into_iter().collect(),
      });
    }

    if !self.pruned.is_empty() {
      payloads.push(HmrPayload::Prune { paths: self.pruned });
    }

    payloads
  }
}

/// Processes file change batches one at a time against the shared module graph.
///
/// For each batch the changed modules are re-run through the pipeline first. Only when every
/// one of them succeeds are the results committed to the graph and hot update boundaries
/// searched, so a broken edit leaves clients and the cache on the last good version.
pub struct HmrEngine {
  graph: ModuleGraphRef,
  pipeline: TransformPipelineRef,
  channel: HotChannelRef,
  options: Arc<KindlingOptions>,
  state: Mutex<BatchState>,
  batch_lock: tokio::sync::Mutex<()>,
}

impl HmrEngine {
  pub fn new(
    pipeline: TransformPipelineRef,
    channel: HotChannelRef,
    options: Arc<KindlingOptions>,
  ) -> Self {
    Self {
      graph: pipeline.graph().clone(),
      pipeline,
      channel,
      options,
      state: Mutex::new(BatchState::Idle),
      batch_lock: tokio::sync::Mutex::new(()),
    }
  }

  pub fn state(&self) -> BatchState {
    *self.state.lock()
  }

  fn set_state(&self, state: BatchState) {
    tracing::trace!(?state, "Batch state changed");
    *self.state.lock() = state;
  }

  /// Consume watcher events until the sender is dropped, debouncing them into batches
  pub async fn run(&self, mut events: mpsc::Receiver<WatchEvent>) {
    while let Some(first) = events.recv().await {
      self.set_state(BatchState::Collecting);
      let batch = collect_batch(first, &mut events, self.options.hmr.debounce()).await;
      self.handle_batch(batch).await;
    }

    tracing::debug!("File watcher closed");
  }

  /// Process one batch of events and send the resulting payloads to every client
  #[tracing::instrument(level = "debug", skip_all, fields(events = events.len()))]
  pub async fn handle_batch(&self, events: Vec<WatchEvent>) -> Vec<HmrPayload> {
    let _batch = self.batch_lock.lock().await;

    self.set_state(BatchState::Resolving);
    let payloads = match self.plan_batch(events).await {
      Ok(plan) => plan.into_payloads(),
      Err(error) => {
        let error = KindlingError::from(&error);
        tracing::error!(%error, "Failed to update changed modules");

        vec![HmrPayload::Error {
          err: ErrorPayload::from(&error.diagnostic()),
        }]
      }
    };

    self.dispatch(&payloads);
    payloads
  }

  async fn plan_batch(&self, events: Vec<WatchEvent>) -> Result<UpdatePlan, PipelineError> {
    let mut plan = UpdatePlan::default();
    let mut changed = Vec::<(ModuleIndex, Arc<TransformArtifact>)>::new();
    let mut deleted = Vec::<ModuleIndex>::new();

    for event in events {
      let modules = self.graph.read().await.get_modules_by_file(&event.path);

      if modules.is_empty() {
        if self.is_full_reload_file(&event.path) {
          tracing::info!(path = ?event.path, "Page changed");
          plan.full_reload(Some(self.url_for_file(&event.path)));
        } else {
          tracing::trace!(path = ?event.path, "Ignoring change to file outside the module graph");
        }
        continue;
      }

      if event.kind == WatchEventType::Delete {
        if self.options.hmr.prune_on_delete {
          deleted.extend(modules);
        } else {
          tracing::info!(path = ?event.path, "Module deleted");
          plan.full_reload(None);
        }
        continue;
      }

      for index in modules {
        let Some(id) = self.module_id(index).await else {
          continue;
        };

        let artifact = self.pipeline.refresh(&id).await?;
        changed.push((index, artifact));
      }
    }

    let timestamp = self.graph.read().await.next_timestamp();
    let mut removed = self.pipeline.commit(changed.clone(), timestamp).await;

    if !deleted.is_empty() {
      let mut graph = self.graph.write().await;
      let mut seen = HashSet::new();
      for index in &deleted {
        graph.invalidate_module(*index, &mut seen, timestamp);
      }

      removed.extend(graph.remove_modules(deleted));
    }

    plan.pruned = removed.into_iter().map(|node| node.url).collect();

    if plan.full_reload.is_some() {
      return Ok(plan);
    }

    self.set_state(BatchState::Walking);
    let graph = self.graph.read().await;
    for (index, _) in &changed {
      let propagation = propagate_update(&graph, *index, timestamp);
      if propagation == Propagation::FullReload {
        tracing::info!(
          id = ?graph.node(*index).map(|node| &node.id),
          "No hot update boundary, reloading the page"
        );
      }

      plan.add(propagation);
      if plan.full_reload.is_some() {
        break;
      }
    }

    Ok(plan)
  }

  /// Handle a module that rejected its own update by updating its importers instead
  #[tracing::instrument(level = "debug", skip(self))]
  pub async fn handle_invalidate(&self, path: &str, message: Option<String>) -> Vec<HmrPayload> {
    let _batch = self.batch_lock.lock().await;
    self.set_state(BatchState::Walking);

    let mut plan = UpdatePlan::default();
    {
      let mut graph = self.graph.write().await;
      let Some(index) = graph
        .get_module_by_url(path)
        .or_else(|| graph.get_module_by_id(path))
      else {
        tracing::debug!(path, "Invalidated module is not part of the module graph");
        self.set_state(BatchState::Idle);
        return Vec::new();
      };

      match &message {
        Some(message) => tracing::info!(path, "Invalidated: {message}"),
        None => tracing::info!(path, "Invalidated"),
      }

      let timestamp = graph.next_timestamp();
      let mut seen = HashSet::new();
      for importer in graph.importers(index) {
        graph.invalidate_module(importer, &mut seen, timestamp);
      }

      plan.add(propagate_to_importers(&graph, index, timestamp));
    }

    let payloads = plan.into_payloads();
    self.dispatch(&payloads);
    payloads
  }

  /// Answer `kindling:invalidate` messages from clients.
  ///
  /// Must be called from within a tokio runtime, which handles the invalidations.
  pub fn listen_for_invalidations(self: &Arc<Self>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      tracing::warn!("Not listening for invalidations outside of a tokio runtime");
      return;
    };

    // Weak, the channel usually outlives the engine
    let engine = Arc::downgrade(self);
    self.channel.on(
      INVALIDATE_EVENT,
      Arc::new(move |client_id: ClientId, data: Value| {
        let request = match serde_json::from_value::<InvalidatePayload>(data) {
          Ok(request) => request,
          Err(error) => {
            tracing::warn!(client_id, %error, "Ignoring malformed invalidation");
            return;
          }
        };

        let Some(engine) = engine.upgrade() else {
          return;
        };

        runtime.spawn(async move {
          engine
            .handle_invalidate(&request.path, request.message)
            .await;
        });
      }),
    );
  }

  fn dispatch(&self, payloads: &[HmrPayload]) {
    self.set_state(BatchState::Dispatching);
    for payload in payloads {
      self.channel.send(payload);
    }
    self.set_state(BatchState::Idle);
  }

  async fn module_id(&self, index: ModuleIndex) -> Option<String> {
    let graph = self.graph.read().await;
    graph.node(index).map(|node| node.id.clone())
  }

  fn is_full_reload_file(&self, path: &Path) -> bool {
    path
      .extension()
      .and_then(|extension| extension.to_str())
      .is_some_and(|extension| {
        self
          .options
          .hmr
          .full_reload_extensions
          .iter()
          .any(|reload| reload.trim_start_matches('.') == extension)
      })
  }

  fn url_for_file(&self, path: &Path) -> String {
    let relative = path.strip_prefix(&self.options.project_root).unwrap_or(path);
    let relative = relative.to_string_lossy().replace('\\', "/");

    format!("/{}", relative.trim_start_matches('/'))
  }
}
