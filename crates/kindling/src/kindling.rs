use std::sync::Arc;

use kindling_core::hmr_payload::ClientOptions;
use kindling_core::hmr_payload::HmrPayload;
use kindling_core::messenger::HmrTransportRef;
use kindling_core::types::TransformArtifact;
use kindling_filesystem::os_file_system::OsFileSystem;
use kindling_filesystem::FileSystemRef;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::cache::TransformCacheRef;
use crate::hmr::HmrEngine;
use crate::hot_channel::ClientId;
use crate::hot_channel::HotChannel;
use crate::hot_channel::HotChannelRef;
use crate::module_graph::ModuleGraph;
use crate::module_graph::ModuleGraphRef;
use crate::pipeline::Plugins;
use crate::pipeline::TransformPipeline;
use crate::pipeline::TransformPipelineRef;
use crate::KindlingError;
use crate::KindlingOptions;
use crate::WatchEvent;

/// A dev server session: one module graph shared by the pipeline serving requests and the
/// engine turning file changes into hot updates
pub struct Kindling {
  pub channel: HotChannelRef,
  pub engine: Arc<HmrEngine>,
  pub fs: FileSystemRef,
  pub graph: ModuleGraphRef,
  pub options: Arc<KindlingOptions>,
  pub pipeline: TransformPipelineRef,
}

impl Kindling {
  pub fn new(
    fs: Option<FileSystemRef>,
    options: KindlingOptions,
    plugins: Plugins,
    cache: Option<TransformCacheRef>,
  ) -> Self {
    let fs = fs.unwrap_or_else(|| Arc::new(OsFileSystem));
    let options = Arc::new(options);
    let graph = Arc::new(RwLock::new(ModuleGraph::default()));

    let mut pipeline = TransformPipeline::new(graph.clone(), fs.clone(), options.clone(), plugins);
    if let Some(cache) = cache {
      pipeline = pipeline.with_cache(cache);
    }

    let pipeline = Arc::new(pipeline);
    let channel = Arc::new(HotChannel::new());
    let engine = Arc::new(HmrEngine::new(
      pipeline.clone(),
      channel.clone(),
      options.clone(),
    ));

    tracing::debug!(project_root = ?options.project_root, "Created dev server session");

    Self {
      channel,
      engine,
      fs,
      graph,
      options,
      pipeline,
    }
  }

  /// Set up tracing for this session from `log_level` and the environment.
  ///
  /// Only the first call in a process has an effect.
  pub fn init_monitoring(&self) -> anyhow::Result<()> {
    kindling_monitoring::initialize_monitoring(self.options.monitoring_options()?)
  }

  /// Options to serve the client runtime with
  pub fn client_options(&self) -> ClientOptions {
    self.options.hmr.client_options()
  }

  /// Serve a module requested by the page
  pub async fn request(&self, url: &str) -> Result<Arc<TransformArtifact>, KindlingError> {
    self
      .pipeline
      .request(url)
      .await
      .map_err(|error| KindlingError::from(&error))
  }

  pub fn connect(&self, transport: HmrTransportRef) -> ClientId {
    self.channel.register_client(transport)
  }

  pub fn disconnect(&self, client_id: ClientId) {
    self.channel.remove_client(client_id);
  }

  pub fn handle_client_message(&self, client_id: ClientId, message: &str) {
    self.channel.handle_client_message(client_id, message);
  }

  /// Start turning watcher events into hot updates.
  ///
  /// Also answers client invalidations. The task ends when the sending side of `events` is
  /// dropped.
  pub fn watch(&self, events: mpsc::Receiver<WatchEvent>) -> JoinHandle<()> {
    self.engine.listen_for_invalidations();

    let engine = self.engine.clone();
    tokio::spawn(async move { engine.run(events).await })
  }

  /// Process a batch of events right away, bypassing the debounce window
  pub async fn handle_batch(&self, events: Vec<WatchEvent>) -> Vec<HmrPayload> {
    self.engine.handle_batch(events).await
  }
}
