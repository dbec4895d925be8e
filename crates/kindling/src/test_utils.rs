use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kindling_core::diagnostic::CodeFrame;
use kindling_core::diagnostic::CodeHighlight;
use kindling_core::diagnostic::Diagnostic;
use kindling_core::hmr_payload::HmrPayload;
use kindling_core::messenger::HmrTransport;
use kindling_core::plugin::LoadResult;
use kindling_core::plugin::LoaderPlugin;
use kindling_core::plugin::PipelineContext;
use kindling_core::plugin::ResolvedId;
use kindling_core::plugin::TransformInput;
use kindling_core::plugin::TransformOutput;
use kindling_core::plugin::TransformerPlugin;
use kindling_core::types::HotUpdatePolicy;
use kindling_core::types::ImportSpecifier;
use kindling_core::types::ModuleMeta;
use kindling_core::types::ModuleRef;
use kindling_filesystem::in_memory_file_system::InMemoryFileSystem;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::RwLock;

use crate::module_graph::ModuleGraph;
use crate::module_graph::ModuleGraphRef;
use crate::pipeline::Plugins;
use crate::pipeline::TransformPipeline;
use crate::pipeline::TransformPipelineRef;
use crate::HmrOptions;
use crate::KindlingOptions;

pub(crate) fn test_options() -> KindlingOptions {
  KindlingOptions {
    project_root: PathBuf::from("/app"),
    hmr: HmrOptions {
      debounce_ms: 5,
      ..HmrOptions::default()
    },
    ..KindlingOptions::default()
  }
}

pub(crate) fn test_file_system(files: &[(&str, &str)]) -> Arc<InMemoryFileSystem> {
  let fs = Arc::new(InMemoryFileSystem::default());

  for (path, contents) in files {
    fs.write_file(Path::new(path), contents.to_string());
  }

  fs
}

pub(crate) fn make_test_pipeline(
  fs: Arc<InMemoryFileSystem>,
  plugins: Plugins,
) -> (ModuleGraphRef, TransformPipelineRef) {
  make_test_pipeline_with_options(fs, plugins, test_options())
}

pub(crate) fn make_test_pipeline_with_options(
  fs: Arc<InMemoryFileSystem>,
  plugins: Plugins,
  options: KindlingOptions,
) -> (ModuleGraphRef, TransformPipelineRef) {
  let graph = Arc::new(RwLock::new(ModuleGraph::default()));
  let pipeline = TransformPipeline::new(graph.clone(), fs, Arc::new(options), plugins);

  (graph, Arc::new(pipeline))
}

/// Lets a test observe a transform while it is in flight
#[derive(Debug, Default)]
pub(crate) struct Gate {
  pub started: Notify,
  pub release: Notify,
}

/// Reads hot update metadata from one directive per line instead of parsing real modules:
///
/// ```text
/// import ./b.js value other
/// soft-import ./types.js
/// accept ./b.js
/// accept-self
/// accept-exports value
/// leaf-swap
/// request ./b.js
/// fail Unexpected token
/// fail-at 1 3 Unexpected token
/// ```
#[derive(Debug, Default)]
pub(crate) struct FixtureTransformer {
  delay: Option<Duration>,
  gate: Option<Arc<Gate>>,
  counts: Mutex<HashMap<String, usize>>,
  requested: Mutex<Vec<(String, ModuleRef)>>,
}

impl FixtureTransformer {
  /// Sleep before transforming each module
  pub fn with_delay(delay: Duration) -> Self {
    Self {
      delay: Some(delay),
      ..Self::default()
    }
  }

  /// Hold every transform until the gate is released
  pub fn with_gate(gate: Arc<Gate>) -> Self {
    Self {
      gate: Some(gate),
      ..Self::default()
    }
  }

  pub fn transform_count(&self, id: &str) -> usize {
    self.counts.lock().get(id).copied().unwrap_or_default()
  }

  pub fn requested(&self) -> Vec<(String, ModuleRef)> {
    self.requested.lock().clone()
  }
}

#[async_trait]
impl TransformerPlugin for FixtureTransformer {
  fn name(&self) -> &str {
    "fixture"
  }

  async fn transform(
    &self,
    input: TransformInput,
    ctx: &dyn PipelineContext,
  ) -> Result<Option<TransformOutput>, anyhow::Error> {
    *self.counts.lock().entry(input.id.clone()).or_default() += 1;

    if let Some(gate) = &self.gate {
      gate.started.notify_one();
      gate.release.notified().await;
    }

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    let mut meta = ModuleMeta::default();

    for line in input.code.lines() {
      let mut words = line.split_whitespace();
      let rest = || line.split_whitespace().skip(1).collect::<Vec<_>>();

      match words.next() {
        Some("import") => {
          let parts = rest();
          if let Some((specifier, bindings)) = parts.split_first() {
            meta
              .imports
              .push(ImportSpecifier::new(*specifier).with_bindings(bindings.iter().copied()));
          }
        }
        Some("soft-import") => {
          for specifier in rest() {
            meta.imports.push(ImportSpecifier::new(specifier).soft());
          }
        }
        Some("accept") => meta
          .accepted_deps
          .extend(rest().into_iter().map(String::from)),
        Some("accept-self") => meta.self_accepting = true,
        Some("accept-exports") => meta
          .accepted_exports
          .get_or_insert_with(Vec::new)
          .extend(rest().into_iter().map(String::from)),
        Some("leaf-swap") => meta.hot_update_policy = Some(HotUpdatePolicy::LeafSwap),
        Some("request") => {
          for specifier in rest() {
            let module = ctx.request(specifier).await?;
            self
              .requested
              .lock()
              .push((ctx.module_id().to_string(), module));
          }
        }
        Some("fail") => return Err(anyhow::anyhow!(rest().join(" "))),
        Some("fail-at") => {
          let parts = rest();
          let line_number = parts.first().and_then(|n| n.parse().ok()).unwrap_or(1);
          let column = parts.get(1).and_then(|n| n.parse().ok()).unwrap_or(1);
          let diagnostic = Diagnostic::new(parts[2..].join(" ")).with_code_frame(CodeFrame::new(
            input.file.clone(),
            input.code.clone(),
            CodeHighlight::from([line_number, column]),
          ));

          return Err(anyhow::Error::new(diagnostic));
        }
        _ => {}
      }
    }

    Ok(Some(TransformOutput {
      code: input.code,
      map: None,
      meta,
    }))
  }
}

/// Fails to load one module id and defers everything else to the file system
#[derive(Debug)]
pub(crate) struct FailingLoader {
  pub id: String,
}

#[async_trait]
impl LoaderPlugin for FailingLoader {
  async fn load(&self, resolved: &ResolvedId) -> Result<Option<LoadResult>, anyhow::Error> {
    if resolved.id == self.id {
      return Err(anyhow::anyhow!("disk on fire"));
    }

    Ok(None)
  }
}

/// Records every message sent to a client
#[derive(Debug)]
pub(crate) struct RecordingTransport {
  ready: AtomicBool,
  messages: Mutex<Vec<String>>,
}

impl Default for RecordingTransport {
  fn default() -> Self {
    Self {
      ready: AtomicBool::new(true),
      messages: Mutex::new(Vec::new()),
    }
  }
}

impl RecordingTransport {
  pub fn set_ready(&self, ready: bool) {
    self.ready.store(ready, Ordering::SeqCst);
  }

  pub fn messages(&self) -> Vec<String> {
    self.messages.lock().clone()
  }

  pub fn payloads(&self) -> Vec<HmrPayload> {
    self
      .messages()
      .iter()
      .filter_map(|message| HmrPayload::from_json(message).ok())
      .collect()
  }
}

impl HmrTransport for RecordingTransport {
  fn is_ready(&self) -> bool {
    self.ready.load(Ordering::SeqCst)
  }

  fn send(&self, message: String) -> anyhow::Result<()> {
    self.messages.lock().push(message);
    Ok(())
  }
}
