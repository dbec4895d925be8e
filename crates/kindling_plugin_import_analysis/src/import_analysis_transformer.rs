use std::fmt::Debug;
use std::fmt::Formatter;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use kindling_core::plugin::PipelineContext;
use kindling_core::plugin::TransformInput;
use kindling_core::plugin::TransformOutput;
use kindling_core::plugin::TransformerPlugin;
use kindling_core::types::clean_url;
use kindling_core::types::HotUpdatePolicy;
use kindling_core::types::ModuleMeta;
use kindling_worker_pool::PoolError;
use kindling_worker_pool::WorkerContext;
use kindling_worker_pool::WorkerPool;
use kindling_worker_pool::WorkerPoolOptions;

use crate::ImportScanner;
use crate::IMPORT_ANALYSIS_ORIGIN;

type ScanPool = WorkerPool<(Option<PathBuf>, String), ModuleMeta>;

const STYLE_EXTENSIONS: [&str; 8] = [
  "css", "less", "sass", "scss", "styl", "stylus", "pcss", "postcss",
];

/// Declares what a module imports and which hot updates it accepts.
///
/// Style sheets are never scanned; they declare [`HotUpdatePolicy::LeafSwap`] so a change to one
/// is applied in place without notifying its importers.
pub struct ImportAnalysisTransformer {
  scanner: Arc<ImportScanner>,
  style_extensions: Vec<String>,
  pool: Option<ScanPool>,
}

impl Debug for ImportAnalysisTransformer {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ImportAnalysisTransformer")
      .field("style_extensions", &self.style_extensions)
      .field("pool", &self.pool.as_ref().map(|pool| pool.max_workers()))
      .finish()
  }
}

impl ImportAnalysisTransformer {
  pub fn new() -> Result<Self, anyhow::Error> {
    Ok(Self {
      scanner: Arc::new(ImportScanner::new()?),
      style_extensions: STYLE_EXTENSIONS.into_iter().map(String::from).collect(),
      pool: None,
    })
  }

  pub fn with_style_extensions<I, S>(mut self, extensions: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.style_extensions = extensions.into_iter().map(Into::into).collect();
    self
  }

  /// Scan modules on a pool of worker threads instead of the async runtime.
  ///
  /// Must be called from within a tokio runtime.
  pub fn with_worker_pool(mut self, max_workers: Option<usize>) -> Result<Self, PoolError> {
    let scanner = self.scanner.clone();
    let pool = WorkerPool::new(
      WorkerPoolOptions {
        max_workers,
        ..WorkerPoolOptions::default()
      },
      move |(file, code): (Option<PathBuf>, String), _: &WorkerContext| {
        scanner
          .scan(file.as_deref(), &code)
          .map_err(anyhow::Error::new)
      },
    )?;

    self.pool = Some(pool);
    Ok(self)
  }

  fn is_style(&self, id: &str) -> bool {
    Path::new(clean_url(id))
      .extension()
      .and_then(|extension| extension.to_str())
      .is_some_and(|extension| self.style_extensions.iter().any(|style| style == extension))
  }

  async fn scan(&self, input: &TransformInput) -> Result<ModuleMeta, anyhow::Error> {
    let Some(pool) = &self.pool else {
      return Ok(self.scanner.scan(input.file.as_deref(), &input.code)?);
    };

    match pool.run((input.file.clone(), input.code.clone())).await {
      Ok(meta) => Ok(meta),
      Err(PoolError::Task(error)) => Err(error),
      Err(error) => Err(anyhow::Error::new(error)),
    }
  }
}

#[async_trait]
impl TransformerPlugin for ImportAnalysisTransformer {
  fn name(&self) -> &str {
    IMPORT_ANALYSIS_ORIGIN
  }

  #[tracing::instrument(level = "debug", skip_all, fields(id = %input.id))]
  async fn transform(
    &self,
    input: TransformInput,
    _ctx: &dyn PipelineContext,
  ) -> Result<Option<TransformOutput>, anyhow::Error> {
    let meta = if self.is_style(&input.id) {
      ModuleMeta {
        hot_update_policy: Some(HotUpdatePolicy::LeafSwap),
        ..ModuleMeta::default()
      }
    } else {
      self.scan(&input).await?
    };

    Ok(Some(TransformOutput {
      code: input.code,
      map: None,
      meta,
    }))
  }
}
