use std::sync::Arc;

use kindling_core::plugin::LoaderPluginRef;
use kindling_core::plugin::ResolverPluginRef;
use kindling_core::plugin::TransformerPluginRef;
use kindling_plugin_import_analysis::ImportAnalysisTransformer;

use crate::KindlingOptions;

/// The plugins of each pipeline stage, consulted in registration order
#[derive(Clone, Debug, Default)]
pub struct Plugins {
  pub resolvers: Vec<ResolverPluginRef>,
  pub loaders: Vec<LoaderPluginRef>,
  pub transformers: Vec<TransformerPluginRef>,
}

impl Plugins {
  /// The built-in plugin set.
  ///
  /// Import analysis scans on worker threads unless `threads` is `Some(0)`, in which case it runs
  /// on the async runtime. Must be called from within a tokio runtime.
  pub fn builtin(options: &KindlingOptions) -> anyhow::Result<Self> {
    let import_analysis = match options.threads {
      Some(0) => ImportAnalysisTransformer::new()?,
      threads => ImportAnalysisTransformer::new()?.with_worker_pool(threads)?,
    };

    Ok(Plugins::default().with_transformer(Arc::new(import_analysis)))
  }

  pub fn with_resolver(mut self, resolver: ResolverPluginRef) -> Self {
    self.resolvers.push(resolver);
    self
  }

  pub fn with_loader(mut self, loader: LoaderPluginRef) -> Self {
    self.loaders.push(loader);
    self
  }

  pub fn with_transformer(mut self, transformer: TransformerPluginRef) -> Self {
    self.transformers.push(transformer);
    self
  }
}
