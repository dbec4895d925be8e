use async_trait::async_trait;

use crate::types::ModuleRef;

/// Gives transformers access to other modules while they run
#[async_trait]
pub trait PipelineContext: Send + Sync {
  /// Id of the module being transformed
  fn module_id(&self) -> &str;

  /// Request another module's artifact through the pipeline.
  ///
  /// When the module is already being transformed further up the current request chain
  /// this returns [`ModuleRef::Deferred`] rather than waiting on itself.
  async fn request(&self, url: &str) -> Result<ModuleRef, anyhow::Error>;
}
