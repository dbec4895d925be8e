use async_trait::async_trait;
use kindling_core::plugin::PipelineContext;
use kindling_core::plugin::ResolvedId;
use kindling_core::types::ModuleRef;

use super::TransformPipeline;

/// The view of the pipeline given to transformers of one module
pub(crate) struct RequestContext<'a> {
  pub pipeline: &'a TransformPipeline,
  pub module: &'a ResolvedId,
  /// Ids being transformed along this request chain, ending with `module`
  pub chain: &'a [String],
}

#[async_trait]
impl PipelineContext for RequestContext<'_> {
  fn module_id(&self) -> &str {
    &self.module.id
  }

  async fn request(&self, url: &str) -> Result<ModuleRef, anyhow::Error> {
    let resolved = self.pipeline.resolve(url, Some(self.module)).await?;

    // Modules further up this chain, or transforms elsewhere that are waiting on this one,
    // cannot finish before this request does
    let waiting = if self.chain.contains(&resolved.id) {
      None
    } else {
      self
        .pipeline
        .pending()
        .wait_for(&self.module.id, &resolved.id)
    };

    let Some(_waiting) = waiting else {
      tracing::debug!(
        importer = %self.module.id,
        id = %resolved.id,
        "Circular request, returning a deferred module"
      );
      return Ok(ModuleRef::Deferred { id: resolved.id });
    };

    let mut chain = self.chain.to_vec();
    chain.push(resolved.id.clone());

    let artifact = self
      .pipeline
      .transform_request(&resolved, &resolved.id, &chain)
      .await?;

    Ok(ModuleRef::Ready(artifact))
  }
}
