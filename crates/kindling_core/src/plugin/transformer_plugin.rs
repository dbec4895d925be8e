use std::any::Any;
use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;

use super::PipelineContext;
use crate::types::ModuleMeta;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformInput {
  pub id: String,
  pub file: Option<PathBuf>,
  /// The output of the previous transformer, or the loaded source
  pub code: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformOutput {
  pub code: String,
  pub map: Option<String>,
  pub meta: ModuleMeta,
}

/// Compile a single module and report what it imports and accepts
///
/// Every transformer runs in registration order, each receiving the previous one's output.
/// Returning `None` leaves the module untouched.
///
/// To point the error overlay at a source location, return a
/// [`Diagnostic`](crate::diagnostic::Diagnostic) as the error.
///
#[async_trait]
pub trait TransformerPlugin: Any + Debug + Send + Sync {
  /// Name reported in diagnostics and error payloads
  fn name(&self) -> &str {
    std::any::type_name::<Self>()
  }

  async fn transform(
    &self,
    input: TransformInput,
    ctx: &dyn PipelineContext,
  ) -> Result<Option<TransformOutput>, anyhow::Error>;
}
