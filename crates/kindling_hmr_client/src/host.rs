use async_trait::async_trait;
use kindling_core::hmr_payload::ErrorPayload;
use kindling_core::hmr_payload::PendingUpdate;
use mockall::automock;
use serde_json::Value;

/// The exports of one evaluated module instance
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleNamespace {
  pub url: String,
  pub exports: Value,
}

/// Loads fresh module instances for hot updates
#[automock]
#[async_trait]
pub trait ModuleImporter: Send + Sync {
  /// Evaluate a new instance of `target`.
  ///
  /// Implementations bust their module cache with `update.timestamp`, see
  /// [`kindling_core::types::with_timestamp_query`].
  async fn import_updated_module(
    &self,
    update: &PendingUpdate,
    target: &str,
  ) -> anyhow::Result<ModuleNamespace>;
}

/// Page level reactions to server messages
#[automock]
pub trait ClientHost: Send + Sync {
  fn connected(&self) {}

  fn full_reload(&self, path: Option<String>);

  fn show_error(&self, err: &ErrorPayload);

  fn clear_error(&self) {}
}
