use std::sync::Arc;

pub use loader_plugin::*;
pub use pipeline_context::*;
pub use resolver_plugin::*;
pub use transformer_plugin::*;

mod loader_plugin;
mod pipeline_context;
mod resolver_plugin;
mod transformer_plugin;

pub type ResolverPluginRef = Arc<dyn ResolverPlugin>;
pub type LoaderPluginRef = Arc<dyn LoaderPlugin>;
pub type TransformerPluginRef = Arc<dyn TransformerPlugin>;
