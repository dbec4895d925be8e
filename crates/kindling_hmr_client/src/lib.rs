pub use client::*;
pub use host::*;
pub use hot_context::*;
pub use hot_data::*;
pub use kindling_core::hmr_payload::ClientOptions;

mod client;
mod host;
mod hot_context;
mod hot_data;
mod registry;

pub use registry::AcceptCallback;
pub use registry::BoxFuture;
pub use registry::CustomListener;
pub use registry::DataHandler;
pub use registry::ListenerId;
