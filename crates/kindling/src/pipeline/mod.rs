pub use self::error::*;
pub use self::pipeline::*;
pub use self::plugins::*;

mod context;
mod error;
mod pending;
#[allow(clippy::module_inception)]
mod pipeline;
mod plugins;
mod resolve;
