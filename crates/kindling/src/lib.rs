pub use error::*;
pub use kindling::*;
pub use kindling_filesystem as file_system;
pub use options::*;
pub use watch::*;

pub mod cache;
pub mod hmr;
pub mod hot_channel;
pub mod kindling;
pub mod module_graph;
pub mod pipeline;

mod error;
mod options;
mod watch;

#[cfg(test)]
mod test_utils;
