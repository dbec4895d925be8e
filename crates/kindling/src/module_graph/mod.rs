pub use self::clock::*;
pub use self::module_graph::*;
pub use self::module_node::*;

mod clock;
#[allow(clippy::module_inception)]
mod module_graph;
mod module_node;
