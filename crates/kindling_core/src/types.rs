pub use self::location::*;
pub use self::module_id::*;
pub use self::module_meta::*;
pub use self::source_map_chain::*;
pub use self::transform_artifact::*;

mod location;
mod module_id;
mod module_meta;
mod source_map_chain;
mod transform_artifact;
