pub use self::in_memory::*;
pub use self::transform_cache::*;

mod in_memory;
mod transform_cache;
