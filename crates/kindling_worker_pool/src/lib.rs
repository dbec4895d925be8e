pub use error::*;
pub use parent::*;
pub use pool::*;
pub use worker::WorkerContext;

mod error;
mod parent;
mod pool;
mod worker;
