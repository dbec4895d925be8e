//! Turns file changes into hot update payloads for connected clients
pub use self::batch::*;
pub use self::engine::*;
pub use self::propagate::*;

mod batch;
mod engine;
mod propagate;
