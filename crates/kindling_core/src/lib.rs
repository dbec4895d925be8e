pub mod diagnostic;
pub mod hash;
pub mod hmr_payload;
pub mod messenger;
pub mod plugin;
pub mod types;
