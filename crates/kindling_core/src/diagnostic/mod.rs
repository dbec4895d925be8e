//! User-facing errors rendered by the error overlay
mod code_frame;
mod code_highlight;
mod diagnostic;

pub use self::code_frame::*;
pub use self::code_highlight::*;
pub use self::diagnostic::*;
