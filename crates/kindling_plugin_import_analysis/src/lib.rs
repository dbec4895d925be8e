pub use import_analysis_transformer::*;
pub use import_scanner::*;

mod accept_lexer;
mod import_analysis_transformer;
mod import_scanner;
