use serde::Deserialize;
use serde::Serialize;

/// A 1-based line and column position in a source file
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Location {
  pub line: usize,
  pub column: usize,
}

/// A position inside a particular file, as reported by transformers
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
  pub file: Option<String>,
  pub line: usize,
  pub column: usize,
}
