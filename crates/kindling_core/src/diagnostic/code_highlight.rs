use serde::Deserialize;
use serde::Serialize;

use crate::types::Location;

/// A range of a code frame, 1-based and inclusive on both ends
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CodeHighlight {
  pub start: Location,
  pub end: Location,

  /// Shown next to the range
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl CodeHighlight {
  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }
}

impl From<Location> for CodeHighlight {
  fn from(location: Location) -> Self {
    CodeHighlight {
      start: location.clone(),
      end: location,
      message: None,
    }
  }
}

/// A single `[line, column]` position
impl From<[usize; 2]> for CodeHighlight {
  fn from([line, column]: [usize; 2]) -> Self {
    CodeHighlight::from(Location { line, column })
  }
}
