use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use super::CodeFrame;

/// This is a user facing error for Kindling.
///
/// Usually but not always this is linked to a source-code location.
#[derive(Error, Debug, Deserialize, PartialEq, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
  /// A summary user-facing message
  pub message: String,

  /// Indicates where this diagnostic was emitted from, usually a plugin name
  pub origin: Option<String>,

  /// A stacktrace of the error (optional)
  pub stack: Option<String>,

  /// Name of the error (optional)
  pub name: Option<String>,

  /// The module id the error was raised for
  pub module_id: Option<String>,

  /// A list of files with source-code highlights
  pub code_frames: Option<Vec<CodeFrame>>,

  /// Hints for the user
  pub hints: Option<Vec<String>>,
}

impl Display for Diagnostic {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.message)
  }
}

impl Diagnostic {
  pub fn new(message: impl Into<String>) -> Self {
    Diagnostic {
      message: message.into(),
      ..Diagnostic::default()
    }
  }

  pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
    self.origin = Some(origin.into());
    self
  }

  pub fn with_module_id(mut self, module_id: impl Into<String>) -> Self {
    self.module_id = Some(module_id.into());
    self
  }

  pub fn with_code_frame(mut self, code_frame: CodeFrame) -> Self {
    self.code_frames.get_or_insert_with(Vec::new).push(code_frame);
    self
  }

  /// The first highlighted frame, which is what the overlay points at
  pub fn primary_frame(&self) -> Option<&CodeFrame> {
    self.code_frames.as_ref().and_then(|frames| frames.first())
  }
}
