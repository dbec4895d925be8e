//! Messages exchanged between the dev server and connected clients.
//!
//! Every message is a single JSON record tagged by `type`.
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::diagnostic::Diagnostic;

/// Messages pushed from the server to clients
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrPayload {
  Connected,
  Update {
    updates: Vec<PendingUpdate>,
  },
  FullReload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
  },
  Prune {
    paths: Vec<String>,
  },
  Error {
    err: ErrorPayload,
  },
  Custom {
    event: String,
    #[serde(default)]
    data: Value,
  },
}

impl HmrPayload {
  pub fn to_json(&self) -> Result<String, ProtocolError> {
    serde_json::to_string(self).map_err(|source| ProtocolError::Encode { source })
  }

  pub fn from_json(message: &str) -> Result<Self, ProtocolError> {
    serde_json::from_str(message).map_err(|source| ProtocolError::Malformed {
      message: message.to_string(),
      source,
    })
  }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
  Reload,
  FullReload,
  Prune,
}

/// A single module replacement delivered to clients
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
  #[serde(rename = "type")]
  pub kind: UpdateKind,
  /// The module whose change is being delivered
  pub path: String,
  /// The module that accepts the change, equal to `path` when the module accepts itself
  pub accepted_path: String,
  pub timestamp: u64,
}

impl PendingUpdate {
  pub fn reload(path: impl Into<String>, accepted_path: impl Into<String>, timestamp: u64) -> Self {
    PendingUpdate {
      kind: UpdateKind::Reload,
      path: path.into(),
      accepted_path: accepted_path.into(),
      timestamp,
    }
  }

  pub fn is_self_update(&self) -> bool {
    self.path == self.accepted_path
  }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLocation {
  pub file: Option<String>,
  pub line: usize,
  pub column: usize,
}

/// The error overlay's view of a failed transform
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
  pub message: String,
  #[serde(default)]
  pub stack: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub loc: Option<ErrorLocation>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub frame: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub plugin: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
}

impl From<&Diagnostic> for ErrorPayload {
  fn from(diagnostic: &Diagnostic) -> Self {
    let frame = diagnostic.primary_frame();

    let loc = frame.and_then(|frame| {
      frame.code_highlights.first().map(|highlight| ErrorLocation {
        file: frame
          .file_path
          .as_ref()
          .map(|path| path.display().to_string()),
        line: highlight.start.line,
        column: highlight.start.column,
      })
    });

    ErrorPayload {
      message: diagnostic.message.clone(),
      stack: diagnostic.stack.clone().unwrap_or_default(),
      loc,
      frame: frame.and_then(|frame| frame.render()),
      plugin: diagnostic.origin.clone(),
      id: diagnostic.module_id.clone(),
    }
  }
}

/// Settings the dev server hands to the client runtime it serves
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientOptions {
  /// Show `error` payloads to the user, rather than only logging them
  pub overlay: bool,
}

impl Default for ClientOptions {
  fn default() -> Self {
    Self { overlay: true }
  }
}

/// Custom event a client sends when a module could not accept its own update
pub const INVALIDATE_EVENT: &str = "kindling:invalidate";

/// Data of an [`INVALIDATE_EVENT`] message
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct InvalidatePayload {
  pub path: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

/// Messages sent from clients to the server
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
  Custom {
    event: String,
    #[serde(default)]
    data: Value,
  },
}

impl ClientMessage {
  pub fn to_json(&self) -> Result<String, ProtocolError> {
    serde_json::to_string(self).map_err(|source| ProtocolError::Encode { source })
  }

  pub fn from_json(message: &str) -> Result<Self, ProtocolError> {
    serde_json::from_str(message).map_err(|source| ProtocolError::Malformed {
      message: message.to_string(),
      source,
    })
  }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
  #[error("Malformed message {message:?}")]
  Malformed {
    message: String,
    #[source]
    source: serde_json::Error,
  },
  #[error("Failed to encode message")]
  Encode {
    #[source]
    source: serde_json::Error,
  },
}
