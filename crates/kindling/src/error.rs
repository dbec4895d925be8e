use kindling_core::diagnostic::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::PipelineError;

/// Errors surfaced to users of the dev server
#[derive(Clone, Debug, Error, PartialEq)]
pub enum KindlingError {
  #[error("{0}")]
  Diagnostic(Diagnostic),
  #[error("{0}")]
  Unknown(String),
}

impl KindlingError {
  /// The user-facing shape of the error, as shown by the error overlay
  pub fn diagnostic(&self) -> Diagnostic {
    match self {
      KindlingError::Diagnostic(diagnostic) => diagnostic.clone(),
      KindlingError::Unknown(message) => Diagnostic::new(message.clone()),
    }
  }
}

impl Serialize for KindlingError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    match self {
      KindlingError::Diagnostic(diagnostic) => diagnostic.serialize(serializer),
      KindlingError::Unknown(message) => message.serialize(serializer),
    }
  }
}

impl From<&PipelineError> for KindlingError {
  fn from(error: &PipelineError) -> Self {
    Self::Diagnostic(Diagnostic::from(error))
  }
}

impl From<&anyhow::Error> for KindlingError {
  fn from(error: &anyhow::Error) -> Self {
    if let Some(diagnostic) = error.downcast_ref::<Diagnostic>() {
      Self::Diagnostic(diagnostic.clone())
    } else if let Some(error) = error.downcast_ref::<PipelineError>() {
      Self::from(error)
    } else {
      Self::Unknown(format!("{error:#}"))
    }
  }
}
