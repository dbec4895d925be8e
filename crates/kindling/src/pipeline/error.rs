use kindling_core::diagnostic::CodeFrame;
use kindling_core::diagnostic::CodeHighlight;
use kindling_core::diagnostic::Diagnostic;
use kindling_core::types::Location;
use kindling_core::types::SourceLocation;
use thiserror::Error;

fn importer_suffix(importer: &Option<String>) -> String {
  importer
    .as_ref()
    .map(|importer| format!(" imported by {importer}"))
    .unwrap_or_default()
}

/// Why a module could not be produced, tagged by the stage that failed
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PipelineError {
  #[error("Failed to resolve {specifier:?}{}", importer_suffix(.importer))]
  Resolution {
    specifier: String,
    importer: Option<String>,
  },

  #[error("Failed to load {id}: {message}")]
  Load { id: String, message: String },

  #[error("[{plugin}] {message}")]
  Transform {
    id: String,
    plugin: String,
    message: String,
    /// Position in the original source when it could be traced back
    loc: Option<SourceLocation>,
    frame: Option<CodeFrame>,
  },
}

impl PipelineError {
  pub fn module_id(&self) -> Option<&str> {
    match self {
      PipelineError::Resolution { importer, .. } => importer.as_deref(),
      PipelineError::Load { id, .. } => Some(id),
      PipelineError::Transform { id, .. } => Some(id),
    }
  }
}

impl From<&PipelineError> for Diagnostic {
  fn from(error: &PipelineError) -> Self {
    let diagnostic = Diagnostic::new(error.to_string());

    let diagnostic = match error.module_id() {
      Some(id) => diagnostic.with_module_id(id),
      None => diagnostic,
    };

    match error {
      PipelineError::Resolution { .. } => diagnostic.with_origin("kindling:resolve"),
      PipelineError::Load { .. } => diagnostic.with_origin("kindling:load"),
      PipelineError::Transform {
        plugin,
        message,
        loc,
        frame,
        ..
      } => {
        let mut diagnostic = Diagnostic {
          message: message.clone(),
          ..diagnostic.with_origin(plugin.clone())
        };

        let frame = frame.clone().or_else(|| {
          loc.as_ref().map(|loc| CodeFrame {
            code: None,
            file_path: loc.file.as_ref().map(Into::into),
            code_highlights: vec![CodeHighlight::from(Location {
              line: loc.line,
              column: loc.column,
            })],
          })
        });

        if let Some(frame) = frame {
          diagnostic = diagnostic.with_code_frame(frame);
        }

        diagnostic
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn formats_resolution_errors() {
    let error = PipelineError::Resolution {
      specifier: String::from("./missing"),
      importer: Some(String::from("/src/a.js")),
    };

    assert_eq!(
      error.to_string(),
      "Failed to resolve \"./missing\" imported by /src/a.js"
    );

    let entry = PipelineError::Resolution {
      specifier: String::from("/nope.js"),
      importer: None,
    };
    assert_eq!(entry.to_string(), "Failed to resolve \"/nope.js\"");
  }

  #[test]
  fn transform_errors_point_at_their_location() {
    let error = PipelineError::Transform {
      id: String::from("/src/a.js"),
      plugin: String::from("import-analysis"),
      message: String::from("Unexpected token"),
      loc: Some(SourceLocation {
        file: Some(String::from("/app/src/a.ts")),
        line: 3,
        column: 7,
      }),
      frame: None,
    };

    let diagnostic = Diagnostic::from(&error);

    assert_eq!(diagnostic.message, "Unexpected token");
    assert_eq!(diagnostic.origin.as_deref(), Some("import-analysis"));
    assert_eq!(diagnostic.module_id.as_deref(), Some("/src/a.js"));

    let frame = diagnostic.primary_frame().unwrap();
    assert_eq!(frame.file_path, Some("/app/src/a.ts".into()));
    assert_eq!(
      frame.code_highlights,
      vec![CodeHighlight::from(Location { line: 3, column: 7 })]
    );
  }
}
