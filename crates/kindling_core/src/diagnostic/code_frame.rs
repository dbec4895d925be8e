use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::CodeHighlight;

/// Lines of context printed above and below a highlight
const CONTEXT_LINES: usize = 2;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CodeFrame {
  /// Source-code of the file at the time of error
  pub code: Option<String>,

  /// Path to the source file if applicable.
  pub file_path: Option<PathBuf>,

  /// List of source-code highlight messages
  pub code_highlights: Vec<CodeHighlight>,
}

impl From<PathBuf> for CodeFrame {
  fn from(path: PathBuf) -> Self {
    CodeFrame {
      code: None,
      code_highlights: Vec::new(),
      file_path: Some(path),
    }
  }
}

impl CodeFrame {
  pub fn new(file_path: Option<PathBuf>, code: String, highlight: CodeHighlight) -> Self {
    CodeFrame {
      code: Some(code),
      file_path,
      code_highlights: vec![highlight],
    }
  }

  /// Render the first highlight as a plain-text frame:
  ///
  /// ```text
  /// 1  |  import a from './a'
  /// 2  |  a(
  ///    |   ^
  /// 3  |  export {}
  /// ```
  pub fn render(&self) -> Option<String> {
    let code = self.code.as_ref()?;
    let highlight = self.code_highlights.first()?;
    let lines = code.lines().collect::<Vec<_>>();
    if lines.is_empty() {
      return None;
    }

    let target = highlight.start.line.clamp(1, lines.len());
    let first = target.saturating_sub(CONTEXT_LINES).max(1);
    let last = (target + CONTEXT_LINES).min(lines.len());
    let gutter = last.to_string().len();

    let mut output = Vec::new();
    for line_number in first..=last {
      let line = lines[line_number - 1];
      output.push(format!("{line_number:<gutter$}  |  {line}"));

      if line_number == target {
        let column = highlight.start.column.max(1);
        let width = if highlight.end.line == highlight.start.line {
          highlight.end.column.saturating_sub(column).max(1)
        } else {
          line.len().saturating_sub(column - 1).max(1)
        };
        output.push(format!(
          "{:gutter$}  |  {}{}",
          "",
          " ".repeat(column - 1),
          "^".repeat(width)
        ));
      }
    }

    Some(output.join("\n"))
  }
}
