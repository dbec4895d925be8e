use std::path::Path;

use kindling_core::diagnostic::CodeFrame;
use kindling_core::diagnostic::CodeHighlight;
use kindling_core::diagnostic::Diagnostic;
use kindling_core::types::ImportSpecifier;
use kindling_core::types::ModuleMeta;
use regex::Regex;

use crate::accept_lexer::lex_accepted_names;

pub const IMPORT_ANALYSIS_ORIGIN: &str = "kindling:import-analysis";

/// Finds imports and hot accept calls in JavaScript modules with regular expressions.
///
/// This is deliberately shallow: statements are matched at the start of a line, so commented
/// out imports are still picked up.
#[derive(Debug)]
pub struct ImportScanner {
  static_imports: Regex,
  reexports: Regex,
  dynamic_imports: Regex,
  hot_calls: Regex,
}

impl ImportScanner {
  pub fn new() -> Result<Self, regex::Error> {
    Ok(Self {
      static_imports: Regex::new(
        r#"(?m)^[ \t]*import\s+(?:(?P<clause>[\w$*{}\s,]+?)\s+from\s+)?["'](?P<specifier>[^"'\n]+)["']"#,
      )?,
      reexports: Regex::new(
        r#"(?m)^[ \t]*export\s+(?P<clause>(?:type\s+)?(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\}))\s*from\s+["'](?P<specifier>[^"'\n]+)["']"#,
      )?,
      dynamic_imports: Regex::new(r#"\bimport\s*\(\s*["'](?P<specifier>[^"'\n]+)["']\s*\)"#)?,
      hot_calls: Regex::new(r"\bimport\.meta\.hot\.(?P<method>acceptExports|accept)\s*\(")?,
    })
  }

  /// Collect the imports and hot update declarations of a module
  pub fn scan(&self, file: Option<&Path>, code: &str) -> Result<ModuleMeta, Diagnostic> {
    let mut meta = ModuleMeta::default();

    for captures in self.static_imports.captures_iter(code) {
      let clause = captures.name("clause").map(|clause| clause.as_str());
      meta
        .imports
        .push(import_from_clause(&captures["specifier"], clause));
    }

    for captures in self.reexports.captures_iter(code) {
      let clause = captures.name("clause").map(|clause| clause.as_str());
      meta
        .imports
        .push(reexport_from_clause(&captures["specifier"], clause));
    }

    for captures in self.dynamic_imports.captures_iter(code) {
      meta
        .imports
        .push(ImportSpecifier::new(&captures["specifier"]));
    }

    for captures in self.hot_calls.captures_iter(code) {
      let Some(call) = captures.get(0) else {
        continue;
      };

      let accepted = lex_accepted_names(code, call.end())
        .map_err(|error| lex_diagnostic(file, code, error.pos, &error.to_string()))?;

      let names = accepted.names.into_iter().map(|name| name.name);
      if &captures["method"] == "acceptExports" {
        if accepted.self_accepting {
          return Err(lex_diagnostic(
            file,
            code,
            call.end(),
            "acceptExports() takes a string literal or an array of string literals",
          ));
        }

        meta
          .accepted_exports
          .get_or_insert_with(Vec::new)
          .extend(names);
      } else if accepted.self_accepting {
        meta.self_accepting = true;
      } else {
        meta.accepted_deps.extend(names);
      }
    }

    tracing::trace!(
      imports = meta.imports.len(),
      accepted = meta.accepted_deps.len(),
      self_accepting = meta.self_accepting,
      "Scanned module"
    );

    Ok(meta)
  }
}

fn import_from_clause(specifier: &str, clause: Option<&str>) -> ImportSpecifier {
  let Some(clause) = clause.map(str::trim) else {
    return ImportSpecifier::new(specifier);
  };

  // `import type` only exists for the type checker
  if let Some(types) = clause.strip_prefix("type ") {
    return ImportSpecifier::new(specifier)
      .with_bindings(clause_bindings(types.trim()))
      .soft();
  }

  ImportSpecifier::new(specifier).with_bindings(clause_bindings(clause))
}

fn reexport_from_clause(specifier: &str, clause: Option<&str>) -> ImportSpecifier {
  match clause.map(str::trim) {
    Some(clause) if clause.starts_with("type ") => ImportSpecifier::new(specifier)
      .with_bindings(clause_bindings(clause.trim_start_matches("type ").trim()))
      .soft(),
    Some(clause) => ImportSpecifier::new(specifier).with_bindings(clause_bindings(clause)),
    None => ImportSpecifier::new(specifier),
  }
}

/// Binding names taken from a module: `default`, `*` for namespaces and the original name of
/// every named import
fn clause_bindings(clause: &str) -> Vec<String> {
  let mut bindings = Vec::new();
  let (outside, named) = match (clause.find('{'), clause.rfind('}')) {
    (Some(open), Some(close)) if open < close => (
      format!("{}{}", &clause[..open], &clause[close + 1..]),
      Some(&clause[open + 1..close]),
    ),
    _ => (clause.to_string(), None),
  };

  for part in outside.split(',').map(str::trim).filter(|part| !part.is_empty()) {
    if part.starts_with('*') {
      bindings.push(String::from("*"));
    } else {
      bindings.push(String::from("default"));
    }
  }

  for part in named.into_iter().flat_map(|named| named.split(',')) {
    match part.split_whitespace().next() {
      // `{ type Props }` names a type, which never exists at runtime
      Some("type") | None => {}
      Some(name) => bindings.push(name.to_string()),
    }
  }

  bindings
}

fn lex_diagnostic(file: Option<&Path>, code: &str, pos: usize, message: &str) -> Diagnostic {
  let before = code.get(..pos).unwrap_or(code);
  let line = before.matches('\n').count() + 1;
  let column = before
    .rsplit('\n')
    .next()
    .map(|line| line.chars().count())
    .unwrap_or_default()
    + 1;

  Diagnostic::new(message)
    .with_origin(IMPORT_ANALYSIS_ORIGIN)
    .with_code_frame(CodeFrame::new(
      file.map(Path::to_path_buf),
      code.to_string(),
      CodeHighlight::from([line, column]).with_message("not statically analyzable"),
    ))
}
