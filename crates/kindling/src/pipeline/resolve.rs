use std::path::Path;
use std::path::PathBuf;

use kindling_core::plugin::ResolveContext;
use kindling_core::plugin::ResolvedId;
use kindling_core::types::clean_url;
use kindling_core::types::remove_timestamp_query;
use kindling_filesystem::normalize_path;
use kindling_filesystem::FileSystem;

use crate::KindlingOptions;

/// Resolve relative and root-relative specifiers against the file system.
///
/// Bare specifiers are left to resolver plugins.
pub(crate) fn resolve_from_file_system(
  fs: &dyn FileSystem,
  options: &KindlingOptions,
  ctx: &ResolveContext,
) -> Option<ResolvedId> {
  let specifier = remove_timestamp_query(&ctx.specifier);
  let (path, query) = match specifier.split_once('?') {
    Some((path, query)) => (path, Some(query)),
    None => (specifier.as_str(), None),
  };

  let root = &options.project_root;
  let candidates = if path.starts_with("./") || path.starts_with("../") {
    vec![normalize_path(&importer_dir(options, ctx)?, Path::new(path))]
  } else if path.starts_with('/') {
    let mut candidates = vec![normalize_path(root, Path::new(path.trim_start_matches('/')))];
    if Path::new(path).starts_with(root) {
      candidates.push(normalize_path(root, Path::new(path)));
    }
    candidates
  } else {
    return None;
  };

  let file = candidates
    .into_iter()
    .find_map(|candidate| try_file(fs, &candidate, &options.resolve_extensions))?;

  Some(ResolvedId {
    id: module_id(root, &file, query),
    file: Some(file),
  })
}

fn importer_dir(options: &KindlingOptions, ctx: &ResolveContext) -> Option<PathBuf> {
  match (&ctx.importer_file, &ctx.importer) {
    (Some(file), _) => file.parent().map(Path::to_path_buf),
    (None, Some(importer)) => normalize_path(
      &options.project_root,
      Path::new(clean_url(importer).trim_start_matches('/')),
    )
    .parent()
    .map(Path::to_path_buf),
    (None, None) => Some(options.project_root.clone()),
  }
}

fn try_file(fs: &dyn FileSystem, candidate: &Path, extensions: &[String]) -> Option<PathBuf> {
  if fs.is_file(candidate) {
    return Some(candidate.to_path_buf());
  }

  for extension in extensions {
    let with_extension = PathBuf::from(format!("{}{extension}", candidate.display()));
    if fs.is_file(&with_extension) {
      return Some(with_extension);
    }
  }

  if fs.is_dir(candidate) {
    for extension in extensions {
      let index = candidate.join(format!("index{extension}"));
      if fs.is_file(&index) {
        return Some(index);
      }
    }
  }

  None
}

/// Files inside the project are identified by their root-relative url
fn module_id(root: &Path, file: &Path, query: Option<&str>) -> String {
  let path = match file.strip_prefix(root) {
    Ok(relative) => format!("/{}", relative.to_string_lossy().replace('\\', "/")),
    Err(_) => file.to_string_lossy().to_string(),
  };

  match query {
    Some(query) if !query.is_empty() => format!("{path}?{query}"),
    _ => path,
  }
}

#[cfg(test)]
mod tests {
  use kindling_filesystem::in_memory_file_system::InMemoryFileSystem;
  use pretty_assertions::assert_eq;

  use super::*;

  fn fixture() -> (InMemoryFileSystem, KindlingOptions) {
    let fs = InMemoryFileSystem::default();
    fs.write_file(Path::new("/app/src/a.js"), String::new());
    fs.write_file(Path::new("/app/src/b.ts"), String::new());
    fs.write_file(Path::new("/app/src/lib/index.js"), String::new());
    fs.write_file(Path::new("/app/index.html"), String::new());

    let options = KindlingOptions {
      project_root: PathBuf::from("/app"),
      ..KindlingOptions::default()
    };

    (fs, options)
  }

  fn resolve(specifier: &str, importer: Option<&str>) -> Option<ResolvedId> {
    let (fs, options) = fixture();
    resolve_from_file_system(
      &fs,
      &options,
      &ResolveContext {
        specifier: String::from(specifier),
        importer: importer.map(String::from),
        importer_file: importer.map(|importer| PathBuf::from(format!("/app{importer}"))),
      },
    )
  }

  fn resolved(id: &str, file: &str) -> Option<ResolvedId> {
    Some(ResolvedId {
      id: String::from(id),
      file: Some(PathBuf::from(file)),
    })
  }

  #[test]
  fn resolves_root_relative_urls() {
    assert_eq!(resolve("/src/a.js", None), resolved("/src/a.js", "/app/src/a.js"));
    assert_eq!(
      resolve("/src/a.js?t=1234", None),
      resolved("/src/a.js", "/app/src/a.js")
    );
    assert_eq!(
      resolve("/app/src/a.js", None),
      resolved("/src/a.js", "/app/src/a.js")
    );
  }

  #[test]
  fn resolves_relative_specifiers_with_extensions_and_index_files() {
    assert_eq!(
      resolve("./b", Some("/src/a.js")),
      resolved("/src/b.ts", "/app/src/b.ts")
    );
    assert_eq!(
      resolve("./lib", Some("/src/a.js")),
      resolved("/src/lib/index.js", "/app/src/lib/index.js")
    );
    assert_eq!(
      resolve("../index.html", Some("/src/a.js")),
      resolved("/index.html", "/app/index.html")
    );
  }

  #[test]
  fn keeps_variant_queries() {
    assert_eq!(
      resolve("./a.js?inline&t=5", Some("/src/b.ts")),
      resolved("/src/a.js?inline", "/app/src/a.js")
    );
  }

  #[test]
  fn leaves_bare_and_missing_specifiers_unresolved() {
    assert_eq!(resolve("react", Some("/src/a.js")), None);
    assert_eq!(resolve("./missing", Some("/src/a.js")), None);
  }
}
