use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

/// Lexically resolve `path` against `cwd`.
///
/// `..` at the root is dropped rather than producing an error.
pub fn normalize_path(cwd: &Path, path: &Path) -> PathBuf {
  let mut result = if path.is_absolute() {
    vec![]
  } else {
    cwd.components().collect()
  };

  for component in path.components() {
    match component {
      Component::Prefix(prefix) => {
        result = vec![Component::Prefix(prefix)];
      }
      Component::RootDir => {
        result.push(Component::RootDir);
      }
      Component::CurDir => {}
      Component::ParentDir => {
        if !matches!(result.last(), Some(Component::RootDir) | None) {
          result.pop();
        }
      }
      Component::Normal(path) => {
        result.push(Component::Normal(path));
      }
    }
  }

  PathBuf::from_iter(result)
}
