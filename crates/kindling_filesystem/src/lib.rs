use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

pub use self::normalize::normalize_path;

/// File tree held in memory, used by fixtures
pub mod in_memory_file_system;

/// Reads straight from disk
pub mod os_file_system;

mod normalize;

/// Shared handle to the file system the pipeline resolves and loads modules from
pub type FileSystemRef = Arc<dyn FileSystem + Send + Sync>;

/// What the resolve and load stages need from a file system.
///
/// Paths may be relative, in which case they are taken relative to [`FileSystem::cwd`].
#[mockall::automock]
pub trait FileSystem: std::fmt::Debug {
  fn cwd(&self) -> std::io::Result<PathBuf> {
    Err(std::io::Error::new(
      std::io::ErrorKind::Unsupported,
      "This file system has no working directory",
    ))
  }

  /// Make `path` absolute and remove `.`/`..` components without touching symlinks
  fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf> {
    Ok(normalize_path(&self.cwd()?, path))
  }

  fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;

  /// Read a module's source, failing for files that are not UTF-8
  fn read_to_string(&self, path: &Path) -> std::io::Result<String>;

  fn is_file(&self, path: &Path) -> bool;

  fn is_dir(&self, path: &Path) -> bool;
}
