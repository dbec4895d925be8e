use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::normalize_path;
use crate::FileSystem;

#[cfg(not(target_os = "windows"))]
fn root_dir() -> PathBuf {
  PathBuf::from("/")
}

#[cfg(target_os = "windows")]
fn root_dir() -> PathBuf {
  PathBuf::from("C:/")
}

/// A file tree held in memory, for fixtures.
///
/// Only files are stored. A directory exists while at least one file lives below it, so removing
/// the last file of a directory removes the directory too.
#[derive(Debug)]
pub struct InMemoryFileSystem {
  files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
  cwd: RwLock<PathBuf>,
}

impl Default for InMemoryFileSystem {
  fn default() -> Self {
    Self {
      files: RwLock::new(BTreeMap::new()),
      cwd: RwLock::new(root_dir()),
    }
  }
}

impl<P: AsRef<Path>, C: Into<String>> FromIterator<(P, C)> for InMemoryFileSystem {
  fn from_iter<I: IntoIterator<Item = (P, C)>>(files: I) -> Self {
    let fs = InMemoryFileSystem::default();
    for (path, contents) in files {
      fs.write_file(path.as_ref(), contents.into());
    }
    fs
  }
}

impl InMemoryFileSystem {
  /// Relative paths are resolved against this directory
  pub fn set_current_working_directory(&self, cwd: &Path) {
    let cwd = self.absolute(cwd);
    *self.cwd.write() = cwd;
  }

  pub fn write_file(&self, path: &Path, contents: String) {
    let path = self.absolute(path);
    self.files.write().insert(path, contents.into_bytes());
  }

  pub fn remove_file(&self, path: &Path) {
    let path = self.absolute(path);
    self.files.write().remove(&path);
  }

  /// Every file currently stored, in path order
  pub fn files(&self) -> Vec<PathBuf> {
    self.files.read().keys().cloned().collect()
  }

  fn absolute(&self, path: &Path) -> PathBuf {
    normalize_path(&self.cwd.read(), path)
  }
}

impl FileSystem for InMemoryFileSystem {
  fn cwd(&self) -> io::Result<PathBuf> {
    Ok(self.cwd.read().clone())
  }

  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    let path = self.absolute(path);

    if let Some(contents) = self.files.read().get(&path) {
      return Ok(contents.clone());
    }

    if self.is_dir(&path) {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{} is a directory", path.display()),
      ));
    }

    Err(io::Error::new(
      io::ErrorKind::NotFound,
      format!("{} does not exist", path.display()),
    ))
  }

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    String::from_utf8(self.read(path)?)
      .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
  }

  fn is_file(&self, path: &Path) -> bool {
    let path = self.absolute(path);
    self.files.read().contains_key(&path)
  }

  fn is_dir(&self, path: &Path) -> bool {
    let path = self.absolute(path);
    let files = self.files.read();

    // Files below `path` sort directly after it
    files
      .range(path.clone()..)
      .next()
      .is_some_and(|(file, _)| file != &path && file.starts_with(&path))
  }
}
