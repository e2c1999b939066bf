//! Filesystem access behind a trait.
//!
//! Registries and providers only see this seam, so tests can substitute
//! fixtures and hosts can audit every path the core touches. Failures carry
//! the operation, the path, and the `io::ErrorKind`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{QuayError, QuayResult};

/// Read and write file access used by the resolution core.
pub trait Filesystem {
    fn read_contents(&self, path: &Path) -> QuayResult<String>;
    fn exists(&self, path: &Path) -> bool;
    fn is_directory(&self, path: &Path) -> bool;
    /// Immediate subdirectories of `dir`, sorted by name.
    fn get_directories_non_recursive(&self, dir: &Path) -> QuayResult<Vec<PathBuf>>;
    /// Immediate regular files of `dir`, sorted by name.
    fn get_regular_files_non_recursive(&self, dir: &Path) -> QuayResult<Vec<PathBuf>>;
    fn create_directories(&self, dir: &Path) -> QuayResult<()>;
    fn write_contents(&self, path: &Path, contents: &str) -> QuayResult<()>;
    fn rename(&self, from: &Path, to: &Path) -> QuayResult<()>;
}

pub(crate) fn fs_error(op: &'static str, path: &Path, err: &std::io::Error) -> QuayError {
    QuayError::FilesystemCall {
        op,
        path: path.to_path_buf(),
        kind: err.kind(),
        message: err.to_string(),
    }
}

/// The production implementation over `std::fs`.
#[derive(Debug, Default)]
pub struct RealFilesystem;

impl RealFilesystem {
    fn list_entries(&self, dir: &Path, want_dirs: bool) -> QuayResult<Vec<PathBuf>> {
        let op = if want_dirs {
            "get_directories_non_recursive"
        } else {
            "get_regular_files_non_recursive"
        };
        let entries = fs::read_dir(dir).map_err(|e| fs_error(op, dir, &e))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| fs_error(op, dir, &e))?;
            let file_type = entry.file_type().map_err(|e| fs_error(op, &entry.path(), &e))?;
            if file_type.is_dir() == want_dirs {
                out.push(entry.path());
            }
        }
        out.sort();
        Ok(out)
    }
}

impl Filesystem for RealFilesystem {
    fn read_contents(&self, path: &Path) -> QuayResult<String> {
        fs::read_to_string(path).map_err(|e| fs_error("read_contents", path, &e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn get_directories_non_recursive(&self, dir: &Path) -> QuayResult<Vec<PathBuf>> {
        self.list_entries(dir, true)
    }

    fn get_regular_files_non_recursive(&self, dir: &Path) -> QuayResult<Vec<PathBuf>> {
        self.list_entries(dir, false)
    }

    fn create_directories(&self, dir: &Path) -> QuayResult<()> {
        fs::create_dir_all(dir).map_err(|e| fs_error("create_directories", dir, &e))
    }

    fn write_contents(&self, path: &Path, contents: &str) -> QuayResult<()> {
        fs::write(path, contents).map_err(|e| fs_error("write_contents", path, &e))
    }

    fn rename(&self, from: &Path, to: &Path) -> QuayResult<()> {
        fs::rename(from, to).map_err(|e| fs_error("rename", from, &e))
    }
}
