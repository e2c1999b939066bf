//! Application context for unified dependency injection.
//!
//! Owns the shared collaborators (filesystem, git backend, recipe parser,
//! metrics, lock file) and the well-known paths. Hosts create this once and
//! hand it to the registry and provider layers.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::QuayResult;
use crate::fs::Filesystem;
use crate::git::GitBackend;
use crate::lockfile::LockFile;
use crate::metrics::Metrics;
use crate::recipe::RecipeParser;

pub struct AppContext {
    /// Root of the builtin registry checkout (`ports/`, `versions/`, `.git`).
    root: PathBuf,
    cache_dir: PathBuf,
    /// Overlay paths are resolved against the directory the host started in.
    original_cwd: PathBuf,
    fs: Rc<dyn Filesystem>,
    git: Rc<dyn GitBackend>,
    parser: Rc<dyn RecipeParser>,
    metrics: Rc<Metrics>,
    lockfile: RefCell<LockFile>,
}

impl AppContext {
    pub fn new(
        root: PathBuf,
        cache_dir: PathBuf,
        original_cwd: PathBuf,
        fs: Rc<dyn Filesystem>,
        git: Rc<dyn GitBackend>,
        parser: Rc<dyn RecipeParser>,
    ) -> Self {
        Self {
            root,
            cache_dir,
            original_cwd,
            fs,
            git,
            parser,
            metrics: Rc::new(Metrics::default()),
            lockfile: RefCell::new(LockFile::default()),
        }
    }

    /// The per-user cache directory for quay, if the platform has one.
    pub fn default_cache_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|p| p.join("quay"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn original_cwd(&self) -> &Path {
        &self.original_cwd
    }

    pub fn fs(&self) -> &dyn Filesystem {
        self.fs.as_ref()
    }

    pub fn git(&self) -> &dyn GitBackend {
        self.git.as_ref()
    }

    pub fn parser(&self) -> &dyn RecipeParser {
        self.parser.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        self.metrics.as_ref()
    }

    pub fn lockfile(&self) -> &RefCell<LockFile> {
        &self.lockfile
    }

    pub fn builtin_ports_directory(&self) -> PathBuf {
        self.root.join("ports")
    }

    pub fn builtin_registry_versions(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn root_dot_git(&self) -> PathBuf {
        self.root.join(".git")
    }

    /// Materialized baseline files: `<cache>/baselines/<sha>/baseline.json`.
    pub fn baselines_output(&self) -> PathBuf {
        self.cache_dir.join("baselines")
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.cache_dir.join("quay-lock.json")
    }

    /// Replace the in-memory lock file with the persisted one.
    pub fn load_lockfile(&self) -> QuayResult<()> {
        let loaded = LockFile::load(self.fs(), &self.lockfile_path())?;
        *self.lockfile.borrow_mut() = loaded;
        Ok(())
    }

    /// Persist the lock file iff it changed this process.
    pub fn persist_lockfile(&self) -> QuayResult<()> {
        self.lockfile
            .borrow()
            .save_if_modified(self.fs(), &self.lockfile_path())
    }
}
