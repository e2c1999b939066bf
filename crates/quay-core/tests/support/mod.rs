//! Shared fixtures: on-disk registry builders and a scripted git backend.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Once;

use quay_core::error::{QuayError, QuayResult};
use quay_core::prelude::*;

static INIT_TRACING: Once = Once::new();

/// Route `RUST_LOG`-filtered tracing output through the test harness.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Write `<root>/<name>/port.json` declaring `name` at `version`.
pub fn write_port(ports_root: &Path, name: &str, version: &str) {
    write_named_port(&ports_root.join(name), name, version);
}

/// Write `<dir>/port.json` declaring `name` at `version`.
pub fn write_named_port(port_dir: &Path, name: &str, version: &str) {
    std::fs::create_dir_all(port_dir).unwrap();
    std::fs::write(
        port_dir.join("port.json"),
        format!(r#"{{"name": "{name}", "version": "{version}"}}"#),
    )
    .unwrap();
}

/// Write `<versions_root>/<x>-/<port>.json` with git-tree entries.
pub fn write_git_versions_file(versions_root: &Path, port: &str, entries: &[(&str, &str)]) {
    let body: Vec<String> = entries
        .iter()
        .map(|(version, tree)| format!(r#"{{"version": "{version}", "git-tree": "{tree}"}}"#))
        .collect();
    write_raw_versions_file(versions_root, port, &body.join(", "));
}

/// Write `<versions_root>/<x>-/<port>.json` with `$/` path entries.
pub fn write_path_versions_file(versions_root: &Path, port: &str, entries: &[(&str, &str)]) {
    let body: Vec<String> = entries
        .iter()
        .map(|(version, path)| format!(r#"{{"version": "{version}", "path": "{path}"}}"#))
        .collect();
    write_raw_versions_file(versions_root, port, &body.join(", "));
}

fn write_raw_versions_file(versions_root: &Path, port: &str, entries: &str) {
    let prefix = format!("{}-", port.chars().next().unwrap());
    let dir = versions_root.join(prefix);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(format!("{port}.json")),
        format!(r#"{{"versions": [{entries}]}}"#),
    )
    .unwrap();
}

/// A `{"default": {...}}` baseline document.
pub fn baseline_json(entries: &[(&str, &str)]) -> String {
    let body: Vec<String> = entries
        .iter()
        .map(|(port, version)| format!(r#""{port}": {{"version": "{version}"}}"#))
        .collect();
    format!(r#"{{"default": {{{}}}}}"#, body.join(", "))
}

/// Build an `AppContext` over the real filesystem and the given backend.
pub fn make_context(root: &Path, cache_dir: &Path, cwd: &Path, git: Rc<dyn GitBackend>) -> Rc<AppContext> {
    Rc::new(AppContext::new(
        root.to_path_buf(),
        cache_dir.to_path_buf(),
        cwd.to_path_buf(),
        Rc::new(RealFilesystem),
        git,
        Rc::new(PortManifestParser),
    ))
}

/// A git backend driven entirely by scripted tables.
///
/// Trees are materialized under `extract_root` as real directories so the
/// rest of the stack can read them with the real filesystem.
#[derive(Default)]
pub struct ScriptedGitBackend {
    /// `(repo, reference)` → commit returned by ref fetches.
    pub refs: RefCell<BTreeMap<(String, String), String>>,
    /// `(commit, path)` → file contents for `show`/`show_remote`.
    pub show_entries: RefCell<BTreeMap<(String, String), String>>,
    /// `(commit, path)` → tree id.
    pub tree_ids: RefCell<BTreeMap<(String, String), String>>,
    /// tree id → files as `(relative path, contents)`.
    pub trees: RefCell<BTreeMap<String, Vec<(String, String)>>>,
    /// Show entries revealed by fetching an exact treeish.
    pub on_fetch_reveal: RefCell<BTreeMap<String, ((String, String), String)>>,
    pub fail_fetch: Cell<bool>,
    pub ref_fetches: Cell<usize>,
    pub object_fetches: Cell<usize>,
    pub extract_root: PathBuf,
}

impl ScriptedGitBackend {
    pub fn new(extract_root: &Path) -> Self {
        Self {
            extract_root: extract_root.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn set_ref(&self, repo: &str, reference: &str, commit: &str) {
        self.refs
            .borrow_mut()
            .insert((repo.to_string(), reference.to_string()), commit.to_string());
    }

    pub fn set_show(&self, commit: &str, path: &str, contents: &str) {
        self.show_entries
            .borrow_mut()
            .insert((commit.to_string(), path.to_string()), contents.to_string());
    }

    pub fn set_tree_id(&self, commit: &str, path: &str, tree: &str) {
        self.tree_ids
            .borrow_mut()
            .insert((commit.to_string(), path.to_string()), tree.to_string());
    }

    pub fn set_tree_file(&self, tree: &str, relative_path: &str, contents: &str) {
        self.trees
            .borrow_mut()
            .entry(tree.to_string())
            .or_default()
            .push((relative_path.to_string(), contents.to_string()));
    }

    /// Script a versions tree for `commit`: a version database directory
    /// holding `port.json` version files.
    pub fn set_versions_tree(&self, commit: &str, tree: &str, ports: &[(&str, &str)]) {
        self.set_tree_id(commit, "versions", tree);
        for (port, entries) in ports {
            let prefix = format!("{}-", port.chars().next().unwrap());
            self.set_tree_file(
                tree,
                &format!("{prefix}/{port}.json"),
                &format!(r#"{{"versions": [{entries}]}}"#),
            );
        }
    }

    /// After `fetch(repo, treeish)` succeeds, `show_remote(commit, path)`
    /// starts answering with `contents`.
    pub fn reveal_on_fetch(&self, treeish: &str, commit: &str, path: &str, contents: &str) {
        self.on_fetch_reveal.borrow_mut().insert(
            treeish.to_string(),
            ((commit.to_string(), path.to_string()), contents.to_string()),
        );
    }
}

impl GitBackend for ScriptedGitBackend {
    fn fetch_remote_registry(&self, repo: &str, reference: &str) -> QuayResult<String> {
        self.ref_fetches.set(self.ref_fetches.get() + 1);
        self.refs
            .borrow()
            .get(&(repo.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| QuayError::GitFetchFailed {
                repo: repo.to_string(),
                message: format!("no scripted result for reference {reference}"),
            })
    }

    fn fetch(&self, repo: &str, treeish: &str) -> QuayResult<()> {
        self.object_fetches.set(self.object_fetches.get() + 1);
        if self.fail_fetch.get() {
            return Err(QuayError::GitFetchFailed {
                repo: repo.to_string(),
                message: "scripted fetch failure".to_string(),
            });
        }
        if let Some((key, contents)) = self.on_fetch_reveal.borrow_mut().remove(treeish) {
            self.show_entries.borrow_mut().insert(key, contents);
        }
        Ok(())
    }

    fn show_remote(&self, commit: &str, path: &str) -> QuayResult<String> {
        let what = format!("{commit}:{path}");
        self.show_entries
            .borrow()
            .get(&(commit.to_string(), path.to_string()))
            .cloned()
            .ok_or(QuayError::GitShowFailed {
                what,
                message: "no scripted contents".to_string(),
            })
    }

    fn show(&self, _dot_git: &Path, commit: &str, path: &str) -> QuayResult<String> {
        self.show_remote(commit, path)
    }

    fn find_object_id_for_remote_registry_path(
        &self,
        commit: &str,
        path: &str,
    ) -> QuayResult<String> {
        let what = format!("{commit}:{path}");
        self.tree_ids
            .borrow()
            .get(&(commit.to_string(), path.to_string()))
            .cloned()
            .ok_or(QuayError::GitShowFailed {
                what,
                message: "no scripted tree".to_string(),
            })
    }

    fn extract_tree_from_remote_registry(&self, tree: &str) -> QuayResult<PathBuf> {
        let destination = self.extract_root.join(tree);
        if destination.exists() {
            return Ok(destination);
        }
        let trees = self.trees.borrow();
        let Some(files) = trees.get(tree) else {
            return Err(QuayError::GitCheckoutFailed {
                what: tree.to_string(),
                message: "no scripted tree contents".to_string(),
            });
        };
        for (relative_path, contents) in files {
            let file_path = destination.join(relative_path);
            std::fs::create_dir_all(file_path.parent().unwrap()).unwrap();
            std::fs::write(file_path, contents).unwrap();
        }
        Ok(destination)
    }

    fn checkout_port(&self, _port_name: &str, tree: &str, _dot_git: &Path) -> QuayResult<PathBuf> {
        self.extract_tree_from_remote_registry(tree)
    }
}
