//! Git access behind a trait.
//!
//! The core never runs git itself; registries talk to this seam. The
//! [`process::ProcessGitBackend`] implementation shells out to the host
//! `git`, and tests substitute scripted backends.

pub mod process;

use std::path::{Path, PathBuf};

use crate::error::QuayResult;

/// Git operations the registries need.
///
/// "The shared store" is a single bare repository into which every remote
/// registry's objects are fetched, so commits and trees from any configured
/// registry can be read without a per-registry clone.
pub trait GitBackend {
    /// Fetch `reference` from `repo` into the shared store and return the
    /// commit id it resolved to.
    fn fetch_remote_registry(&self, repo: &str, reference: &str) -> QuayResult<String>;

    /// Fetch an exact object (usually a commit sha) from `repo` into the
    /// shared store.
    fn fetch(&self, repo: &str, treeish: &str) -> QuayResult<()>;

    /// Contents of `<commit>:<path>` in the shared store.
    fn show_remote(&self, commit: &str, path: &str) -> QuayResult<String>;

    /// Contents of `<commit>:<path>` in the repository at `dot_git`.
    fn show(&self, dot_git: &Path, commit: &str, path: &str) -> QuayResult<String>;

    /// Object id of `<commit>:<path>` in the shared store (a tree sha).
    fn find_object_id_for_remote_registry_path(
        &self,
        commit: &str,
        path: &str,
    ) -> QuayResult<String>;

    /// Materialize `tree` from the shared store into the content-addressed
    /// tree cache and return its directory. Publication is atomic: readers
    /// never observe a partially extracted tree.
    fn extract_tree_from_remote_registry(&self, tree: &str) -> QuayResult<PathBuf>;

    /// Materialize a port's `tree` from the repository at `dot_git` into the
    /// tree cache and return its directory.
    fn checkout_port(&self, port_name: &str, tree: &str, dot_git: &Path) -> QuayResult<PathBuf>;
}

/// True for a 40-character lowercase-hex git sha.
pub fn is_commit_sha(s: &str) -> bool {
    s.len() == 40
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
