//! `GitBackend` implementation that shells out to the host `git`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{QuayError, QuayResult};
use crate::git::GitBackend;

/// Runs git against a shared bare store under the cache directory and
/// extracts trees into a content-addressed cache.
#[derive(Debug)]
pub struct ProcessGitBackend {
    /// Bare repository collecting objects from every remote registry.
    store_dir: PathBuf,
    /// Content-addressed tree cache: `<git_trees>/<tree-sha>/…`.
    git_trees: PathBuf,
}

impl ProcessGitBackend {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            store_dir: cache_dir.join("registries.git"),
            git_trees: cache_dir.join("git-trees"),
        }
    }

    fn ensure_store(&self) -> QuayResult<()> {
        if self.store_dir.join("HEAD").exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.store_dir).map_err(|e| QuayError::GitFetchFailed {
            repo: self.store_dir.display().to_string(),
            message: format!("failed to create the registries store: {e}"),
        })?;
        run_git(&self.store_dir, &["init", "--bare", "--quiet", "."]).map_err(|message| {
            QuayError::GitFetchFailed {
                repo: self.store_dir.display().to_string(),
                message,
            }
        })?;
        Ok(())
    }

    fn extract_tree(&self, dot_git: &Path, tree: &str, what: &str) -> QuayResult<PathBuf> {
        let destination = self.git_trees.join(tree);
        if destination.exists() {
            return Ok(destination);
        }

        let checkout_error = |message: String| QuayError::GitCheckoutFailed {
            what: what.to_string(),
            message,
        };

        let staging = self
            .git_trees
            .join(format!(".{}.tmp.{}", tree, std::process::id()));
        std::fs::create_dir_all(&staging)
            .map_err(|e| checkout_error(format!("failed to create {}: {e}", staging.display())))?;

        let result = archive_into(dot_git, tree, &staging);
        if let Err(message) = result {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(checkout_error(message));
        }

        // Publish atomically; a tree that appeared meanwhile is the same
        // content, so losing the rename race is fine.
        match std::fs::rename(&staging, &destination) {
            Ok(()) => Ok(destination),
            Err(_) if destination.exists() => {
                let _ = std::fs::remove_dir_all(&staging);
                Ok(destination)
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                Err(checkout_error(format!(
                    "failed to rename {} to {}: {e}",
                    staging.display(),
                    destination.display()
                )))
            }
        }
    }
}

impl GitBackend for ProcessGitBackend {
    fn fetch_remote_registry(&self, repo: &str, reference: &str) -> QuayResult<String> {
        self.ensure_store()?;
        run_git(
            &self.store_dir,
            &["fetch", "--filter=blob:none", "--", repo, reference],
        )
        .map_err(|message| QuayError::GitFetchFailed {
            repo: repo.to_string(),
            message,
        })?;
        capture_git(&self.store_dir, &["rev-parse", "FETCH_HEAD"]).map_err(|message| {
            QuayError::GitFetchFailed {
                repo: repo.to_string(),
                message,
            }
        })
    }

    fn fetch(&self, repo: &str, treeish: &str) -> QuayResult<()> {
        self.ensure_store()?;
        run_git(
            &self.store_dir,
            &["fetch", "--filter=blob:none", "--", repo, treeish],
        )
        .map_err(|message| QuayError::GitFetchFailed {
            repo: repo.to_string(),
            message,
        })
    }

    fn show_remote(&self, commit: &str, path: &str) -> QuayResult<String> {
        self.ensure_store()?;
        let treeish = format!("{commit}:{path}");
        capture_git(&self.store_dir, &["show", &treeish]).map_err(|message| {
            QuayError::GitShowFailed {
                what: treeish.clone(),
                message,
            }
        })
    }

    fn show(&self, dot_git: &Path, commit: &str, path: &str) -> QuayResult<String> {
        let treeish = format!("{commit}:{path}");
        capture_git(dot_git, &["show", &treeish]).map_err(|message| QuayError::GitShowFailed {
            what: treeish.clone(),
            message,
        })
    }

    fn find_object_id_for_remote_registry_path(
        &self,
        commit: &str,
        path: &str,
    ) -> QuayResult<String> {
        self.ensure_store()?;
        let treeish = format!("{commit}:{path}");
        capture_git(&self.store_dir, &["rev-parse", &treeish]).map_err(|message| {
            QuayError::GitShowFailed {
                what: treeish.clone(),
                message,
            }
        })
    }

    fn extract_tree_from_remote_registry(&self, tree: &str) -> QuayResult<PathBuf> {
        self.ensure_store()?;
        let store = self.store_dir.clone();
        self.extract_tree(&store, tree, tree)
    }

    fn checkout_port(&self, port_name: &str, tree: &str, dot_git: &Path) -> QuayResult<PathBuf> {
        self.extract_tree(dot_git, tree, port_name)
    }
}

fn git_command(dot_git: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("--git-dir").arg(dot_git);
    cmd
}

/// Run a git command, discarding stdout.
fn run_git(dot_git: &Path, args: &[&str]) -> Result<(), String> {
    let output = git_command(dot_git)
        .args(args)
        .output()
        .map_err(|e| format!("failed to run git {args:?}: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {args:?} failed: {}", stderr.trim()));
    }
    Ok(())
}

/// Run a git command and return trimmed stdout.
fn capture_git(dot_git: &Path, args: &[&str]) -> Result<String, String> {
    let output = git_command(dot_git)
        .args(args)
        .output()
        .map_err(|e| format!("failed to run git {args:?}: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {args:?} failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Stream `git archive <tree>` into `tar -x` at `destination`.
fn archive_into(dot_git: &Path, tree: &str, destination: &Path) -> Result<(), String> {
    let mut archive = git_command(dot_git)
        .args(["archive", "--format=tar", tree])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to run git archive {tree}: {e}"))?;

    let archive_stdout = archive
        .stdout
        .take()
        .ok_or_else(|| "git archive produced no stdout handle".to_string())?;

    let tar = Command::new("tar")
        .arg("-xf")
        .arg("-")
        .arg("-C")
        .arg(destination)
        .stdin(Stdio::from(archive_stdout))
        .output()
        .map_err(|e| format!("failed to run tar for tree {tree}: {e}"))?;

    let archive_output = archive
        .wait_with_output()
        .map_err(|e| format!("failed to wait for git archive {tree}: {e}"))?;
    if !archive_output.status.success() {
        let stderr = String::from_utf8_lossy(&archive_output.stderr);
        return Err(format!("git archive {tree} failed: {}", stderr.trim()));
    }
    if !tar.status.success() {
        let stderr = String::from_utf8_lossy(&tar.stderr);
        return Err(format!("tar extraction of {tree} failed: {}", stderr.trim()));
    }
    Ok(())
}
