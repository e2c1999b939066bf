//! The registries lock file.
//!
//! Maps `(repository, reference)` to the commit the reference resolved to
//! the last time it was fetched. Entries loaded from disk are stale until
//! revalidated; an entry is refreshed at most once per process.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{QuayError, QuayResult};
use crate::fs::Filesystem;
use crate::git::GitBackend;

/// One resolved reference of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntryData {
    pub reference: String,
    pub commit_id: String,
    /// True when `commit_id` came from a previous run and has not been
    /// revalidated by this process.
    pub stale: bool,
}

/// All lock entries, a multimap from repository to its references.
#[derive(Debug, Default)]
pub struct LockFile {
    data: BTreeMap<String, Vec<LockEntryData>>,
    modified: bool,
}

#[derive(Serialize, Deserialize)]
struct LockNode {
    commit: String,
}

impl LockFile {
    /// Look up an entry without fetching.
    pub fn entry(&self, repo: &str, reference: &str) -> Option<&LockEntryData> {
        self.data
            .get(repo)?
            .iter()
            .find(|e| e.reference == reference)
    }

    /// Find the entry for `(repo, reference)`, fetching and inserting a
    /// fresh one if absent.
    pub fn get_or_fetch(
        &mut self,
        git: &dyn GitBackend,
        repo: &str,
        reference: &str,
    ) -> QuayResult<LockEntryData> {
        if let Some(entry) = self.entry(repo, reference) {
            return Ok(entry.clone());
        }

        info!(repo, reference, "fetching registry information");
        let commit_id = git.fetch_remote_registry(repo, reference)?;
        let entry = LockEntryData {
            reference: reference.to_string(),
            commit_id,
            stale: false,
        };
        self.data
            .entry(repo.to_string())
            .or_default()
            .push(entry.clone());
        self.modified = true;
        Ok(entry)
    }

    /// Re-fetch a stale entry and return the current data. Fresh entries are
    /// returned unchanged, so a reference is refreshed at most once per
    /// process.
    pub fn ensure_up_to_date(
        &mut self,
        git: &dyn GitBackend,
        repo: &str,
        reference: &str,
    ) -> QuayResult<LockEntryData> {
        let Some(existing) = self.entry(repo, reference).cloned() else {
            return self.get_or_fetch(git, repo, reference);
        };
        if !existing.stale {
            return Ok(existing);
        }

        info!(repo, reference, "fetching registry information");
        let commit_id = git.fetch_remote_registry(repo, reference)?;
        let entries = self.data.entry(repo.to_string()).or_default();
        let entry = entries
            .iter_mut()
            .find(|e| e.reference == reference)
            .ok_or_else(|| QuayError::GitFetchFailed {
                repo: repo.to_string(),
                message: "lock entry disappeared during refresh".to_string(),
            })?;
        entry.commit_id = commit_id;
        entry.stale = false;
        self.modified = true;
        Ok(entry.clone())
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Parse the on-disk representation. Every loaded entry starts stale.
    pub fn parse(contents: &str) -> QuayResult<LockFile> {
        let raw: BTreeMap<String, BTreeMap<String, LockNode>> = serde_json::from_str(contents)
            .map_err(|e| QuayError::Config {
                message: format!("failed to parse lock file: {e}"),
            })?;

        let mut data = BTreeMap::new();
        for (repo, references) in raw {
            let entries: Vec<LockEntryData> = references
                .into_iter()
                .map(|(reference, node)| LockEntryData {
                    reference,
                    commit_id: node.commit,
                    stale: true,
                })
                .collect();
            data.insert(repo, entries);
        }

        Ok(LockFile {
            data,
            modified: false,
        })
    }

    fn serialize(&self) -> String {
        let mut raw: BTreeMap<&str, BTreeMap<&str, LockNode>> = BTreeMap::new();
        for (repo, entries) in &self.data {
            let node = raw.entry(repo.as_str()).or_default();
            for entry in entries {
                node.insert(
                    entry.reference.as_str(),
                    LockNode {
                        commit: entry.commit_id.clone(),
                    },
                );
            }
        }
        serde_json::to_string_pretty(&raw).unwrap_or_else(|_| "{}".to_string())
    }

    /// Load the lock file at `path`; a missing file is an empty lock file.
    pub fn load(fs: &dyn Filesystem, path: &Path) -> QuayResult<LockFile> {
        match fs.read_contents(path) {
            Ok(contents) => LockFile::parse(&contents),
            Err(err) if err.is_file_not_found() => Ok(LockFile::default()),
            Err(err) => Err(err),
        }
    }

    /// Persist to `path` (tmp + rename) iff anything changed this process.
    pub fn save_if_modified(&self, fs: &dyn Filesystem, path: &Path) -> QuayResult<()> {
        if !self.modified {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs.create_directories(parent)?;
        }
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        fs.write_contents(&tmp, &self.serialize())?;
        fs.rename(&tmp, path)
    }
}
