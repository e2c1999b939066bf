//! Remote git registries.
//!
//! A git registry is `(repository, reference, baseline)` plus a lock entry
//! pinning the reference to a commit. Version lookups try the stale lock
//! commit first and only refresh when it cannot answer, so an up-to-date
//! lock file means no network traffic at all.

use std::path::PathBuf;
use std::rc::Rc;

use tracing::info;

use crate::cache::{Cache, CacheSingle};
use crate::context::AppContext;
use crate::error::{QuayError, QuayResult};
use crate::git::is_commit_sha;
use crate::lockfile::LockEntryData;
use crate::metrics::DefineMetric;
use crate::recipe::PathAndLocation;
use crate::registry::{
    load_all_port_names_from_registry_versions, RegistryImplementation, GIT_KIND,
    REGISTRY_VERSIONS_DIR,
};
use crate::version::baseline::{parse_baseline_versions, Baseline, DEFAULT_BASELINE_KEY};
use crate::version::db::{load_versions_file, PortVersionDb, VersionDbType};
use crate::version::{Version, VersionSpec};

const BASELINE_PATH_IN_REGISTRY: &str = "versions/baseline.json";

pub struct GitRegistry {
    ctx: Rc<AppContext>,
    repo: String,
    reference: String,
    baseline_identifier: String,
    lock_seeded: CacheSingle<QuayResult<()>>,
    stale_versions_tree: CacheSingle<QuayResult<PathBuf>>,
    live_versions_tree: CacheSingle<QuayResult<PathBuf>>,
    baseline: CacheSingle<QuayResult<Rc<Baseline>>>,
    /// Version databases read at the lock's stored commit.
    stale_versions: Cache<String, QuayResult<Option<Rc<PortVersionDb>>>>,
    /// Version databases read after the lock entry was brought up to date.
    live_versions: Cache<String, QuayResult<Option<Rc<PortVersionDb>>>>,
}

impl GitRegistry {
    pub fn new(
        ctx: Rc<AppContext>,
        repo: String,
        reference: String,
        baseline_identifier: String,
    ) -> Self {
        Self {
            ctx,
            repo,
            reference,
            baseline_identifier,
            lock_seeded: CacheSingle::new(),
            stale_versions_tree: CacheSingle::new(),
            live_versions_tree: CacheSingle::new(),
            baseline: CacheSingle::new(),
            stale_versions: Cache::new(),
            live_versions: Cache::new(),
        }
    }

    /// Make sure the lock file has an entry for this registry, then read it.
    fn get_lock_entry(&self) -> QuayResult<LockEntryData> {
        self.lock_seeded
            .get_lazy(|| {
                self.ctx
                    .lockfile()
                    .borrow_mut()
                    .get_or_fetch(self.ctx.git(), &self.repo, &self.reference)
                    .map(|_| ())
            })
            .clone()?;
        self.current_lock_entry()
    }

    fn current_lock_entry(&self) -> QuayResult<LockEntryData> {
        self.ctx
            .lockfile()
            .borrow()
            .entry(&self.repo, &self.reference)
            .cloned()
            .ok_or_else(|| QuayError::GitFetchFailed {
                repo: self.repo.clone(),
                message: "the lock entry vanished mid-process".to_string(),
            })
    }

    fn ensure_up_to_date(&self) -> QuayResult<LockEntryData> {
        self.get_lock_entry()?;
        self.ctx
            .lockfile()
            .borrow_mut()
            .ensure_up_to_date(self.ctx.git(), &self.repo, &self.reference)
    }

    /// Locate and extract the `versions/` tree of `commit`.
    fn get_versions_tree_from_commit(
        &self,
        commit: &str,
        emit_telemetry: bool,
    ) -> QuayResult<PathBuf> {
        let tree = match self
            .ctx
            .git()
            .find_object_id_for_remote_registry_path(commit, REGISTRY_VERSIONS_DIR)
        {
            Ok(tree) => tree,
            Err(err) => {
                if emit_telemetry {
                    self.ctx
                        .metrics()
                        .track_define(DefineMetric::RegistriesErrorNoVersionsAtCommit);
                }
                return Err(QuayError::NoVersionsAtCommit {
                    repo: self.repo.clone(),
                    commit: commit.to_string(),
                    message: err.to_string(),
                });
            }
        };

        self.ctx
            .git()
            .extract_tree_from_remote_registry(&tree)
            .map_err(|err| QuayError::GitCheckoutFailed {
                what: self.repo.clone(),
                message: err.to_string(),
            })
    }

    fn load_live_versions_tree(&self) -> QuayResult<PathBuf> {
        self.get_lock_entry()?;
        let entry = self.ensure_up_to_date()?;
        self.get_versions_tree_from_commit(&entry.commit_id, true)
    }

    fn get_versions_in(
        &self,
        cache: &Cache<String, QuayResult<Option<Rc<PortVersionDb>>>>,
        port_name: &str,
        vdb_path: &std::path::Path,
    ) -> QuayResult<Option<Rc<PortVersionDb>>> {
        cache.get_lazy(port_name, || {
            let entries =
                load_versions_file(self.ctx.fs(), VersionDbType::Git, vdb_path, port_name)?;
            Ok(entries.map(|entries| Rc::new(PortVersionDb::new(entries))))
        })
    }

    /// Version database as of the stale lock commit. Callers only ask while
    /// the entry is actually stale.
    fn get_stale_versions(&self, port_name: &str) -> QuayResult<Option<Rc<PortVersionDb>>> {
        let tree = self.stale_versions_tree.get_lazy(|| {
            let entry = self.current_lock_entry()?;
            self.get_versions_tree_from_commit(&entry.commit_id, false)
        });
        match tree {
            Ok(path) => self.get_versions_in(&self.stale_versions, port_name, path),
            Err(err) => self
                .stale_versions
                .get_lazy(port_name, || Err(err.clone())),
        }
    }

    fn get_live_versions(&self, port_name: &str) -> QuayResult<Option<Rc<PortVersionDb>>> {
        let tree = self
            .live_versions_tree
            .get_lazy(|| self.load_live_versions_tree());
        match tree {
            Ok(path) => self.get_versions_in(&self.live_versions, port_name, path),
            Err(err) => self.live_versions.get_lazy(port_name, || Err(err.clone())),
        }
    }

    fn load_git_tree(&self, git_tree: &str) -> QuayResult<Option<PathAndLocation>> {
        let path = self.ctx.git().extract_tree_from_remote_registry(git_tree)?;
        Ok(Some(PathAndLocation {
            path,
            location: format!("git+{}@{}", self.repo, git_tree),
        }))
    }

    fn load_baseline(&self) -> QuayResult<Rc<Baseline>> {
        // Validation is delayed until someone actually needs the baseline so
        // the error can name the registry's current head.
        if !is_commit_sha(&self.baseline_identifier) {
            let entry = self.ensure_up_to_date()?;
            return Err(QuayError::GitRegistryMustHaveBaseline {
                repo: self.repo.clone(),
                commit: entry.commit_id,
            });
        }

        let mut maybe_contents = self
            .ctx
            .git()
            .show_remote(&self.baseline_identifier, BASELINE_PATH_IN_REGISTRY);

        if maybe_contents.is_err() {
            // The baseline commit may be newer than the lock's commit.
            self.ensure_up_to_date()?;
            maybe_contents = self
                .ctx
                .git()
                .show_remote(&self.baseline_identifier, BASELINE_PATH_IN_REGISTRY);
        }

        if maybe_contents.is_err() {
            // Still unknown; fetch the baseline commit itself.
            info!(repo = %self.repo, "fetching baseline information");
            if let Err(err) = self.ctx.git().fetch(&self.repo, &self.baseline_identifier) {
                self.ctx
                    .metrics()
                    .track_define(DefineMetric::RegistriesErrorCouldNotFindBaseline);
                return Err(err);
            }
            maybe_contents = self
                .ctx
                .git()
                .show_remote(&self.baseline_identifier, BASELINE_PATH_IN_REGISTRY);
        }

        let contents = match maybe_contents {
            Ok(contents) => contents,
            Err(err) => {
                self.ctx
                    .metrics()
                    .track_define(DefineMetric::RegistriesErrorCouldNotFindBaseline);
                return Err(QuayError::CouldNotFindBaseline {
                    repo: self.repo.clone(),
                    commit: self.baseline_identifier.clone(),
                    message: err.to_string(),
                });
            }
        };

        let parsed = parse_baseline_versions(
            &contents,
            DEFAULT_BASELINE_KEY,
            BASELINE_PATH_IN_REGISTRY,
        )
        .map_err(|err| {
            err.note(format!(
                "while fetching baseline {} of {}",
                self.baseline_identifier, self.repo
            ))
        })?;

        match parsed {
            Some(baseline) => Ok(Rc::new(baseline)),
            None => {
                self.ctx
                    .metrics()
                    .track_define(DefineMetric::RegistriesErrorCouldNotFindBaseline);
                Err(QuayError::BaselineMissingDefault {
                    origin: format!("{}@{}", self.repo, self.baseline_identifier),
                })
            }
        }
    }
}

impl RegistryImplementation for GitRegistry {
    fn kind(&self) -> &'static str {
        GIT_KIND
    }

    fn get_port(&self, spec: &VersionSpec) -> QuayResult<Option<PathAndLocation>> {
        let entry = self.get_lock_entry()?;

        // Phase one: answer from the stale lock commit when possible. Any
        // failure here falls through to the live lookup instead of
        // surfacing.
        if entry.stale {
            if let Ok(Some(stale_db)) = self.get_stale_versions(&spec.port_name) {
                if let Some(git_tree) = stale_db.try_get_git_tree(&spec.version) {
                    let git_tree = git_tree.to_string();
                    return self.load_git_tree(&git_tree);
                }
            }
        }

        // Phase two: refresh and answer from the live commit.
        if let Some(live_db) = self.get_live_versions(&spec.port_name)? {
            if let Some(git_tree) = live_db.try_get_git_tree(&spec.version) {
                let git_tree = git_tree.to_string();
                return self.load_git_tree(&git_tree);
            }
        }

        Ok(None)
    }

    fn get_all_port_versions(&self, port_name: &str) -> QuayResult<Option<Vec<Version>>> {
        Ok(self
            .get_live_versions(port_name)?
            .map(|db| db.versions().to_vec()))
    }

    fn get_baseline_version(&self, port_name: &str) -> QuayResult<Option<Version>> {
        let baseline = self.baseline.get_lazy(|| self.load_baseline()).clone()?;
        Ok(baseline.get(port_name).cloned())
    }

    fn append_all_port_names(&self, out: &mut Vec<String>) -> QuayResult<()> {
        let tree = self
            .live_versions_tree
            .get_lazy(|| self.load_live_versions_tree())
            .clone()?;
        load_all_port_names_from_registry_versions(out, self.ctx.fs(), &tree)
    }

    fn try_append_all_port_names_no_network(&self, _out: &mut Vec<String>) -> QuayResult<bool> {
        // The lock file does not record when this registry was last
        // enumerated, so there is no offline answer to give.
        Ok(false)
    }
}
