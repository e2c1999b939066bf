//! The builtin registry backends.
//!
//! `BuiltinFilesRegistry` serves whatever is checked out under `ports/`.
//! `BuiltinGitRegistry` adds a baseline commit and the in-tree version
//! database, checking historic versions out of the root `.git`.
//! `BuiltinErrorRegistry` stands in when a baseline is required but absent.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::warn;

use crate::cache::{Cache, CacheSingle};
use crate::context::AppContext;
use crate::error::{QuayError, QuayResult};
use crate::recipe::{PathAndLocation, Recipe};
use crate::registry::{
    load_all_port_names_from_registry_versions, RegistryImplementation, BUILTIN_ERROR_KIND,
    BUILTIN_FILES_KIND, BUILTIN_GIT_KIND, BUILTIN_REGISTRY_GIT_URL,
};
use crate::version::baseline::{load_baseline_versions, Baseline};
use crate::version::db::{load_versions_file, PortVersionDb, VersionDbType};
use crate::version::{Version, VersionSpec};

/// The builtin registry without a baseline: only the `ports/` tree exists.
pub struct BuiltinFilesRegistry {
    ctx: Rc<AppContext>,
    recipes: Cache<PathBuf, QuayResult<Option<Rc<Recipe>>>>,
    versions: Cache<String, QuayResult<Option<Version>>>,
}

impl BuiltinFilesRegistry {
    pub fn new(ctx: Rc<AppContext>) -> Self {
        Self {
            ctx,
            recipes: Cache::new(),
            versions: Cache::new(),
        }
    }

    fn get_recipe(&self, path: &Path) -> QuayResult<Option<Rc<Recipe>>> {
        self.recipes.get_lazy(path, || {
            self.ctx
                .parser()
                .try_load_port(self.ctx.fs(), path)
                .map(|recipe| recipe.map(Rc::new))
        })
    }

    fn get_version(&self, port_name: &str) -> QuayResult<Option<Version>> {
        self.versions.get_lazy(port_name, || {
            let port_directory = self.ctx.builtin_ports_directory().join(port_name);
            self.get_recipe(&port_directory)
                .map(|recipe| recipe.map(|r| r.version().clone()))
        })
    }
}

impl RegistryImplementation for BuiltinFilesRegistry {
    fn kind(&self) -> &'static str {
        BUILTIN_FILES_KIND
    }

    fn get_port(&self, spec: &VersionSpec) -> QuayResult<Option<PathAndLocation>> {
        let port_directory = self.ctx.builtin_ports_directory().join(&spec.port_name);
        let Some(recipe) = self.get_recipe(&port_directory)? else {
            return Ok(None);
        };

        if recipe.name() != spec.port_name {
            return Err(QuayError::UnexpectedPortName {
                expected: spec.port_name.clone(),
                actual: recipe.name().to_string(),
                path: port_directory,
            });
        }

        if recipe.version() != &spec.version {
            warn!(
                port = %spec.port_name,
                expected = %spec.version,
                actual = %recipe.version(),
                "the builtin port tree does not have the requested version",
            );
            return Ok(None);
        }

        Ok(Some(PathAndLocation {
            path: port_directory,
            location: format!("git+{BUILTIN_REGISTRY_GIT_URL}#ports/{}", spec.port_name),
        }))
    }

    fn get_all_port_versions(&self, port_name: &str) -> QuayResult<Option<Vec<Version>>> {
        Ok(self.get_version(port_name)?.map(|version| vec![version]))
    }

    fn get_baseline_version(&self, port_name: &str) -> QuayResult<Option<Version>> {
        // Without a baseline file, the checked-out tree is the baseline.
        self.get_version(port_name)
    }

    fn append_all_port_names(&self, out: &mut Vec<String>) -> QuayResult<()> {
        let port_directories = self
            .ctx
            .fs()
            .get_directories_non_recursive(&self.ctx.builtin_ports_directory())?;
        for port_directory in port_directories {
            let Some(filename) = port_directory.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            if filename == ".DS_Store" {
                continue;
            }
            out.push(filename.to_string());
        }
        Ok(())
    }

    fn try_append_all_port_names_no_network(&self, out: &mut Vec<String>) -> QuayResult<bool> {
        self.append_all_port_names(out)?;
        Ok(true)
    }
}

/// The builtin registry pinned to a baseline commit.
pub struct BuiltinGitRegistry {
    ctx: Rc<AppContext>,
    baseline_identifier: String,
    files_impl: BuiltinFilesRegistry,
    baseline: CacheSingle<QuayResult<Rc<Baseline>>>,
    versions: Cache<String, QuayResult<Option<Rc<PortVersionDb>>>>,
}

impl BuiltinGitRegistry {
    pub fn new(ctx: Rc<AppContext>, baseline_identifier: String) -> Self {
        let files_impl = BuiltinFilesRegistry::new(ctx.clone());
        Self {
            ctx,
            baseline_identifier,
            files_impl,
            baseline: CacheSingle::new(),
            versions: Cache::new(),
        }
    }

    fn get_versions(&self, port_name: &str) -> QuayResult<Option<Rc<PortVersionDb>>> {
        self.versions.get_lazy(port_name, || {
            let entries = load_versions_file(
                self.ctx.fs(),
                VersionDbType::Git,
                &self.ctx.builtin_registry_versions(),
                port_name,
            )?;
            Ok(entries.map(|entries| Rc::new(PortVersionDb::new(entries))))
        })
    }

    fn load_baseline(&self) -> QuayResult<Rc<Baseline>> {
        let path = git_checkout_baseline(&self.ctx, &self.baseline_identifier)?;
        let loaded = load_baseline_versions(self.ctx.fs(), &path, "")?;
        match loaded {
            Some(baseline) => Ok(Rc::new(baseline)),
            None => Err(QuayError::BaselineMissingDefault {
                origin: format!(
                    "{} (baseline {})",
                    path.display(),
                    self.baseline_identifier
                ),
            }),
        }
    }
}

impl RegistryImplementation for BuiltinGitRegistry {
    fn kind(&self) -> &'static str {
        BUILTIN_GIT_KIND
    }

    fn get_port(&self, spec: &VersionSpec) -> QuayResult<Option<PathAndLocation>> {
        let Some(versions) = self.get_versions(&spec.port_name)? else {
            // No version database for this port; the checked-out tree may
            // still have it.
            return self.files_impl.get_port(spec);
        };

        let Some(git_tree) = versions.try_get_git_tree(&spec.version) else {
            return Err(QuayError::VersionNotInDatabase {
                port: spec.port_name.clone(),
                version: spec.version.clone(),
                known: versions.versions().to_vec(),
            });
        };
        let git_tree = git_tree.to_string();

        let path =
            self.ctx
                .git()
                .checkout_port(&spec.port_name, &git_tree, &self.ctx.root_dot_git())?;
        Ok(Some(PathAndLocation {
            path,
            location: format!("git+{BUILTIN_REGISTRY_GIT_URL}@{git_tree}"),
        }))
    }

    fn get_all_port_versions(&self, port_name: &str) -> QuayResult<Option<Vec<Version>>> {
        match self.get_versions(port_name)? {
            Some(versions) => Ok(Some(versions.versions().to_vec())),
            None => self.files_impl.get_all_port_versions(port_name),
        }
    }

    fn get_baseline_version(&self, port_name: &str) -> QuayResult<Option<Version>> {
        let baseline = self.baseline.get_lazy(|| self.load_baseline()).clone()?;
        Ok(baseline.get(port_name).cloned())
    }

    fn append_all_port_names(&self, out: &mut Vec<String>) -> QuayResult<()> {
        let versions_dir = self.ctx.builtin_registry_versions();
        if self.ctx.fs().exists(&versions_dir) {
            load_all_port_names_from_registry_versions(out, self.ctx.fs(), &versions_dir)?;
        }
        self.files_impl.append_all_port_names(out)
    }

    fn try_append_all_port_names_no_network(&self, out: &mut Vec<String>) -> QuayResult<bool> {
        self.append_all_port_names(out)?;
        Ok(true)
    }
}

/// Stub used when the configuration demands a baseline and none is set:
/// every operation reports that requirement.
pub struct BuiltinErrorRegistry;

impl RegistryImplementation for BuiltinErrorRegistry {
    fn kind(&self) -> &'static str {
        BUILTIN_ERROR_KIND
    }

    fn get_port(&self, _spec: &VersionSpec) -> QuayResult<Option<PathAndLocation>> {
        Err(QuayError::RegistryRequiresBaseline)
    }

    fn get_all_port_versions(&self, _port_name: &str) -> QuayResult<Option<Vec<Version>>> {
        Err(QuayError::RegistryRequiresBaseline)
    }

    fn get_baseline_version(&self, _port_name: &str) -> QuayResult<Option<Version>> {
        Err(QuayError::RegistryRequiresBaseline)
    }

    fn append_all_port_names(&self, _out: &mut Vec<String>) -> QuayResult<()> {
        Err(QuayError::RegistryRequiresBaseline)
    }

    fn try_append_all_port_names_no_network(&self, _out: &mut Vec<String>) -> QuayResult<bool> {
        Err(QuayError::RegistryRequiresBaseline)
    }
}

/// Materialize the builtin baseline file for `commit_sha` at
/// `<baselines>/<sha>/baseline.json`, once, with an atomic rename.
fn git_checkout_baseline(ctx: &AppContext, commit_sha: &str) -> QuayResult<PathBuf> {
    let destination_parent = ctx.baselines_output().join(commit_sha);
    let destination = destination_parent.join("baseline.json");
    if ctx.fs().exists(&destination) {
        return Ok(destination);
    }

    let note = || format!("while checking out baseline {commit_sha}");
    let contents = ctx
        .git()
        .show(&ctx.root_dot_git(), commit_sha, "versions/baseline.json")
        .map_err(|e| e.note(note()))?;

    let destination_tmp = destination_parent.join("baseline.json.tmp");
    ctx.fs()
        .create_directories(&destination_parent)
        .map_err(|e| e.note(note()))?;
    ctx.fs()
        .write_contents(&destination_tmp, &contents)
        .map_err(|e| e.note(note()))?;
    ctx.fs()
        .rename(&destination_tmp, &destination)
        .map_err(|e| e.note(note()))?;

    Ok(destination)
}
