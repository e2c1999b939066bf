//! Registries: the authoritative sources of port recipes.
//!
//! Five backends share one contract; [`set::RegistrySet`] routes port names
//! to them through package patterns.

pub mod builtin;
pub mod filesystem;
pub mod git;
pub mod set;

use std::path::{Path, PathBuf};
use std::rc::Rc;

pub use builtin::{BuiltinErrorRegistry, BuiltinFilesRegistry, BuiltinGitRegistry};
pub use filesystem::FilesystemRegistry;
pub use git::GitRegistry;
pub use set::{package_pattern_match, Registry, RegistrySet};

use crate::context::AppContext;
use crate::error::{QuayError, QuayResult};
use crate::fs::Filesystem;
use crate::recipe::{is_valid_port_name, PathAndLocation};
use crate::version::baseline::{load_baseline_versions, Baseline};
use crate::version::db::{load_versions_file, Locator, VersionDbType};
use crate::version::{SchemedVersion, Version, VersionSpec};

pub const BUILTIN_FILES_KIND: &str = "builtin-files";
pub const BUILTIN_GIT_KIND: &str = "builtin-git";
pub const BUILTIN_ERROR_KIND: &str = "builtin-error";
pub const GIT_KIND: &str = "git";
pub const FILESYSTEM_KIND: &str = "filesystem";

/// Upstream of the builtin port collection.
pub const BUILTIN_REGISTRY_GIT_URL: &str = "https://github.com/Microsoft/vcpkg";

/// Name of the version database directory inside a registry.
pub(crate) const REGISTRY_VERSIONS_DIR: &str = "versions";

/// The contract every registry backend implements.
pub trait RegistryImplementation {
    fn kind(&self) -> &'static str;

    /// The on-disk recipe directory for `(name, version)`, or `None` when
    /// this registry has no such port version.
    fn get_port(&self, spec: &VersionSpec) -> QuayResult<Option<PathAndLocation>>;

    /// Every version this registry knows for the port, in database order.
    fn get_all_port_versions(&self, port_name: &str) -> QuayResult<Option<Vec<Version>>>;

    /// The version this registry's baseline pins the port to.
    fn get_baseline_version(&self, port_name: &str) -> QuayResult<Option<Version>>;

    /// Append every port name this registry can serve. May touch the
    /// network.
    fn append_all_port_names(&self, out: &mut Vec<String>) -> QuayResult<()>;

    /// Like [`append_all_port_names`](Self::append_all_port_names) but never
    /// touching the network. Returns `false` when an exhaustive enumeration
    /// would require it; nothing is appended in that case.
    fn try_append_all_port_names_no_network(&self, out: &mut Vec<String>) -> QuayResult<bool>;
}

/// The builtin registry in the flavor the configuration asks for.
///
/// With a baseline, versions come from the builtin tree's own git database
/// (or, when `versions_via_git` is set, from the upstream registry treated
/// as a remote). Without a baseline, ports are read straight from the
/// `ports/` tree, unless `versions_via_git` demands a baseline, in which
/// case every operation fails.
pub fn make_builtin_registry(
    ctx: &Rc<AppContext>,
    baseline: Option<String>,
    versions_via_git: bool,
) -> Box<dyn RegistryImplementation> {
    match (baseline, versions_via_git) {
        (Some(baseline), true) => Box::new(GitRegistry::new(
            ctx.clone(),
            BUILTIN_REGISTRY_GIT_URL.to_string(),
            "HEAD".to_string(),
            baseline,
        )),
        (Some(baseline), false) => Box::new(BuiltinGitRegistry::new(ctx.clone(), baseline)),
        (None, true) => Box::new(BuiltinErrorRegistry),
        (None, false) => Box::new(BuiltinFilesRegistry::new(ctx.clone())),
    }
}

pub fn make_git_registry(
    ctx: &Rc<AppContext>,
    repo: String,
    reference: String,
    baseline: String,
) -> Box<dyn RegistryImplementation> {
    Box::new(GitRegistry::new(ctx.clone(), repo, reference, baseline))
}

pub fn make_filesystem_registry(
    ctx: &Rc<AppContext>,
    path: PathBuf,
    baseline: String,
) -> Box<dyn RegistryImplementation> {
    Box::new(FilesystemRegistry::new(ctx.clone(), path, baseline))
}

/// Append the port names present in a registry's version database
/// directory: every `<x>-/<name>.json` contributes `<name>`.
///
/// Files that are not `.json` at all are ignored, but a wrong-case
/// extension or a filename that is not a valid port name is an error.
pub(crate) fn load_all_port_names_from_registry_versions(
    out: &mut Vec<String>,
    fs: &dyn Filesystem,
    port_versions_path: &Path,
) -> QuayResult<()> {
    for super_directory in fs.get_directories_non_recursive(port_versions_path)? {
        for file in fs.get_regular_files_non_recursive(&super_directory)? {
            let Some(filename) = file.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            if !filename.to_ascii_lowercase().ends_with(".json") {
                continue;
            }
            let Some(port_name) = filename.strip_suffix(".json") else {
                return Err(QuayError::JsonFileMissingExtension { path: file });
            };
            if !is_valid_port_name(port_name) {
                return Err(QuayError::InvalidPortVersionFileName { path: file });
            }
            out.push(port_name.to_string());
        }
    }
    Ok(())
}

/// Versions known to the builtin registry's database for `port_name`, with
/// their git trees. Used by the update and upgrade pipelines.
pub fn get_builtin_versions(
    ctx: &AppContext,
    port_name: &str,
) -> QuayResult<Option<Vec<(SchemedVersion, String)>>> {
    let entries = load_versions_file(
        ctx.fs(),
        VersionDbType::Git,
        &ctx.builtin_registry_versions(),
        port_name,
    )?;
    Ok(entries.map(|entries| {
        entries
            .into_iter()
            .filter_map(|entry| match entry.locator {
                Locator::GitTree(tree) => Some((
                    SchemedVersion {
                        scheme: entry.scheme,
                        version: entry.version,
                    },
                    tree,
                )),
                Locator::Filesystem(_) => None,
            })
            .collect()
    }))
}

/// The builtin registry's `default` baseline; missing files or a missing
/// `default` key are errors here.
pub fn get_builtin_baseline(ctx: &AppContext) -> QuayResult<Baseline> {
    let baseline_path = ctx.builtin_registry_versions().join("baseline.json");
    let loaded = load_baseline_versions(ctx.fs(), &baseline_path, "")?;
    loaded.ok_or_else(|| QuayError::BaselineMissingDefault {
        origin: baseline_path.display().to_string(),
    })
}
