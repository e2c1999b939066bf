//! Version database files.
//!
//! Each port has `<versions-root>/<first-letter>-/<port-name>.json` listing
//! every known version and where to get its recipe: a git tree for git
//! registries, a `$/`-relative path for filesystem registries.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{QuayError, QuayResult};
use crate::fs::Filesystem;
use crate::version::{schemed_version_from_object, Version, VersionScheme};

/// Which locator flavor a registry's version database uses.
#[derive(Debug, Clone, Copy)]
pub enum VersionDbType<'a> {
    Git,
    Filesystem { registry_root: &'a Path },
}

/// Where one version's recipe lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A git tree sha in the registry's repository.
    GitTree(String),
    /// An absolute path resolved from a `$/…` locator.
    Filesystem(PathBuf),
}

/// One parsed element of the `"versions"` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDbEntry {
    pub scheme: VersionScheme,
    pub version: Version,
    pub locator: Locator,
}

/// A port's versions and locators as parallel arrays in source order.
/// Lookup is a linear scan; the first equal version wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortVersionDb {
    versions: Vec<Version>,
    locators: Vec<Locator>,
}

impl PortVersionDb {
    pub fn new(entries: Vec<VersionDbEntry>) -> Self {
        let mut versions = Vec::with_capacity(entries.len());
        let mut locators = Vec::with_capacity(entries.len());
        for entry in entries {
            versions.push(entry.version);
            locators.push(entry.locator);
        }
        Self { versions, locators }
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn try_get_locator(&self, version: &Version) -> Option<&Locator> {
        self.versions
            .iter()
            .position(|v| v == version)
            .map(|i| &self.locators[i])
    }

    pub fn try_get_git_tree(&self, version: &Version) -> Option<&str> {
        match self.try_get_locator(version) {
            Some(Locator::GitTree(tree)) => Some(tree),
            _ => None,
        }
    }

    pub fn try_get_path(&self, version: &Version) -> Option<&Path> {
        match self.try_get_locator(version) {
            Some(Locator::Filesystem(path)) => Some(path),
            _ => None,
        }
    }
}

/// `zlib` → `z-/zlib.json`.
pub fn relative_path_to_versions(port_name: &str) -> PathBuf {
    let mut prefix = String::new();
    if let Some(first) = port_name.chars().next() {
        prefix.push(first);
    }
    prefix.push('-');
    PathBuf::from(prefix).join(format!("{port_name}.json"))
}

/// Check a `$/…` registry-relative locator before resolving it.
pub(crate) fn validate_registry_path(path: &str) -> Result<(), String> {
    if !path.starts_with("$/") {
        return Err("must start with \"$/\"".to_string());
    }
    if path.contains('\\') {
        return Err("must be delimited with forward slashes".to_string());
    }
    if path.contains("//") {
        return Err("must not contain empty path components".to_string());
    }
    for component in path[2..].split('/') {
        if component == "." || component == ".." {
            return Err("must not contain dot or dot-dot path components".to_string());
        }
    }
    Ok(())
}

fn entry_from_value(
    value: &Value,
    db_type: VersionDbType<'_>,
    origin: &Path,
) -> QuayResult<VersionDbEntry> {
    let parse_error = |message: String| QuayError::VersionsFileParse {
        origin: origin.display().to_string(),
        message,
    };

    let obj = value
        .as_object()
        .ok_or_else(|| parse_error("expected a version database entry object".to_string()))?;
    let schemed = schemed_version_from_object(obj).map_err(parse_error)?;

    let locator = match db_type {
        VersionDbType::Git => {
            let tree = obj
                .get("git-tree")
                .and_then(|v| v.as_str())
                .ok_or_else(|| parse_error("expected a \"git-tree\" string field".to_string()))?;
            Locator::GitTree(tree.to_string())
        }
        VersionDbType::Filesystem { registry_root } => {
            let raw = obj
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| parse_error("expected a \"path\" string field".to_string()))?;
            validate_registry_path(raw).map_err(|reason| QuayError::InvalidRegistryPath {
                path: raw.to_string(),
                reason,
            })?;
            Locator::Filesystem(registry_root.join(&raw[2..]))
        }
    };

    Ok(VersionDbEntry {
        scheme: schemed.scheme,
        version: schemed.version,
        locator,
    })
}

/// Load a port's version database file.
///
/// A missing file yields `Ok(None)`: the registry simply has no entries for
/// this port. Everything else that goes wrong is an error.
pub fn load_versions_file(
    fs: &dyn Filesystem,
    db_type: VersionDbType<'_>,
    registry_versions: &Path,
    port_name: &str,
) -> QuayResult<Option<Vec<VersionDbEntry>>> {
    let versions_file_path = registry_versions.join(relative_path_to_versions(port_name));
    let contents = match fs.read_contents(&versions_file_path) {
        Ok(contents) => contents,
        Err(err) if err.is_file_not_found() => return Ok(None),
        Err(err) => return Err(err),
    };

    let parse_error = |message: String| QuayError::VersionsFileParse {
        origin: versions_file_path.display().to_string(),
        message,
    };

    let value: Value = serde_json::from_str(&contents).map_err(|e| parse_error(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| parse_error("expected a top-level object".to_string()))?;
    let versions = obj
        .get("versions")
        .and_then(|v| v.as_array())
        .ok_or_else(|| parse_error("expected a \"versions\" array".to_string()))?;

    let mut entries = Vec::with_capacity(versions.len());
    for element in versions {
        entries.push(entry_from_value(element, db_type, &versions_file_path)?);
    }
    Ok(Some(entries))
}
