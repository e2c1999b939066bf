//! Port recipes and their on-disk manifest.
//!
//! A port directory is identified by its `port.json` manifest: the port
//! name plus one schemed version field, sharing the version grammar with
//! the version database files.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{QuayError, QuayResult};
use crate::fs::Filesystem;
use crate::version::{schemed_version_from_object, SchemedVersion, Version, VersionScheme, VersionSpec};

/// Manifest file name that makes a directory a port.
pub const PORT_MANIFEST_FILE: &str = "port.json";

/// A port name is lowercase alphanumeric runs separated by single hyphens,
/// and must not collide with a reserved device or keyword name.
pub fn is_valid_port_name(name: &str) -> bool {
    const RESERVED: [&str; 6] = ["prn", "aux", "nul", "con", "core", "default"];

    let well_formed = !name.is_empty()
        && name.split('-').all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        });
    if !well_formed {
        return false;
    }
    if RESERVED.contains(&name) {
        return false;
    }
    // lpt0-lpt9 and com0-com9 are also reserved.
    if name.len() == 4
        && (name.starts_with("lpt") || name.starts_with("com"))
        && name.as_bytes()[3].is_ascii_digit()
    {
        return false;
    }
    true
}

/// The parsed identity of a port directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    name: String,
    schemed: SchemedVersion,
}

impl Recipe {
    pub fn new(name: impl Into<String>, schemed: SchemedVersion) -> Self {
        Self {
            name: name.into(),
            schemed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.schemed.version
    }

    pub fn scheme(&self) -> VersionScheme {
        self.schemed.scheme
    }

    pub fn to_version_spec(&self) -> VersionSpec {
        VersionSpec::new(self.name.clone(), self.schemed.version.clone())
    }
}

/// Parses a directory into a [`Recipe`].
pub trait RecipeParser {
    /// `Ok(None)` means the directory is not a port at all; parse failures
    /// of an actual manifest are errors.
    fn try_load_port(&self, fs: &dyn Filesystem, port_dir: &Path) -> QuayResult<Option<Recipe>>;
}

/// The default parser, reading `<port>/port.json`.
#[derive(Debug, Default)]
pub struct PortManifestParser;

impl RecipeParser for PortManifestParser {
    fn try_load_port(&self, fs: &dyn Filesystem, port_dir: &Path) -> QuayResult<Option<Recipe>> {
        let manifest_path = port_dir.join(PORT_MANIFEST_FILE);
        let contents = match fs.read_contents(&manifest_path) {
            Ok(contents) => contents,
            Err(err) if err.is_file_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        let parse_error = |message: String| QuayError::RecipeParse {
            path: manifest_path.clone(),
            message,
        };

        let value: serde_json::Value =
            serde_json::from_str(&contents).map_err(|e| parse_error(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| parse_error("expected a top-level object".to_string()))?;

        let name = obj
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| parse_error("expected a \"name\" string field".to_string()))?;
        let schemed = schemed_version_from_object(obj).map_err(parse_error)?;

        Ok(Some(Recipe::new(name, schemed)))
    }
}

/// A loaded recipe together with where it came from.
#[derive(Debug, Clone)]
pub struct RecipeAndLocation {
    pub recipe: Rc<Recipe>,
    /// Path of the manifest the recipe was parsed from.
    pub control_path: PathBuf,
    /// Stable, user-visible identifier of the source (see registry kinds).
    pub location: String,
}

impl RecipeAndLocation {
    pub fn to_version_spec(&self) -> VersionSpec {
        self.recipe.to_version_spec()
    }
}

/// A port directory on disk plus the same user-visible identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAndLocation {
    pub path: PathBuf,
    pub location: String,
}
