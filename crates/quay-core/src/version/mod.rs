//! Version and version-spec types.
//!
//! The core transports versions; it never compares them semantically. Two
//! versions are equal iff their text and port-version match exactly.

pub mod baseline;
pub mod db;

use std::fmt;

use serde_json::Value;

/// A port version: the version text exactly as written, plus the
/// port-version revision counter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    text: String,
    port_version: u32,
}

impl Version {
    pub fn new(text: impl Into<String>, port_version: u32) -> Self {
        Self {
            text: text.into(),
            port_version,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn port_version(&self) -> u32 {
        self.port_version
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port_version == 0 {
            write!(f, "{}", self.text)
        } else {
            write!(f, "{}#{}", self.text, self.port_version)
        }
    }
}

/// How a version's text is meant to be compared by downstream tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionScheme {
    /// `"version"`: dotted numbers, relaxed.
    Relaxed,
    /// `"version-semver"`: strict semantic versioning.
    Semver,
    /// `"version-date"`: `YYYY-MM-DD` with optional suffix.
    Date,
    /// `"version-string"`: opaque, equality only.
    String,
}

impl VersionScheme {
    pub const JSON_KEYS: [&'static str; 4] = [
        "version",
        "version-semver",
        "version-date",
        "version-string",
    ];

    pub fn as_json_key(&self) -> &'static str {
        match self {
            VersionScheme::Relaxed => "version",
            VersionScheme::Semver => "version-semver",
            VersionScheme::Date => "version-date",
            VersionScheme::String => "version-string",
        }
    }

    pub fn from_json_key(key: &str) -> Option<VersionScheme> {
        match key {
            "version" => Some(VersionScheme::Relaxed),
            "version-semver" => Some(VersionScheme::Semver),
            "version-date" => Some(VersionScheme::Date),
            "version-string" => Some(VersionScheme::String),
            _ => None,
        }
    }
}

/// A version tagged with its comparison scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemedVersion {
    pub scheme: VersionScheme,
    pub version: Version,
}

/// The primary query key: a port name and an exact version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSpec {
    pub port_name: String,
    pub version: Version,
}

impl VersionSpec {
    pub fn new(port_name: impl Into<String>, version: Version) -> Self {
        Self {
            port_name: port_name.into(),
            version,
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.port_name, self.version)
    }
}

/// Parse the schemed-version fields of a JSON object: exactly one of the
/// scheme keys must be present with a string value, plus an optional
/// non-negative `"port-version"`.
///
/// Version text is kept exactly as written; no normalization happens here.
pub(crate) fn schemed_version_from_object(
    obj: &serde_json::Map<String, Value>,
) -> Result<SchemedVersion, String> {
    const SCHEMES: [VersionScheme; 4] = [
        VersionScheme::Relaxed,
        VersionScheme::Semver,
        VersionScheme::Date,
        VersionScheme::String,
    ];

    let mut found: Option<(VersionScheme, &str)> = None;
    for scheme in SCHEMES {
        let key = scheme.as_json_key();
        let Some(value) = obj.get(key) else { continue };
        let Some(text) = value.as_str() else {
            return Err(format!("\"{key}\" must be a string"));
        };
        if found.is_some() {
            return Err("more than one version scheme field is present".to_string());
        }
        found = Some((scheme, text));
    }

    let Some((scheme, text)) = found else {
        return Err(format!(
            "expected one of the fields {}",
            VersionScheme::JSON_KEYS.join(", ")
        ));
    };

    let port_version = match obj.get("port-version") {
        None => 0,
        Some(value) => match value.as_u64() {
            Some(n) if n <= u64::from(u32::MAX) => n as u32,
            _ => return Err("\"port-version\" must be a non-negative integer".to_string()),
        },
    };

    Ok(SchemedVersion {
        scheme,
        version: Version::new(text, port_version),
    })
}
