//! Error types for the resolution core.
//!
//! Resolution results are memoized, including failures, so every error here
//! is cloneable; causes from I/O, git, and JSON parsing are captured as
//! messages rather than source chains.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::version::Version;

/// Result alias used throughout the crate.
pub type QuayResult<T> = std::result::Result<T, QuayError>;

/// The canonical error type of the resolution core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuayError {
    /// A filesystem call failed. The `kind` is preserved so callers can
    /// distinguish a missing file from other failures.
    #[error("filesystem call {op} failed for {}: {message}", .path.display())]
    FilesystemCall {
        op: &'static str,
        path: PathBuf,
        kind: io::ErrorKind,
        message: String,
    },

    /// A version database file did not parse.
    #[error("failed to parse version database {origin}: {message}")]
    VersionsFileParse { origin: String, message: String },

    /// A version database file's `.json` extension is not lowercase.
    #[error("the version database file {} must have a lowercase .json extension", .path.display())]
    JsonFileMissingExtension { path: PathBuf },

    /// A version database file is not named after a valid port.
    #[error("the version database file {} is not named after a valid port", .path.display())]
    InvalidPortVersionFileName { path: PathBuf },

    /// A baseline file did not parse.
    #[error("failed to parse baseline {origin}: {message}")]
    BaselineParse { origin: String, message: String },

    /// A baseline file parsed but has no entry under the expected key.
    #[error("the baseline at {origin} does not contain a \"default\" field")]
    BaselineMissingDefault { origin: String },

    /// A git registry's baseline file could not be located at its commit.
    #[error("could not find a baseline for {repo} at {commit}: {message}")]
    CouldNotFindBaseline {
        repo: String,
        commit: String,
        message: String,
    },

    /// A `$/`-relative version database locator was malformed.
    #[error("invalid registry path {path}: {reason}")]
    InvalidRegistryPath { path: String, reason: String },

    /// A port directory did not parse as a port.
    #[error("failed to load port from {}: {message}", .path.display())]
    RecipeParse { path: PathBuf, message: String },

    /// No registry knows this port at all.
    #[error("the port {port} does not exist")]
    PortNotFound { port: String },

    /// The selected registry has no baseline entry for this port.
    #[error("the port {port} is not in the baseline")]
    PortNotInBaseline { port: String },

    /// No registry pattern matched and there is no default registry.
    #[error("no registry is configured for the port {port}")]
    NoRegistryForPort { port: String },

    /// A loaded recipe disagrees with the `(name, version)` it was loaded for.
    #[error("{}: expected {expected} but the port declares {actual}", .path.display())]
    VersionSpecMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A registry port directory declares a name other than its own.
    #[error("{}: the port is named {actual}, expected {expected}", .path.display())]
    UnexpectedPortName {
        expected: String,
        actual: String,
        path: PathBuf,
    },

    /// An overlay's `<overlay>/<name>` directory declares a different name.
    #[error("{}: the port {actual} does not match the overlay name {expected}", .path.display())]
    MismatchedOverlayName {
        expected: String,
        actual: String,
        path: PathBuf,
    },

    /// An overlay directory does not exist or is not a directory.
    #[error("the overlay {} is not a directory", .path.display())]
    OverlayNotADirectory { path: PathBuf },

    /// The builtin registry was configured without a baseline but one is
    /// required in this mode.
    #[error("the builtin registry requires a baseline in this configuration")]
    RegistryRequiresBaseline,

    /// A git registry's baseline identifier is not a commit sha.
    #[error("the git registry {repo} must have a commit sha baseline; its current head is {commit}")]
    GitRegistryMustHaveBaseline { repo: String, commit: String },

    /// A git fetch against a remote registry failed.
    #[error("failed to fetch {repo}: {message}")]
    GitFetchFailed { repo: String, message: String },

    /// Extracting or checking out a git tree failed.
    #[error("failed to check out {what}: {message}")]
    GitCheckoutFailed { what: String, message: String },

    /// Reading a file at `commit:path` from a git repository failed.
    #[error("git show {what} failed: {message}")]
    GitShowFailed { what: String, message: String },

    /// The registry's commit does not carry a versions database.
    #[error("{repo} does not have a versions database at {commit}: {message}")]
    NoVersionsAtCommit {
        repo: String,
        commit: String,
        message: String,
    },

    /// The version database for a port has no entry for the requested version.
    #[error("{}", format_version_entry_missing(.port, .version, .known))]
    VersionNotInDatabase {
        port: String,
        version: Version,
        known: Vec<Version>,
    },

    /// A registry configuration is invalid.
    #[error("invalid registry configuration: {message}")]
    Config { message: String },

    /// A deeper error annotated with context, keeping the cause intact.
    #[error("{inner}\nnote: {note}")]
    Noted { note: String, inner: Box<QuayError> },
}

impl QuayError {
    /// Wrap this error with a `note:` line, preserving the original.
    pub fn note(self, note: impl Into<String>) -> QuayError {
        QuayError::Noted {
            note: note.into(),
            inner: Box::new(self),
        }
    }

    /// True when this is a filesystem not-found error, which several loaders
    /// treat as "no data" rather than a failure.
    pub fn is_file_not_found(&self) -> bool {
        matches!(
            self,
            QuayError::FilesystemCall {
                kind: io::ErrorKind::NotFound,
                ..
            }
        )
    }
}

fn format_version_entry_missing(port: &str, version: &Version, known: &[Version]) -> String {
    let mut msg = format!("no version database entry for {port}@{version}");
    if !known.is_empty() {
        msg.push_str("; known versions:");
        for v in known {
            msg.push_str("\n  ");
            msg.push_str(&v.to_string());
        }
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_preserves_inner_message() {
        let err = QuayError::PortNotFound {
            port: "zlib".to_string(),
        }
        .note("while loading port version zlib@1.3");

        let text = err.to_string();
        assert!(text.starts_with("the port zlib does not exist"));
        assert!(text.contains("note: while loading port version zlib@1.3"));
    }

    #[test]
    fn test_file_not_found_detection() {
        let missing = QuayError::FilesystemCall {
            op: "read_contents",
            path: PathBuf::from("/nope"),
            kind: io::ErrorKind::NotFound,
            message: "no such file".to_string(),
        };
        assert!(missing.is_file_not_found());

        let denied = QuayError::FilesystemCall {
            op: "read_contents",
            path: PathBuf::from("/secret"),
            kind: io::ErrorKind::PermissionDenied,
            message: "denied".to_string(),
        };
        assert!(!denied.is_file_not_found());
    }

    #[test]
    fn test_version_entry_missing_lists_known_versions() {
        let err = QuayError::VersionNotInDatabase {
            port: "curl".to_string(),
            version: Version::new("8.0.0", 0),
            known: vec![Version::new("7.88.1", 1), Version::new("8.1.2", 0)],
        };
        let text = err.to_string();
        assert!(text.contains("curl@8.0.0"));
        assert!(text.contains("7.88.1#1"));
        assert!(text.contains("8.1.2"));
    }
}
