//! Quay Core Library
//!
//! Port resolution for the quay package manager: registries, overlays, and
//! the provider pipeline that answers "where is the recipe for this port,
//! and what is its canonical identity?".

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod fs;
pub mod git;
pub mod lockfile;
pub mod metrics;
pub mod provider;
pub mod recipe;
pub mod registry;
pub mod version;

/// Re-exports of commonly used types
pub mod prelude {
    // Context
    pub use crate::context::AppContext;

    // Errors
    pub use crate::error::{QuayError, QuayResult};

    // External seams
    pub use crate::fs::{Filesystem, RealFilesystem};
    pub use crate::git::{process::ProcessGitBackend, GitBackend};
    pub use crate::recipe::{PortManifestParser, RecipeParser};

    // Data model
    pub use crate::recipe::{PathAndLocation, Recipe, RecipeAndLocation};
    pub use crate::version::{SchemedVersion, Version, VersionScheme, VersionSpec};

    // Registries
    pub use crate::config::{Configuration, RegistryConfig, RegistryKind};
    pub use crate::registry::{Registry, RegistryImplementation, RegistrySet};

    // Providers
    pub use crate::provider::{
        BaselineProvider, ManifestProvider, OverlayProvider, OverlayProviderImpl, PathsProvider,
        VersionedProvider,
    };

    // Lock file
    pub use crate::lockfile::{LockEntryData, LockFile};
}
