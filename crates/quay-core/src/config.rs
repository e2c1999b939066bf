//! Registry configuration.
//!
//! Deserializes `quay-configuration.json` — an optional default registry
//! plus an ordered list of routed registries — validates it, and
//! instantiates the [`RegistrySet`].

use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::context::AppContext;
use crate::error::{QuayError, QuayResult};
use crate::registry::{
    make_builtin_registry, make_filesystem_registry, make_git_registry, Registry,
    RegistryImplementation, RegistrySet,
};

/// The whole configuration file.
///
/// `default_registry` distinguishes "absent" (the builtin registry) from an
/// explicit `null` (no default registry at all).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    #[serde(
        default,
        deserialize_with = "deserialize_explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_registry: Option<Option<RegistryConfig>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registries: Vec<RegistryConfig>,
}

fn deserialize_explicit_null<'de, D>(
    deserializer: D,
) -> Result<Option<Option<RegistryConfig>>, D::Error>
where
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// One registry declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryConfig {
    pub kind: RegistryKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,

    /// Git registries: the repository URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Git registries: the reference to track, defaulting to HEAD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Filesystem registries: the registry root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Patterns routing port names to this registry. Required for routed
    /// registries, forbidden for the default registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryKind {
    Builtin,
    Git,
    Filesystem,
}

impl RegistryConfig {
    pub fn validate(&self, is_default: bool) -> QuayResult<()> {
        let config_error = |message: String| QuayError::Config { message };

        match self.kind {
            RegistryKind::Builtin => {
                if self.repository.is_some() || self.path.is_some() || self.reference.is_some() {
                    return Err(config_error(
                        "a builtin registry declares only \"baseline\"".to_string(),
                    ));
                }
            }
            RegistryKind::Git => {
                let Some(repository) = &self.repository else {
                    return Err(config_error(
                        "a git registry requires a \"repository\" field".to_string(),
                    ));
                };
                Url::parse(repository).map_err(|e| {
                    config_error(format!("invalid git registry repository {repository}: {e}"))
                })?;
                if self.path.is_some() {
                    return Err(config_error(
                        "a git registry must not declare \"path\"".to_string(),
                    ));
                }
            }
            RegistryKind::Filesystem => {
                if self.path.is_none() {
                    return Err(config_error(
                        "a filesystem registry requires a \"path\" field".to_string(),
                    ));
                }
                if self.repository.is_some() || self.reference.is_some() {
                    return Err(config_error(
                        "a filesystem registry must not declare \"repository\" or \"reference\""
                            .to_string(),
                    ));
                }
            }
        }

        if is_default {
            if !self.packages.is_empty() {
                return Err(config_error(
                    "the default registry must not declare \"packages\"".to_string(),
                ));
            }
        } else if self.packages.is_empty() {
            return Err(config_error(
                "a registry requires a non-empty \"packages\" array".to_string(),
            ));
        } else if self.packages.iter().any(|pattern| pattern.is_empty()) {
            return Err(config_error(
                "package patterns must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn instantiate(
        &self,
        ctx: &Rc<AppContext>,
        versions_via_git: bool,
    ) -> Box<dyn RegistryImplementation> {
        match self.kind {
            RegistryKind::Builtin => {
                make_builtin_registry(ctx, self.baseline.clone(), versions_via_git)
            }
            RegistryKind::Git => make_git_registry(
                ctx,
                self.repository.clone().unwrap_or_default(),
                self.reference.clone().unwrap_or_else(|| "HEAD".to_string()),
                self.baseline.clone().unwrap_or_default(),
            ),
            RegistryKind::Filesystem => make_filesystem_registry(
                ctx,
                ctx.original_cwd()
                    .join(self.path.as_deref().unwrap_or_default()),
                self.baseline.clone().unwrap_or_default(),
            ),
        }
    }
}

impl Configuration {
    pub fn parse(contents: &str, origin: &str) -> QuayResult<Configuration> {
        serde_json::from_str(contents).map_err(|e| QuayError::Config {
            message: format!("failed to parse {origin}: {e}"),
        })
    }

    pub fn validate(&self) -> QuayResult<()> {
        if let Some(Some(default_registry)) = &self.default_registry {
            default_registry.validate(true)?;
        }
        for registry in &self.registries {
            registry.validate(false)?;
        }
        Ok(())
    }

    /// Build the registry set this configuration describes.
    ///
    /// `versions_via_git` selects the git-backed flavor of the builtin
    /// registry, which requires a baseline.
    pub fn instantiate(
        &self,
        ctx: &Rc<AppContext>,
        versions_via_git: bool,
    ) -> QuayResult<RegistrySet> {
        self.validate()?;

        let default_registry = match &self.default_registry {
            None => Some(make_builtin_registry(ctx, None, versions_via_git)),
            Some(None) => None,
            Some(Some(config)) => Some(config.instantiate(ctx, versions_via_git)),
        };

        let registries = self
            .registries
            .iter()
            .map(|config| {
                Registry::new(config.packages.clone(), config.instantiate(ctx, versions_via_git))
            })
            .collect();

        Ok(RegistrySet::new(registries, default_registry))
    }
}
