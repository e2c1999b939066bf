//! Routing port names to registries.

use crate::error::{QuayError, QuayResult};
use crate::recipe::PathAndLocation;
use crate::registry::{RegistryImplementation, BUILTIN_FILES_KIND};
use crate::version::{Version, VersionSpec};

/// How well `pattern` matches `name`.
///
/// A pattern ending in `*` matches any name starting with its prefix and
/// scores the pattern's length; an exact match beats every prefix by
/// scoring `usize::MAX`; everything else scores 0.
pub fn package_pattern_match(name: &str, pattern: &str) -> usize {
    if let Some(prefix) = pattern.strip_suffix('*') {
        if name.starts_with(prefix) {
            return pattern.len();
        }
    } else if name == pattern {
        return usize::MAX;
    }
    0
}

/// A registry route record: the patterns that send port names to an
/// implementation.
pub struct Registry {
    patterns: Vec<String>,
    implementation: Box<dyn RegistryImplementation>,
}

impl Registry {
    pub fn new(mut patterns: Vec<String>, implementation: Box<dyn RegistryImplementation>) -> Self {
        patterns.sort();
        patterns.dedup();
        Self {
            patterns,
            implementation,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn implementation(&self) -> &dyn RegistryImplementation {
        self.implementation.as_ref()
    }
}

/// The ordered registry routes plus an optional default registry that
/// serves names no pattern claims.
pub struct RegistrySet {
    registries: Vec<Registry>,
    default_registry: Option<Box<dyn RegistryImplementation>>,
}

impl RegistrySet {
    pub fn new(
        registries: Vec<Registry>,
        default_registry: Option<Box<dyn RegistryImplementation>>,
    ) -> Self {
        Self {
            registries,
            default_registry,
        }
    }

    pub fn registries(&self) -> &[Registry] {
        &self.registries
    }

    pub fn default_registry(&self) -> Option<&dyn RegistryImplementation> {
        self.default_registry.as_deref()
    }

    /// Every registry matching `name`, best score first; ties keep
    /// configuration order.
    pub fn registries_for_port(&self, name: &str) -> Vec<&dyn RegistryImplementation> {
        let mut candidates: Vec<(&dyn RegistryImplementation, usize)> = Vec::new();
        for registry in &self.registries {
            let longest_prefix = registry
                .patterns()
                .iter()
                .map(|pattern| package_pattern_match(name, pattern))
                .max()
                .unwrap_or(0);
            if longest_prefix != 0 {
                candidates.push((registry.implementation(), longest_prefix));
            }
        }

        candidates.sort_by(|lhs, rhs| rhs.1.cmp(&lhs.1));
        candidates.into_iter().map(|(implementation, _)| implementation).collect()
    }

    /// The registry that serves `name`: the best pattern match, or the
    /// default registry when nothing matches.
    pub fn registry_for_port(&self, name: &str) -> Option<&dyn RegistryImplementation> {
        let candidates = self.registries_for_port(name);
        candidates
            .first()
            .copied()
            .or_else(|| self.default_registry())
    }

    pub fn baseline_for_port(&self, port_name: &str) -> QuayResult<Option<Version>> {
        let Some(implementation) = self.registry_for_port(port_name) else {
            return Err(QuayError::NoRegistryForPort {
                port: port_name.to_string(),
            });
        };
        implementation.get_baseline_version(port_name)
    }

    pub fn get_port(&self, spec: &VersionSpec) -> QuayResult<Option<PathAndLocation>> {
        match self.registry_for_port(&spec.port_name) {
            Some(implementation) => implementation.get_port(spec),
            None => Ok(None),
        }
    }

    /// Like [`get_port`](Self::get_port), but a missing entry is an error.
    pub fn get_port_required(&self, spec: &VersionSpec) -> QuayResult<PathAndLocation> {
        self.get_port(spec)?
            .ok_or_else(|| QuayError::VersionNotInDatabase {
                port: spec.port_name.clone(),
                version: spec.version.clone(),
                known: Vec::new(),
            })
    }

    pub fn get_all_port_versions(&self, port_name: &str) -> QuayResult<Option<Vec<Version>>> {
        match self.registry_for_port(port_name) {
            Some(implementation) => implementation.get_all_port_versions(port_name),
            None => Ok(None),
        }
    }

    /// Like [`get_all_port_versions`](Self::get_all_port_versions), but a
    /// nonexistent port is an error.
    pub fn get_all_port_versions_required(&self, port_name: &str) -> QuayResult<Vec<Version>> {
        self.get_all_port_versions(port_name)?
            .ok_or_else(|| QuayError::PortNotFound {
                port: port_name.to_string(),
            })
    }

    /// Every port name reachable through some pattern, plus everything the
    /// default registry serves. Sorted and deduplicated.
    pub fn get_all_reachable_port_names(&self) -> QuayResult<Vec<String>> {
        let mut result = Vec::new();
        for registry in &self.registries {
            let start_at = result.len();
            registry.implementation().append_all_port_names(&mut result)?;
            remove_unreachable_port_names_by_patterns(&mut result, start_at, registry.patterns());
        }

        if let Some(default_registry) = self.default_registry() {
            default_registry.append_all_port_names(&mut result)?;
        }

        result.sort();
        result.dedup();
        Ok(result)
    }

    /// The no-network flavor: where a registry cannot enumerate without the
    /// network, its exact (non-wildcard) patterns stand in for its names.
    pub fn get_all_known_reachable_port_names_no_network(&self) -> QuayResult<Vec<String>> {
        let mut result = Vec::new();
        for registry in &self.registries {
            let start_at = result.len();
            let exhaustive = registry
                .implementation()
                .try_append_all_port_names_no_network(&mut result)?;
            if exhaustive {
                remove_unreachable_port_names_by_patterns(
                    &mut result,
                    start_at,
                    registry.patterns(),
                );
            } else {
                result.truncate(start_at);
                result.extend(
                    registry
                        .patterns()
                        .iter()
                        .filter(|pattern| !pattern.is_empty() && !pattern.ends_with('*'))
                        .cloned(),
                );
            }
        }

        if let Some(default_registry) = self.default_registry() {
            default_registry.try_append_all_port_names_no_network(&mut result)?;
        }

        result.sort();
        result.dedup();
        Ok(result)
    }

    /// True when the default registry is the plain builtin files registry,
    /// i.e. the registry configuration is unmodified.
    pub fn is_default_builtin_registry(&self) -> bool {
        self.default_registry()
            .is_some_and(|r| r.kind() == BUILTIN_FILES_KIND)
    }

    pub fn has_modifications(&self) -> bool {
        !self.registries.is_empty() || !self.is_default_builtin_registry()
    }
}

/// Drop names in `result[start_at..]` that no pattern matches.
fn remove_unreachable_port_names_by_patterns(
    result: &mut Vec<String>,
    start_at: usize,
    patterns: &[String],
) {
    let mut index = start_at;
    while index < result.len() {
        let reachable = patterns
            .iter()
            .any(|pattern| package_pattern_match(&result[index], pattern) != 0);
        if reachable {
            index += 1;
        } else {
            result.remove(index);
        }
    }
}
