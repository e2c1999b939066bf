//! The provider layer: cached lookup pipelines over a [`RegistrySet`].
//!
//! `PathsProvider` is the facade downstream pipelines use. A query first
//! consults the overlays, then resolves a baseline version, then loads the
//! exact `(name, version)` through the routed registry. Every stage
//! memoizes, failures included.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::cache::Cache;
use crate::context::AppContext;
use crate::error::{QuayError, QuayResult};
use crate::recipe::{RecipeAndLocation, PORT_MANIFEST_FILE};
use crate::registry::RegistrySet;
use crate::version::{Version, VersionSpec};

/// Directory-shadow lookups that take precedence over all registries.
pub trait OverlayProvider {
    /// `Ok(None)` means no overlay has this port: callers fall through to
    /// the registries. Errors never mean "not found".
    fn get_control_file(&self, port_name: &str) -> QuayResult<Option<RecipeAndLocation>>;

    /// Insert every overlay port into `out`, earlier overlays winning on
    /// name collisions.
    fn load_all_control_files(
        &self,
        out: &mut BTreeMap<String, RecipeAndLocation>,
    ) -> QuayResult<()>;
}

/// Caches `port name → baseline version` from the routed registry.
pub struct BaselineProvider<'a> {
    registry_set: &'a RegistrySet,
    cache: Cache<String, QuayResult<Version>>,
}

impl<'a> BaselineProvider<'a> {
    pub fn new(registry_set: &'a RegistrySet) -> Self {
        Self {
            registry_set,
            cache: Cache::new(),
        }
    }

    pub fn get_baseline_version(&self, port_name: &str) -> QuayResult<Version> {
        self.cache.get_lazy(port_name, || {
            match self.registry_set.baseline_for_port(port_name)? {
                Some(version) => Ok(version),
                None => Err(QuayError::PortNotInBaseline {
                    port: port_name.to_string(),
                }),
            }
        })
    }
}

/// Caches `(port name, version) → recipe` loads through the routed
/// registry.
pub struct VersionedProvider<'a> {
    ctx: Rc<AppContext>,
    registry_set: &'a RegistrySet,
    entry_cache: Cache<String, QuayResult<Rc<Vec<Version>>>>,
    control_cache: Cache<VersionSpec, QuayResult<RecipeAndLocation>>,
}

impl<'a> VersionedProvider<'a> {
    pub fn new(ctx: &Rc<AppContext>, registry_set: &'a RegistrySet) -> Self {
        Self {
            ctx: ctx.clone(),
            registry_set,
            entry_cache: Cache::new(),
            control_cache: Cache::new(),
        }
    }

    /// The routed registry's version list for this port; errors when no
    /// registry serves it or the registry has never heard of it.
    fn entry(&self, port_name: &str) -> QuayResult<Rc<Vec<Version>>> {
        self.entry_cache.get_lazy(port_name, || {
            let Some(registry) = self.registry_set.registry_for_port(port_name) else {
                return Err(QuayError::NoRegistryForPort {
                    port: port_name.to_string(),
                });
            };
            match registry.get_all_port_versions(port_name)? {
                Some(versions) => Ok(Rc::new(versions)),
                None => Err(QuayError::PortNotFound {
                    port: port_name.to_string(),
                }),
            }
        })
    }

    pub fn get_port_versions(&self, port_name: &str) -> QuayResult<Vec<Version>> {
        self.entry(port_name).map(|versions| (*versions).clone())
    }

    fn load_control_file(&self, version_spec: &VersionSpec) -> QuayResult<RecipeAndLocation> {
        let note = || format!("while loading port version {version_spec}");

        let known = self.entry(&version_spec.port_name)?;
        let Some(registry) = self.registry_set.registry_for_port(&version_spec.port_name) else {
            return Err(QuayError::NoRegistryForPort {
                port: version_spec.port_name.clone(),
            });
        };

        let loaded = registry
            .get_port(version_spec)
            .map_err(|err| err.note(note()))?;
        let Some(port) = loaded else {
            return Err(QuayError::VersionNotInDatabase {
                port: version_spec.port_name.clone(),
                version: version_spec.version.clone(),
                known: (*known).clone(),
            });
        };

        let control_path = port.path.join(PORT_MANIFEST_FILE);
        let recipe = self
            .ctx
            .parser()
            .try_load_port(self.ctx.fs(), &port.path)
            .map_err(|err| err.note(note()))?;
        let Some(recipe) = recipe else {
            return Err(QuayError::RecipeParse {
                path: control_path,
                message: "the registry returned a directory that is not a port".to_string(),
            }
            .note(note()));
        };

        let recipe = Rc::new(recipe);
        let loaded_spec = recipe.to_version_spec();
        if &loaded_spec != version_spec {
            return Err(QuayError::VersionSpecMismatch {
                path: control_path,
                expected: version_spec.to_string(),
                actual: loaded_spec.to_string(),
            });
        }

        Ok(RecipeAndLocation {
            recipe,
            control_path,
            location: port.location,
        })
    }

    pub fn get_control_file(&self, version_spec: &VersionSpec) -> QuayResult<RecipeAndLocation> {
        self.control_cache
            .get_lazy(version_spec, || self.load_control_file(version_spec))
    }

    /// Eagerly load every reachable port at its baseline version,
    /// populating the caches. Ports that fail to load are skipped.
    pub fn load_all_control_files(
        &self,
        out: &mut BTreeMap<String, RecipeAndLocation>,
    ) -> QuayResult<()> {
        for port_name in self.registry_set.get_all_reachable_port_names()? {
            let baseline = match self.registry_set.baseline_for_port(&port_name) {
                Ok(Some(version)) => version,
                Ok(None) => {
                    debug!(port = %port_name, "skipping port with no baseline version");
                    continue;
                }
                Err(err) => {
                    warn!(port = %port_name, error = %err, "skipping port: baseline lookup failed");
                    continue;
                }
            };

            let spec = VersionSpec::new(port_name.clone(), baseline);
            match self.get_control_file(&spec) {
                Ok(recipe) => {
                    out.entry(port_name).or_insert(recipe);
                }
                Err(err) => {
                    warn!(port = %port_name, error = %err, "skipping port: load failed");
                }
            }
        }
        Ok(())
    }
}

/// Searches an ordered list of overlay directories.
pub struct OverlayProviderImpl {
    ctx: Rc<AppContext>,
    overlay_ports: Vec<PathBuf>,
    cache: Cache<String, QuayResult<Option<RecipeAndLocation>>>,
}

impl std::fmt::Debug for OverlayProviderImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayProviderImpl")
            .field("overlay_ports", &self.overlay_ports)
            .finish()
    }
}

impl OverlayProviderImpl {
    /// `overlay_ports` are resolved against the original working directory;
    /// each must exist as a directory.
    pub fn new(ctx: &Rc<AppContext>, overlay_ports: &[String]) -> QuayResult<Self> {
        let mut resolved = Vec::with_capacity(overlay_ports.len());
        for overlay in overlay_ports {
            let overlay = ctx.original_cwd().join(overlay);
            debug!(overlay = %overlay.display(), "using overlay");
            if !ctx.fs().is_directory(&overlay) {
                return Err(QuayError::OverlayNotADirectory { path: overlay });
            }
            resolved.push(overlay);
        }
        Ok(Self {
            ctx: ctx.clone(),
            overlay_ports: resolved,
            cache: Cache::new(),
        })
    }

    /// Load `dir` as a single port, if it is one.
    fn try_load_overlay_dir(
        &self,
        dir: &std::path::Path,
    ) -> QuayResult<Option<RecipeAndLocation>> {
        let recipe = self.ctx.parser().try_load_port(self.ctx.fs(), dir)?;
        Ok(recipe.map(|recipe| RecipeAndLocation {
            recipe: Rc::new(recipe),
            control_path: dir.join(PORT_MANIFEST_FILE),
            location: dir.display().to_string(),
        }))
    }

    fn load_port(&self, port_name: &str) -> QuayResult<Option<RecipeAndLocation>> {
        for overlay_dir in &self.overlay_ports {
            // The overlay directory may itself be a single port.
            if let Some(found) = self.try_load_overlay_dir(overlay_dir)? {
                if found.recipe.name() == port_name {
                    return Ok(Some(found));
                }
                // A port, but not the one we're looking for.
                continue;
            }

            let port_dir = overlay_dir.join(port_name);
            if let Some(found) = self.try_load_overlay_dir(&port_dir)? {
                if found.recipe.name() == port_name {
                    return Ok(Some(found));
                }
                return Err(QuayError::MismatchedOverlayName {
                    expected: port_name.to_string(),
                    actual: found.recipe.name().to_string(),
                    path: port_dir,
                });
            }
        }

        Ok(None)
    }
}

impl OverlayProvider for OverlayProviderImpl {
    fn get_control_file(&self, port_name: &str) -> QuayResult<Option<RecipeAndLocation>> {
        self.cache
            .get_lazy(port_name, || self.load_port(port_name))
    }

    fn load_all_control_files(
        &self,
        out: &mut BTreeMap<String, RecipeAndLocation>,
    ) -> QuayResult<()> {
        // Walk in reverse and overwrite, so earlier overlays win.
        for overlay_dir in self.overlay_ports.iter().rev() {
            if let Some(found) = self.try_load_overlay_dir(overlay_dir)? {
                out.insert(found.recipe.name().to_string(), found);
                continue;
            }

            // Not itself a port: a directory of ports.
            for port_dir in self.ctx.fs().get_directories_non_recursive(overlay_dir)? {
                if let Some(found) = self.try_load_overlay_dir(&port_dir)? {
                    out.insert(found.recipe.name().to_string(), found);
                }
            }
        }
        Ok(())
    }
}

/// An overlay provider that additionally serves the current project's own
/// recipe under its name.
pub struct ManifestProvider {
    overlay_ports: OverlayProviderImpl,
    manifest: RecipeAndLocation,
}

impl ManifestProvider {
    pub fn new(
        ctx: &Rc<AppContext>,
        overlay_ports: &[String],
        manifest: RecipeAndLocation,
    ) -> QuayResult<Self> {
        Ok(Self {
            overlay_ports: OverlayProviderImpl::new(ctx, overlay_ports)?,
            manifest,
        })
    }
}

impl OverlayProvider for ManifestProvider {
    fn get_control_file(&self, port_name: &str) -> QuayResult<Option<RecipeAndLocation>> {
        if port_name == self.manifest.recipe.name() {
            return Ok(Some(self.manifest.clone()));
        }
        self.overlay_ports.get_control_file(port_name)
    }

    fn load_all_control_files(
        &self,
        out: &mut BTreeMap<String, RecipeAndLocation>,
    ) -> QuayResult<()> {
        self.overlay_ports.load_all_control_files(out)?;
        // The manifest beats any overlay of the same name.
        out.insert(self.manifest.recipe.name().to_string(), self.manifest.clone());
        Ok(())
    }
}

/// The top-level lookup facade: overlay → baseline → versioned registry.
pub struct PathsProvider<'a> {
    baseline: BaselineProvider<'a>,
    versioned: VersionedProvider<'a>,
    overlay: Box<dyn OverlayProvider + 'a>,
}

impl<'a> PathsProvider<'a> {
    pub fn new(
        ctx: &Rc<AppContext>,
        registry_set: &'a RegistrySet,
        overlay: Box<dyn OverlayProvider + 'a>,
    ) -> Self {
        Self {
            baseline: BaselineProvider::new(registry_set),
            versioned: VersionedProvider::new(ctx, registry_set),
            overlay,
        }
    }

    pub fn baseline(&self) -> &BaselineProvider<'a> {
        &self.baseline
    }

    pub fn versioned(&self) -> &VersionedProvider<'a> {
        &self.versioned
    }

    pub fn get_control_file(&self, port_name: &str) -> QuayResult<RecipeAndLocation> {
        if let Some(overlay_recipe) = self.overlay.get_control_file(port_name)? {
            return Ok(overlay_recipe);
        }

        let baseline_version = self.baseline.get_baseline_version(port_name)?;
        self.versioned
            .get_control_file(&VersionSpec::new(port_name, baseline_version))
    }

    /// Every loadable port, overlays shadowing registries by name.
    pub fn load_all_control_files(&self) -> QuayResult<Vec<RecipeAndLocation>> {
        let mut merged = BTreeMap::new();
        self.overlay.load_all_control_files(&mut merged)?;

        let mut versioned = BTreeMap::new();
        self.versioned.load_all_control_files(&mut versioned)?;
        for (port_name, recipe) in versioned {
            merged.entry(port_name).or_insert(recipe);
        }

        Ok(merged.into_values().collect())
    }
}
