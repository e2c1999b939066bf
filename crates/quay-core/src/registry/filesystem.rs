//! Local filesystem registries.
//!
//! A filesystem registry is a directory with a `versions/` database whose
//! locators are `$/…` paths under the registry root. Recipes are used in
//! place, so the location string is empty.

use std::path::PathBuf;
use std::rc::Rc;

use crate::cache::{Cache, CacheSingle};
use crate::context::AppContext;
use crate::error::QuayResult;
use crate::recipe::PathAndLocation;
use crate::registry::{
    load_all_port_names_from_registry_versions, RegistryImplementation, FILESYSTEM_KIND,
    REGISTRY_VERSIONS_DIR,
};
use crate::version::baseline::{load_baseline_versions, Baseline};
use crate::version::db::{load_versions_file, PortVersionDb, VersionDbType};
use crate::version::{Version, VersionSpec};

pub struct FilesystemRegistry {
    ctx: Rc<AppContext>,
    path: PathBuf,
    baseline_identifier: String,
    baseline: CacheSingle<QuayResult<Option<Rc<Baseline>>>>,
    entries: Cache<String, QuayResult<Option<Rc<PortVersionDb>>>>,
}

impl FilesystemRegistry {
    pub fn new(ctx: Rc<AppContext>, path: PathBuf, baseline_identifier: String) -> Self {
        Self {
            ctx,
            path,
            baseline_identifier,
            baseline: CacheSingle::new(),
            entries: Cache::new(),
        }
    }

    fn get_entry(&self, port_name: &str) -> QuayResult<Option<Rc<PortVersionDb>>> {
        self.entries.get_lazy(port_name, || {
            let entries = load_versions_file(
                self.ctx.fs(),
                VersionDbType::Filesystem {
                    registry_root: &self.path,
                },
                &self.path.join(REGISTRY_VERSIONS_DIR),
                port_name,
            )?;
            Ok(entries.map(|entries| Rc::new(PortVersionDb::new(entries))))
        })
    }

    fn load_baseline(&self) -> QuayResult<Option<Rc<Baseline>>> {
        let baseline_path = self
            .path
            .join(REGISTRY_VERSIONS_DIR)
            .join("baseline.json");
        let loaded =
            load_baseline_versions(self.ctx.fs(), &baseline_path, &self.baseline_identifier)?;
        Ok(loaded.map(Rc::new))
    }
}

impl RegistryImplementation for FilesystemRegistry {
    fn kind(&self) -> &'static str {
        FILESYSTEM_KIND
    }

    fn get_port(&self, spec: &VersionSpec) -> QuayResult<Option<PathAndLocation>> {
        let Some(entry) = self.get_entry(&spec.port_name)? else {
            return Ok(None);
        };
        let Some(path) = entry.try_get_path(&spec.version) else {
            return Ok(None);
        };
        Ok(Some(PathAndLocation {
            path: path.to_path_buf(),
            location: String::new(),
        }))
    }

    fn get_all_port_versions(&self, port_name: &str) -> QuayResult<Option<Vec<Version>>> {
        Ok(self
            .get_entry(port_name)?
            .map(|entry| entry.versions().to_vec()))
    }

    fn get_baseline_version(&self, port_name: &str) -> QuayResult<Option<Version>> {
        let baseline = self.baseline.get_lazy(|| self.load_baseline()).clone()?;
        Ok(baseline.and_then(|b| b.get(port_name).cloned()))
    }

    fn append_all_port_names(&self, out: &mut Vec<String>) -> QuayResult<()> {
        load_all_port_names_from_registry_versions(
            out,
            self.ctx.fs(),
            &self.path.join(REGISTRY_VERSIONS_DIR),
        )
    }

    fn try_append_all_port_names_no_network(&self, out: &mut Vec<String>) -> QuayResult<bool> {
        self.append_all_port_names(out)?;
        Ok(true)
    }
}
