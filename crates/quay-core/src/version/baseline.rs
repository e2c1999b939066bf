//! Baseline files.
//!
//! A baseline pins every port to one version under a named key. The file is
//! an object of baselines; each baseline is an object of port → schemed
//! version.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{QuayError, QuayResult};
use crate::fs::Filesystem;
use crate::version::{schemed_version_from_object, Version};

/// Port name → pinned version, ordered by name.
pub type Baseline = BTreeMap<String, Version>;

pub const DEFAULT_BASELINE_KEY: &str = "default";

/// Parse baseline `contents`, selecting `baseline_key` (empty means
/// `"default"`).
///
/// `Ok(None)` means the file parsed but does not contain the requested
/// baseline, which callers treat differently from a parse failure.
pub fn parse_baseline_versions(
    contents: &str,
    baseline_key: &str,
    origin: &str,
) -> QuayResult<Option<Baseline>> {
    let parse_error = |message: String| QuayError::BaselineParse {
        origin: origin.to_string(),
        message,
    };

    let value: Value = serde_json::from_str(contents).map_err(|e| parse_error(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| parse_error("expected a top-level object".to_string()))?;

    let key = if baseline_key.is_empty() {
        DEFAULT_BASELINE_KEY
    } else {
        baseline_key
    };
    let Some(baseline_value) = obj.get(key) else {
        return Ok(None);
    };
    let baseline_obj = baseline_value
        .as_object()
        .ok_or_else(|| parse_error(format!("baseline \"{key}\" must be an object")))?;

    let mut baseline = Baseline::new();
    for (port_name, version_value) in baseline_obj {
        let version_obj = version_value
            .as_object()
            .ok_or_else(|| parse_error(format!("entry for \"{port_name}\" must be an object")))?;
        let schemed = schemed_version_from_object(version_obj)
            .map_err(|message| parse_error(format!("entry for \"{port_name}\": {message}")))?;
        baseline.insert(port_name.clone(), schemed.version);
    }
    Ok(Some(baseline))
}

/// Load and parse a baseline file. A missing file means "no baseline".
pub fn load_baseline_versions(
    fs: &dyn Filesystem,
    baseline_path: &Path,
    baseline_key: &str,
) -> QuayResult<Option<Baseline>> {
    let contents = match fs.read_contents(baseline_path) {
        Ok(contents) => contents,
        Err(err) if err.is_file_not_found() => {
            debug!(path = %baseline_path.display(), "no baseline file found");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    parse_baseline_versions(&contents, baseline_key, &baseline_path.display().to_string())
}
