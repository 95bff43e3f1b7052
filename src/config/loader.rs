// src/config/loader.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{Manifest, ManifestSet, RawManifest};
use crate::errors::{Result, RunnerError};

/// Load one manifest file.
///
/// This only performs TOML deserialization; references are left as written
/// and nothing is validated. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawManifest> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let manifest: RawManifest = toml::from_str(&contents)?;

    Ok(manifest)
}

/// Load `path` and every manifest it references, directly or transitively.
///
/// Each manifest is read once even if several recipes reference it, so a
/// reference cycle terminates here and is reported by validation.
pub fn load_manifest_set(path: impl AsRef<Path>) -> Result<ManifestSet> {
    let root = canonical(path.as_ref(), None)?;

    let mut manifests = BTreeMap::new();
    let mut pending = vec![root.clone()];
    while let Some(next) = pending.pop() {
        if manifests.contains_key(&next) {
            continue;
        }
        let mut raw = load_from_path(&next)?;
        let base = next.parent().map(Path::to_path_buf).unwrap_or_default();
        for reference in raw.references_mut() {
            let resolved = canonical(&base.join(&*reference), Some(&next))?;
            *reference = resolved.clone();
            pending.push(resolved);
        }
        debug!(manifest = ?next, name = %raw.name, "loaded manifest");
        manifests.insert(next, raw);
    }

    Ok(ManifestSet { root, manifests })
}

/// Load a manifest with its references and validate the whole tree.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML, following `[[codemods]] path = "..."` references.
/// - Checks for:
///   - unknown or missing engine settings,
///   - empty recipes,
///   - reference cycles,
///   - recipes nested too deeply.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Manifest> {
    let set = load_manifest_set(path)?;
    let manifest = Manifest::try_from(set)?;
    Ok(manifest)
}

fn canonical(path: &Path, referenced_from: Option<&Path>) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|err| match referenced_from {
        Some(from) => RunnerError::ConfigError(format!(
            "manifest {} references {}: {err}",
            from.display(),
            path.display()
        )),
        None => RunnerError::IoError(err),
    })
}
