// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::engine::Codemod;
use crate::types::ArgumentRecord;

/// A codemod manifest as read from a TOML file.
///
/// ```toml
/// name = "migrate"
/// engine = "recipe"
/// include = ["src/**/*.ts"]
///
/// [arguments]
/// quote = "single"
///
/// [[codemods]]
/// name = "rename-imports"
/// engine = "jscodeshift"
/// source = "transforms/rename.sh"
///
/// [[codemods]]
/// path = "../shared/codemod.toml"
/// ```
///
/// Engine strings and required fields are only checked when the manifest is
/// converted into a [`Manifest`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawManifest {
    pub name: String,

    /// `jscodeshift`, `ts-morph`, `filemod`, `ast-grep`, `recipe` or `piranha`.
    pub engine: String,

    /// Transform source, relative to the manifest's directory.
    #[serde(default)]
    pub source: Option<PathBuf>,

    /// Include patterns declared by the codemod.
    #[serde(default)]
    pub include: Vec<String>,

    /// ast-grep rule language.
    #[serde(default)]
    pub language: Option<String>,

    /// Default argument values; the command line overrides them.
    #[serde(default)]
    pub arguments: ArgumentRecord,

    /// Recipe steps.
    #[serde(default)]
    pub codemods: Vec<RawStep>,
}

/// One `[[codemods]]` entry: another manifest on disk, or an inline codemod.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawStep {
    Reference(ManifestReference),
    Inline(RawManifest),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestReference {
    /// Relative to the referencing manifest until the loader resolves it.
    pub path: PathBuf,
}

impl RawManifest {
    /// Every manifest reference in this manifest, including those nested in
    /// inline recipe steps.
    pub fn references_mut(&mut self) -> Vec<&mut PathBuf> {
        let mut out = Vec::new();
        for step in self.codemods.iter_mut() {
            match step {
                RawStep::Reference(reference) => out.push(&mut reference.path),
                RawStep::Inline(inline) => out.extend(inline.references_mut()),
            }
        }
        out
    }

    pub fn references(&self) -> Vec<&Path> {
        let mut out = Vec::new();
        for step in self.codemods.iter() {
            match step {
                RawStep::Reference(reference) => out.push(reference.path.as_path()),
                RawStep::Inline(inline) => out.extend(inline.references()),
            }
        }
        out
    }
}

/// A root manifest plus every manifest reachable through references, keyed
/// by canonical path. References inside the set are already canonical.
#[derive(Debug, Clone)]
pub struct ManifestSet {
    pub root: PathBuf,
    pub manifests: BTreeMap<PathBuf, RawManifest>,
}

/// Validated manifest, ready to run.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub codemod: Codemod,
    /// Root `[arguments]`, completed by defaults from referenced manifests.
    pub arguments: ArgumentRecord,
}
