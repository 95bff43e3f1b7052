// src/config/validate.rs

use std::path::Path;
use std::str::FromStr;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{Manifest, ManifestSet, RawManifest, RawStep};
use crate::engine::{Codemod, Engine, MAX_RECIPE_DEPTH};
use crate::errors::{Result, RunnerError};
use crate::patterns::ast_grep_language_patterns;
use crate::types::{ArgumentRecord, EngineKind};

impl TryFrom<ManifestSet> for Manifest {
    type Error = crate::errors::RunnerError;

    fn try_from(set: ManifestSet) -> std::result::Result<Self, Self::Error> {
        validate_references(&set)?;

        let root = lookup(&set, &set.root)?;
        let codemod = build_codemod(&set, root, manifest_dir(&set.root), 0)?;
        let arguments = merge_arguments(&set, root);

        Ok(Manifest {
            path: set.root.clone(),
            codemod,
            arguments,
        })
    }
}

fn validate_references(set: &ManifestSet) -> Result<()> {
    // Edge direction: referencing manifest -> referenced manifest.
    let mut graph: DiGraphMap<&Path, ()> = DiGraphMap::new();

    for (path, raw) in set.manifests.iter() {
        graph.add_node(path.as_path());
        for reference in raw.references() {
            if reference == path.as_path() {
                return Err(RunnerError::ConfigError(format!(
                    "manifest {} references itself",
                    path.display()
                )));
            }
            graph.add_edge(path.as_path(), reference, ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(RunnerError::ConfigError(format!(
            "manifest references form a cycle involving {}",
            cycle.node_id().display()
        ))),
    }
}

fn lookup<'a>(set: &'a ManifestSet, path: &Path) -> Result<&'a RawManifest> {
    set.manifests.get(path).ok_or_else(|| {
        RunnerError::ConfigError(format!("manifest {} was not loaded", path.display()))
    })
}

fn manifest_dir(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new("."))
}

fn build_codemod(set: &ManifestSet, raw: &RawManifest, base: &Path, depth: usize) -> Result<Codemod> {
    let kind = EngineKind::from_str(&raw.engine)
        .map_err(|e| RunnerError::ConfigError(format!("codemod '{}': {e}", raw.name)))?;

    if kind != EngineKind::Recipe && !raw.codemods.is_empty() {
        return Err(RunnerError::ConfigError(format!(
            "codemod '{}' lists steps but its engine is '{}'; only recipes have steps",
            raw.name, raw.engine
        )));
    }

    let engine = match kind {
        EngineKind::Unsupported => Engine::Unsupported {
            engine: raw.engine.trim().to_string(),
        },
        EngineKind::JsTransform => Engine::JsTransform {
            source: required_source(raw, base)?,
            include: raw.include.clone(),
        },
        EngineKind::Filemod => Engine::Filemod {
            source: required_source(raw, base)?,
            include: raw.include.clone(),
        },
        EngineKind::AstGrep => Engine::AstGrep {
            source: required_source(raw, base)?,
            language: validate_language(raw)?,
        },
        EngineKind::Recipe => Engine::Recipe {
            include: raw.include.clone(),
            steps: build_steps(set, raw, base, depth)?,
        },
    };

    Ok(Codemod {
        name: raw.name.clone(),
        engine,
    })
}

fn build_steps(set: &ManifestSet, raw: &RawManifest, base: &Path, depth: usize) -> Result<Vec<Codemod>> {
    if raw.codemods.is_empty() {
        return Err(RunnerError::ConfigError(format!(
            "recipe '{}' must list at least one [[codemods]] step",
            raw.name
        )));
    }
    if depth >= MAX_RECIPE_DEPTH {
        return Err(RunnerError::ConfigError(format!(
            "recipe '{}' nests deeper than {MAX_RECIPE_DEPTH} levels",
            raw.name
        )));
    }

    raw.codemods
        .iter()
        .map(|step| match step {
            RawStep::Inline(inline) => build_codemod(set, inline, base, depth + 1),
            RawStep::Reference(reference) => {
                let nested = lookup(set, &reference.path)?;
                build_codemod(set, nested, manifest_dir(&reference.path), depth + 1)
            }
        })
        .collect()
}

fn required_source(raw: &RawManifest, base: &Path) -> Result<std::path::PathBuf> {
    match &raw.source {
        Some(source) => Ok(base.join(source)),
        None => Err(RunnerError::ConfigError(format!(
            "codemod '{}' ({}) needs a `source`",
            raw.name, raw.engine
        ))),
    }
}

fn validate_language(raw: &RawManifest) -> Result<String> {
    let Some(language) = raw.language.as_deref() else {
        return Err(RunnerError::ConfigError(format!(
            "ast-grep codemod '{}' needs a `language`",
            raw.name
        )));
    };
    if ast_grep_language_patterns(language).is_none() {
        return Err(RunnerError::ConfigError(format!(
            "ast-grep codemod '{}' uses unknown language '{language}'",
            raw.name
        )));
    }
    Ok(language.to_string())
}

/// Root arguments win; referenced manifests only fill in missing keys.
fn merge_arguments(set: &ManifestSet, root: &RawManifest) -> ArgumentRecord {
    let mut arguments = root.arguments.clone();
    for (path, raw) in set.manifests.iter() {
        if *path == set.root {
            continue;
        }
        for (key, value) in raw.arguments.iter() {
            arguments.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    arguments
}
