#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use codemod_runner::engine::{Codemod, Engine, FlowSettings, RunSettings};
use codemod_runner::fs::VirtualFileSystem;

/// Builder for `Codemod` trees.
///
/// Sources are fake paths; the fake backend looks codemods up by name.
pub struct CodemodBuilder {
    name: String,
    engine: Engine,
}

impl CodemodBuilder {
    pub fn js(name: &str) -> Self {
        Self {
            name: name.to_string(),
            engine: Engine::JsTransform {
                source: PathBuf::from(format!("/codemods/{name}.js")),
                include: vec![],
            },
        }
    }

    pub fn filemod(name: &str) -> Self {
        Self {
            name: name.to_string(),
            engine: Engine::Filemod {
                source: PathBuf::from(format!("/codemods/{name}.js")),
                include: vec![],
            },
        }
    }

    pub fn ast_grep(name: &str, language: &str) -> Self {
        Self {
            name: name.to_string(),
            engine: Engine::AstGrep {
                source: PathBuf::from(format!("/codemods/{name}.yml")),
                language: language.to_string(),
            },
        }
    }

    pub fn recipe(name: &str) -> Self {
        Self {
            name: name.to_string(),
            engine: Engine::Recipe {
                include: vec![],
                steps: vec![],
            },
        }
    }

    pub fn unsupported(name: &str) -> Self {
        Self {
            name: name.to_string(),
            engine: Engine::Unsupported {
                engine: "piranha".to_string(),
            },
        }
    }

    pub fn include(mut self, pattern: &str) -> Self {
        match &mut self.engine {
            Engine::JsTransform { include, .. }
            | Engine::Filemod { include, .. }
            | Engine::Recipe { include, .. } => include.push(pattern.to_string()),
            Engine::AstGrep { .. } | Engine::Unsupported { .. } => {
                panic!("codemod '{}' takes no include patterns", self.name)
            }
        }
        self
    }

    pub fn step(mut self, step: Codemod) -> Self {
        match &mut self.engine {
            Engine::Recipe { steps, .. } => steps.push(step),
            _ => panic!("codemod '{}' is not a recipe", self.name),
        }
        self
    }

    pub fn build(self) -> Codemod {
        Codemod {
            name: self.name,
            engine: self.engine,
        }
    }
}

/// Builder for `FlowSettings`; defaults to one thread and a short idle timeout.
pub struct FlowBuilder {
    flow: FlowSettings,
}

impl FlowBuilder {
    pub fn new(target: &str) -> Self {
        let mut flow = FlowSettings::new(target);
        flow.threads = 1;
        flow.idle_timeout = Duration::from_secs(2);
        Self { flow }
    }

    pub fn include(mut self, pattern: &str) -> Self {
        self.flow.patterns.include.push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.flow.patterns.exclude.push(pattern.to_string());
        self
    }

    pub fn file(mut self, path: &str) -> Self {
        self.flow.patterns.files.push(PathBuf::from(path));
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.flow.threads = threads;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.flow.idle_timeout = timeout;
        self
    }

    pub fn build(self) -> FlowSettings {
        self.flow
    }
}

pub fn run_settings(dry_run: bool) -> RunSettings {
    RunSettings {
        dry_run,
        case_hash_digest: [7u8; 20],
    }
}

/// In-memory tree with the given `(path, content)` files.
pub fn vfs_with(files: &[(&str, &str)]) -> Arc<VirtualFileSystem> {
    let fs = VirtualFileSystem::new();
    for (path, content) in files {
        fs.add_file(path, content.as_bytes());
    }
    Arc::new(fs)
}
