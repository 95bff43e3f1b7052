use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use codemod_runner::commands::FileCommand;
use codemod_runner::engine::Codemod;
use codemod_runner::exec::{
    BoxFuture, EngineBackend, FileTransform, Filemod, FilemodInput, FilemodOutput, TransformInput,
};

type TransformFn = dyn Fn(&TransformInput) -> anyhow::Result<Vec<FileCommand>> + Send + Sync;
type FilemodFn = dyn Fn(&FilemodInput) -> anyhow::Result<FilemodOutput> + Send + Sync;

/// An in-process per-file transform built from a closure.
pub struct FnTransform {
    f: Arc<TransformFn>,
    delay: Option<Duration>,
    slow_suffix: Option<String>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FnTransform {
    pub fn new(
        f: impl Fn(&TransformInput) -> anyhow::Result<Vec<FileCommand>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            f: Arc::new(f),
            delay: None,
            slow_suffix: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep `delay` before transforming files ending in `suffix`.
    pub fn slow_on(mut self, suffix: &str, delay: Duration) -> Self {
        self.delay = Some(delay);
        self.slow_suffix = Some(suffix.to_string());
        self
    }

    /// Highest number of concurrent `transform` calls observed.
    pub fn max_in_flight(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.max_in_flight)
    }
}

impl FileTransform for FnTransform {
    fn transform(&self, input: TransformInput) -> BoxFuture<'_, anyhow::Result<Vec<FileCommand>>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let slow = self
                .slow_suffix
                .as_deref()
                .is_some_and(|suffix| input.path.to_string_lossy().ends_with(suffix));
            match self.delay {
                Some(delay) if slow => tokio::time::sleep(delay).await,
                // Yield so other workers interleave.
                _ => tokio::task::yield_now().await,
            }

            let result = (self.f)(&input);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

/// An in-process filemod built from a closure.
pub struct FnFilemod {
    include: Vec<String>,
    f: Arc<FilemodFn>,
}

impl FnFilemod {
    pub fn new(
        include: &[&str],
        f: impl Fn(&FilemodInput) -> anyhow::Result<FilemodOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            include: include.iter().map(|s| s.to_string()).collect(),
            f: Arc::new(f),
        }
    }
}

impl Filemod for FnFilemod {
    fn include_patterns(&self) -> Vec<String> {
        self.include.clone()
    }

    fn execute(&self, input: FilemodInput) -> BoxFuture<'_, anyhow::Result<FilemodOutput>> {
        Box::pin(async move { (self.f)(&input) })
    }
}

/// Engine backend serving registered fakes by codemod name.
///
/// Also records the order in which codemods were compiled, which is the
/// order the orchestrator started them in.
#[derive(Default)]
pub struct FakeBackend {
    transforms: HashMap<String, Arc<dyn FileTransform>>,
    filemods: HashMap<String, Arc<dyn Filemod>>,
    started: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transform(mut self, name: &str, transform: FnTransform) -> Self {
        self.transforms.insert(name.to_string(), Arc::new(transform));
        self
    }

    pub fn with_filemod(mut self, name: &str, filemod: FnFilemod) -> Self {
        self.filemods.insert(name.to_string(), Arc::new(filemod));
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl EngineBackend for FakeBackend {
    fn file_transform(&self, codemod: &Codemod) -> anyhow::Result<Arc<dyn FileTransform>> {
        self.started.lock().unwrap().push(codemod.name.clone());
        self.transforms
            .get(&codemod.name)
            .cloned()
            .ok_or_else(|| anyhow!("no fake transform registered for '{}'", codemod.name))
    }

    fn filemod(&self, codemod: &Codemod) -> anyhow::Result<Arc<dyn Filemod>> {
        self.started.lock().unwrap().push(codemod.name.clone());
        self.filemods
            .get(&codemod.name)
            .cloned()
            .ok_or_else(|| anyhow!("no fake filemod registered for '{}'", codemod.name))
    }
}

/// Transform that appends `suffix` to every file.
pub fn append(suffix: &'static str) -> FnTransform {
    FnTransform::new(move |input| {
        Ok(vec![FileCommand::UpdateFile {
            old_path: input.path.clone(),
            old_data: input.data.clone(),
            new_data: format!("{}{suffix}", input.data),
        }])
    })
}

/// Transform that replaces every `from` with `to`; unchanged files yield a
/// no-op update that normalisation drops.
pub fn replace(from: &'static str, to: &'static str) -> FnTransform {
    FnTransform::new(move |input| {
        Ok(vec![FileCommand::UpdateFile {
            old_path: input.path.clone(),
            old_data: input.data.clone(),
            new_data: input.data.replace(from, to),
        }])
    })
}

/// Like [`append`], but fails for files whose name ends in `bad_suffix`.
pub fn append_failing_on(suffix: &'static str, bad_suffix: &'static str) -> FnTransform {
    FnTransform::new(move |input| {
        if input.path.to_string_lossy().ends_with(bad_suffix) {
            return Err(anyhow!("cannot parse {}", input.path.display()));
        }
        Ok(vec![FileCommand::UpdateFile {
            old_path: input.path.clone(),
            old_data: input.data.clone(),
            new_data: format!("{}{suffix}", input.data),
        }])
    })
}

/// Transform that deletes every file it sees.
pub fn delete_all() -> FnTransform {
    FnTransform::new(|input| {
        Ok(vec![FileCommand::DeleteFile {
            old_path: input.path.clone(),
        }])
    })
}

/// Transform that creates `<file>.<ext>` next to every file it sees.
pub fn create_sibling(ext: &'static str, content: &'static str) -> FnTransform {
    FnTransform::new(move |input| {
        Ok(vec![FileCommand::CreateFile {
            new_path: with_extra_extension(&input.path, ext),
            new_data: content.to_string(),
        }])
    })
}

fn with_extra_extension(path: &Path, ext: &str) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    name.into()
}
