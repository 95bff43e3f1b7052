// src/patterns.rs

//! Which files a codemod runs on.
//!
//! Resolution order:
//! 1. an explicit file list wins outright;
//! 2. flow-level `--include` patterns;
//! 3. the codemod's own include patterns;
//! 4. the engine default.
//!
//! `ast-grep` codemods always derive their includes from the rule language.
//! Excludes are the user's plus the defaults; a default exclude is dropped
//! when the user explicitly includes the same pattern.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, anyhow};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{Codemod, Engine};
use crate::fs::FileSystem;

/// Capacity of the channel between the directory walker and consumers.
pub const PATH_STREAM_CAPACITY: usize = 64;

pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &["**/node_modules/**", "**/dist/**", "**/build/**"];

pub const VERSION_CONTROL_DIRECTORIES: &[&str] = &["**/.git/**", "**/.svn/**", "**/.hg/**", "**/.jj/**"];

pub const JS_ENGINE_DEFAULT_PATTERNS: &[&str] = &["**/*.js", "**/*.jsx", "**/*.ts", "**/*.tsx"];

pub const FALLBACK_PATTERNS: &[&str] = &["**/*"];

/// Include patterns for an ast-grep rule language.
pub fn ast_grep_language_patterns(language: &str) -> Option<&'static [&'static str]> {
    const JS: &[&str] = &["**/*.js", "**/*.jsx", "**/*.cjs", "**/*.mjs"];
    const TS: &[&str] = &["**/*.ts", "**/*.cts", "**/*.mts"];
    const TSX: &[&str] = &["**/*.tsx"];
    const PY: &[&str] = &["**/*.py", "**/*.py3", "**/*.pyi", "**/*.bzl"];
    const JAVA: &[&str] = &["**/*.java"];
    const BASH: &[&str] = &[
        "**/*.bash",
        "**/*.bats",
        "**/*.cgi",
        "**/*.command",
        "**/*.env",
        "**/*.fcgi",
        "**/*.ksh",
        "**/*.sh",
        "**/*.sh.in",
        "**/*.tmux",
        "**/*.tool",
        "**/*.zsh",
    ];
    const C: &[&str] = &["**/*.c", "**/*.h"];
    const CPP: &[&str] = &[
        "**/*.cc", "**/*.hpp", "**/*.cpp", "**/*.c++", "**/*.hh", "**/*.cxx", "**/*.cu", "**/*.ino",
    ];
    const JSON: &[&str] = &["**/*.json"];
    const HTML: &[&str] = &["**/*.html", "**/*.htm", "**/*.xhtml"];

    Some(match language.trim().to_lowercase().as_str() {
        "js" | "jsx" | "javascript" => JS,
        "ts" | "typescript" => TS,
        "tsx" => TSX,
        "py" | "python" => PY,
        "java" => JAVA,
        "bash-exp" => BASH,
        "c" => C,
        "cc" | "c++" | "cpp" | "cxx" => CPP,
        "json" => JSON,
        "html" => HTML,
        _ => return None,
    })
}

/// Normalise a user pattern so it matches anywhere below the target.
///
/// - patterns not anchored with `**` or `/` get a `**/` prefix;
/// - a trailing `/` names a directory and expands to everything below it.
pub fn format_pattern(pattern: &str) -> String {
    let mut formatted = if pattern.starts_with("**") || pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("**/{pattern}")
    };
    if formatted.ends_with('/') {
        formatted.push_str("**/*");
    }
    formatted
}

/// User-supplied selection from the flow settings.
#[derive(Debug, Clone, Default)]
pub struct FlowPatterns {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub files: Vec<PathBuf>,
}

/// Why a particular include list was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternReason {
    ExplicitFiles,
    FlowSettings,
    CodemodConfig,
    AstGrepLanguage,
    EngineDefault,
}

impl fmt::Display for PatternReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatternReason::ExplicitFiles => "Running on the explicitly listed files",
            PatternReason::FlowSettings => "Using include patterns from the command line",
            PatternReason::CodemodConfig => "Using include patterns from the codemod configuration",
            PatternReason::AstGrepLanguage => "Using include patterns based on the ast-grep rule language",
            PatternReason::EngineDefault => "Using default include patterns based on the engine",
        };
        f.write_str(s)
    }
}

/// Resolved file selection for one codemod run.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSelection {
    Files(Vec<PathBuf>),
    Globs { include: Vec<String>, exclude: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct ResolvedPatterns {
    pub selection: PathSelection,
    pub reason: PatternReason,
}

impl ResolvedPatterns {
    pub fn include(&self) -> &[String] {
        match &self.selection {
            PathSelection::Globs { include, .. } => include,
            PathSelection::Files(_) => &[],
        }
    }

    pub fn exclude(&self) -> &[String] {
        match &self.selection {
            PathSelection::Globs { exclude, .. } => exclude,
            PathSelection::Files(_) => &[],
        }
    }
}

/// Pick the include/exclude patterns for `codemod`.
///
/// `engine_patterns` are patterns an engine declares at runtime (filemods);
/// they stand in for the static engine default when present.
pub fn resolve_patterns(
    codemod: &Codemod,
    flow: &FlowPatterns,
    engine_patterns: Option<&[String]>,
) -> Result<ResolvedPatterns> {
    if !flow.files.is_empty() {
        return Ok(ResolvedPatterns {
            selection: PathSelection::Files(flow.files.clone()),
            reason: PatternReason::ExplicitFiles,
        });
    }

    let (raw_include, reason) = if let Engine::AstGrep { language, .. } = &codemod.engine {
        let patterns = ast_grep_language_patterns(language).ok_or_else(|| {
            anyhow!("unable to determine file patterns for ast-grep language '{language}'")
        })?;
        if !flow.include.is_empty() || !codemod.include().is_empty() {
            warn!(
                codemod = %codemod.name,
                language = %language,
                "ast-grep codemods only run on files of their rule language; include patterns ignored"
            );
        }
        (to_strings(patterns), PatternReason::AstGrepLanguage)
    } else if !flow.include.is_empty() {
        (flow.include.clone(), PatternReason::FlowSettings)
    } else if !codemod.include().is_empty() {
        (codemod.include().to_vec(), PatternReason::CodemodConfig)
    } else {
        let defaults = match (&codemod.engine, engine_patterns) {
            (Engine::Filemod { .. }, Some(declared)) if !declared.is_empty() => declared.to_vec(),
            (Engine::JsTransform { .. }, _) => to_strings(JS_ENGINE_DEFAULT_PATTERNS),
            _ => to_strings(FALLBACK_PATTERNS),
        };
        (defaults, PatternReason::EngineDefault)
    };

    let include = dedup(raw_include.iter().map(|p| format_pattern(p)));
    let user_exclude = dedup(flow.exclude.iter().map(|p| format_pattern(p)));
    let default_exclude = DEFAULT_EXCLUDE_PATTERNS
        .iter()
        .chain(VERSION_CONTROL_DIRECTORIES)
        .map(|p| format_pattern(p))
        .filter(|p| !include.contains(p));

    let exclude = dedup(user_exclude.into_iter().chain(default_exclude));
    let include: Vec<String> = include.into_iter().filter(|p| !exclude.contains(p)).collect();

    debug!(codemod = %codemod.name, ?include, ?exclude, %reason, "patterns resolved");

    Ok(ResolvedPatterns {
        selection: PathSelection::Globs { include, exclude },
        reason,
    })
}

fn to_strings(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

fn dedup(patterns: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in patterns {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Compiled include/exclude globs, evaluated relative to a target root.
#[derive(Clone)]
pub struct PathMatcher {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMatcher")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl PathMatcher {
    pub fn new(root: impl Into<PathBuf>, include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            include: build_globset(include).context("building include globset")?,
            exclude: build_globset(exclude).context("building exclude globset")?,
        })
    }

    fn candidates(&self, path: &Path) -> [String; 2] {
        let abs = path.to_string_lossy().replace('\\', "/");
        let rel = path
            .strip_prefix(&self.root)
            .map(|r| r.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| abs.clone());
        [rel, abs]
    }

    pub fn matches(&self, path: &Path) -> bool {
        let candidates = self.candidates(path);
        candidates.iter().any(|c| self.include.is_match(c))
            && !candidates.iter().any(|c| self.exclude.is_match(c))
    }

    /// Whether a whole directory can be skipped.
    fn excludes_dir(&self, dir: &Path) -> bool {
        self.candidates(dir)
            .iter()
            .any(|c| self.exclude.is_match(c) || self.exclude.is_match(format!("{c}/_")))
    }
}

/// A directory the walk could not read. Its subtree is missing from the
/// results; the rest of the tree is still walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDir {
    pub path: PathBuf,
    pub reason: String,
}

/// Shared record of the directories a walk skipped.
#[derive(Debug, Clone, Default)]
pub struct SkippedDirs(Arc<Mutex<Vec<SkippedDir>>>);

impl SkippedDirs {
    fn push(&self, skipped: SkippedDir) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(skipped);
    }

    /// Drain what has been recorded so far.
    pub fn take(&self) -> Vec<SkippedDir> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Collect all files under `root` accepted by `matcher`, sorted, along with
/// the directories that could not be read.
pub fn collect_matching_files(fs: &dyn FileSystem, matcher: &PathMatcher) -> (Vec<PathBuf>, Vec<SkippedDir>) {
    let mut files = Vec::new();
    let mut skipped = Vec::new();
    walk(fs, matcher, |dir| skipped.push(dir), |path| {
        files.push(path);
        true
    });
    files.sort();
    (files, skipped)
}

/// Stack-based walk; stops early when `visit` returns `false`.
///
/// Symlinked directories are not entered, so a link back to an ancestor
/// can't make the walk revisit a subtree.
fn walk(
    fs: &dyn FileSystem,
    matcher: &PathMatcher,
    mut on_skip: impl FnMut(SkippedDir),
    mut visit: impl FnMut(PathBuf) -> bool,
) {
    let mut stack = vec![matcher.root.clone()];

    while let Some(dir) = stack.pop() {
        let mut entries = match fs.read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = ?dir, error = %err, "skipping unreadable directory");
                on_skip(SkippedDir {
                    path: dir,
                    reason: format!("{err:#}"),
                });
                continue;
            }
        };
        entries.sort();
        for path in entries.into_iter().rev() {
            if fs.is_dir(&path) {
                if fs.is_symlink(&path) {
                    debug!(dir = ?path, "not following symlinked directory");
                } else if !matcher.excludes_dir(&path) {
                    stack.push(path);
                }
            } else if fs.is_file(&path) && matcher.matches(&path) && !visit(path) {
                return;
            }
        }
    }
}

/// Lazily produced candidate paths.
///
/// A blocking walker fills a bounded channel, so it only runs ahead of the
/// consumer by [`PATH_STREAM_CAPACITY`] paths.
#[derive(Debug)]
pub struct PathSource {
    rx: mpsc::Receiver<PathBuf>,
    peeked: Option<PathBuf>,
    skipped: SkippedDirs,
}

impl PathSource {
    pub fn from_selection(
        fs: Arc<dyn FileSystem>,
        root: &Path,
        selection: &PathSelection,
    ) -> Result<Self> {
        match selection {
            PathSelection::Files(files) => {
                let files = files
                    .iter()
                    .map(|f| if f.is_absolute() { f.clone() } else { root.join(f) })
                    .filter(|f| fs.is_file(f))
                    .collect();
                Ok(Self::from_paths(files))
            }
            PathSelection::Globs { include, exclude } => {
                let matcher = PathMatcher::new(root, include, exclude)?;
                Ok(Self::spawn_walker(fs, matcher))
            }
        }
    }

    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel(paths.len().max(1));
        for path in paths {
            // Capacity covers every path.
            let _ = tx.try_send(path);
        }
        Self {
            rx,
            peeked: None,
            skipped: SkippedDirs::default(),
        }
    }

    fn spawn_walker(fs: Arc<dyn FileSystem>, matcher: PathMatcher) -> Self {
        let (tx, rx) = mpsc::channel(PATH_STREAM_CAPACITY);
        let skipped = SkippedDirs::default();
        let record = skipped.clone();
        tokio::task::spawn_blocking(move || {
            walk(
                fs.as_ref(),
                &matcher,
                |dir| record.push(dir),
                |path| tx.blocking_send(path).is_ok(),
            );
        });
        Self {
            rx,
            peeked: None,
            skipped,
        }
    }

    /// Handle to the directories the walk skipped; complete once the source
    /// is exhausted.
    pub fn skipped_dirs(&self) -> SkippedDirs {
        self.skipped.clone()
    }

    pub async fn next(&mut self) -> Option<PathBuf> {
        match self.peeked.take() {
            Some(path) => Some(path),
            None => self.rx.recv().await,
        }
    }

    /// Wait until another path is available; `false` once exhausted.
    pub async fn has_next(&mut self) -> bool {
        if self.peeked.is_none() {
            self.peeked = self.rx.recv().await;
        }
        self.peeked.is_some()
    }

    pub async fn collect(mut self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        while let Some(path) = self.next().await {
            out.push(path);
        }
        out
    }
}
