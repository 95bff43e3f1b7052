// src/exec/command.rs

//! Production engine backend: codemods are scripts run as child processes.
//!
//! - JS transforms run as `sh <source>` once per file. The file content is
//!   written to stdin and the new content is read back from stdout.
//! - Filemods run as `sh <source>` once per pass. Stdin carries one
//!   `{"path":..,"data":..}` JSON line per file; stdout carries one command
//!   per line (`upsertFile`, `deleteFile` or `error`). A script declares its
//!   default include patterns in its leading comment block with
//!   `# codemod-include: <glob>, <glob>`.
//! - ast-grep rules run through the `sg` binary on stdin; the compact JSON
//!   matches are spliced back into the file.
//!
//! Every process gets `CODEMOD_ARGS` (the argument record as JSON) and is
//! killed if its future is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::backend::{
    BoxFuture, EngineBackend, FileTransform, Filemod, FilemodInput, FilemodOutput, TransformInput,
};
use crate::commands::{ExternalFileCommand, FileCommand};
use crate::engine::{Codemod, Engine};
use crate::types::ArgumentRecord;

pub const AST_GREP_BIN_ENV: &str = "CODEMOD_AST_GREP_BIN";

#[derive(Debug, Clone)]
pub struct CommandBackend {
    ast_grep_bin: String,
}

impl Default for CommandBackend {
    fn default() -> Self {
        Self {
            ast_grep_bin: std::env::var(AST_GREP_BIN_ENV).unwrap_or_else(|_| "sg".to_string()),
        }
    }
}

impl CommandBackend {
    pub fn new(ast_grep_bin: impl Into<String>) -> Self {
        Self {
            ast_grep_bin: ast_grep_bin.into(),
        }
    }
}

impl EngineBackend for CommandBackend {
    fn file_transform(&self, codemod: &Codemod) -> Result<Arc<dyn FileTransform>> {
        match &codemod.engine {
            Engine::JsTransform { source, .. } => Ok(Arc::new(ScriptTransform {
                name: codemod.name.clone(),
                source: source.clone(),
            })),
            Engine::AstGrep { source, .. } => Ok(Arc::new(AstGrepTransform {
                bin: self.ast_grep_bin.clone(),
                rule: source.clone(),
            })),
            _ => bail!("codemod '{}' is not a per-file transform", codemod.name),
        }
    }

    fn filemod(&self, codemod: &Codemod) -> Result<Arc<dyn Filemod>> {
        match &codemod.engine {
            Engine::Filemod { source, .. } => {
                let script = std::fs::read_to_string(source)
                    .with_context(|| format!("reading filemod script {source:?}"))?;
                Ok(Arc::new(ScriptFilemod {
                    name: codemod.name.clone(),
                    source: source.clone(),
                    include: declared_include_patterns(&script),
                }))
            }
            _ => bail!("codemod '{}' is not a filemod", codemod.name),
        }
    }
}

/// Build a shell command appropriate for the platform.
fn script_command(source: &Path) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(source);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg(source);
        c
    }
}

/// Run `cmd` with `input` on stdin and return its stdout.
///
/// A non-zero exit is an error carrying the trimmed stderr, unless
/// `accept_failure_with_output` is set and the process printed something.
async fn run_with_stdin(
    mut cmd: Command,
    input: Vec<u8>,
    what: &str,
    accept_failure_with_output: bool,
) -> Result<String> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().with_context(|| format!("spawning {what}"))?;

    // Feed stdin concurrently so a chatty child can't deadlock on stdout.
    let stdin = child.stdin.take();
    let writer = tokio::spawn(async move {
        if let Some(mut stdin) = stdin {
            stdin.write_all(&input).await?;
            stdin.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("waiting for {what}"))?;
    match writer.await {
        Ok(Ok(())) => {}
        // The child may legitimately exit without reading all of stdin.
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Ok(Err(e)) => return Err(e).with_context(|| format!("writing stdin of {what}")),
        Err(e) => return Err(anyhow!("stdin writer of {what} panicked: {e}")),
    }

    let stdout = String::from_utf8(output.stdout).with_context(|| format!("{what} printed invalid UTF-8"))?;
    if !output.status.success() && !(accept_failure_with_output && !stdout.trim().is_empty()) {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "{what} exited with {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
    }
    Ok(stdout)
}

fn arguments_json(arguments: &ArgumentRecord) -> Result<String> {
    serde_json::to_string(arguments).context("serialising argument record")
}

struct ScriptTransform {
    name: String,
    source: PathBuf,
}

impl FileTransform for ScriptTransform {
    fn transform(&self, input: TransformInput) -> BoxFuture<'_, Result<Vec<FileCommand>>> {
        Box::pin(async move {
            let mut cmd = script_command(&self.source);
            cmd.env("CODEMOD_FILE_PATH", &input.path)
                .env("CODEMOD_ARGS", arguments_json(&input.arguments)?);

            let what = format!("transform '{}' on {:?}", self.name, input.path);
            let new_data = run_with_stdin(cmd, input.data.clone().into_bytes(), &what, false).await?;
            debug!(codemod = %self.name, path = ?input.path, "script transform finished");

            Ok(vec![FileCommand::UpdateFile {
                old_path: input.path,
                old_data: input.data,
                new_data,
            }])
        })
    }
}

#[derive(Serialize)]
struct FilemodFileLine<'a> {
    path: &'a Path,
    data: &'a str,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum FilemodOutputLine {
    UpsertFile { path: PathBuf, data: String },
    DeleteFile { path: PathBuf },
    Error { path: Option<PathBuf>, message: String },
}

const INCLUDE_HEADER: &str = "codemod-include:";

/// Patterns from `# codemod-include:` lines in the script's leading comments.
fn declared_include_patterns(script: &str) -> Vec<String> {
    let mut patterns = Vec::new();
    for line in script.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        let Some(comment) = line.strip_prefix('#') else {
            break;
        };
        if let Some(list) = comment.trim().strip_prefix(INCLUDE_HEADER) {
            patterns.extend(
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
        }
    }
    patterns
}

struct ScriptFilemod {
    name: String,
    source: PathBuf,
    include: Vec<String>,
}

impl Filemod for ScriptFilemod {
    fn include_patterns(&self) -> Vec<String> {
        self.include.clone()
    }

    fn execute(&self, input: FilemodInput) -> BoxFuture<'_, Result<FilemodOutput>> {
        Box::pin(async move {
            let mut stdin = Vec::new();
            for (path, data) in &input.files {
                serde_json::to_writer(&mut stdin, &FilemodFileLine { path, data })?;
                stdin.push(b'\n');
            }

            let mut cmd = script_command(&self.source);
            cmd.current_dir(&input.target)
                .env("CODEMOD_TARGET", &input.target)
                .env("CODEMOD_ARGS", arguments_json(&input.arguments)?);

            let what = format!("filemod '{}'", self.name);
            let stdout = run_with_stdin(cmd, stdin, &what, false).await?;

            let absolute = |path: PathBuf| {
                if path.is_absolute() {
                    path
                } else {
                    input.target.join(path)
                }
            };

            let mut output = FilemodOutput::default();
            for (n, line) in stdout.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let parsed: FilemodOutputLine = serde_json::from_str(line)
                    .with_context(|| format!("{what}: invalid output line {}", n + 1))?;
                match parsed {
                    FilemodOutputLine::UpsertFile { path, data } => {
                        output.commands.push(ExternalFileCommand::UpsertFile {
                            path: absolute(path),
                            data,
                        })
                    }
                    FilemodOutputLine::DeleteFile { path } => output
                        .commands
                        .push(ExternalFileCommand::DeleteFile { path: absolute(path) }),
                    FilemodOutputLine::Error { path, message } => {
                        output.errors.push((path.map(absolute), message))
                    }
                }
            }
            Ok(output)
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AstGrepMatch {
    replacement: Option<String>,
    replacement_offsets: Option<ByteRange>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ByteRange {
    start: usize,
    end: usize,
}

struct AstGrepTransform {
    bin: String,
    rule: PathBuf,
}

impl FileTransform for AstGrepTransform {
    fn transform(&self, input: TransformInput) -> BoxFuture<'_, Result<Vec<FileCommand>>> {
        Box::pin(async move {
            let mut cmd = Command::new(&self.bin);
            cmd.arg("scan")
                .arg("--rule")
                .arg(&self.rule)
                .arg("--json=compact")
                .arg("--stdin");

            let what = format!("ast-grep rule {:?} on {:?}", self.rule, input.path);
            // `sg scan` exits non-zero when error-severity rules match.
            let stdout = run_with_stdin(cmd, input.data.clone().into_bytes(), &what, true).await?;
            let matches: Vec<AstGrepMatch> = if stdout.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&stdout).with_context(|| format!("{what}: invalid JSON output"))?
            };

            let edits = matches
                .into_iter()
                .filter_map(|m| Some((m.replacement_offsets?, m.replacement?)))
                .map(|(range, text)| (range.start, range.end, text))
                .collect();
            let new_data = apply_replacements(&input.data, edits);

            Ok(vec![FileCommand::UpdateFile {
                old_path: input.path,
                old_data: input.data,
                new_data,
            }])
        })
    }
}

/// Splice `(start, end, text)` byte-range edits into `source`.
///
/// Edits that overlap an earlier one or fall outside char boundaries are
/// skipped.
pub fn apply_replacements(source: &str, mut edits: Vec<(usize, usize, String)>) -> String {
    edits.sort_by_key(|(start, end, _)| (*start, *end));

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (start, end, text) in edits {
        if start < cursor
            || end < start
            || end > source.len()
            || !source.is_char_boundary(start)
            || !source.is_char_boundary(end)
        {
            debug!(start, end, "skipping unusable replacement range");
            continue;
        }
        out.push_str(&source[cursor..start]);
        out.push_str(&text);
        cursor = end;
    }
    out.push_str(&source[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacements_apply_in_order_and_skip_overlaps() {
        let src = "let a = 1; let b = 2;";
        let edits = vec![
            (15, 16, "y".to_string()),
            (4, 5, "x".to_string()),
            (4, 9, "ignored".to_string()),
        ];

        assert_eq!(apply_replacements(src, edits), "let x = 1; let y = 2;");
    }

    #[test]
    fn out_of_range_replacements_are_ignored() {
        assert_eq!(apply_replacements("abc", vec![(2, 10, "z".into())]), "abc");
    }

    #[test]
    fn backend_rejects_mismatched_engines() {
        let backend = CommandBackend::new("sg");
        let recipe = Codemod {
            name: "r".into(),
            engine: Engine::Recipe {
                include: vec![],
                steps: vec![],
            },
        };

        assert!(backend.file_transform(&recipe).is_err());
        assert!(backend.filemod(&recipe).is_err());
    }

    #[test]
    fn include_header_is_read_from_leading_comments() {
        let script = "#!/bin/sh\n# codemod-include: **/*.ts, **/*.tsx\n\n# codemod-include: package.json\ncat\n# codemod-include: **/*.md\n";

        assert_eq!(
            declared_include_patterns(script),
            vec!["**/*.ts", "**/*.tsx", "package.json"]
        );
        assert!(declared_include_patterns("cat\n").is_empty());
    }

    #[test]
    fn filemod_script_declares_its_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("mod.sh");
        std::fs::write(&script, "# codemod-include: **/*.json\ncat >/dev/null\n").unwrap();

        let backend = CommandBackend::new("sg");
        let codemod = Codemod {
            name: "json".into(),
            engine: Engine::Filemod {
                source: script,
                include: vec![],
            },
        };

        let filemod = backend.filemod(&codemod).unwrap();
        assert_eq!(filemod.include_patterns(), vec!["**/*.json".to_string()]);
    }

    #[test]
    fn missing_filemod_script_fails_to_compile() {
        let codemod = Codemod {
            name: "gone".into(),
            engine: Engine::Filemod {
                source: PathBuf::from("/definitely/not/here.sh"),
                include: vec![],
            },
        };

        assert!(CommandBackend::new("sg").filemod(&codemod).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_transform_reads_stdin_and_writes_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("upper.sh");
        std::fs::write(&script, "tr a-z A-Z\n").unwrap();

        let backend = CommandBackend::new("sg");
        let codemod = Codemod {
            name: "upper".into(),
            engine: Engine::JsTransform {
                source: script,
                include: vec![],
            },
        };
        let transform = backend.file_transform(&codemod).unwrap();

        let commands = transform
            .transform(TransformInput {
                path: dir.path().join("a.ts"),
                data: "abc".into(),
                arguments: Arc::new(ArgumentRecord::new()),
            })
            .await
            .unwrap();

        assert!(matches!(
            &commands[..],
            [FileCommand::UpdateFile { new_data, .. }] if new_data == "ABC"
        ));
    }
}
