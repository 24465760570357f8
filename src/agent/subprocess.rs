//! External CLI agent backend
//!
//! Runs the configured program with the instruction appended as the last
//! argument, in its own process group so a panic can take down everything
//! it forks. Each stdout line is one chunk; lines between ``` fences are
//! gathered into a single code chunk.

use super::types::{AgentBackend, AgentRequest, ChunkKind, ChunkSink};
use crate::config::CommandSpec;
use crate::error::{Error, Result};
use crate::process;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const STDERR_TAIL_CHARS: usize = 500;

/// Agent backend backed by a child process
#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    name: String,
    spec: CommandSpec,
    default_dir: PathBuf,
}

impl SubprocessBackend {
    /// `default_dir` is used when the command spec has no working directory.
    pub fn new(name: impl Into<String>, spec: CommandSpec, default_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            spec,
            default_dir: default_dir.into(),
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn working_dir(&self) -> &Path {
        self.spec.working_dir.as_deref().unwrap_or(&self.default_dir)
    }

    fn pump(&self, reader: impl BufRead, sink: &mut dyn ChunkSink) -> Result<()> {
        let mut fences = FenceSplitter::default();
        for line in reader.split(b'\n') {
            let line = line
                .map_err(|e| Error::AgentBackend(format!("reading {} output: {}", self.name, e)))?;
            let line = String::from_utf8_lossy(&line);
            let line = line.strip_suffix('\r').unwrap_or(&*line);
            if let Some((kind, content)) = fences.push_line(line) {
                sink.emit(kind, content)?;
            }
        }
        if let Some((kind, content)) = fences.finish() {
            sink.emit(kind, content)?;
        }
        Ok(())
    }
}

impl AgentBackend for SubprocessBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, request: &AgentRequest, sink: &mut dyn ChunkSink) -> Result<()> {
        let program = &self.spec.program;
        let mut command = Command::new(program);
        command
            .args(&self.spec.args)
            .arg(&request.instruction)
            .current_dir(self.working_dir())
            .env("POCKETCLAW_LLM_PROVIDER", request.provider.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::AgentBackend(format!("failed to start '{}': {}", program, e)))?;
        let pid = child.id();
        tracing::info!(
            invocation_id = %request.invocation_id,
            backend = %self.name,
            pid,
            "Agent process started"
        );

        if let Err(e) = sink.spawned(pid) {
            let _ = child.wait();
            return Err(e);
        }

        let stderr = child.stderr.take().map(|mut stream| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = stream.read_to_string(&mut buf);
                buf
            })
        });

        let outcome = match child.stdout.take() {
            Some(stdout) => self.pump(BufReader::new(stdout), sink),
            None => Err(Error::Internal("agent stdout was not captured".to_string())),
        };
        if outcome.is_err() {
            process::kill_tree(pid);
        }

        let status = child.wait();
        sink.exited(pid);
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        outcome?;
        let status = status
            .map_err(|e| Error::AgentBackend(format!("waiting for '{}': {}", program, e)))?;
        if !status.success() {
            return Err(Error::AgentBackend(format!(
                "'{}' exited with {}{}",
                program,
                status,
                stderr_tail(&stderr)
            )));
        }

        tracing::info!(
            invocation_id = %request.invocation_id,
            backend = %self.name,
            "Agent process finished"
        );
        Ok(())
    }
}

/// Splits line output into prose and fenced code chunks
#[derive(Debug, Default)]
struct FenceSplitter {
    code: Option<String>,
}

impl FenceSplitter {
    fn push_line(&mut self, line: &str) -> Option<(ChunkKind, String)> {
        if line.trim_start().starts_with("```") {
            return match self.code.take() {
                Some(code) if !code.is_empty() => Some((ChunkKind::Code, code)),
                Some(_) => None,
                None => {
                    self.code = Some(String::new());
                    None
                }
            };
        }
        match self.code.as_mut() {
            Some(code) => {
                code.push_str(line);
                code.push('\n');
                None
            }
            None => Some((ChunkKind::Text, format!("{}\n", line))),
        }
    }

    /// Flush an unterminated code block
    fn finish(&mut self) -> Option<(ChunkKind, String)> {
        self.code
            .take()
            .filter(|code| !code.is_empty())
            .map(|code| (ChunkKind::Code, code))
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let start = trimmed
        .char_indices()
        .rev()
        .nth(STDERR_TAIL_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!(": {}", &trimmed[start..])
}

/// Locate `program` the way the shell would
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}
