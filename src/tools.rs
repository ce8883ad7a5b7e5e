use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::config::ToolPrograms;
use crate::error::CollectorError;

/// One external command: program name or path, arguments, optional working dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Value following `flag` in the argument list.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Diagnostic text for a failed run: stderr, else stdout, else the exit code.
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external executables. Fails with `ToolNotFound` when the program is
/// absent; a non-zero exit is reported through `ToolOutput`, not as an error.
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, CollectorError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub program: String,
    pub path: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SystemToolRunner;

impl SystemToolRunner {
    pub fn new() -> Self {
        Self
    }

    /// Resolves a bare name through PATH, or checks an explicit path. Only
    /// executable files count.
    pub fn locate(program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    pub fn tool_info(programs: &ToolPrograms) -> Vec<ToolInfo> {
        [
            (&programs.makeblastdb, "-version"),
            (&programs.blastn, "-version"),
            (&programs.blastp, "-version"),
            (&programs.bowtie_build, "--version"),
            (&programs.bowtie2_build, "--version"),
        ]
        .into_iter()
        .map(|(program, flag)| {
            let path = Self::locate(program);
            ToolInfo {
                program: program.clone(),
                version: path.as_deref().and_then(|path| tool_version(path, &[flag])),
                path: path.map(|path| path.to_string_lossy().to_string()),
            }
        })
        .collect()
    }
}

impl ToolRunner for SystemToolRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, CollectorError> {
        let program = Self::locate(&invocation.program)
            .ok_or_else(|| CollectorError::tool_not_found(&invocation.program))?;
        let mut cmd = Command::new(&program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }
        tracing::debug!(program = %program.display(), args = ?invocation.args, "running tool");
        let output = cmd.output().map_err(|err| match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                CollectorError::tool_not_found(&invocation.program)
            }
            _ => CollectorError::Filesystem(format!("spawn {}: {err}", program.display())),
        })?;
        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
