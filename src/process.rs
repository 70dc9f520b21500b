use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

pub trait CommandExecutor {
    /// Run `command` through a shell and capture its output.
    ///
    /// A non-zero exit is reported through [`CommandOutput::code`], not as an error.
    fn execute(&self, command: &str) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    working_dir: Option<PathBuf>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        let mut cmd = Cmd::new("sh").args(["-c", command]).allow_fail();
        if let Some(dir) = &self.working_dir {
            cmd = cmd.dir(dir);
        }
        cmd.run()
    }
}

pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    allow_fail: bool,
    error_prefix: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            allow_fail: false,
            error_prefix: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_string()));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn run(self) -> Result<CommandOutput> {
        debug!(command = %self.display(), "Running external command");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;

        let result = CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            let prefix = self
                .error_prefix
                .unwrap_or_else(|| format!("'{}' failed", self.program));
            let stderr = result.stderr_trimmed();
            if stderr.is_empty() {
                bail!("{} (exit code {})", prefix, result.code);
            }
            bail!("{} (exit code {}):\n{}", prefix, result.code, stderr);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_executor_captures_stdout() {
        let output = ShellExecutor::new()
            .execute("echo numpy==1.2 && echo pandas")
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "numpy==1.2\npandas\n");
    }

    #[test]
    fn shell_executor_reports_exit_code() {
        let output = ShellExecutor::new().execute("echo oops >&2; exit 3").unwrap();
        assert_eq!(output.code, 3);
        assert_eq!(output.stderr_trimmed(), "oops");
    }

    #[test]
    fn shell_executor_honours_working_dir() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "here").unwrap();
        let output = ShellExecutor::in_dir(temp.path())
            .execute("cat marker.txt")
            .unwrap();
        assert_eq!(output.stdout_trimmed(), "here");
    }

    #[test]
    fn failing_command_error_carries_prefix_and_stderr() {
        let err = Cmd::new("sh")
            .args(["-c", "echo broken >&2; exit 1"])
            .error_msg("docker build failed")
            .run()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("docker build failed"));
        assert!(message.contains("broken"));
    }

    #[test]
    fn display_joins_program_and_args() {
        let cmd = Cmd::new("docker").args(["tag", "a", "b"]);
        assert_eq!(cmd.display(), "docker tag a b");
    }
}
