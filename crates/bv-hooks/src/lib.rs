//! Runs user-configured hook commands through the platform shell.

use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use thiserror::Error;

/// Result type for hook execution.
pub type HookResult<T> = Result<T, HookError>;

/// Errors returned while running a hook.
#[derive(Debug, Error)]
pub enum HookError {
    /// The configured command was blank.
    #[error("hook {name} has an empty command")]
    EmptyCommand { name: String },
    /// The shell could not be started.
    #[error("failed to start hook {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// The hook ran and exited unsuccessfully.
    #[error("hook {name} exited with {status}: {stderr}")]
    Failed {
        name: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Captured output of a successful hook.
#[derive(Debug, Clone)]
pub struct HookOutput {
    /// Exit status of the shell.
    pub status: ExitStatus,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// The shell and flag used to run a command string on this platform.
#[cfg(windows)]
pub fn shell_command() -> (&'static str, &'static str) {
    ("cmd", "/C")
}

/// The shell and flag used to run a command string on this platform.
#[cfg(not(windows))]
pub fn shell_command() -> (&'static str, &'static str) {
    ("sh", "-c")
}

/// Executes hook commands, optionally from a fixed working directory.
#[derive(Debug, Default, Clone)]
pub struct HookRunner {
    working_dir: Option<PathBuf>,
}

impl HookRunner {
    /// Create a runner using the current working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run hooks from `dir` instead of the current directory.
    pub fn with_working_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }

    /// Run `command` for the hook called `name` and wait for it.
    pub fn run(&self, name: &str, command: &str) -> HookResult<HookOutput> {
        if command.trim().is_empty() {
            return Err(HookError::EmptyCommand { name: name.into() });
        }

        let (shell, flag) = shell_command();
        let mut process = Command::new(shell);
        process.arg(flag).arg(command);
        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }

        tracing::debug!(hook = name, shell, "running hook");
        let output = process.output().map_err(|source| HookError::Spawn {
            name: name.into(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            tracing::warn!(hook = name, status = %output.status, "hook failed");
            return Err(HookError::Failed {
                name: name.into(),
                status: output.status,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(HookOutput {
            status: output.status,
            stdout,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn posix_shell_pair() {
        assert_eq!(shell_command(), ("sh", "-c"));
    }

    #[cfg(windows)]
    #[test]
    fn windows_shell_pair() {
        assert_eq!(shell_command(), ("cmd", "/C"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let result = HookRunner::new().run("noop", "   ");
        assert!(matches!(result, Err(HookError::EmptyCommand { .. })));
    }

    #[test]
    fn captures_stdout() {
        let output = HookRunner::new().run("greet", "echo hello").expect("hook");
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[cfg(not(windows))]
    #[test]
    fn non_zero_exit_is_failure() {
        let result = HookRunner::new().run("boom", "echo oops >&2; exit 3");
        match result {
            Err(HookError::Failed { status, stderr, .. }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn runs_in_working_dir() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        std::fs::write(temp.path().join("marker.txt"), "here").unwrap();

        let output = HookRunner::with_working_dir(temp.path())
            .run("cat", "cat marker.txt")
            .expect("hook");
        assert_eq!(output.stdout, "here");
    }
}
