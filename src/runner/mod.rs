//! Runner module - Execution abstraction layer
//!
//! `Runner` is the seam between the judge and the operating system: spawn a
//! command with resource limits and a timeout, feed it stdin, capture its
//! combined output. Platform-specific limiting lives in the implementations.
//!
//! The runner module does NOT:
//! - Compare outputs or determine verdicts
//! - Know about languages or compilation

#[cfg(unix)]
pub mod sandboxed;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::core::ExecutionLimits;
use crate::error::JudgeResult;

#[cfg(unix)]
pub use sandboxed::SandboxedRunner;

/// Command to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        let args: Vec<String> = iter.cloned().collect();
        Self {
            program,
            args,
            work_dir: None,
        }
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.iter().cloned());
        v
    }
}

/// How the process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed by signal
    Signaled(i32),
}

impl ExitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

/// Raw result of one execution, without verdict interpretation
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Combined stdout + stderr, in write order
    pub stdout: Vec<u8>,
    pub exit_status: ExitStatus,
    /// Wall-clock time in milliseconds
    pub elapsed_ms: u64,
    /// Best-effort peak resident memory in KB, 0 when unmeasured
    pub peak_memory_kb: u64,
    /// Best-effort peak address-space size in KB, the quantity the memory
    /// ceiling limits. 0 when unmeasured
    pub peak_virtual_kb: u64,
    /// Killed for exceeding the time ceiling
    pub timed_out: bool,
}

impl RunOutcome {
    /// Exited 0 within the time limit
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_status.is_success()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runner trait for executing programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run `cmd` with `stdin` as its standard input under `limits`.
    ///
    /// Returns `Err` only for infrastructure failures (spawn, filesystem);
    /// a crash or timeout of the program itself is a normal `RunOutcome`.
    async fn execute(
        &self,
        cmd: &CommandSpec,
        stdin: &[u8],
        limits: &ExecutionLimits,
    ) -> JudgeResult<RunOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_from_vec() {
        let cmd = CommandSpec::from_vec(&["node".to_string(), "code.js".to_string()]);
        assert_eq!(cmd.program, "node");
        assert_eq!(cmd.args, vec!["code.js"]);
        assert_eq!(cmd.to_vec(), vec!["node", "code.js"]);
    }

    #[test]
    fn test_empty_command_spec() {
        let cmd = CommandSpec::from_vec(&[]);
        assert!(cmd.program.is_empty());
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_outcome_success_requires_no_timeout() {
        let outcome = RunOutcome {
            stdout: Vec::new(),
            exit_status: ExitStatus::Exited(0),
            elapsed_ms: 1000,
            peak_memory_kb: 0,
            peak_virtual_kb: 0,
            timed_out: true,
        };
        assert!(!outcome.is_success());
        assert!(outcome.exit_status.is_success());
    }
}
