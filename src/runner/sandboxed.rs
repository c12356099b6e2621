//! Sandboxed runner implementation using POSIX resource limits
//!
//! The child runs in its own process group with `RLIMIT_AS`, `RLIMIT_CPU`,
//! `RLIMIT_FSIZE` and `RLIMIT_CORE` applied between fork and exec, so the
//! limits are in force before any user code runs. The parent enforces the
//! wall-clock deadline and kills the whole group when it passes.

use async_trait::async_trait;
use nix::libc::rlim_t;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandSpec, ExitStatus, RunOutcome, Runner};
use crate::core::ExecutionLimits;
use crate::error::{JudgeError, JudgeResult};

/// Default cap on captured output (16 MiB)
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 16 * 1024 * 1024;

const INPUT_FILE: &str = "input.txt";
const OUTPUT_FILE: &str = "output.txt";
const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// Runner that executes untrusted code under rlimits and a wall-clock deadline
#[derive(Debug, Clone)]
pub struct SandboxedRunner {
    /// Upper bound on captured output, also applied as RLIMIT_FSIZE
    max_output_bytes: u64,
    /// Parent directory for per-call scratch directories
    scratch_root: Option<PathBuf>,
}

impl SandboxedRunner {
    pub fn new(max_output_bytes: u64) -> Self {
        Self {
            max_output_bytes,
            scratch_root: None,
        }
    }

    pub fn with_scratch_root(mut self, dir: impl AsRef<Path>) -> Self {
        self.scratch_root = Some(dir.as_ref().to_path_buf());
        self
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("run-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}

impl Default for SandboxedRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_BYTES)
    }
}

#[async_trait]
impl Runner for SandboxedRunner {
    async fn execute(
        &self,
        cmd: &CommandSpec,
        stdin: &[u8],
        limits: &ExecutionLimits,
    ) -> JudgeResult<RunOutcome> {
        if cmd.program.is_empty() {
            return Err(JudgeError::EmptyCommand);
        }

        // Removed on every exit path when dropped
        let io_dir = self.scratch_dir()?;
        let input_path = io_dir.path().join(INPUT_FILE);
        let output_path = io_dir.path().join(OUTPUT_FILE);
        fs::write(&input_path, stdin).await?;

        let stdin_file = std::fs::File::open(&input_path)?;
        let output_file = std::fs::File::create(&output_path)?;
        let stderr_file = output_file.try_clone()?;

        let work_dir = cmd
            .work_dir
            .clone()
            .unwrap_or_else(|| io_dir.path().to_path_buf());

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .current_dir(&work_dir)
            .env_clear()
            .env("PATH", SANDBOX_PATH)
            .env("HOME", &work_dir)
            .stdin(Stdio::from(stdin_file))
            .stdout(Stdio::from(output_file))
            .stderr(Stdio::from(stderr_file))
            .process_group(0)
            .kill_on_drop(true);

        let process_limits = ProcessLimits::new(limits, self.max_output_bytes);
        // SAFETY: the hook only issues setrlimit syscalls, which are
        // async-signal-safe, and touches no shared state.
        unsafe {
            command.pre_exec(move || process_limits.apply());
        }

        debug!(
            "Executing {:?} (timeout={}s, memory={}KB)",
            cmd.to_vec(),
            limits.timeout_secs(),
            limits.memory_limit_kb()
        );

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| JudgeError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
        let pid = child.id();

        let deadline = tokio::time::Instant::from_std(start) + limits.wall_timeout();
        let mut sampler = tokio::time::interval(MEMORY_SAMPLE_INTERVAL);
        let mut peak = MemorySample::default();

        let finished = loop {
            tokio::select! {
                status = child.wait() => break Some(status?),
                _ = tokio::time::sleep_until(deadline) => break None,
                _ = sampler.tick() => {
                    if let Some(pid) = pid {
                        if let Some(sample) = read_memory_sample(pid).await {
                            peak = peak.max(sample);
                        }
                    }
                }
            }
        };

        let (exit_status, timed_out) = match finished {
            Some(status) => {
                let exit_status = to_exit_status(status);
                let cpu_exceeded = exit_status == ExitStatus::Signaled(Signal::SIGXCPU as i32);
                (exit_status, cpu_exceeded)
            }
            None => {
                debug!(
                    "Wall-clock limit of {}s reached, killing {:?}",
                    limits.timeout_secs(),
                    pid
                );
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                if let Err(e) = child.start_kill() {
                    debug!("start_kill after timeout: {}", e);
                }
                (to_exit_status(child.wait().await?), true)
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        // Anything the program forked off is still in its group
        if let Some(pid) = pid {
            kill_process_group(pid);
        }

        let stdout = read_capped(&output_path, self.max_output_bytes).await?;

        Ok(RunOutcome {
            stdout,
            exit_status,
            elapsed_ms,
            peak_memory_kb: peak.resident_kb,
            peak_virtual_kb: peak.virtual_kb,
            timed_out,
        })
    }
}

/// Limits applied in the child between fork and exec
#[derive(Debug, Clone, Copy)]
struct ProcessLimits {
    address_space_bytes: u64,
    cpu_secs: u64,
    file_size_bytes: u64,
}

impl ProcessLimits {
    fn new(limits: &ExecutionLimits, max_output_bytes: u64) -> Self {
        Self {
            address_space_bytes: limits.memory_limit_kb() * 1024,
            cpu_secs: limits.timeout_secs(),
            file_size_bytes: max_output_bytes,
        }
    }

    fn apply(&self) -> std::io::Result<()> {
        set_limit(
            Resource::RLIMIT_AS,
            self.address_space_bytes,
            self.address_space_bytes,
        )?;
        // Soft limit delivers SIGXCPU, hard limit one second later SIGKILL
        set_limit(Resource::RLIMIT_CPU, self.cpu_secs, self.cpu_secs + 1)?;
        set_limit(
            Resource::RLIMIT_FSIZE,
            self.file_size_bytes,
            self.file_size_bytes,
        )?;
        set_limit(Resource::RLIMIT_CORE, 0, 0)?;
        Ok(())
    }
}

fn set_limit(resource: Resource, soft: u64, hard: u64) -> std::io::Result<()> {
    setrlimit(resource, soft as rlim_t, hard as rlim_t).map_err(std::io::Error::from)
}

fn kill_process_group(pid: u32) {
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
    }
}

fn to_exit_status(status: std::process::ExitStatus) -> ExitStatus {
    match status.code() {
        Some(code) => ExitStatus::Exited(code),
        None => ExitStatus::Signaled(status.signal().unwrap_or(0)),
    }
}

async fn read_capped(path: &Path, max_bytes: u64) -> std::io::Result<Vec<u8>> {
    let file = fs::File::open(path).await?;
    let mut buf = Vec::new();
    file.take(max_bytes).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// High-water marks of a live process, in KB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MemorySample {
    /// `VmHWM`
    resident_kb: u64,
    /// `VmPeak`
    virtual_kb: u64,
}

impl MemorySample {
    fn max(self, other: MemorySample) -> MemorySample {
        MemorySample {
            resident_kb: self.resident_kb.max(other.resident_kb),
            virtual_kb: self.virtual_kb.max(other.virtual_kb),
        }
    }
}

/// Read from /proc (Linux only)
#[cfg(target_os = "linux")]
async fn read_memory_sample(pid: u32) -> Option<MemorySample> {
    let status = fs::read_to_string(format!("/proc/{}/status", pid))
        .await
        .ok()?;
    parse_memory_sample(&status)
}

#[cfg(not(target_os = "linux"))]
async fn read_memory_sample(_pid: u32) -> Option<MemorySample> {
    None
}

/// `None` once the process has exited and its memory fields are gone
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_memory_sample(status: &str) -> Option<MemorySample> {
    Some(MemorySample {
        resident_kb: status_field_kb(status, "VmHWM:")?,
        virtual_kb: status_field_kb(status, "VmPeak:")?,
    })
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn status_field_kb(status: &str, field: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(field))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}
