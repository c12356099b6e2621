//! Compiler module - Source code compilation
//!
//! Compilation runs once per submission, through the same `Runner` as the
//! program itself but under the (larger) compile limits.

use std::path::Path;
use tracing::{debug, info};

use crate::core::ExecutionLimits;
use crate::error::JudgeResult;
use crate::languages::LanguageConfig;
use crate::runner::{ExitStatus, Runner};

/// Result of a compilation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    pub success: bool,
    /// Compiler diagnostics, verbatim, when compilation failed
    pub message: Option<String>,
}

impl CompileResult {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }
}

/// Compile the source already written to `work_dir`.
///
/// Interpreted languages succeed immediately. `Err` is reserved for
/// infrastructure failures such as the compiler binary failing to spawn.
pub async fn compile(
    runner: &dyn Runner,
    work_dir: &Path,
    language: &LanguageConfig,
    limits: &ExecutionLimits,
) -> JudgeResult<CompileResult> {
    let source_path = language.source_path(work_dir);
    let binary_path = language.binary_path(work_dir);
    let Some(command) = language.compile_command(&source_path, &binary_path) else {
        return Ok(CompileResult::ok());
    };
    let command = command.with_work_dir(work_dir);

    debug!("Compiling {} with {:?}", language.name, command.to_vec());
    let outcome = runner.execute(&command, b"", limits).await?;

    if outcome.is_success() {
        debug!("Compilation finished in {}ms", outcome.elapsed_ms);
        return Ok(CompileResult::ok());
    }

    let diagnostics = outcome.stdout_lossy();
    let message = if !diagnostics.trim().is_empty() {
        diagnostics
    } else if outcome.timed_out {
        "Compilation timed out".to_string()
    } else {
        match outcome.exit_status {
            ExitStatus::Exited(code) => format!("Compilation failed with exit code {}", code),
            ExitStatus::Signaled(sig) => format!("Compiler killed by signal {}", sig),
        }
    };

    info!("Compilation of {} failed", language.name);
    Ok(CompileResult {
        success: false,
        message: Some(message),
    })
}
