//! Test-case runner
//!
//! Drives the runner once per test case, in order, against a program that is
//! already compiled (or an interpreted source) inside `work_dir`. Every case
//! runs even after a failure so the caller gets full diagnostics.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use crate::checker;
use crate::core::{ExecutionLimits, ExecutionOutcome, FailureReason, TestCase, Verdict, VerdictBuilder};
use crate::error::JudgeResult;
use crate::languages::LanguageConfig;
use crate::runner::{ExitStatus, RunOutcome, Runner};

/// Receives a notification after each finished test case
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, completed: usize, total: usize);
}

/// Discards progress
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _completed: usize, _total: usize) {}
}

/// Run every test case and fold the outcomes into a `Verdict`
pub async fn run_all(
    runner: &dyn Runner,
    language: &LanguageConfig,
    work_dir: &Path,
    test_cases: &[TestCase],
    limits: &ExecutionLimits,
    progress: &dyn ProgressSink,
) -> JudgeResult<Verdict> {
    let command = language
        .run_command(&language.run_target(work_dir))
        .with_work_dir(work_dir);
    let total = test_cases.len();
    let mut builder = VerdictBuilder::with_capacity(total);

    for (idx, tc) in test_cases.iter().enumerate() {
        let run = runner.execute(&command, tc.input.as_bytes(), limits).await?;
        let outcome = classify(run, tc.expected_output.as_bytes(), limits);

        debug!(
            "Test case {}/{}: passed={}, reason={:?}, time={}ms, memory={}KB",
            idx + 1,
            total,
            outcome.passed,
            outcome.failure_reason,
            outcome.elapsed_ms,
            outcome.peak_memory_kb
        );

        builder.push(outcome);
        progress.report(idx + 1, total).await;
    }

    let verdict = builder.finish();
    info!(
        "Ran {} test case(s): success={}, max_time_ms={}, max_memory_kb={}",
        total, verdict.overall_success, verdict.worst_elapsed_ms, verdict.worst_peak_memory_kb
    );
    Ok(verdict)
}

/// Smallest gap between the sampled address-space peak and the ceiling that
/// still counts as hitting it
const MIN_CEILING_SLACK_KB: u64 = 1024;

/// Turn a raw run into a test-case outcome.
///
/// Checked in order: timeout, memory ceiling, abnormal exit, output mismatch.
/// The process is killed only at the whole-second wall clock, so a run that
/// finished past `time_limit_ms` is a timeout as well. Memory is reported as
/// exceeded when the process ended abnormally with its sampled address-space
/// peak close to the ceiling.
pub fn classify(run: RunOutcome, expected: &[u8], limits: &ExecutionLimits) -> ExecutionOutcome {
    let RunOutcome {
        stdout,
        exit_status,
        elapsed_ms,
        peak_memory_kb,
        peak_virtual_kb,
        timed_out,
    } = run;

    let over_time = timed_out || elapsed_ms > u64::from(limits.time_limit_ms);

    let failure = if over_time {
        Some((FailureReason::Timeout, "Time limit exceeded".to_string()))
    } else if !exit_status.is_success() && reached_memory_ceiling(peak_virtual_kb, limits) {
        Some((FailureReason::MemoryExceeded, "Memory limit exceeded".to_string()))
    } else {
        match exit_status {
            ExitStatus::Exited(0) => None,
            ExitStatus::Exited(code) => Some((
                FailureReason::RuntimeError,
                format!("Runtime error (exit code: {})", code),
            )),
            ExitStatus::Signaled(sig) => Some((
                FailureReason::RuntimeError,
                format!("Runtime error (signal {})", sig),
            )),
        }
    };

    let failure = failure.or_else(|| {
        (!checker::compare(&stdout, expected)).then(|| {
            (
                FailureReason::OutputMismatch,
                "Output does not match expected output".to_string(),
            )
        })
    });

    match failure {
        None => ExecutionOutcome::passed(stdout, elapsed_ms, peak_memory_kb),
        Some((reason, message)) => {
            ExecutionOutcome::failed(reason, message, stdout, elapsed_ms, peak_memory_kb)
        }
    }
}

/// The allocation that crossed the ceiling was refused and sampling lags the
/// program, so the recorded peak sits somewhat below the ceiling.
fn reached_memory_ceiling(peak_virtual_kb: u64, limits: &ExecutionLimits) -> bool {
    let ceiling = limits.memory_limit_kb();
    let slack = (ceiling / 8).max(MIN_CEILING_SLACK_KB);
    peak_virtual_kb > 0 && peak_virtual_kb + slack >= ceiling
}
