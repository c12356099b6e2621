use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a single test case did not pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    CompileError,
    RuntimeError,
    Timeout,
    MemoryExceeded,
    OutputMismatch,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::CompileError => "compile_error",
            FailureReason::RuntimeError => "runtime_error",
            FailureReason::Timeout => "timeout",
            FailureReason::MemoryExceeded => "memory_exceeded",
            FailureReason::OutputMismatch => "output_mismatch",
        };
        write!(f, "{}", s)
    }
}

/// Result of running one test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub passed: bool,
    /// Combined stdout + stderr
    pub stdout_captured: Vec<u8>,
    pub elapsed_ms: u64,
    /// 0 when the platform could not measure it
    pub peak_memory_kb: u64,
    pub failure_reason: Option<FailureReason>,
    pub error_message: Option<String>,
}

impl ExecutionOutcome {
    pub fn passed(stdout: Vec<u8>, elapsed_ms: u64, peak_memory_kb: u64) -> Self {
        Self {
            passed: true,
            stdout_captured: stdout,
            elapsed_ms,
            peak_memory_kb,
            failure_reason: None,
            error_message: None,
        }
    }

    pub fn failed(
        reason: FailureReason,
        message: impl Into<String>,
        stdout: Vec<u8>,
        elapsed_ms: u64,
        peak_memory_kb: u64,
    ) -> Self {
        Self {
            passed: false,
            stdout_captured: stdout,
            elapsed_ms,
            peak_memory_kb,
            failure_reason: Some(reason),
            error_message: Some(message.into()),
        }
    }

    /// Outcome recorded for every case when the submission does not compile
    pub fn compile_error(diagnostics: &str) -> Self {
        Self::failed(
            FailureReason::CompileError,
            format!("Compilation error: {}", diagnostics),
            Vec::new(),
            0,
            0,
        )
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout_captured).into_owned()
    }
}

/// Aggregate over every test case of one submission. Never mutated after
/// `VerdictBuilder::finish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub overall_success: bool,
    pub worst_elapsed_ms: u64,
    pub worst_peak_memory_kb: u64,
    pub combined_output: String,
    pub primary_failure_reason: Option<FailureReason>,
    pub error_message: Option<String>,
    pub per_case: Vec<ExecutionOutcome>,
}

impl Verdict {
    /// One `compile_error` outcome per test case
    pub fn compile_failed(case_count: usize, diagnostics: &str) -> Self {
        let mut builder = VerdictBuilder::with_capacity(case_count);
        for _ in 0..case_count {
            builder.push(ExecutionOutcome::compile_error(diagnostics));
        }
        builder.finish()
    }

    pub fn report(&self) -> VerdictReport {
        VerdictReport::from(self)
    }
}

/// Folds outcomes in case order, keeping running maxima
#[derive(Debug)]
pub struct VerdictBuilder {
    overall_success: bool,
    worst_elapsed_ms: u64,
    worst_peak_memory_kb: u64,
    combined_output: String,
    primary_failure_reason: Option<FailureReason>,
    error_message: Option<String>,
    per_case: Vec<ExecutionOutcome>,
}

impl VerdictBuilder {
    pub fn with_capacity(case_count: usize) -> Self {
        Self {
            overall_success: true,
            worst_elapsed_ms: 0,
            worst_peak_memory_kb: 0,
            combined_output: String::new(),
            primary_failure_reason: None,
            error_message: None,
            per_case: Vec::with_capacity(case_count),
        }
    }

    pub fn push(&mut self, outcome: ExecutionOutcome) {
        let case_number = self.per_case.len() + 1;

        self.worst_elapsed_ms = self.worst_elapsed_ms.max(outcome.elapsed_ms);
        self.worst_peak_memory_kb = self.worst_peak_memory_kb.max(outcome.peak_memory_kb);

        if !outcome.passed {
            self.overall_success = false;
            if self.primary_failure_reason.is_none() {
                self.primary_failure_reason = outcome.failure_reason;
            }
            if self.error_message.is_none() {
                self.error_message = outcome.error_message.clone();
            }
        }

        if !outcome.stdout_captured.is_empty() {
            if !self.combined_output.is_empty() {
                self.combined_output.push('\n');
            }
            self.combined_output
                .push_str(&format!("Test Case {}:\n", case_number));
            self.combined_output.push_str(&outcome.output_lossy());
        }

        self.per_case.push(outcome);
    }

    pub fn finish(self) -> Verdict {
        Verdict {
            overall_success: self.overall_success,
            worst_elapsed_ms: self.worst_elapsed_ms,
            worst_peak_memory_kb: self.worst_peak_memory_kb,
            combined_output: self.combined_output,
            primary_failure_reason: self.primary_failure_reason,
            error_message: self.error_message,
            per_case: self.per_case,
        }
    }
}

/// JSON shape of a verdict as returned to the submission API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictReport {
    pub success: bool,
    pub execution_time_ms: u64,
    pub memory_usage_kb: u64,
    pub output: String,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub test_results: Vec<TestCaseReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseReport {
    /// 1-based
    pub test_case: usize,
    pub success: bool,
    pub execution_time: u64,
    pub memory_usage: u64,
    pub output: String,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl From<&Verdict> for VerdictReport {
    fn from(verdict: &Verdict) -> Self {
        let test_results = verdict
            .per_case
            .iter()
            .enumerate()
            .map(|(idx, outcome)| TestCaseReport {
                test_case: idx + 1,
                success: outcome.passed,
                execution_time: outcome.elapsed_ms,
                memory_usage: outcome.peak_memory_kb,
                output: outcome.output_lossy(),
                error_message: outcome.error_message.clone(),
                failure_reason: outcome.failure_reason,
            })
            .collect();

        Self {
            success: verdict.overall_success,
            execution_time_ms: verdict.worst_elapsed_ms,
            memory_usage_kb: verdict.worst_peak_memory_kb,
            output: verdict.combined_output.clone(),
            error_message: verdict.error_message.clone(),
            failure_reason: verdict.primary_failure_reason,
            test_results,
        }
    }
}
