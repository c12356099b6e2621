//! Judging orchestrator
//!
//! Single entry point for judging a submission. Owns the lifecycle
//! `pending -> running -> {completed, failed}` and the shared pipeline
//! (resolve language, prepare workspace, compile once, run every case) that
//! the authoring dry runs reuse unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::checker;
use crate::compiler;
use crate::config::JudgeConfig;
use crate::core::{Problem, Submission, TestCase, TestCaseReport, Verdict, VerdictBuilder};
use crate::error::{JudgeError, JudgeResult, OrchestrationError};
use crate::judger::{self, NoProgress, ProgressSink};
use crate::languages::LanguageRegistry;
use crate::runner::Runner;
use crate::scoring;
use crate::store::{SubmissionStatus, SubmissionStore};
use crate::workspace::Workspace;

/// Outcome of running a sample solution against a problem's test cases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub test_results: Vec<TestCaseReport>,
}

pub struct Orchestrator {
    registry: Arc<LanguageRegistry>,
    runner: Arc<dyn Runner>,
    store: Arc<dyn SubmissionStore>,
    config: JudgeConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<LanguageRegistry>,
        runner: Arc<dyn Runner>,
        store: Arc<dyn SubmissionStore>,
        config: JudgeConfig,
    ) -> Self {
        Self {
            registry,
            runner,
            store,
            config,
        }
    }

    /// Judge a submission and persist the result.
    ///
    /// Ends with the submission `completed` (a verdict, passing or not) or
    /// `failed` (no verdict could be produced).
    pub async fn judge(
        &self,
        submission: &Submission,
        problem: &Problem,
    ) -> Result<Verdict, OrchestrationError> {
        let submission_id = submission.id;

        if let Err(source) = self
            .store
            .set_status(submission_id, SubmissionStatus::Running)
            .await
        {
            error!(
                "Failed to mark submission {} as running: {}",
                submission_id, source
            );
            return Err(OrchestrationError {
                submission_id,
                source,
            });
        }

        info!(
            "Judging submission {} (problem={}, language={}, test_cases={})",
            submission_id,
            problem.id,
            submission.language,
            problem.test_cases.len()
        );

        let progress = StoreProgress {
            store: self.store.as_ref(),
            submission_id,
        };
        let label = submission_id.to_string();
        let verdict = match self
            .evaluate(&submission.code, &submission.language, problem, &label, &progress)
            .await
        {
            Ok(verdict) => verdict,
            Err(source) => return Err(self.fail(submission_id, source).await),
        };

        let score = scoring::score_for(&verdict, problem, &self.config.default_limits());
        if let Err(source) = self.complete(submission_id, &verdict, score).await {
            return Err(self.fail(submission_id, source).await);
        }

        info!(
            "Submission {} completed: success={}, score={}, max_time_ms={}, max_memory_kb={}",
            submission_id,
            verdict.overall_success,
            score,
            verdict.worst_elapsed_ms,
            verdict.worst_peak_memory_kb
        );
        Ok(verdict)
    }

    async fn complete(&self, submission_id: i64, verdict: &Verdict, score: u32) -> JudgeResult<()> {
        self.store
            .save_verdict(submission_id, &verdict.report(), score)
            .await?;
        self.store
            .set_status(submission_id, SubmissionStatus::Completed)
            .await
    }

    async fn fail(&self, submission_id: i64, source: JudgeError) -> OrchestrationError {
        if source.is_configuration() {
            warn!("Submission {} rejected: {}", submission_id, source);
        } else {
            error!("Judging submission {} failed: {}", submission_id, source);
        }

        let message = source.to_string();
        if let Err(e) = self.store.save_failure(submission_id, &message).await {
            warn!("Failed to record failure of submission {}: {}", submission_id, e);
        }
        if let Err(e) = self
            .store
            .set_status(submission_id, SubmissionStatus::Failed)
            .await
        {
            warn!("Failed to mark submission {} as failed: {}", submission_id, e);
        }

        OrchestrationError {
            submission_id,
            source,
        }
    }

    /// Shared pipeline: resolve, write source, compile once, run all cases
    async fn evaluate(
        &self,
        code: &str,
        language: &str,
        problem: &Problem,
        label: &str,
        progress: &dyn ProgressSink,
    ) -> JudgeResult<Verdict> {
        let lang = self.registry.resolve(language)?;
        let limits = lang.adjust_limits(&problem.limits(&self.config.default_limits()));

        if problem.test_cases.is_empty() {
            warn!("Problem {} has no test cases, passing vacuously", problem.id);
            return Ok(VerdictBuilder::with_capacity(0).finish());
        }

        let workspace = Workspace::create(self.config.work_root.as_deref(), label)?;
        workspace.write_source(lang, code).await?;

        let compiled = compiler::compile(
            self.runner.as_ref(),
            workspace.path(),
            lang,
            &self.config.compile_limits(),
        )
        .await?;
        if !compiled.success {
            let diagnostics = compiled.message.unwrap_or_default();
            return Ok(Verdict::compile_failed(
                problem.test_cases.len(),
                &diagnostics,
            ));
        }

        judger::run_all(
            self.runner.as_ref(),
            lang,
            workspace.path(),
            &problem.test_cases,
            &limits,
            progress,
        )
        .await
    }

    /// Dry run a sample solution against the problem's test cases.
    /// Nothing is persisted.
    pub async fn validate_test_cases(
        &self,
        sample_solution: &str,
        language: &str,
        problem: &Problem,
    ) -> JudgeResult<ValidationReport> {
        let label = format!("validate-{}", problem.id);
        let verdict = self
            .evaluate(sample_solution, language, problem, &label, &NoProgress)
            .await?;

        info!(
            "Validated problem {}: valid={} ({} test cases)",
            problem.id,
            verdict.overall_success,
            verdict.per_case.len()
        );
        Ok(ValidationReport {
            valid: verdict.overall_success,
            test_results: verdict.report().test_results,
        })
    }

    /// Run a sample solution on each input and keep the ones it handles
    /// cleanly, with its output as the expected output. Nothing is persisted.
    pub async fn generate_test_cases(
        &self,
        sample_solution: &str,
        language: &str,
        problem: &Problem,
        inputs: &[String],
    ) -> JudgeResult<Vec<TestCase>> {
        let lang = self.registry.resolve(language)?;
        let limits = lang.adjust_limits(&problem.limits(&self.config.default_limits()));

        let workspace = Workspace::create(
            self.config.work_root.as_deref(),
            &format!("generate-{}", problem.id),
        )?;
        workspace.write_source(lang, sample_solution).await?;

        let compiled = compiler::compile(
            self.runner.as_ref(),
            workspace.path(),
            lang,
            &self.config.compile_limits(),
        )
        .await?;
        if !compiled.success {
            warn!(
                "Sample solution for problem {} does not compile, no test cases generated",
                problem.id
            );
            return Ok(Vec::new());
        }

        let command = lang
            .run_command(&lang.run_target(workspace.path()))
            .with_work_dir(workspace.path());

        let mut test_cases = Vec::with_capacity(inputs.len());
        for (idx, input) in inputs.iter().enumerate() {
            let run = self
                .runner
                .execute(&command, input.as_bytes(), &limits)
                .await?;
            let over_time = run.elapsed_ms > u64::from(limits.time_limit_ms);
            if !run.is_success() || over_time {
                warn!(
                    "Sample solution failed on input {} of problem {} ({:?}, elapsed={}ms, timed_out={})",
                    idx + 1,
                    problem.id,
                    run.exit_status,
                    run.elapsed_ms,
                    run.timed_out
                );
                continue;
            }
            let output = String::from_utf8_lossy(&checker::normalize(&run.stdout)).into_owned();
            test_cases.push(TestCase::new(input.clone(), output));
        }

        info!(
            "Generated {}/{} test cases for problem {}",
            test_cases.len(),
            inputs.len(),
            problem.id
        );
        Ok(test_cases)
    }
}

/// Forwards per-case progress to the submission store
struct StoreProgress<'a> {
    store: &'a dyn SubmissionStore,
    submission_id: i64,
}

#[async_trait]
impl<'a> ProgressSink for StoreProgress<'a> {
    async fn report(&self, completed: usize, total: usize) {
        self.store
            .progress(self.submission_id, completed, total)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Difficulty, ExecutionLimits, FailureReason};
    use crate::runner::{CommandSpec, RunOutcome, SandboxedRunner};
    use crate::store::MemoryStore;

    const TEST_LANGUAGES: &str = r#"
[sh]
source_file = "main.sh"
run_command = "sh {source}"
aliases = ["shell"]

[shc]
source_file = "main.sh"
binary_file = "main.bin"
compile_command = "sh {source} {binary}"
run_command = "sh {binary}"
"#;

    fn orchestrator(store: Arc<MemoryStore>) -> Orchestrator {
        orchestrator_with(store, Arc::new(SandboxedRunner::default()))
    }

    fn orchestrator_with(store: Arc<MemoryStore>, runner: Arc<dyn Runner>) -> Orchestrator {
        let registry = LanguageRegistry::from_toml_str(TEST_LANGUAGES).unwrap();
        Orchestrator::new(Arc::new(registry), runner, store, JudgeConfig::default())
    }

    fn hello_problem() -> Problem {
        Problem {
            id: 1,
            time_limit_ms: Some(1000),
            memory_limit_mb: Some(128),
            test_cases: vec![TestCase::new("", "Hello, World!")],
            difficulty: Difficulty::Easy,
        }
    }

    fn submission(id: i64, language: &str, code: &str) -> Submission {
        Submission {
            id,
            problem_id: 1,
            code: code.to_string(),
            language: language.to_string(),
        }
    }

    #[tokio::test]
    async fn test_correct_submission_completes_with_full_score() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store.clone());
        let problem = hello_problem();

        let verdict = judge
            .judge(&submission(1, "sh", "echo 'Hello, World!'"), &problem)
            .await
            .unwrap();

        assert!(verdict.overall_success);
        let stored = store.get(1).unwrap();
        assert_eq!(
            stored.history,
            vec![
                SubmissionStatus::Pending,
                SubmissionStatus::Running,
                SubmissionStatus::Completed
            ]
        );
        assert!(stored.verdict.unwrap().success);
        assert_eq!(stored.progress, vec![(1, 1)]);

        // Zero measured usage scores the whole base
        let zero_usage = Verdict {
            worst_elapsed_ms: 0,
            worst_peak_memory_kb: 0,
            ..verdict
        };
        assert_eq!(
            scoring::score_for(&zero_usage, &problem, &ExecutionLimits::default()),
            100
        );
    }

    #[tokio::test]
    async fn test_wrong_output_completes_with_zero_score() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store.clone());
        let problem = hello_problem();

        let verdict = judge
            .judge(&submission(2, "sh", "echo 'Hello World!'"), &problem)
            .await
            .unwrap();

        assert!(!verdict.overall_success);
        assert_eq!(
            verdict.per_case[0].failure_reason,
            Some(FailureReason::OutputMismatch)
        );
        assert_eq!(
            scoring::score_for(&verdict, &problem, &ExecutionLimits::default()),
            0
        );

        let stored = store.get(2).unwrap();
        assert_eq!(stored.status(), SubmissionStatus::Completed);
        assert_eq!(stored.score, Some(0));
        let report = stored.verdict.unwrap();
        assert_eq!(
            report.error_message.as_deref(),
            Some("Output does not match expected output")
        );
    }

    #[tokio::test]
    async fn test_sleeping_program_times_out() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store.clone());
        let started = std::time::Instant::now();

        let verdict = judge
            .judge(&submission(3, "sh", "sleep 10"), &hello_problem())
            .await
            .unwrap();

        assert!(!verdict.overall_success);
        assert_eq!(verdict.per_case[0].failure_reason, Some(FailureReason::Timeout));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(store.get(3).unwrap().status(), SubmissionStatus::Completed);
    }

    #[tokio::test]
    async fn test_runtime_error_message() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store);

        let verdict = judge
            .judge(&submission(4, "sh", "exit 2"), &hello_problem())
            .await
            .unwrap();

        assert_eq!(
            verdict.error_message.as_deref(),
            Some("Runtime error (exit code: 2)")
        );
    }

    #[tokio::test]
    async fn test_unsupported_language_fails_submission() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store.clone());

        let err = judge
            .judge(&submission(5, "cobol", "DISPLAY 'HI'."), &hello_problem())
            .await
            .unwrap_err();

        assert_eq!(err.submission_id, 5);
        assert!(matches!(err.source, JudgeError::UnsupportedLanguage(_)));

        let stored = store.get(5).unwrap();
        assert_eq!(
            stored.history,
            vec![
                SubmissionStatus::Pending,
                SubmissionStatus::Running,
                SubmissionStatus::Failed
            ]
        );
        assert_eq!(
            stored.failure.as_deref(),
            Some("Unsupported language: cobol")
        );
        assert!(stored.verdict.is_none());
    }

    struct BrokenRunner;

    #[async_trait]
    impl Runner for BrokenRunner {
        async fn execute(
            &self,
            _cmd: &CommandSpec,
            _stdin: &[u8],
            _limits: &ExecutionLimits,
        ) -> JudgeResult<RunOutcome> {
            Err(JudgeError::Io(std::io::Error::other("disk full")))
        }
    }

    #[tokio::test]
    async fn test_infrastructure_error_fails_submission() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator_with(store.clone(), Arc::new(BrokenRunner));

        let err = judge
            .judge(&submission(6, "sh", "echo 'Hello, World!'"), &hello_problem())
            .await
            .unwrap_err();

        assert!(matches!(err.source, JudgeError::Io(_)));
        assert_eq!(store.get(6).unwrap().status(), SubmissionStatus::Failed);
    }

    #[tokio::test]
    async fn test_compile_error_marks_every_case() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store);
        let problem = Problem {
            test_cases: vec![TestCase::new("", "1"), TestCase::new("", "2")],
            ..hello_problem()
        };

        let verdict = judge
            .judge(
                &submission(7, "shc", "echo 'syntax error near line 1'; exit 1"),
                &problem,
            )
            .await
            .unwrap();

        assert_eq!(verdict.per_case.len(), 2);
        assert!(verdict
            .per_case
            .iter()
            .all(|o| o.failure_reason == Some(FailureReason::CompileError)));
        assert_eq!(
            verdict.error_message.as_deref(),
            Some("Compilation error: syntax error near line 1\n")
        );
    }

    #[tokio::test]
    async fn test_compiled_language_runs_binary() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store);
        let code = "echo \"echo 'Hello, World!'\" > \"$1\"";

        let verdict = judge
            .judge(&submission(8, "shc", code), &hello_problem())
            .await
            .unwrap();

        assert!(verdict.overall_success);
    }

    #[tokio::test]
    async fn test_empty_test_list_is_vacuous_pass() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store.clone());
        let problem = Problem {
            test_cases: Vec::new(),
            ..hello_problem()
        };

        let verdict = judge
            .judge(&submission(9, "shell", "exit 1"), &problem)
            .await
            .unwrap();

        assert!(verdict.overall_success);
        assert!(verdict.per_case.is_empty());
        assert_eq!(store.get(9).unwrap().status(), SubmissionStatus::Completed);
    }

    #[tokio::test]
    async fn test_repeated_judging_is_deterministic() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store);
        let problem = Problem {
            test_cases: vec![
                TestCase::new("3\n", "6"),
                TestCase::new("5\n", "11"),
                TestCase::new("0\n", "0"),
            ],
            ..hello_problem()
        };
        let code = "read n\necho $((n * 2))";

        let first = judge.judge(&submission(10, "sh", code), &problem).await.unwrap();
        let second = judge.judge(&submission(11, "sh", code), &problem).await.unwrap();

        let flags = |v: &Verdict| v.per_case.iter().map(|o| o.passed).collect::<Vec<_>>();
        assert_eq!(flags(&first), vec![true, false, true]);
        assert_eq!(flags(&first), flags(&second));
    }

    #[tokio::test]
    async fn test_c_hello_world() {
        if std::process::Command::new("gcc")
            .arg("--version")
            .output()
            .is_err()
        {
            eprintln!("gcc not available, skipping");
            return;
        }

        let registry = LanguageRegistry::builtin().unwrap();
        let store = Arc::new(MemoryStore::new());
        let judge = Orchestrator::new(
            Arc::new(registry),
            Arc::new(SandboxedRunner::default()),
            store,
            JudgeConfig::default(),
        );
        let code = "#include <stdio.h>\nint main(void) { printf(\"Hello, World!\\n\"); return 0; }\n";

        let verdict = judge
            .judge(&submission(12, "C", code), &hello_problem())
            .await
            .unwrap();

        assert!(verdict.overall_success, "{:?}", verdict.error_message);
    }

    #[tokio::test]
    async fn test_validate_test_cases() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store.clone());

        let report = judge
            .validate_test_cases("echo 'Hello, World!'", "sh", &hello_problem())
            .await
            .unwrap();
        assert!(report.valid);
        assert_eq!(report.test_results.len(), 1);
        assert_eq!(report.test_results[0].test_case, 1);

        let report = judge
            .validate_test_cases("echo 'Hello'", "sh", &hello_problem())
            .await
            .unwrap();
        assert!(!report.valid);
        assert!(store.get(1).is_none());
    }

    #[tokio::test]
    async fn test_generate_test_cases_skips_failing_inputs() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store);
        let sample = "read n\n[ \"$n\" -ge 0 ] || exit 1\necho $((n * n))";
        let inputs = vec!["3\n".to_string(), "-1\n".to_string(), "12\n".to_string()];

        let generated = judge
            .generate_test_cases(sample, "sh", &hello_problem(), &inputs)
            .await
            .unwrap();

        assert_eq!(
            generated,
            vec![TestCase::new("3\n", "9"), TestCase::new("12\n", "144")]
        );

        // Generated cases validate against the same solution
        let problem = Problem {
            test_cases: generated,
            ..hello_problem()
        };
        let report = judge.validate_test_cases(sample, "sh", &problem).await.unwrap();
        assert!(report.valid);
    }

    #[tokio::test]
    async fn test_generate_with_broken_sample_yields_nothing() {
        let store = Arc::new(MemoryStore::new());
        let judge = orchestrator(store);

        let generated = judge
            .generate_test_cases("exit 1", "shc", &hello_problem(), &["1".to_string()])
            .await
            .unwrap();

        assert!(generated.is_empty());
    }
}
