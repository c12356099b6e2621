//! Jobs consumed by the queue worker and the results it publishes

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::core::{ExecutionLimits, Problem, Submission, TestCase, TestCaseReport, VerdictReport};
use crate::dispatch::Dispatcher;
use crate::error::OrchestrationError;
use crate::orchestrator::Orchestrator;
use crate::scoring;
use crate::store::SubmissionStatus;

/// Worker job enum - represents different types of jobs the worker can process
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "job_type")]
pub enum WorkerJob {
    /// Judge a user submission
    #[serde(rename = "judge")]
    Judge(JudgeJob),
    /// Check a sample solution against a problem's test cases
    #[serde(rename = "validate")]
    Validate(ValidateJob),
    /// Derive expected outputs from a sample solution
    #[serde(rename = "generate")]
    Generate(GenerateJob),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JudgeJob {
    pub submission_id: i64,
    pub code: String,
    pub language: String,
    pub problem: Problem,
}

impl JudgeJob {
    pub fn submission(&self) -> Submission {
        Submission {
            id: self.submission_id,
            problem_id: self.problem.id,
            code: self.code.clone(),
            language: self.language.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateJob {
    pub problem: Problem,
    pub sample_solution: String,
    pub language: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateJob {
    pub problem: Problem,
    pub sample_solution: String,
    pub language: String,
    pub inputs: Vec<String>,
}

/// Stored under `judge:result:{submission_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeJobResult {
    pub submission_id: i64,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VerdictReport>,
    /// Infrastructure failure message, for `failed` submissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JudgeJobResult {
    pub fn completed(submission_id: i64, verdict: VerdictReport, score: u32) -> Self {
        Self {
            submission_id,
            status: SubmissionStatus::Completed,
            score: Some(score),
            verdict: Some(verdict),
            error_message: None,
        }
    }

    pub fn failed(submission_id: i64, message: impl Into<String>) -> Self {
        Self {
            submission_id,
            status: SubmissionStatus::Failed,
            score: None,
            verdict: None,
            error_message: Some(message.into()),
        }
    }
}

/// Stored under `validate:result:{problem_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateJobResult {
    pub problem_id: i64,
    pub valid: bool,
    pub test_results: Vec<TestCaseReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Stored under `generate:result:{problem_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateJobResult {
    pub problem_id: i64,
    pub test_cases: Vec<TestCase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Process a judge job. The submission store has already recorded the
/// outcome; the returned result is what was recorded.
pub async fn process_judge_job(
    dispatcher: &Dispatcher,
    job: JudgeJob,
    defaults: &ExecutionLimits,
) -> JudgeJobResult {
    let submission = job.submission();
    let submission_id = submission.id;

    match dispatcher.judge(submission, job.problem.clone()).await {
        Ok(verdict) => {
            let score = scoring::score_for(&verdict, &job.problem, defaults);
            JudgeJobResult::completed(submission_id, verdict.report(), score)
        }
        Err(OrchestrationError { source, .. }) => {
            JudgeJobResult::failed(submission_id, source.to_string())
        }
    }
}

/// Process a validate job; errors are reported in the result
pub async fn process_validate_job(
    orchestrator: &Orchestrator,
    job: &ValidateJob,
) -> ValidateJobResult {
    let problem_id = job.problem.id;
    info!("Validating test cases of problem {}", problem_id);

    match orchestrator
        .validate_test_cases(&job.sample_solution, &job.language, &job.problem)
        .await
    {
        Ok(report) => ValidateJobResult {
            problem_id,
            valid: report.valid,
            test_results: report.test_results,
            error_message: None,
        },
        Err(e) => {
            error!("Validation of problem {} failed: {}", problem_id, e);
            ValidateJobResult {
                problem_id,
                valid: false,
                test_results: Vec::new(),
                error_message: Some(e.to_string()),
            }
        }
    }
}

/// Process a generate job; errors are reported in the result
pub async fn process_generate_job(
    orchestrator: &Orchestrator,
    job: &GenerateJob,
) -> GenerateJobResult {
    let problem_id = job.problem.id;
    info!(
        "Generating test cases for problem {} from {} input(s)",
        problem_id,
        job.inputs.len()
    );

    match orchestrator
        .generate_test_cases(&job.sample_solution, &job.language, &job.problem, &job.inputs)
        .await
    {
        Ok(test_cases) => GenerateJobResult {
            problem_id,
            test_cases,
            error_message: None,
        },
        Err(e) => {
            error!("Test case generation for problem {} failed: {}", problem_id, e);
            GenerateJobResult {
                problem_id,
                test_cases: Vec::new(),
                error_message: Some(e.to_string()),
            }
        }
    }
}
