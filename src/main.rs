use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{error, info};

use code_judge::config::JudgeConfig;
use code_judge::dispatch::{Dispatcher, ExecutionMode};
use code_judge::jobs::{process_generate_job, process_judge_job, process_validate_job, WorkerJob};
use code_judge::languages::LanguageRegistry;
use code_judge::orchestrator::Orchestrator;
use code_judge::redis_manager::RedisManager;
use code_judge::runner::SandboxedRunner;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("code_judge=info".parse()?)
                .add_directive("judge_worker=info".parse()?),
        )
        .init();

    let config = JudgeConfig::from_env().context("Invalid judge configuration")?;

    let registry = match &config.languages_config {
        Some(path) => LanguageRegistry::from_file(path)?,
        None => LanguageRegistry::builtin()?,
    };
    info!(
        "Loaded language configurations: {}",
        registry.supported_languages().join(", ")
    );

    info!("Starting Judge Worker...");

    let redis = Arc::new(RedisManager::connect(&config.redis_url).await?);

    let mut runner = SandboxedRunner::new(config.max_output_bytes);
    if let Some(root) = &config.work_root {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create work root {}", root.display()))?;
        runner = runner.with_scratch_root(root);
    }

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(registry),
        Arc::new(runner),
        redis.clone(),
        config.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        orchestrator.clone(),
        ExecutionMode::Queued,
        config.workers,
    ));

    // Bounds how many popped jobs may be waiting or running at once
    let in_flight = Arc::new(Semaphore::new(config.workers * 2));
    let defaults = config.default_limits();

    info!("Waiting for jobs ({} workers)...", config.workers);

    loop {
        let permit = in_flight
            .clone()
            .acquire_owned()
            .await
            .context("Job semaphore closed")?;
        let job = redis.pop_job().await?;

        match job {
            WorkerJob::Judge(job) => {
                info!(
                    "Received judge job: submission_id={}, language={}",
                    job.submission_id, job.language
                );
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let result = process_judge_job(&dispatcher, job, &defaults).await;
                    info!(
                        "Judge job finished: submission_id={}, status={}, score={:?}",
                        result.submission_id, result.status, result.score
                    );
                    drop(permit);
                });
            }
            WorkerJob::Validate(job) => {
                info!(
                    "Received validate job: problem_id={}, testcases={}",
                    job.problem.id,
                    job.problem.test_cases.len()
                );
                let orchestrator = orchestrator.clone();
                let redis = redis.clone();
                tokio::spawn(async move {
                    let result = process_validate_job(&orchestrator, &job).await;
                    if let Err(e) = redis.store_validate_result(&result).await {
                        error!(
                            "Failed to store validation result for problem {}: {:#}",
                            result.problem_id, e
                        );
                    }
                    info!(
                        "Validate job completed: problem_id={}, valid={}",
                        result.problem_id, result.valid
                    );
                    drop(permit);
                });
            }
            WorkerJob::Generate(job) => {
                info!(
                    "Received generate job: problem_id={}, inputs={}",
                    job.problem.id,
                    job.inputs.len()
                );
                let orchestrator = orchestrator.clone();
                let redis = redis.clone();
                tokio::spawn(async move {
                    let result = process_generate_job(&orchestrator, &job).await;
                    if let Err(e) = redis.store_generate_result(&result).await {
                        error!(
                            "Failed to store generated test cases for problem {}: {:#}",
                            result.problem_id, e
                        );
                    }
                    info!(
                        "Generate job completed: problem_id={}, test_cases={}",
                        result.problem_id,
                        result.test_cases.len()
                    );
                    drop(permit);
                });
            }
        }
    }
}
