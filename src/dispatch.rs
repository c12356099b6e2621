//! Inline or queued execution of judgings
//!
//! Both modes honor the same contract: the caller waits until a verdict or
//! an orchestration failure is available. Queued mode bounds how many
//! judgings run at once.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::core::{Problem, Submission, Verdict};
use crate::error::{JudgeError, OrchestrationError};
use crate::orchestrator::Orchestrator;

type JudgeReply = Result<Verdict, OrchestrationError>;

struct JudgeTask {
    submission: Submission,
    problem: Problem,
    reply: oneshot::Sender<JudgeReply>,
}

/// Handle to a queued judging
pub struct JudgeTicket {
    submission_id: i64,
    reply: oneshot::Receiver<JudgeReply>,
}

impl JudgeTicket {
    pub fn submission_id(&self) -> i64 {
        self.submission_id
    }

    /// Wait for the verdict
    pub async fn wait(self) -> JudgeReply {
        let submission_id = self.submission_id;
        self.reply.await.unwrap_or_else(|_| {
            Err(OrchestrationError {
                submission_id,
                source: JudgeError::QueueClosed,
            })
        })
    }
}

/// Channel-fed pool running at most `workers` judgings concurrently
#[derive(Clone)]
pub struct JudgeQueue {
    sender: mpsc::Sender<JudgeTask>,
}

impl JudgeQueue {
    /// Start the dispatch loop. It exits once every queue handle is dropped
    /// and in-flight judgings have finished.
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        workers: usize,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(dispatch_loop(orchestrator, receiver, workers.max(1)));
        (Self { sender }, handle)
    }

    /// Enqueue a judging; waits while the queue is full
    pub async fn submit(
        &self,
        submission: Submission,
        problem: Problem,
    ) -> Result<JudgeTicket, JudgeError> {
        let submission_id = submission.id;
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(JudgeTask {
                submission,
                problem,
                reply,
            })
            .await
            .map_err(|_| JudgeError::QueueClosed)?;
        debug!("Queued submission {}", submission_id);

        Ok(JudgeTicket {
            submission_id,
            reply: receiver,
        })
    }
}

async fn dispatch_loop(
    orchestrator: Arc<Orchestrator>,
    mut receiver: mpsc::Receiver<JudgeTask>,
    workers: usize,
) {
    info!("Judge queue started with {} worker(s)", workers);
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut in_flight = tokio::task::JoinSet::new();

    while let Some(task) = receiver.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("Judge queue semaphore closed: {}", e);
                break;
            }
        };
        let orchestrator = orchestrator.clone();

        in_flight.spawn(async move {
            let result = orchestrator.judge(&task.submission, &task.problem).await;
            drop(permit);
            if task.reply.send(result).is_err() {
                debug!(
                    "Result of submission {} dropped, caller went away",
                    task.submission.id
                );
            }
        });

        // Reap finished judgings so the set does not grow unbounded
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
    info!("Judge queue stopped");
}

/// How submissions are handed to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Judge on the caller's task
    #[default]
    Inline,
    /// Judge on the bounded queue
    Queued,
}

/// Entry point for callers that should not care which mode is active
pub enum Dispatcher {
    Inline(Arc<Orchestrator>),
    Queued(JudgeQueue),
}

impl Dispatcher {
    /// Must be called within a Tokio runtime when `mode` is `Queued`
    pub fn new(orchestrator: Arc<Orchestrator>, mode: ExecutionMode, workers: usize) -> Self {
        match mode {
            ExecutionMode::Inline => Dispatcher::Inline(orchestrator),
            ExecutionMode::Queued => {
                let (queue, _handle) = JudgeQueue::start(orchestrator, workers, workers * 4);
                Dispatcher::Queued(queue)
            }
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            Dispatcher::Inline(_) => ExecutionMode::Inline,
            Dispatcher::Queued(_) => ExecutionMode::Queued,
        }
    }

    /// Judge and wait for the result, whichever the mode
    pub async fn judge(&self, submission: Submission, problem: Problem) -> JudgeReply {
        match self {
            Dispatcher::Inline(orchestrator) => orchestrator.judge(&submission, &problem).await,
            Dispatcher::Queued(queue) => {
                let submission_id = submission.id;
                queue
                    .submit(submission, problem)
                    .await
                    .map_err(|source| OrchestrationError {
                        submission_id,
                        source,
                    })?
                    .wait()
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JudgeConfig;
    use crate::core::{ExecutionLimits, TestCase};
    use crate::error::JudgeResult;
    use crate::languages::LanguageRegistry;
    use crate::runner::{CommandSpec, ExitStatus, RunOutcome, Runner};
    use crate::store::{MemoryStore, SubmissionStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes stdin back after a short delay, tracking concurrency
    #[derive(Default)]
    struct SlowEcho {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Runner for SlowEcho {
        async fn execute(
            &self,
            _cmd: &CommandSpec,
            stdin: &[u8],
            _limits: &ExecutionLimits,
        ) -> JudgeResult<RunOutcome> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            Ok(RunOutcome {
                stdout: stdin.to_vec(),
                exit_status: ExitStatus::Exited(0),
                elapsed_ms: 50,
                peak_memory_kb: 0,
                peak_virtual_kb: 0,
                timed_out: false,
            })
        }
    }

    fn setup(runner: Arc<SlowEcho>) -> (Arc<Orchestrator>, Arc<MemoryStore>) {
        let registry = LanguageRegistry::from_toml_str(
            "[echo]\nsource_file = \"main.txt\"\nrun_command = \"cat\"\n",
        )
        .unwrap();
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(
            Arc::new(registry),
            runner,
            store.clone(),
            JudgeConfig::default(),
        );
        (Arc::new(orchestrator), store)
    }

    fn job(id: i64) -> (Submission, Problem) {
        let submission = Submission {
            id,
            problem_id: 1,
            code: String::new(),
            language: "echo".to_string(),
        };
        let problem = Problem {
            id: 1,
            test_cases: vec![TestCase::new(format!("{}", id), format!("{}", id))],
            ..Default::default()
        };
        (submission, problem)
    }

    #[tokio::test]
    async fn test_queue_bounds_concurrency() {
        let runner = Arc::new(SlowEcho::default());
        let (orchestrator, store) = setup(runner.clone());
        let (queue, _handle) = JudgeQueue::start(orchestrator, 2, 16);

        let mut tickets = Vec::new();
        for id in 1..=6 {
            let (submission, problem) = job(id);
            tickets.push(queue.submit(submission, problem).await.unwrap());
        }
        for ticket in tickets {
            let id = ticket.submission_id();
            let verdict = ticket.wait().await.unwrap();
            assert!(verdict.overall_success);
            assert_eq!(store.get(id).unwrap().status(), SubmissionStatus::Completed);
        }

        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_modes_give_same_verdict() {
        let (orchestrator, _store) = setup(Arc::new(SlowEcho::default()));
        let inline = Dispatcher::new(orchestrator.clone(), ExecutionMode::Inline, 1);
        let queued = Dispatcher::new(orchestrator, ExecutionMode::Queued, 1);
        assert_eq!(queued.mode(), ExecutionMode::Queued);

        let (submission, problem) = job(1);
        let a = inline.judge(submission, problem).await.unwrap();
        let (submission, problem) = job(2);
        let b = queued.judge(submission, problem).await.unwrap();

        assert_eq!(a.overall_success, b.overall_success);
        assert_eq!(a.per_case.len(), b.per_case.len());
    }

    #[tokio::test]
    async fn test_queued_failure_is_returned() {
        let (orchestrator, store) = setup(Arc::new(SlowEcho::default()));
        let queued = Dispatcher::new(orchestrator, ExecutionMode::Queued, 1);
        let (mut submission, problem) = job(3);
        submission.language = "fortran".to_string();

        let err = queued.judge(submission, problem).await.unwrap_err();
        assert_eq!(err.submission_id, 3);
        assert_eq!(store.get(3).unwrap().status(), SubmissionStatus::Failed);
    }

    #[test]
    fn test_execution_mode_parsing() {
        let mode: ExecutionMode = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(mode, ExecutionMode::Queued);
        assert_eq!(ExecutionMode::default(), ExecutionMode::Inline);
    }
}
