//! Submission lifecycle state and the persistence seam
//!
//! The engine does not own submission records. It reports status changes,
//! verdicts and progress through `SubmissionStore`, implemented by the Redis
//! worker in production and by `MemoryStore` in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::core::VerdictReport;
use crate::error::{JudgeError, JudgeResult};

/// `pending -> running -> {completed, failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Running,
    /// A verdict was produced, whether or not it passed
    Completed,
    /// Infrastructure failure, no verdict
    Failed,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Failed)
    }

    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        matches!(
            (self, next),
            (SubmissionStatus::Pending, SubmissionStatus::Running)
                | (SubmissionStatus::Running, SubmissionStatus::Completed)
                | (SubmissionStatus::Running, SubmissionStatus::Failed)
        )
    }

    pub fn transition(self, next: SubmissionStatus) -> JudgeResult<SubmissionStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(JudgeError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Running => "running",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Where the orchestrator persists what happens to a submission
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn set_status(&self, submission_id: i64, status: SubmissionStatus) -> JudgeResult<()>;

    async fn save_verdict(
        &self,
        submission_id: i64,
        verdict: &VerdictReport,
        score: u32,
    ) -> JudgeResult<()>;

    async fn save_failure(&self, submission_id: i64, message: &str) -> JudgeResult<()>;

    /// Best-effort progress notification; failures are ignored
    async fn progress(&self, _submission_id: i64, _completed: usize, _total: usize) {}
}

/// What `MemoryStore` knows about one submission
#[derive(Debug, Clone, Default)]
pub struct StoredSubmission {
    /// Every status the submission went through, in order
    pub history: Vec<SubmissionStatus>,
    pub verdict: Option<VerdictReport>,
    pub score: Option<u32>,
    pub failure: Option<String>,
    pub progress: Vec<(usize, usize)>,
}

impl StoredSubmission {
    pub fn status(&self) -> SubmissionStatus {
        self.history
            .last()
            .copied()
            .unwrap_or(SubmissionStatus::Pending)
    }
}

/// In-process store that enforces the lifecycle state machine
#[derive(Debug, Default)]
pub struct MemoryStore {
    submissions: Mutex<HashMap<i64, StoredSubmission>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, submission_id: i64) -> Option<StoredSubmission> {
        self.lock().ok()?.get(&submission_id).cloned()
    }

    fn lock(&self) -> JudgeResult<std::sync::MutexGuard<'_, HashMap<i64, StoredSubmission>>> {
        self.submissions
            .lock()
            .map_err(|_| JudgeError::Store("submission store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn set_status(&self, submission_id: i64, status: SubmissionStatus) -> JudgeResult<()> {
        let mut submissions = self.lock()?;
        let entry = submissions.entry(submission_id).or_insert_with(|| StoredSubmission {
            history: vec![SubmissionStatus::Pending],
            ..Default::default()
        });
        entry.status().transition(status)?;
        entry.history.push(status);
        Ok(())
    }

    async fn save_verdict(
        &self,
        submission_id: i64,
        verdict: &VerdictReport,
        score: u32,
    ) -> JudgeResult<()> {
        let mut submissions = self.lock()?;
        let entry = submissions.entry(submission_id).or_default();
        entry.verdict = Some(verdict.clone());
        entry.score = Some(score);
        Ok(())
    }

    async fn save_failure(&self, submission_id: i64, message: &str) -> JudgeResult<()> {
        let mut submissions = self.lock()?;
        submissions.entry(submission_id).or_default().failure = Some(message.to_string());
        Ok(())
    }

    async fn progress(&self, submission_id: i64, completed: usize, total: usize) {
        if let Ok(mut submissions) = self.lock() {
            submissions
                .entry(submission_id)
                .or_default()
                .progress
                .push((completed, total));
        }
    }
}
