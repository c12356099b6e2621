//! Redis Manager - Centralized Redis connection and operations
//!
//! This module handles all Redis-related operations including:
//! - Job queue operations (BLPOP)
//! - Result storage and publishing
//! - Submission status and progress, as a `SubmissionStore`

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::core::VerdictReport;
use crate::error::{JudgeError, JudgeResult};
use crate::jobs::{GenerateJobResult, JudgeJobResult, ValidateJobResult, WorkerJob};
use crate::store::{SubmissionStatus, SubmissionStore};

/// Redis key constants
pub mod keys {
    /// Judge job queue key
    pub const JUDGE_QUEUE: &str = "judge:queue";

    /// Judge result key prefix (for polling)
    pub const JUDGE_RESULT_PREFIX: &str = "judge:result:";

    /// Judge result channel (for pub/sub)
    pub const JUDGE_RESULT_CHANNEL: &str = "judge:results";

    /// Submission status key prefix
    pub const JUDGE_STATUS_PREFIX: &str = "judge:status:";

    /// Validation result key prefix (for polling)
    pub const VALIDATE_RESULT_PREFIX: &str = "validate:result:";

    /// Generation result key prefix (for polling)
    pub const GENERATE_RESULT_PREFIX: &str = "generate:result:";

    /// Judge progress channel (for pub/sub)
    pub const JUDGE_PROGRESS_CHANNEL: &str = "judge:progress";
}

const RESULT_EXPIRY_SECS: u64 = 3600; // 1 hour
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Centralized Redis manager for all Redis operations
pub struct RedisManager {
    client: redis::Client,
    /// Dedicated to BLPOP, which would otherwise stall every other command
    queue_conn: Mutex<MultiplexedConnection>,
    conn: RwLock<MultiplexedConnection>,
}

impl RedisManager {
    /// Connect to Redis, retrying until it is reachable
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let queue_conn = get_connection_with_retry(&client).await?;
        let conn = get_connection_with_retry(&client).await?;
        info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            client,
            queue_conn: Mutex::new(queue_conn),
            conn: RwLock::new(conn),
        })
    }

    /// Block and wait for the next job from the queue.
    ///
    /// This uses BLPOP to efficiently wait for jobs without polling.
    /// Automatically reconnects on connection failure; malformed jobs are
    /// logged and skipped.
    pub async fn pop_job(&self) -> Result<WorkerJob> {
        let mut conn = self.queue_conn.lock().await;
        loop {
            let result: Option<(String, String)> =
                match conn.blpop(keys::JUDGE_QUEUE, 0.0).await {
                    Ok(res) => res,
                    Err(e) => {
                        warn!("Redis BLPOP failed: {}. Reconnecting...", e);
                        *conn = get_connection_with_retry(&self.client).await?;
                        continue;
                    }
                };

            if let Some((_, job_data)) = result {
                match serde_json::from_str::<WorkerJob>(&job_data) {
                    Ok(job) => return Ok(job),
                    Err(e) => {
                        warn!("Failed to parse job data: {}. Data: {}", e, job_data);
                        continue;
                    }
                }
            }
        }
    }

    /// Store a judge result and publish it to subscribers
    pub async fn store_judge_result(&self, result: &JudgeJobResult) -> Result<()> {
        self.store_result(
            &format!("{}{}", keys::JUDGE_RESULT_PREFIX, result.submission_id),
            Some(keys::JUDGE_RESULT_CHANNEL),
            result,
        )
        .await
    }

    pub async fn store_validate_result(&self, result: &ValidateJobResult) -> Result<()> {
        self.store_result(
            &format!("{}{}", keys::VALIDATE_RESULT_PREFIX, result.problem_id),
            None,
            result,
        )
        .await
    }

    pub async fn store_generate_result(&self, result: &GenerateJobResult) -> Result<()> {
        self.store_result(
            &format!("{}{}", keys::GENERATE_RESULT_PREFIX, result.problem_id),
            None,
            result,
        )
        .await
    }

    /// Publish judge progress update
    pub async fn publish_progress(&self, submission_id: i64, current: usize, total: usize) -> Result<()> {
        let progress = serde_json::json!({
            "submission_id": submission_id,
            "percentage": progress_percentage(current, total),
        });
        let json = serde_json::to_string(&progress)?;

        let mut conn = self.conn.read().await.clone();
        conn.publish::<_, _, ()>(keys::JUDGE_PROGRESS_CHANNEL, &json)
            .await
            .context("Failed to publish progress")?;
        Ok(())
    }

    /// Internal helper to store a value with expiry and optionally publish it
    async fn store_result<T: Serialize>(
        &self,
        key: &str,
        channel: Option<&str>,
        result: &T,
    ) -> Result<()> {
        let json = serde_json::to_string(result)?;
        self.set_with_retry(key, &json).await?;

        // Publish to channel (ignore errors as there may be no subscribers)
        if let Some(chan) = channel {
            let mut conn = self.conn.read().await.clone();
            let _ = conn.publish::<_, _, ()>(chan, &json).await;
        }

        Ok(())
    }

    async fn set_with_retry(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.read().await.clone();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, value, RESULT_EXPIRY_SECS)
            .await
        {
            warn!("Failed to store {}: {}. Reconnecting...", key, e);
            let mut conn = self.reconnect().await?;
            conn.set_ex::<_, _, ()>(key, value, RESULT_EXPIRY_SECS)
                .await
                .with_context(|| format!("Failed to store {}", key))?;
        }
        Ok(())
    }

    /// Replace the shared connection, returning a handle to the new one
    async fn reconnect(&self) -> Result<MultiplexedConnection> {
        let fresh = get_connection_with_retry(&self.client).await?;
        *self.conn.write().await = fresh.clone();
        Ok(fresh)
    }
}

#[async_trait]
impl SubmissionStore for RedisManager {
    async fn set_status(&self, submission_id: i64, status: SubmissionStatus) -> JudgeResult<()> {
        let key = format!("{}{}", keys::JUDGE_STATUS_PREFIX, submission_id);
        self.set_with_retry(&key, &status.to_string())
            .await
            .map_err(store_error)
    }

    async fn save_verdict(
        &self,
        submission_id: i64,
        verdict: &VerdictReport,
        score: u32,
    ) -> JudgeResult<()> {
        let result = JudgeJobResult::completed(submission_id, verdict.clone(), score);
        self.store_judge_result(&result).await.map_err(store_error)
    }

    async fn save_failure(&self, submission_id: i64, message: &str) -> JudgeResult<()> {
        let result = JudgeJobResult::failed(submission_id, message);
        self.store_judge_result(&result).await.map_err(store_error)
    }

    async fn progress(&self, submission_id: i64, completed: usize, total: usize) {
        // Progress updates are non-critical
        if let Err(e) = self.publish_progress(submission_id, completed, total).await {
            warn!("Progress update for submission {} dropped: {:#}", submission_id, e);
        }
    }
}

fn store_error(e: anyhow::Error) -> JudgeError {
    JudgeError::Store(format!("{:#}", e))
}

fn progress_percentage(current: usize, total: usize) -> u32 {
    if total > 0 {
        ((current as f32 / total as f32) * 100.0) as u32
    } else {
        0
    }
}

/// Get a Redis connection with retry logic
async fn get_connection_with_retry(client: &redis::Client) -> Result<MultiplexedConnection> {
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in {} seconds...",
                    e,
                    RECONNECT_DELAY.as_secs()
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
