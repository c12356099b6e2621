//! Problem and submission data handed to the engine by the outer application

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{JudgeError, JudgeResult};

/// Default time limit when a problem omits one (ms)
pub const DEFAULT_TIME_LIMIT_MS: u32 = 1000;
/// Default memory limit when a problem omits one (MB)
pub const DEFAULT_MEMORY_LIMIT_MB: u32 = 128;

/// Resource limits for one execution. Both values are > 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub time_limit_ms: u32,
    pub memory_limit_mb: u32,
}

impl ExecutionLimits {
    pub fn new(time_limit_ms: u32, memory_limit_mb: u32) -> JudgeResult<Self> {
        if time_limit_ms == 0 || memory_limit_mb == 0 {
            return Err(JudgeError::InvalidLimits(format!(
                "time_limit_ms={} memory_limit_mb={}",
                time_limit_ms, memory_limit_mb
            )));
        }
        Ok(Self {
            time_limit_ms,
            memory_limit_mb,
        })
    }

    /// Wall-clock ceiling: the time limit rounded up to whole seconds
    pub fn wall_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs())
    }

    pub fn timeout_secs(&self) -> u64 {
        (self.time_limit_ms as u64).div_ceil(1000)
    }

    /// Address-space ceiling in KB
    pub fn memory_limit_kb(&self) -> u64 {
        self.memory_limit_mb as u64 * 1024
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            time_limit_ms: DEFAULT_TIME_LIMIT_MS,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
        }
    }
}

/// One (input, expected output) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub input: String,
    #[serde(rename = "output", alias = "expected_output")]
    pub expected_output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// Difficulty tier; anything unrecognised scores like `easy`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Problem definition as stored by the outer application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub time_limit_ms: Option<u32>,
    #[serde(default)]
    pub memory_limit_mb: Option<u32>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl Problem {
    /// Limits with defaults applied; a zero value counts as omitted
    pub fn limits(&self, defaults: &ExecutionLimits) -> ExecutionLimits {
        ExecutionLimits {
            time_limit_ms: self
                .time_limit_ms
                .filter(|&t| t > 0)
                .unwrap_or(defaults.time_limit_ms),
            memory_limit_mb: self
                .memory_limit_mb
                .filter(|&m| m > 0)
                .unwrap_or(defaults.memory_limit_mb),
        }
    }
}

/// One candidate's code for one problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(alias = "submission_id")]
    pub id: i64,
    pub problem_id: i64,
    pub code: String,
    pub language: String,
}
