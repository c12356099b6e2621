//! Plain data model of the judging engine

pub mod problem;
pub mod verdict;

pub use problem::{
    Difficulty, ExecutionLimits, Problem, Submission, TestCase, DEFAULT_MEMORY_LIMIT_MB,
    DEFAULT_TIME_LIMIT_MS,
};
pub use verdict::{
    ExecutionOutcome, FailureReason, TestCaseReport, Verdict, VerdictBuilder, VerdictReport,
};
