//! Code judging engine
//!
//! Compiles and runs untrusted submissions in C, JavaScript or PHP (or any
//! language added to the registry) against a problem's test cases under
//! time and memory ceilings, and scores the resulting verdict.
//!
//! The boundary is [`Orchestrator::judge`] and [`scoring::score_for`].

pub mod checker;
pub mod compiler;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod judger;
pub mod languages;
pub mod orchestrator;
pub mod redis_manager;
pub mod runner;
pub mod scoring;
pub mod store;
pub mod workspace;

pub use crate::config::JudgeConfig;
pub use crate::core::{
    Difficulty, ExecutionLimits, ExecutionOutcome, FailureReason, Problem, Submission, TestCase,
    Verdict, VerdictReport,
};
pub use crate::error::{JudgeError, JudgeResult, OrchestrationError};
pub use crate::languages::{LanguageConfig, LanguageRegistry};
pub use crate::orchestrator::{Orchestrator, ValidationReport};
pub use crate::scoring::{score, score_for};
pub use crate::store::{SubmissionStatus, SubmissionStore};
