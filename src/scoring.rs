//! Scoring: a pure function of a verdict, the problem's difficulty and its
//! configured limits, plus per-user aggregation.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::core::{
    Difficulty, ExecutionLimits, Problem, Verdict, DEFAULT_MEMORY_LIMIT_MB, DEFAULT_TIME_LIMIT_MS,
};

pub fn base_score(difficulty: Difficulty) -> u32 {
    match difficulty {
        Difficulty::Easy => 100,
        Difficulty::Medium => 200,
        Difficulty::Hard => 300,
        Difficulty::Unknown => 100,
    }
}

/// `1 - min(0.5, used / limit * 0.5)`, in [0.5, 1.0]. Zero usage is 1.0.
fn efficiency(used: u64, limit: u64) -> f64 {
    let ratio = used as f64 / limit as f64;
    1.0 - (ratio * 0.5).min(0.5)
}

/// Mean of time and memory efficiency, in [0.5, 1.0]
pub fn performance_multiplier(elapsed_ms: u64, peak_memory_kb: u64, limits: &ExecutionLimits) -> f64 {
    let time_limit_ms = match limits.time_limit_ms {
        0 => DEFAULT_TIME_LIMIT_MS,
        t => t,
    };
    let memory_limit_mb = match limits.memory_limit_mb {
        0 => DEFAULT_MEMORY_LIMIT_MB,
        m => m,
    };

    let time_efficiency = efficiency(elapsed_ms, time_limit_ms as u64);
    let memory_efficiency = efficiency(peak_memory_kb, memory_limit_mb as u64 * 1024);
    (time_efficiency + memory_efficiency) / 2.0
}

/// 0 for a failed verdict, else `round(base × multiplier)`
pub fn score(verdict: &Verdict, difficulty: Difficulty, limits: &ExecutionLimits) -> u32 {
    if !verdict.overall_success {
        return 0;
    }
    let multiplier = performance_multiplier(
        verdict.worst_elapsed_ms,
        verdict.worst_peak_memory_kb,
        limits,
    );
    (base_score(difficulty) as f64 * multiplier).round() as u32
}

/// Score against the problem's own limits (before any per-language bonus)
pub fn score_for(verdict: &Verdict, problem: &Problem, defaults: &ExecutionLimits) -> u32 {
    score(verdict, problem.difficulty, &problem.limits(defaults))
}

/// Sum over distinct problems of the best score for each
pub fn best_per_problem_total<I>(scores: I) -> u32
where
    I: IntoIterator<Item = (i64, u32)>,
{
    let mut best: HashMap<i64, u32> = HashMap::new();
    for (problem_id, score) in scores {
        let entry = best.entry(problem_id).or_insert(score);
        *entry = (*entry).max(score);
    }
    best.values().sum()
}

#[derive(Debug, Default)]
struct Board {
    /// (problem_id, score) of every completed submission, per user
    scores: HashMap<i64, Vec<(i64, u32)>>,
    totals: HashMap<i64, u32>,
}

impl Board {
    fn total(&mut self, user_id: i64) -> u32 {
        if let Some(&total) = self.totals.get(&user_id) {
            return total;
        }
        let total = self
            .scores
            .get(&user_id)
            .map(|scores| best_per_problem_total(scores.iter().copied()))
            .unwrap_or(0);
        self.totals.insert(user_id, total);
        total
    }
}

/// Cached per-user totals.
///
/// A user's cached total is dropped only when a new completed submission is
/// recorded for that user.
#[derive(Debug, Default)]
pub struct ScoreBoard {
    board: Mutex<Board>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, user_id: i64, problem_id: i64, score: u32) {
        let mut board = self.board.lock().unwrap_or_else(|e| e.into_inner());
        board
            .scores
            .entry(user_id)
            .or_default()
            .push((problem_id, score));
        board.totals.remove(&user_id);
        debug!(
            "Recorded score {} for user {} on problem {}",
            score, user_id, problem_id
        );
    }

    pub fn total(&self, user_id: i64) -> u32 {
        self.board
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total(user_id)
    }

    /// 1-based rank: one more than the number of users with a higher total
    pub fn ranking(&self, user_id: i64) -> usize {
        let mut board = self.board.lock().unwrap_or_else(|e| e.into_inner());
        let users: Vec<i64> = board.scores.keys().copied().collect();
        let own = board.total(user_id);
        users
            .into_iter()
            .filter(|&other| board.total(other) > own)
            .count()
            + 1
    }
}
