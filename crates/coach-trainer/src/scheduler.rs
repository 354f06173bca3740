//! Spaced-repetition scheduling — pure functions only
//! (no database or clock dependencies; callers pass `today` in)
//!
//! A leveled scheduler: each problem sits on a mastery ladder from 0 to
//! 8, and the ladder rung alone determines the review interval.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Review interval in days per mastery level.
pub const REVIEW_INTERVALS: [i64; 9] = [0, 1, 3, 7, 14, 30, 90, 180, 365];

pub const MAX_MASTERY: i32 = 8;

/// Mastery level at or above which a problem counts as mastered in
/// queue summaries.
pub const MASTERED_LEVEL: i32 = 5;

/// Interval-to-date mapping: a pure function of the mastery level.
pub fn interval_days(mastery_level: i32) -> i64 {
    REVIEW_INTERVALS[mastery_level.clamp(0, MAX_MASTERY) as usize]
}

/// Persistent per-problem scheduling state. Created on first recorded
/// attempt, mutated on every attempt after that, reset only explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemStat {
    pub problem_id: String,
    pub attempts: i64,
    pub solved: bool,
    pub first_try_solved: bool,
    /// 0..=8, clamped after every update
    pub mastery_level: i32,
    pub consecutive_correct: i64,
    pub next_review_date: Option<NaiveDate>,
    pub last_interval_days: i64,
    pub last_attempt: Option<NaiveDateTime>,
}

impl ProblemStat {
    pub fn new(problem_id: &str) -> Self {
        Self {
            problem_id: problem_id.to_string(),
            attempts: 0,
            solved: false,
            first_try_solved: false,
            mastery_level: 0,
            consecutive_correct: 0,
            next_review_date: None,
            last_interval_days: 0,
            last_attempt: None,
        }
    }
}

/// Fold one attempt outcome into the stat and reschedule it. Pure in
/// dates: callers pass `today`, and the wall-clock `last_attempt` stamp
/// is the storage layer's job.
pub fn apply_outcome(stat: &mut ProblemStat, is_correct: bool, today: NaiveDate) {
    let first_attempt_ever = stat.attempts == 0;
    stat.attempts += 1;

    if is_correct {
        stat.consecutive_correct += 1;
        // First-try solves jump two rungs instead of one.
        let step = if first_attempt_ever { 2 } else { 1 };
        stat.mastery_level = (stat.mastery_level + step).min(MAX_MASTERY);
        stat.solved = true;
        if first_attempt_ever {
            stat.first_try_solved = true;
        }
    } else {
        stat.consecutive_correct = 0;
        stat.mastery_level = (stat.mastery_level - 1).max(0);
    }

    let interval = interval_days(stat.mastery_level);
    stat.last_interval_days = interval;
    stat.next_review_date = Some(today + Duration::days(interval));
}

/// A problem is due when its review date has arrived, or when it sits at
/// mastery 0 (unseen or freshly failed), independent of any stored date.
pub fn is_due(stat: &ProblemStat, today: NaiveDate) -> bool {
    if stat.mastery_level == 0 {
        return true;
    }
    stat.next_review_date.map_or(true, |date| date <= today)
}

pub fn days_overdue(stat: &ProblemStat, today: NaiveDate) -> i64 {
    stat.next_review_date
        .map_or(0, |date| (today - date).num_days().max(0))
}

/// Priority score for ranking the due queue, higher first. The jitter
/// term is a tie-break against monotony, not part of the contract;
/// callers wanting reproducible queues pass a seeded RNG.
pub fn priority(stat: &ProblemStat, today: NaiveDate, rng: &mut impl Rng) -> i64 {
    let mut score = 100;

    score += days_overdue(stat, today) * 15;

    if !stat.solved || stat.mastery_level == 0 {
        score += 50;
    }

    score += 10 * (stat.attempts - stat.consecutive_correct).max(0);
    score -= 10 * i64::from(stat.mastery_level);

    score + rng.gen_range(-5..=5)
}

/// Derived queue entry — computed per request, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub problem_id: String,
    pub priority: i64,
    pub is_due: bool,
    pub days_overdue: i64,
    pub mastery_level: i32,
    pub attempts: i64,
}
