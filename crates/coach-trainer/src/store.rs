//! SQLite-backed statistics store.
//!
//! One attempt touches several derived aggregates (global totals,
//! per-problem scheduler state, per-category and per-day counters), so
//! `record_attempt` commits them as a single transaction. The store owns
//! its one `Connection` and takes `&mut self` on writes, which serializes
//! writers without further locking.

use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use crate::error::TrainerError;
use crate::scheduler::{
    self, apply_outcome, ProblemStat, ReviewQueueItem, MASTERED_LEVEL,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS training_stats (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    total_problems INTEGER NOT NULL DEFAULT 0,
    total_correct INTEGER NOT NULL DEFAULT 0,
    total_attempts INTEGER NOT NULL DEFAULT 0,
    current_streak INTEGER NOT NULL DEFAULT 0,
    best_streak INTEGER NOT NULL DEFAULT 0,
    last_update TEXT
);
INSERT OR IGNORE INTO training_stats (id) VALUES (1);

CREATE TABLE IF NOT EXISTS problem_stats (
    problem_id TEXT PRIMARY KEY,
    attempts INTEGER NOT NULL DEFAULT 0,
    solved INTEGER NOT NULL DEFAULT 0,
    first_try_solved INTEGER NOT NULL DEFAULT 0,
    mastery_level INTEGER NOT NULL DEFAULT 0,
    consecutive_correct INTEGER NOT NULL DEFAULT 0,
    next_review_date TEXT,
    last_interval_days INTEGER NOT NULL DEFAULT 0,
    last_attempt TEXT
);

CREATE TABLE IF NOT EXISTS category_stats (
    category_type TEXT NOT NULL,
    category_value TEXT NOT NULL,
    total INTEGER NOT NULL DEFAULT 0,
    correct INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (category_type, category_value)
);

CREATE TABLE IF NOT EXISTS daily_stats (
    date TEXT PRIMARY KEY,
    problems INTEGER NOT NULL DEFAULT 0,
    correct INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0
);
"#;

/// One attempt to record. The optional categories come from the
/// problem's PositionAnalysis record (error type, player color).
#[derive(Debug, Clone)]
pub struct Attempt {
    pub problem_id: String,
    pub is_correct: bool,
    pub error_type: Option<String>,
    pub player_color: Option<String>,
}

/// Global counters maintained across all attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingTotals {
    pub total_problems: i64,
    pub total_correct: i64,
    pub total_attempts: i64,
    pub current_streak: i64,
    pub best_streak: i64,
}

/// The due queue plus its summary counters.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueue {
    pub due: Vec<ReviewQueueItem>,
    pub total_problems: usize,
    pub due_count: usize,
    pub mastered_count: usize,
    pub new_count: usize,
}

pub struct StatsStore {
    conn: Connection,
}

impl StatsStore {
    pub fn open(path: &str) -> Result<Self, TrainerError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, TrainerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Record one attempt and return the updated problem state.
    ///
    /// The whole update — totals, streaks, scheduler state, category and
    /// daily counters — commits atomically; on any failure the
    /// transaction rolls back and nothing is observable.
    pub fn record_attempt(
        &mut self,
        attempt: &Attempt,
        today: NaiveDate,
    ) -> Result<ProblemStat, TrainerError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO problem_stats (problem_id) VALUES (?1)",
            params![attempt.problem_id],
        )?;

        let mut stat = tx
            .query_row(
                "SELECT problem_id, attempts, solved, first_try_solved, mastery_level,
                        consecutive_correct, next_review_date, last_interval_days, last_attempt
                 FROM problem_stats WHERE problem_id = ?1",
                params![attempt.problem_id],
                map_problem_row,
            )?
            .into_stat()?;
        let was_solved = stat.solved;

        apply_outcome(&mut stat, attempt.is_correct, today);
        // Wall-clock stamp, truncated to seconds to survive the TEXT
        // round-trip.
        let now = Utc::now().naive_utc();
        stat.last_attempt = Some(now.with_nanosecond(0).unwrap_or(now));

        tx.execute(
            "UPDATE problem_stats
             SET attempts = ?2, solved = ?3, first_try_solved = ?4, mastery_level = ?5,
                 consecutive_correct = ?6, next_review_date = ?7, last_interval_days = ?8,
                 last_attempt = ?9
             WHERE problem_id = ?1",
            params![
                stat.problem_id,
                stat.attempts,
                stat.solved,
                stat.first_try_solved,
                stat.mastery_level,
                stat.consecutive_correct,
                stat.next_review_date.map(|d| d.to_string()),
                stat.last_interval_days,
                stat.last_attempt.map(format_datetime),
            ],
        )?;

        // Global totals and streaks
        let (mut total_problems, mut total_correct, mut total_attempts, mut streak, mut best): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = tx.query_row(
            "SELECT total_problems, total_correct, total_attempts, current_streak, best_streak
             FROM training_stats WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )?;

        let newly_solved = !was_solved && attempt.is_correct;
        total_attempts += 1;
        if attempt.is_correct {
            total_correct += 1;
            streak += 1;
            best = best.max(streak);
        } else {
            streak = 0;
        }
        if newly_solved {
            total_problems += 1;
        }

        tx.execute(
            "UPDATE training_stats
             SET total_problems = ?1, total_correct = ?2, total_attempts = ?3,
                 current_streak = ?4, best_streak = ?5, last_update = ?6
             WHERE id = 1",
            params![
                total_problems,
                total_correct,
                total_attempts,
                streak,
                best,
                today.to_string()
            ],
        )?;

        // Per-category counters
        let categories = [
            ("error_type", attempt.error_type.as_deref()),
            ("player_color", attempt.player_color.as_deref()),
        ];
        for (category_type, value) in categories {
            let Some(value) = value else { continue };
            tx.execute(
                "INSERT OR IGNORE INTO category_stats (category_type, category_value)
                 VALUES (?1, ?2)",
                params![category_type, value],
            )?;
            tx.execute(
                "UPDATE category_stats
                 SET total = total + ?3, correct = correct + ?4, attempts = attempts + 1
                 WHERE category_type = ?1 AND category_value = ?2",
                params![
                    category_type,
                    value,
                    newly_solved as i64,
                    attempt.is_correct as i64
                ],
            )?;
        }

        // Per-day counters
        tx.execute(
            "INSERT OR IGNORE INTO daily_stats (date) VALUES (?1)",
            params![today.to_string()],
        )?;
        tx.execute(
            "UPDATE daily_stats
             SET problems = problems + ?2, correct = correct + ?3, attempts = attempts + 1
             WHERE date = ?1",
            params![
                today.to_string(),
                newly_solved as i64,
                attempt.is_correct as i64
            ],
        )?;

        tx.commit()?;
        Ok(stat)
    }

    /// Compute the prioritized due queue, truncated to `max_count`.
    ///
    /// The RNG drives the jitter tie-break; pass a seeded one for
    /// reproducible queues.
    pub fn due_queue(
        &self,
        max_count: usize,
        today: NaiveDate,
        rng: &mut impl Rng,
    ) -> Result<ReviewQueue, TrainerError> {
        let mut stmt = self.conn.prepare(
            "SELECT problem_id, attempts, solved, first_try_solved, mastery_level,
                    consecutive_correct, next_review_date, last_interval_days, last_attempt
             FROM problem_stats",
        )?;
        let rows = stmt.query_map([], map_problem_row)?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?.into_stat()?);
        }

        let total_problems = stats.len();
        let mastered_count = stats
            .iter()
            .filter(|s| s.mastery_level >= MASTERED_LEVEL)
            .count();
        let new_count = stats.iter().filter(|s| s.mastery_level == 0).count();

        let mut due: Vec<ReviewQueueItem> = stats
            .iter()
            .filter(|s| scheduler::is_due(s, today))
            .map(|s| ReviewQueueItem {
                problem_id: s.problem_id.clone(),
                priority: scheduler::priority(s, today, rng),
                is_due: true,
                days_overdue: scheduler::days_overdue(s, today),
                mastery_level: s.mastery_level,
                attempts: s.attempts,
            })
            .collect();

        let due_count = due.len();
        // Priority descending; problem id keeps equal scores stable.
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.problem_id.cmp(&b.problem_id))
        });
        due.truncate(max_count);

        Ok(ReviewQueue {
            due,
            total_problems,
            due_count,
            mastered_count,
            new_count,
        })
    }

    pub fn get_problem(&self, problem_id: &str) -> Result<Option<ProblemStat>, TrainerError> {
        let raw = self
            .conn
            .query_row(
                "SELECT problem_id, attempts, solved, first_try_solved, mastery_level,
                        consecutive_correct, next_review_date, last_interval_days, last_attempt
                 FROM problem_stats WHERE problem_id = ?1",
                params![problem_id],
                map_problem_row,
            )
            .optional()?;
        raw.map(RawProblemRow::into_stat).transpose()
    }

    pub fn totals(&self) -> Result<TrainingTotals, TrainerError> {
        let totals = self.conn.query_row(
            "SELECT total_problems, total_correct, total_attempts, current_streak, best_streak
             FROM training_stats WHERE id = 1",
            [],
            |row| {
                Ok(TrainingTotals {
                    total_problems: row.get(0)?,
                    total_correct: row.get(1)?,
                    total_attempts: row.get(2)?,
                    current_streak: row.get(3)?,
                    best_streak: row.get(4)?,
                })
            },
        )?;
        Ok(totals)
    }

    /// Explicit full reset — the only way problem state is ever deleted.
    pub fn reset(&mut self) -> Result<(), TrainerError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE training_stats
             SET total_problems = 0, total_correct = 0, total_attempts = 0,
                 current_streak = 0, best_streak = 0, last_update = NULL
             WHERE id = 1",
            [],
        )?;
        for table in ["problem_stats", "category_stats", "daily_stats"] {
            tx.execute(&format!("DELETE FROM {table}"), [])?;
        }
        tx.commit()?;
        info!("Training statistics reset");
        Ok(())
    }
}

/// Row image with dates still as TEXT; parsed outside the rusqlite
/// closure so date errors surface as TrainerError, not as a bogus
/// database error.
struct RawProblemRow {
    problem_id: String,
    attempts: i64,
    solved: bool,
    first_try_solved: bool,
    mastery_level: i32,
    consecutive_correct: i64,
    next_review_date: Option<String>,
    last_interval_days: i64,
    last_attempt: Option<String>,
}

fn map_problem_row(row: &Row<'_>) -> rusqlite::Result<RawProblemRow> {
    Ok(RawProblemRow {
        problem_id: row.get(0)?,
        attempts: row.get(1)?,
        solved: row.get(2)?,
        first_try_solved: row.get(3)?,
        mastery_level: row.get(4)?,
        consecutive_correct: row.get(5)?,
        next_review_date: row.get(6)?,
        last_interval_days: row.get(7)?,
        last_attempt: row.get(8)?,
    })
}

impl RawProblemRow {
    fn into_stat(self) -> Result<ProblemStat, TrainerError> {
        let next_review_date = self
            .next_review_date
            .map(|s| s.parse::<NaiveDate>())
            .transpose()?;
        let last_attempt = self
            .last_attempt
            .map(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
            .transpose()?;
        Ok(ProblemStat {
            problem_id: self.problem_id,
            attempts: self.attempts,
            solved: self.solved,
            first_try_solved: self.first_try_solved,
            mastery_level: self.mastery_level,
            consecutive_correct: self.consecutive_correct,
            next_review_date,
            last_interval_days: self.last_interval_days,
            last_attempt,
        })
    }
}

fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}
