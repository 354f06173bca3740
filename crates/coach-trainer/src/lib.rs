pub mod error;
pub mod scheduler;
pub mod store;

pub use error::TrainerError;
pub use scheduler::{ProblemStat, ReviewQueueItem, MAX_MASTERY, REVIEW_INTERVALS};
pub use store::{Attempt, ReviewQueue, StatsStore, TrainingTotals};
