//! Trainer error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Corrupt date value: {0}")]
    Date(#[from] chrono::ParseError),
}
