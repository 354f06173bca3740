//! Analyzer configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::error::AnalyzerError;

/// Workers are capped because each one owns a full engine subprocess.
const MAX_WORKER_CAP: usize = 8;

#[derive(Clone, Debug)]
pub struct AnalyzerConfig {
    /// Path to the UCI engine binary
    pub engine_path: String,

    /// Engine think time per position, in milliseconds
    pub movetime_ms: u64,

    /// Player whose moves are checked for errors
    pub username: String,

    /// Game category, used to namespace cache and output (blitz, rapid, ...)
    pub game_category: String,

    /// Directory for cached per-game analysis
    pub cache_dir: PathBuf,

    /// Directory for the aggregated output artifact
    pub output_dir: PathBuf,

    /// Bounded worker count for the batch pool
    pub max_workers: usize,
}

impl AnalyzerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AnalyzerError> {
        let username =
            env::var("COACH_USERNAME").map_err(|_| AnalyzerError::Config("COACH_USERNAME not set"))?;

        let engine_path = env::var("STOCKFISH_PATH")
            .unwrap_or_else(|_| "/usr/local/bin/stockfish".to_string());

        let movetime_ms = env::var("ENGINE_MOVETIME_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let game_category =
            env::var("GAME_CATEGORY").unwrap_or_else(|_| "blitz".to_string());

        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("game_cache"));

        let output_dir = env::var("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("game_analysis"));

        let max_workers = env::var("MAX_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| num_cpus::get().min(MAX_WORKER_CAP))
            .max(1);

        Ok(Self {
            engine_path,
            movetime_ms,
            username,
            game_category,
            cache_dir,
            output_dir,
            max_workers,
        })
    }
}
