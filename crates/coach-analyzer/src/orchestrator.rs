//! Batch orchestration: bounded worker pool over independent games.
//!
//! The cache is the only resource shared between workers; its per-key
//! idempotent writes make concurrent writers safe without locking. Each
//! worker owns its engine process for exactly one game.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::cache::{AnalysisCache, CacheKey};
use crate::classify::PositionAnalysis;
use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use crate::session;

/// Analyze a batch of games and return the unordered aggregation of all
/// classified positions.
///
/// A single game's failure is logged and contributes zero records; it
/// never cancels sibling tasks. A missing engine binary is the one fatal
/// condition, reported once before any work starts. Dropping the returned
/// future aborts in-flight tasks; engine processes are killed on drop, so
/// no orphans survive cancellation.
pub async fn analyze_batch(
    games: Vec<String>,
    config: Arc<AnalyzerConfig>,
) -> Result<Vec<PositionAnalysis>, AnalyzerError> {
    if !Path::new(&config.engine_path).exists() {
        return Err(AnalyzerError::EngineMissing(config.engine_path.clone()));
    }

    let total = games.len();
    let workers = config.max_workers.max(1);
    info!(games = total, workers, "Starting batch analysis");

    let semaphore = Arc::new(Semaphore::new(workers));
    let cache = Arc::new(AnalysisCache::new(config.cache_dir.clone()));
    let mut tasks: JoinSet<Vec<PositionAnalysis>> = JoinSet::new();

    for (index, pgn) in games.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let cache = cache.clone();
        let config = config.clone();

        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Vec::new(), // pool shut down
            };

            let key = CacheKey::new(&config.username, &config.game_category, &pgn);
            if let Some(cached) = cache.get(&key) {
                debug!(game = index, "Cache hit");
                return cached;
            }

            match session::analyze_game(&pgn, &config).await {
                Ok(problems) => {
                    // Write through on success, including the empty
                    // result: "no errors found" is a result too.
                    cache.put(&key, &problems);
                    problems
                }
                Err(e) => {
                    error!(game = index, error = %e, "Game analysis failed");
                    Vec::new()
                }
            }
        });
    }

    let mut all = Vec::new();
    let mut completed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(problems) => {
                completed += 1;
                debug!(completed, total, "Game finished");
                all.extend(problems);
            }
            Err(e) => {
                completed += 1;
                error!(error = %e, "Analysis task panicked");
            }
        }
    }

    info!(problems = all.len(), games = total, "Batch analysis complete");
    Ok(all)
}
