//! Batch game analyzer.
//!
//! Reads `.pgn` files from a directory, runs each game through the
//! engine (or the cache), and writes the aggregated problem list as a
//! JSON artifact for the trainer.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use tracing::{info, warn};

use coach_analyzer::cache::AnalysisCache;
use coach_analyzer::config::AnalyzerConfig;
use coach_analyzer::orchestrator::analyze_batch;

struct CliArgs {
    games_dir: String,
    max_games: Option<usize>,
    clear_cache: bool,
}

/// Parse `[games-dir] [--max-games N] [--clear-cache]` from CLI args.
fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut parsed = CliArgs {
        games_dir: "games".to_string(),
        max_games: None,
        clear_cache: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--max-games" => {
                if let Some(n) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                    parsed.max_games = Some(n);
                }
                i += 2;
            }
            "--clear-cache" => {
                parsed.clear_cache = true;
                i += 1;
            }
            other => {
                parsed.games_dir = other.to_string();
                i += 1;
            }
        }
    }
    parsed
}

/// Collect game texts from `.pgn` files, sorted by filename so runs are
/// reproducible.
fn load_games(dir: &str, max_games: Option<usize>) -> std::io::Result<Vec<String>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "pgn"))
        .collect();
    paths.sort();

    let mut games = Vec::new();
    for path in paths {
        if max_games.is_some_and(|max| games.len() >= max) {
            break;
        }
        match fs::read_to_string(&path) {
            Ok(text) => games.push(text),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable game file"),
        }
    }
    Ok(games)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env for local dev
    let _ = dotenvy::dotenv();

    let args = parse_args();
    let config = Arc::new(AnalyzerConfig::from_env()?);
    info!(
        username = %config.username,
        category = %config.game_category,
        engine = %config.engine_path,
        movetime_ms = config.movetime_ms,
        workers = config.max_workers,
        "Analyzer config loaded"
    );

    if args.clear_cache {
        info!(dir = %config.cache_dir.display(), "Clearing cache");
        AnalysisCache::new(config.cache_dir.clone()).clear();
    }

    let games = load_games(&args.games_dir, args.max_games)?;
    if games.is_empty() {
        warn!(dir = %args.games_dir, "No .pgn files found, nothing to analyze");
        return Ok(());
    }
    info!(games = games.len(), dir = %args.games_dir, "Loaded games");

    let problems = analyze_batch(games, config.clone()).await?;

    // Error-type breakdown for the run summary
    let mut breakdown: BTreeMap<String, usize> = BTreeMap::new();
    for p in &problems {
        *breakdown.entry(p.error_type.to_string()).or_default() += 1;
    }

    fs::create_dir_all(&config.output_dir)?;
    let output_path = config.output_dir.join(format!(
        "{}_{}_analysis.json",
        config.username, config.game_category
    ));
    fs::write(&output_path, serde_json::to_string_pretty(&problems)?)?;

    info!(
        problems = problems.len(),
        breakdown = ?breakdown,
        output = %output_path.display(),
        "Analysis complete"
    );

    Ok(())
}
