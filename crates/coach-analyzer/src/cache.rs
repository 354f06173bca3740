//! Content-addressed file cache for per-game analysis results.
//!
//! Purely an optimization, never the source of truth: reads fall back to
//! a miss on any corruption and writes are best-effort.

use std::fs;
use std::path::PathBuf;

use coach_core::game_hash;
use tracing::{debug, warn};

use crate::classify::PositionAnalysis;

/// Cache key: tracked user + game category + content hash of the game
/// text. A changed game text produces a different key, never an
/// overwritten entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub user: String,
    pub category: String,
    pub game_hash: String,
}

impl CacheKey {
    pub fn new(user: &str, category: &str, pgn: &str) -> Self {
        Self {
            user: user.to_string(),
            category: category.to_string(),
            game_hash: game_hash(pgn),
        }
    }

    fn filename(&self) -> String {
        format!("{}_{}_{}.json", self.user, self.category, self.game_hash)
    }
}

pub struct AnalysisCache {
    dir: PathBuf,
}

impl AnalysisCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Look up a cached result. A malformed or unreadable entry is
    /// discarded and treated as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<PositionAnalysis>> {
        let path = self.dir.join(key.filename());
        if !path.exists() {
            return None;
        }

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable cache entry, discarding");
                let _ = fs::remove_file(&path);
                return None;
            }
        };

        match serde_json::from_str(&text) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache entry, discarding");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Write a result through to the cache. Best-effort: a persistence
    /// failure is logged, never surfaced. Rewrites are idempotent since
    /// the key pins the exact input content.
    pub fn put(&self, key: &CacheKey, entries: &[PositionAnalysis]) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "Could not create cache directory");
            return;
        }

        let path = self.dir.join(key.filename());
        let json = match serde_json::to_string_pretty(entries) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Could not serialize cache entry");
                return;
            }
        };

        if let Err(e) = fs::write(&path, json) {
            warn!(path = %path.display(), error = %e, "Could not write cache entry");
        } else {
            debug!(path = %path.display(), entries = entries.len(), "Cached analysis");
        }
    }

    /// Drop a single entry.
    pub fn invalidate(&self, key: &CacheKey) {
        let _ = fs::remove_file(self.dir.join(key.filename()));
    }

    /// Remove the whole cache directory.
    pub fn clear(&self) {
        if !self.dir.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "Could not clear cache directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use coach_core::PlayerColor;

    fn sample_record() -> PositionAnalysis {
        PositionAnalysis {
            fen: "rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2".to_string(),
            move_number: 3,
            player_color: PlayerColor::White,
            player_move: "g2g4".to_string(),
            eval_before_move_cp: -50,
            eval_after_move_cp: -9998,
            best_move: "e2e4".to_string(),
            error_type: ErrorKind::Blunder,
            game_url: Some("https://www.chess.com/game/live/42".to_string()),
        }
    }

    #[test]
    fn test_put_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::new(dir.path().join("cache"));
        let key = CacheKey::new("robofresh", "blitz", "1. f3 e5 2. g4 Qh4#");

        assert!(cache.get(&key).is_none());
        cache.put(&key, &[sample_record()]);
        assert_eq!(cache.get(&key), Some(vec![sample_record()]));
    }

    #[test]
    fn test_key_is_whitespace_insensitive_but_content_sensitive() {
        let a = CacheKey::new("u", "blitz", "1. e4  e5\n2. Nf3");
        let b = CacheKey::new("u", "blitz", "1. e4 e5 2. Nf3");
        let c = CacheKey::new("u", "blitz", "1. d4 e5 2. Nf3");
        assert_eq!(a.game_hash, b.game_hash);
        assert_ne!(a.game_hash, c.game_hash);
        // Namespacing by user and category
        let d = CacheKey::new("u", "rapid", "1. e4 e5 2. Nf3");
        assert_ne!(b.filename(), d.filename());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::new(dir.path().to_path_buf());
        let key = CacheKey::new("u", "blitz", "1. e4");

        std::fs::write(dir.path().join(key.filename()), "{ not json").unwrap();
        assert!(cache.get(&key).is_none());
        assert!(!dir.path().join(key.filename()).exists());
    }

    #[test]
    fn test_empty_result_is_cached_as_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::new(dir.path().to_path_buf());
        let key = CacheKey::new("u", "blitz", "1. e4 e5");

        cache.put(&key, &[]);
        assert_eq!(cache.get(&key), Some(vec![]));
    }

    #[test]
    fn test_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::new(dir.path().to_path_buf());
        let key = CacheKey::new("u", "blitz", "1. e4 e5");

        cache.put(&key, &[sample_record()]);
        cache.invalidate(&key);
        assert!(cache.get(&key).is_none());
    }
}
