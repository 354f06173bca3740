//! Content hashing for cache keys.

use sha2::{Digest, Sha256};

/// Stable digest of a game text, used as the cache key component.
///
/// The text is whitespace-normalized first so that formatting-only
/// differences (line wrapping, indentation) hash identically. Any
/// substantive change to the game produces a new digest.
pub fn game_hash(pgn: &str) -> String {
    let normalized = pgn.split_whitespace().collect::<Vec<_>>().join(" ");
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}
