use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMetadata {
    pub white: String,
    pub black: String,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameData {
    pub metadata: GameMetadata,
    pub moves: Vec<String>, // SAN notation
    pub pgn: String,
}

/// Side that played a move. Serialized lowercase to match the
/// analysis artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl PlayerColor {
    /// Color of the player who makes move `ply` (0-based).
    pub fn from_ply(ply: usize) -> Self {
        if ply % 2 == 0 {
            PlayerColor::White
        } else {
            PlayerColor::Black
        }
    }
}

impl std::fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerColor::White => write!(f, "white"),
            PlayerColor::Black => write!(f, "black"),
        }
    }
}

impl GameData {
    /// Case-insensitive check whether `username` played in this game,
    /// and on which side.
    pub fn side_of(&self, username: &str) -> Option<PlayerColor> {
        if self.metadata.white.eq_ignore_ascii_case(username) {
            Some(PlayerColor::White)
        } else if self.metadata.black.eq_ignore_ascii_case(username) {
            Some(PlayerColor::Black)
        } else {
            None
        }
    }
}
