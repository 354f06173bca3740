pub mod game_data;
pub mod hash;
pub mod pgn;

pub use game_data::{GameData, GameMetadata, PlayerColor};
pub use hash::game_hash;
pub use pgn::parse_pgn;
