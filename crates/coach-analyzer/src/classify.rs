//! Error classification — pure functions only
//! (no board, cache or engine dependencies)

use coach_core::PlayerColor;
use serde::{Deserialize, Serialize};

/// Classification thresholds (evaluation drop, centipawns from the
/// mover's perspective)
pub const BLUNDER_THRESHOLD_CP: i32 = 200;
pub const MISTAKE_THRESHOLD_CP: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Mistake,
    Blunder,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Mistake => write!(f, "Mistake"),
            ErrorKind::Blunder => write!(f, "Blunder"),
        }
    }
}

/// Classify an evaluation drop. A positive drop means the mover's
/// position got worse; anything under the mistake threshold is not
/// recorded.
pub fn classify_drop(drop: i32) -> Option<ErrorKind> {
    if drop >= BLUNDER_THRESHOLD_CP {
        Some(ErrorKind::Blunder)
    } else if drop >= MISTAKE_THRESHOLD_CP {
        Some(ErrorKind::Mistake)
    } else {
        None
    }
}

/// One detected erroneous position — the unit of work shared by the
/// cache, the output artifact and the trainer. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionAnalysis {
    /// FEN of the position *after* the problematic move
    pub fen: String,
    /// 1-based ply number of the move
    pub move_number: u32,
    pub player_color: PlayerColor,
    /// The move the player made, in UCI notation
    pub player_move: String,
    /// Evaluation before the move (centipawns, mover's perspective)
    pub eval_before_move_cp: i32,
    /// Evaluation after the move (centipawns, mover's perspective)
    pub eval_after_move_cp: i32,
    /// Engine's preferred move from the pre-move position
    pub best_move: String,
    pub error_type: ErrorKind,
    /// URL of the originating game, when the PGN carries one
    pub game_url: Option<String>,
}

impl PositionAnalysis {
    /// Evaluation drop that triggered the record.
    pub fn eval_drop(&self) -> i32 {
        self.eval_before_move_cp - self.eval_after_move_cp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_drop_thresholds() {
        assert_eq!(classify_drop(99), None);
        assert_eq!(classify_drop(100), Some(ErrorKind::Mistake));
        assert_eq!(classify_drop(199), Some(ErrorKind::Mistake));
        assert_eq!(classify_drop(200), Some(ErrorKind::Blunder));
        assert_eq!(classify_drop(1000), Some(ErrorKind::Blunder));
    }

    #[test]
    fn test_classify_drop_ignores_improvements() {
        assert_eq!(classify_drop(0), None);
        assert_eq!(classify_drop(-250), None);
    }

    #[test]
    fn test_eval_drop_from_record() {
        let record = PositionAnalysis {
            fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
            move_number: 9,
            player_color: PlayerColor::White,
            player_move: "f2f3".to_string(),
            eval_before_move_cp: 50,
            eval_after_move_cp: -160,
            best_move: "g1f3".to_string(),
            error_type: ErrorKind::Blunder,
            game_url: None,
        };
        assert_eq!(record.eval_drop(), 210);
        assert_eq!(classify_drop(record.eval_drop()), Some(ErrorKind::Blunder));
    }

    #[test]
    fn test_error_kind_serializes_capitalized() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::Blunder).unwrap(),
            "\"Blunder\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::Mistake).unwrap(),
            "\"Mistake\""
        );
    }
}
