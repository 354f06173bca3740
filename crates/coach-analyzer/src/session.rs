//! Per-game analysis session.
//!
//! Board state threads through the move list, so a game is analyzed
//! strictly sequentially. One engine process is owned exclusively by
//! one session for its full lifetime.

use chess::{Board, ChessMove, File, MoveGen, Piece, Rank, Square};
use coach_core::{parse_pgn, GameData, PlayerColor};
use tracing::{debug, warn};

use crate::classify::{classify_drop, PositionAnalysis};
use crate::config::AnalyzerConfig;
use crate::engine::UciEngine;
use crate::error::AnalyzerError;

/// Analyze one game and return the tracked user's classified errors.
///
/// Unparsable game text and games the tracked user didn't play yield an
/// empty result, never an error. Engine failure mid-game aborts the whole
/// game (no partial output); the subprocess is terminated on every path.
pub async fn analyze_game(
    pgn: &str,
    config: &AnalyzerConfig,
) -> Result<Vec<PositionAnalysis>, AnalyzerError> {
    let Some(game) = parse_pgn(pgn) else {
        warn!("Could not parse game text, skipping");
        return Ok(Vec::new());
    };

    let Some(user_color) = game.side_of(&config.username) else {
        debug!(
            white = %game.metadata.white,
            black = %game.metadata.black,
            "Tracked user not a participant, skipping"
        );
        return Ok(Vec::new());
    };

    let mut engine = UciEngine::spawn(&config.engine_path).await?;
    let result = walk_game(&mut engine, &game, user_color, config).await;
    engine.quit().await;

    match result {
        // Bad SAN means the game text is unusable, same as a parse failure.
        Err(AnalyzerError::Analysis(msg)) => {
            warn!(error = %msg, "Game contains unplayable moves, skipping");
            Ok(Vec::new())
        }
        other => other,
    }
}

async fn walk_game(
    engine: &mut UciEngine,
    game: &GameData,
    user_color: PlayerColor,
    config: &AnalyzerConfig,
) -> Result<Vec<PositionAnalysis>, AnalyzerError> {
    let mut board = Board::default();
    let mut problems = Vec::new();

    for (ply, san) in game.moves.iter().enumerate() {
        let mover = PlayerColor::from_ply(ply);
        let fen_before = board.to_string();
        let chess_move = resolve_san(&board, san)?;

        // Evaluation before the move, from the mover's perspective.
        let eval_before = engine
            .evaluate(&fen_before, config.movetime_ms)
            .await?
            .relative_cp();

        board = board.make_move_new(chess_move);

        // After the move the engine scores for the opponent; negate to
        // stay in the mover's perspective.
        let eval_after = -engine
            .evaluate(&board.to_string(), config.movetime_ms)
            .await?
            .relative_cp();

        // Positive drop = the mover's position got worse.
        let eval_drop = eval_before - eval_after;

        // Every move is evaluated to keep the board threading correct,
        // but only the tracked user's classified moves are recorded.
        if mover != user_color {
            continue;
        }
        let Some(error_type) = classify_drop(eval_drop) else {
            continue;
        };

        // Retract to the pre-move position and probe it again for the
        // engine's preferred alternative.
        let probe = engine.evaluate(&fen_before, config.movetime_ms).await?;
        let best_move = probe.top_move().unwrap_or("N/A").to_string();

        problems.push(PositionAnalysis {
            fen: board.to_string(),
            move_number: (ply + 1) as u32,
            player_color: mover,
            player_move: uci_string(chess_move),
            eval_before_move_cp: eval_before,
            eval_after_move_cp: eval_after,
            best_move,
            error_type,
            game_url: game.metadata.link.clone(),
        });
    }

    Ok(problems)
}

/// Format a move in UCI notation (e.g. "e2e4", "e7e8q").
pub fn uci_string(m: ChessMove) -> String {
    let promo = m
        .get_promotion()
        .map(|p| match p {
            Piece::Queen => "q",
            Piece::Rook => "r",
            Piece::Bishop => "b",
            Piece::Knight => "n",
            _ => "",
        })
        .unwrap_or("");
    format!("{}{}{}", m.get_source(), m.get_dest(), promo)
}

/// Resolve a SAN string against the legal moves of `board`.
pub fn resolve_san(board: &Board, san: &str) -> Result<ChessMove, AnalyzerError> {
    let clean = san.trim_end_matches(|c: char| matches!(c, '+' | '#' | '!' | '?'));
    let legal: Vec<ChessMove> = MoveGen::new_legal(board).collect();

    if clean == "O-O" || clean == "0-0" {
        return castling_move(board, &legal, san, true);
    }
    if clean == "O-O-O" || clean == "0-0-0" {
        return castling_move(board, &legal, san, false);
    }

    let bytes = clean.as_bytes();
    if bytes.is_empty() {
        return Err(AnalyzerError::Analysis("Empty SAN move".to_string()));
    }

    let (piece, rest) = if bytes[0].is_ascii_uppercase() {
        let p = match bytes[0] {
            b'K' => Piece::King,
            b'Q' => Piece::Queen,
            b'R' => Piece::Rook,
            b'B' => Piece::Bishop,
            b'N' => Piece::Knight,
            _ => {
                return Err(AnalyzerError::Analysis(format!(
                    "Unknown piece letter in SAN: {san}"
                )))
            }
        };
        (p, &clean[1..])
    } else {
        (Piece::Pawn, clean)
    };

    let (rest, promotion) = match rest.find('=') {
        Some(i) => {
            let promo = match rest.as_bytes().get(i + 1) {
                Some(b'Q') => Some(Piece::Queen),
                Some(b'R') => Some(Piece::Rook),
                Some(b'B') => Some(Piece::Bishop),
                Some(b'N') => Some(Piece::Knight),
                _ => None,
            };
            (&rest[..i], promo)
        }
        None => (rest, None),
    };

    let rest = rest.replace('x', "");
    let rb = rest.as_bytes();
    if rb.len() < 2 {
        return Err(AnalyzerError::Analysis(format!("SAN too short: {san}")));
    }

    let dest_file = rb[rb.len() - 2];
    let dest_rank = rb[rb.len() - 1];
    if !(b'a'..=b'h').contains(&dest_file) || !(b'1'..=b'8').contains(&dest_rank) {
        return Err(AnalyzerError::Analysis(format!(
            "Invalid destination in SAN: {san}"
        )));
    }

    let dest = Square::make_square(
        Rank::from_index((dest_rank - b'1') as usize),
        File::from_index((dest_file - b'a') as usize),
    );
    let disambig = &rest[..rest.len() - 2];

    let mut candidates: Vec<ChessMove> = legal
        .into_iter()
        .filter(|m| {
            m.get_dest() == dest
                && board.piece_on(m.get_source()) == Some(piece)
                && m.get_promotion() == promotion
        })
        .collect();

    if candidates.len() > 1 && !disambig.is_empty() {
        candidates.retain(|m| {
            disambig.bytes().all(|b| match b {
                b'a'..=b'h' => m.get_source().get_file().to_index() == (b - b'a') as usize,
                b'1'..=b'8' => m.get_source().get_rank().to_index() == (b - b'1') as usize,
                _ => true,
            })
        });
    }

    match candidates.len() {
        1 => Ok(candidates[0]),
        0 => Err(AnalyzerError::Analysis(format!(
            "No legal move matches SAN: {san}"
        ))),
        n => Err(AnalyzerError::Analysis(format!(
            "Ambiguous SAN: {san} ({n} candidates)"
        ))),
    }
}

fn castling_move(
    board: &Board,
    legal: &[ChessMove],
    san: &str,
    kingside: bool,
) -> Result<ChessMove, AnalyzerError> {
    for m in legal {
        if board.piece_on(m.get_source()) != Some(Piece::King) {
            continue;
        }
        let src_file = m.get_source().get_file().to_index();
        let dst_file = m.get_dest().get_file().to_index();
        if kingside && dst_file > src_file && dst_file - src_file == 2 {
            return Ok(*m);
        }
        if !kingside && src_file > dst_file && src_file - dst_file == 2 {
            return Ok(*m);
        }
    }
    Err(AnalyzerError::Analysis(format!(
        "No legal castling move for: {san}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use std::path::PathBuf;

    /// Writes an executable shell script that speaks just enough UCI.
    fn fake_engine(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-engine.sh");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn test_config() -> AnalyzerConfig {
        AnalyzerConfig {
            engine_path: "/nonexistent/engine".to_string(),
            movetime_ms: 10,
            username: "robofresh".to_string(),
            game_category: "blitz".to_string(),
            cache_dir: PathBuf::from("/tmp/unused"),
            output_dir: PathBuf::from("/tmp/unused"),
            max_workers: 1,
        }
    }

    fn play(moves: &[&str]) -> Board {
        let mut board = Board::default();
        for san in moves {
            let m = resolve_san(&board, san).unwrap();
            board = board.make_move_new(m);
        }
        board
    }

    #[test]
    fn test_resolve_san_pawn_and_piece_moves() {
        let board = Board::default();
        assert_eq!(uci_string(resolve_san(&board, "e4").unwrap()), "e2e4");
        assert_eq!(uci_string(resolve_san(&board, "Nf3").unwrap()), "g1f3");
    }

    #[test]
    fn test_resolve_san_capture_with_check_suffix() {
        let board = play(&["e4", "d5"]);
        assert_eq!(uci_string(resolve_san(&board, "exd5").unwrap()), "e4d5");
    }

    #[test]
    fn test_resolve_san_kingside_castle() {
        let board = play(&["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"]);
        assert_eq!(uci_string(resolve_san(&board, "O-O").unwrap()), "e1g1");
    }

    #[test]
    fn test_resolve_san_disambiguation() {
        // Both the b1 knight and the e2 knight can reach c3.
        let board = play(&["e4", "e5", "Ne2", "Nc6"]);
        let m = resolve_san(&board, "Nbc3").unwrap();
        assert_eq!(uci_string(m), "b1c3");
        let m = resolve_san(&board, "Nec3").unwrap();
        assert_eq!(uci_string(m), "e2c3");
        assert!(resolve_san(&board, "Nc3").is_err());
    }

    #[test]
    fn test_resolve_san_rejects_illegal() {
        let board = Board::default();
        assert!(resolve_san(&board, "Qe5").is_err());
        assert!(resolve_san(&board, "z9").is_err());
    }

    #[tokio::test]
    async fn test_blunder_by_tracked_user_emits_one_record() {
        let dir = tempfile::tempdir().unwrap();
        // Scores per `go`, in call order: before 1.e4 (+50 for white),
        // after 1.e4 (+160 for black, so -160 for the mover), the
        // best-move re-probe, then black's reply. The reply scores
        // would classify too, but black is not the tracked user.
        let script = r#"#!/bin/sh
n=0
while read line; do
  case "$line" in
    uci) echo uciok ;;
    isready) echo readyok ;;
    go*)
      n=$((n+1))
      case "$n" in
        1|3) echo "info depth 12 score cp 50 pv d2d4 g8f6" ;;
        2) echo "info depth 12 score cp 160 pv g8f6" ;;
        4) echo "info depth 12 score cp 300 pv b8c6" ;;
        *) echo "info depth 12 score cp 300 pv a2a3" ;;
      esac
      echo "bestmove e2e4"
      ;;
    quit) exit 0 ;;
  esac
done
"#;
        let mut config = test_config();
        config.engine_path = fake_engine(dir.path(), script);

        let pgn = "[White \"robofresh\"]\n[Black \"opp\"]\n\n1. e4 e5 1-0";
        let records = analyze_game(pgn, &config).await.unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.error_type, ErrorKind::Blunder);
        assert_eq!(record.player_color, PlayerColor::White);
        assert_eq!(record.player_move, "e2e4");
        assert_eq!(record.move_number, 1);
        assert_eq!(record.eval_before_move_cp, 50);
        assert_eq!(record.eval_after_move_cp, -160);
        assert_eq!(record.best_move, "d2d4");
        assert_eq!(record.fen, play(&["e4"]).to_string());
    }

    #[tokio::test]
    async fn test_delivering_checkmate_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // Call 7 is the position before Qh4# (tracked user to move,
        // mate in 1), call 8 the checkmated position after it. A drop
        // of 9999 - 10000 = -1 must not produce a record.
        let script = r#"#!/bin/sh
n=0
while read line; do
  case "$line" in
    uci) echo uciok ;;
    isready) echo readyok ;;
    go*)
      n=$((n+1))
      case "$n" in
        7) echo "info depth 5 score mate 1 pv d8h4"; echo "bestmove d8h4" ;;
        8) echo "info depth 0 score mate 0"; echo "bestmove (none)" ;;
        *) echo "info depth 8 score cp 0 pv a2a3"; echo "bestmove a2a3" ;;
      esac
      ;;
    quit) exit 0 ;;
  esac
done
"#;
        let mut config = test_config();
        config.engine_path = fake_engine(dir.path(), script);

        let pgn = "[White \"opp\"]\n[Black \"robofresh\"]\n\n1. f3 e5 2. g4 Qh4# 0-1";
        let records = analyze_game(pgn, &config).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_unparsable_game_yields_empty_result() {
        let config = test_config();
        // Engine path doesn't exist, so this only passes if the parse
        // check short-circuits before any engine is spawned.
        let result = analyze_game("not a chess game", &config).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_untracked_user_yields_empty_result() {
        let config = test_config();
        let pgn = r#"[White "someone"]
[Black "else"]

1. e4 e5 2. Nf3 Nc6 1-0"#;
        let result = analyze_game(pgn, &config).await.unwrap();
        assert!(result.is_empty());
    }
}
