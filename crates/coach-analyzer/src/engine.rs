//! UCI engine wrapper (async I/O over a subprocess).

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use tracing::debug;

use crate::error::AnalyzerError;

/// Sentinel magnitude for forced-mate scores, in centipawns.
pub const MATE_SCORE_CP: i32 = 10_000;

/// Result of a single position evaluation.
/// Scores are relative to the side to move, per the UCI protocol.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Centipawn score
    pub cp: Option<i32>,
    /// Mate in N moves (positive = side to move wins)
    pub mate: Option<i32>,
    /// Principal variation in UCI notation
    pub pv: Vec<String>,
    /// Best move reported by the engine
    pub best_move: String,
}

impl Evaluation {
    /// Collapse the score into a single centipawn value, folding mate
    /// scores into the ±10000 sentinel range. Still relative to the
    /// side to move. Mate 0 means the side to move is already
    /// checkmated, so it folds to the losing side of the sentinel.
    pub fn relative_cp(&self) -> i32 {
        if let Some(m) = self.mate {
            if m > 0 {
                MATE_SCORE_CP - m
            } else {
                -MATE_SCORE_CP - m
            }
        } else {
            self.cp.unwrap_or(0)
        }
    }

    /// First move of the principal variation, falling back to the
    /// engine's bestmove line.
    pub fn top_move(&self) -> Option<&str> {
        self.pv
            .first()
            .map(String::as_str)
            .or_else(|| {
                if self.best_move.is_empty() || self.best_move == "(none)" {
                    None
                } else {
                    Some(self.best_move.as_str())
                }
            })
    }
}

/// One UCI engine subprocess. Owned exclusively by a single game's
/// analysis; never shared between concurrent sessions.
pub struct UciEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl UciEngine {
    /// Spawn a new engine process and initialize UCI.
    pub async fn spawn(path: &str) -> Result<Self, AnalyzerError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| AnalyzerError::Engine(format!("Failed to spawn engine: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| AnalyzerError::Engine("Engine stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| AnalyzerError::Engine("Engine stdout unavailable".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
        };

        // Initialize UCI
        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        // One thread and a small hash per process; parallelism comes
        // from running many engines, not from inside one.
        engine.send("setoption name Threads value 1").await?;
        engine.send("setoption name Hash value 16").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command to the engine
    async fn send(&mut self, cmd: &str) -> Result<(), AnalyzerError> {
        debug!(cmd, "UCI <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| AnalyzerError::Engine(format!("Failed to write to engine: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| AnalyzerError::Engine(format!("Failed to flush engine stdin: {e}")))?;
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), AnalyzerError> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| AnalyzerError::Engine(format!("Failed to read from engine: {e}")))?;
            if n == 0 {
                return Err(AnalyzerError::Engine(format!(
                    "Engine exited before sending '{expected}'"
                )));
            }
            let trimmed = line.trim();
            debug!(line = trimmed, "UCI >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Evaluate a position for `movetime_ms` milliseconds.
    pub async fn evaluate(&mut self, fen: &str, movetime_ms: u64) -> Result<Evaluation, AnalyzerError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go movetime {movetime_ms}")).await?;

        let mut result = Evaluation {
            cp: None,
            mate: None,
            pv: Vec::new(),
            best_move: String::new(),
        };

        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| AnalyzerError::Engine(format!("Failed to read from engine: {e}")))?;
            if n == 0 {
                return Err(AnalyzerError::Engine(
                    "Engine exited during search".to_string(),
                ));
            }
            let trimmed = line.trim();

            // Terminal positions produce a pv-less `info depth 0 score
            // mate 0` line, so the score is taken from any info line
            // that carries one.
            if trimmed.starts_with("info") && trimmed.contains(" score ") {
                if let Some(cp) = parse_cp(trimmed) {
                    result.cp = Some(cp);
                    result.mate = None;
                }
                if let Some(mate) = parse_mate(trimmed) {
                    result.mate = Some(mate);
                    result.cp = None;
                }
                if trimmed.contains(" pv ") {
                    result.pv = parse_pv(trimmed);
                }
            } else if trimmed.starts_with("bestmove") {
                let parts: Vec<&str> = trimmed.split_whitespace().collect();
                if parts.len() >= 2 {
                    result.best_move = parts[1].to_string();
                }
                break;
            }
        }

        Ok(result)
    }

    /// Send quit and wait for the process to exit.
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill so cancelled tasks don't leak
        // engine processes.
        let _ = self.process.start_kill();
    }
}

/// Parse centipawn score from an info line
fn parse_cp(line: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "cp" && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

/// Parse mate score from an info line
fn parse_mate(line: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "mate" && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

/// Parse PV moves from an info line
fn parse_pv(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in parts {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            // PV ends at next keyword or end of line
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes an executable shell script that speaks just enough UCI.
    fn fake_engine(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-engine.sh");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        assert_eq!(parse_cp(line), Some(35));
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate 3 nodes 100000 pv e2e4";
        assert_eq!(parse_mate(line), Some(3));
    }

    #[test]
    fn test_parse_pv() {
        let line = "info depth 20 score cp 35 pv e2e4 e7e5 g1f3";
        let pv = parse_pv(line);
        assert_eq!(pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_relative_cp_folds_mate_into_sentinel() {
        let eval = Evaluation {
            cp: None,
            mate: Some(3),
            pv: vec![],
            best_move: String::new(),
        };
        assert_eq!(eval.relative_cp(), 9997);

        let eval = Evaluation {
            cp: None,
            mate: Some(-2),
            pv: vec![],
            best_move: String::new(),
        };
        assert_eq!(eval.relative_cp(), -9998);

        // Mate 0: the side to move is checkmated right now.
        let eval = Evaluation {
            cp: None,
            mate: Some(0),
            pv: vec![],
            best_move: "(none)".to_string(),
        };
        assert_eq!(eval.relative_cp(), -10_000);

        let eval = Evaluation {
            cp: Some(-42),
            mate: None,
            pv: vec![],
            best_move: String::new(),
        };
        assert_eq!(eval.relative_cp(), -42);
    }

    #[test]
    fn test_top_move_prefers_pv() {
        let eval = Evaluation {
            cp: Some(0),
            mate: None,
            pv: vec!["d2d4".to_string()],
            best_move: "e2e4".to_string(),
        };
        assert_eq!(eval.top_move(), Some("d2d4"));

        let eval = Evaluation {
            cp: Some(0),
            mate: None,
            pv: vec![],
            best_move: "(none)".to_string(),
        };
        assert_eq!(eval.top_move(), None);
    }

    #[tokio::test]
    async fn test_evaluate_scores_a_checkmated_position_as_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_engine(
            dir.path(),
            r#"#!/bin/sh
while read line; do
  case "$line" in
    uci) echo uciok ;;
    isready) echo readyok ;;
    go*)
      echo "info depth 0 score mate 0"
      echo "bestmove (none)"
      ;;
    quit) exit 0 ;;
  esac
done
"#,
        );

        let mut engine = UciEngine::spawn(&path).await.unwrap();
        // Fool's mate: white to move, already checkmated.
        let eval = engine
            .evaluate(
                "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3",
                10,
            )
            .await
            .unwrap();
        engine.quit().await;

        assert_eq!(eval.mate, Some(0));
        assert_eq!(eval.relative_cp(), -MATE_SCORE_CP);
        assert_eq!(eval.top_move(), None);
    }
}
