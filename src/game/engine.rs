//! Match Engine
//!
//! The authoritative turn state machine. One instance per room; the session
//! layer feeds it validated packets and broadcasts whatever it commits.
//! This is the only code path that writes board squares.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::board::{
    BoardSquare, BoardState, GameSettings, Move, Piece, PlayerId, Position,
};
use crate::game::win::{check_win, WinLine};

// =============================================================================
// PHASES AND OUTCOMES
// =============================================================================

/// Lifecycle of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPhase {
    /// Room not full or start not requested yet.
    WaitingForPlayers,
    /// Moves are being applied.
    InProgress,
    /// Terminal; see the recorded [`MatchOutcome`].
    Finished,
}

/// Why a match ended. Set exactly once, at the transition into `Finished`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FinishReason {
    /// No decisive result: the board filled up (draw).
    #[default]
    None = 0,
    /// A player completed a winning line.
    PlayerWin = 1,
    /// A player dropped; the survivor wins.
    PlayerDisconnect = 2,
    /// Reserved.
    Other = 3,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FinishReason::None => "draw",
            FinishReason::PlayerWin => "player win",
            FinishReason::PlayerDisconnect => "player disconnect",
            FinishReason::Other => "other",
        };
        f.write_str(label)
    }
}

/// Terminal result of a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Why the match ended.
    pub reason: FinishReason,
    /// Winner, absent for a draw.
    pub winner: Option<PlayerId>,
    /// Winning line, present for `PlayerWin`.
    pub line: Option<WinLine>,
}

/// Result of a successfully applied move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveApplied {
    /// The move as recorded in history.
    pub mv: Move,
    /// Board snapshot after the move was committed.
    pub board: BoardState,
    /// Present when this move ended the match.
    pub finished: Option<MatchOutcome>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Rejected start / settings problems.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Board size or win length out of range.
    #[error("invalid settings: board size {board_size}, win length {win_length}")]
    InvalidSettings {
        /// Requested side length.
        board_size: u8,
        /// Requested win length.
        win_length: u8,
    },

    /// A match needs exactly two players.
    #[error("expected exactly 2 players, got {0}")]
    PlayerCount(usize),

    /// The two player ids must differ.
    #[error("duplicate player id {0}")]
    DuplicatePlayer(PlayerId),

    /// Start requested while a match is already running.
    #[error("match already in progress")]
    MatchInProgress,
}

/// Rejected moves. None of these mutate any state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MoveError {
    /// No match has been started.
    #[error("no match in progress")]
    NotStarted,

    /// The match already ended.
    #[error("match already finished")]
    MatchFinished,

    /// Sender is not the acting player.
    #[error("not your turn")]
    NotYourTurn,

    /// Square outside the board.
    #[error("square {0} is out of bounds")]
    OutOfBounds(Position),

    /// Square already taken.
    #[error("square {0} is already occupied")]
    SquareOccupied(Position),
}

// =============================================================================
// ENGINE
// =============================================================================

/// Authoritative match state: board, move history, turn owner, outcome.
///
/// `waiting-for-players -> in-progress -> finished`; `start` is also accepted
/// from `finished` for rematches. The first roster entry passed to `start`
/// (the room owner) always moves first; the turn owner is
/// `players[ply % 2]`.
#[derive(Debug)]
pub struct MatchEngine {
    phase: MatchPhase,
    players: [(PlayerId, Piece); 2],
    board: Option<BoardState>,
    moves: Vec<Move>,
    outcome: Option<MatchOutcome>,
}

impl MatchEngine {
    /// Create an engine with no match running.
    pub fn new() -> Self {
        Self {
            phase: MatchPhase::WaitingForPlayers,
            players: [(PlayerId::NONE, Piece::Empty); 2],
            board: None,
            moves: Vec::new(),
            outcome: None,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Board snapshot, present once a match has started.
    pub fn board(&self) -> Option<&BoardState> {
        self.board.as_ref()
    }

    /// Moves applied to the current match, in order.
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// Terminal outcome, present once finished.
    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    /// Player whose turn it is, while a match is in progress.
    pub fn acting_player(&self) -> Option<PlayerId> {
        if self.phase == MatchPhase::InProgress {
            self.board.as_ref().map(|b| b.acting_player)
        } else {
            None
        }
    }

    /// Start (or restart, after a finish) a match. Requires exactly two
    /// distinct players and in-range settings. The first entry moves first.
    /// `round` is the room's completed-match counter, echoed in snapshots.
    /// Returns the initial (empty) board snapshot.
    pub fn start(
        &mut self,
        players: &[(PlayerId, Piece)],
        settings: GameSettings,
        round: u16,
    ) -> Result<BoardState, ConfigError> {
        if self.phase == MatchPhase::InProgress {
            return Err(ConfigError::MatchInProgress);
        }
        if !settings.is_valid() {
            return Err(ConfigError::InvalidSettings {
                board_size: settings.board_size,
                win_length: settings.win_length,
            });
        }
        if players.len() != 2 {
            return Err(ConfigError::PlayerCount(players.len()));
        }
        if players[0].0 == players[1].0 {
            return Err(ConfigError::DuplicatePlayer(players[0].0));
        }

        self.players = [players[0], players[1]];
        let mut board = BoardState::new(settings);
        board.round = round;
        board.acting_player = self.players[0].0;
        self.board = Some(board.clone());
        self.moves.clear();
        self.outcome = None;
        self.phase = MatchPhase::InProgress;

        Ok(board)
    }

    /// Apply one move for `player` at `pos`. On success the square is
    /// claimed, the move recorded, and the win validator consulted; a win or
    /// a full board finishes the match, otherwise the turn flips. Every
    /// error leaves the board untouched.
    pub fn apply_move(
        &mut self,
        player: PlayerId,
        pos: Position,
    ) -> Result<MoveApplied, MoveError> {
        match self.phase {
            MatchPhase::WaitingForPlayers => return Err(MoveError::NotStarted),
            MatchPhase::Finished => return Err(MoveError::MatchFinished),
            MatchPhase::InProgress => {}
        }
        let board = match self.board.as_mut() {
            Some(board) => board,
            None => return Err(MoveError::NotStarted),
        };

        if board.acting_player != player {
            return Err(MoveError::NotYourTurn);
        }
        let square = board.get(pos).ok_or(MoveError::OutOfBounds(pos))?;
        if !square.is_empty() {
            return Err(MoveError::SquareOccupied(pos));
        }

        let piece = match self.players.iter().find(|(id, _)| *id == player) {
            Some((_, piece)) => *piece,
            None => return Err(MoveError::NotYourTurn),
        };

        let mv = Move {
            piece,
            player,
            ply: board.ply,
            pos,
        };
        board.set_square(
            pos,
            BoardSquare {
                piece,
                owner: player,
                ply: board.ply,
            },
        );
        board.ply += 1;
        self.moves.push(mv);

        let finished = if let Some(line) = check_win(board, pos) {
            Some(MatchOutcome {
                reason: FinishReason::PlayerWin,
                winner: Some(player),
                line: Some(line),
            })
        } else if board.is_full() {
            Some(MatchOutcome {
                reason: FinishReason::None,
                winner: None,
                line: None,
            })
        } else {
            None
        };

        match &finished {
            Some(outcome) => {
                board.acting_player = PlayerId::NONE;
                self.outcome = Some(outcome.clone());
                self.phase = MatchPhase::Finished;
            }
            None => {
                let next = self.players[board.ply as usize % 2].0;
                board.acting_player = next;
            }
        }

        Ok(MoveApplied {
            mv,
            board: board.clone(),
            finished,
        })
    }

    /// Forfeit on behalf of `player`: the other player wins with the given
    /// reason. Only acts on an in-progress match for a known player; any
    /// other call is a no-op returning `None`, so a disconnect notification
    /// racing a just-completed match stays harmless.
    pub fn forfeit(&mut self, player: PlayerId, reason: FinishReason) -> Option<MatchOutcome> {
        if self.phase != MatchPhase::InProgress {
            return None;
        }
        if !self.players.iter().any(|(id, _)| *id == player) {
            return None;
        }
        let (winner, _) = *self.players.iter().find(|(id, _)| *id != player)?;

        if let Some(board) = self.board.as_mut() {
            board.acting_player = PlayerId::NONE;
        }
        let outcome = MatchOutcome {
            reason,
            winner: Some(winner),
            line: None,
        };
        self.outcome = Some(outcome.clone());
        self.phase = MatchPhase::Finished;
        Some(outcome)
    }

    /// Drop any current match and return to waiting-for-players.
    pub fn reset(&mut self) {
        self.phase = MatchPhase::WaitingForPlayers;
        self.board = None;
        self.moves.clear();
        self.outcome = None;
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PlayerId = PlayerId::new(1);
    const B: PlayerId = PlayerId::new(2);

    fn started_engine() -> MatchEngine {
        let mut engine = MatchEngine::new();
        engine
            .start(
                &[(A, Piece::Cross), (B, Piece::Circle)],
                GameSettings::default(),
                0,
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_start_requires_two_distinct_players() {
        let mut engine = MatchEngine::new();
        let settings = GameSettings::default();

        let err = engine.start(&[(A, Piece::Cross)], settings, 0).unwrap_err();
        assert_eq!(err, ConfigError::PlayerCount(1));

        let err = engine
            .start(&[(A, Piece::Cross), (A, Piece::Circle)], settings, 0)
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicatePlayer(A));

        assert_eq!(engine.phase(), MatchPhase::WaitingForPlayers);
    }

    #[test]
    fn test_start_rejects_invalid_settings() {
        let mut engine = MatchEngine::new();
        let players = [(A, Piece::Cross), (B, Piece::Circle)];

        for settings in [
            GameSettings { board_size: 0, win_length: 1 },
            GameSettings { board_size: 33, win_length: 3 },
            GameSettings { board_size: 3, win_length: 4 },
            GameSettings { board_size: 3, win_length: 0 },
        ] {
            assert!(matches!(
                engine.start(&players, settings, 0),
                Err(ConfigError::InvalidSettings { .. })
            ));
        }
    }

    #[test]
    fn test_start_rejected_while_in_progress() {
        let mut engine = started_engine();
        let err = engine
            .start(
                &[(A, Piece::Cross), (B, Piece::Circle)],
                GameSettings::default(),
                0,
            )
            .unwrap_err();
        assert_eq!(err, ConfigError::MatchInProgress);
    }

    #[test]
    fn test_first_roster_entry_moves_first() {
        let engine = started_engine();
        assert_eq!(engine.acting_player(), Some(A));
    }

    #[test]
    fn test_column_win_scenario() {
        let mut engine = started_engine();

        assert!(engine.apply_move(A, Position::new(0, 0)).unwrap().finished.is_none());
        assert!(engine.apply_move(B, Position::new(1, 0)).unwrap().finished.is_none());
        assert!(engine.apply_move(A, Position::new(0, 1)).unwrap().finished.is_none());
        assert!(engine.apply_move(B, Position::new(1, 1)).unwrap().finished.is_none());

        let applied = engine.apply_move(A, Position::new(0, 2)).unwrap();
        assert_eq!(applied.board.occupied_count(), 5);
        assert_eq!(applied.board.acting_player, PlayerId::NONE);
        let outcome = applied.finished.expect("third in a column should win");
        assert_eq!(outcome.reason, FinishReason::PlayerWin);
        assert_eq!(outcome.winner, Some(A));
        assert_eq!(
            outcome.line.unwrap().positions,
            vec![Position::new(0, 0), Position::new(0, 1), Position::new(0, 2)]
        );
        assert_eq!(engine.phase(), MatchPhase::Finished);
        assert_eq!(engine.moves().len(), 5);
    }

    #[test]
    fn test_not_your_turn_leaves_state_unchanged() {
        let mut engine = started_engine();
        let board_before = engine.board().unwrap().clone();

        let err = engine.apply_move(B, Position::new(0, 0)).unwrap_err();
        assert_eq!(err, MoveError::NotYourTurn);
        assert_eq!(engine.board().unwrap(), &board_before);
        assert!(engine.moves().is_empty());
    }

    #[test]
    fn test_occupied_square_rejected_unchanged() {
        let mut engine = started_engine();
        engine.apply_move(A, Position::new(1, 1)).unwrap();
        let board_before = engine.board().unwrap().clone();

        let err = engine.apply_move(B, Position::new(1, 1)).unwrap_err();
        assert_eq!(err, MoveError::SquareOccupied(Position::new(1, 1)));
        assert_eq!(engine.board().unwrap(), &board_before);
        assert_eq!(engine.moves().len(), 1);
        assert_eq!(engine.acting_player(), Some(B));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut engine = started_engine();
        let err = engine.apply_move(A, Position::new(5, 5)).unwrap_err();
        assert_eq!(err, MoveError::OutOfBounds(Position::new(5, 5)));
        assert_eq!(engine.board().unwrap().occupied_count(), 0);
    }

    #[test]
    fn test_move_before_start_and_after_finish() {
        let mut engine = MatchEngine::new();
        assert_eq!(
            engine.apply_move(A, Position::new(0, 0)).unwrap_err(),
            MoveError::NotStarted
        );

        let mut engine = started_engine();
        engine.forfeit(B, FinishReason::PlayerDisconnect);
        assert_eq!(
            engine.apply_move(A, Position::new(0, 0)).unwrap_err(),
            MoveError::MatchFinished
        );
    }

    #[test]
    fn test_draw_on_full_board() {
        let mut engine = started_engine();
        // Alternating sequence that fills 3x3 without any 3-line.
        let sequence = [
            (A, 0, 0), (B, 1, 0), (A, 2, 0),
            (B, 1, 1), (A, 0, 1), (B, 2, 1),
            (A, 1, 2), (B, 0, 2), (A, 2, 2),
        ];

        let mut last = None;
        for (player, x, y) in sequence {
            last = Some(engine.apply_move(player, Position::new(x, y)).unwrap());
        }

        let outcome = last.unwrap().finished.expect("full board should finish");
        assert_eq!(outcome.reason, FinishReason::None);
        assert_eq!(outcome.winner, None);
        assert_eq!(outcome.line, None);
        assert_eq!(engine.phase(), MatchPhase::Finished);
    }

    #[test]
    fn test_forfeit_awards_other_player() {
        let mut engine = started_engine();
        let outcome = engine.forfeit(A, FinishReason::PlayerDisconnect).unwrap();
        assert_eq!(outcome.reason, FinishReason::PlayerDisconnect);
        assert_eq!(outcome.winner, Some(B));
        assert_eq!(engine.phase(), MatchPhase::Finished);
    }

    #[test]
    fn test_forfeit_is_idempotent() {
        let mut engine = started_engine();
        assert!(engine.forfeit(B, FinishReason::PlayerDisconnect).is_some());
        assert!(engine.forfeit(B, FinishReason::PlayerDisconnect).is_none());
        assert!(engine.forfeit(A, FinishReason::PlayerDisconnect).is_none());

        let outcome = engine.outcome().unwrap();
        assert_eq!(outcome.winner, Some(A));
    }

    #[test]
    fn test_forfeit_ignores_unknown_player_and_waiting_phase() {
        let mut engine = MatchEngine::new();
        assert!(engine.forfeit(A, FinishReason::PlayerDisconnect).is_none());

        let mut engine = started_engine();
        assert!(engine.forfeit(PlayerId::new(9), FinishReason::PlayerDisconnect).is_none());
        assert_eq!(engine.phase(), MatchPhase::InProgress);
    }

    #[test]
    fn test_rematch_after_finish() {
        let mut engine = started_engine();
        engine.forfeit(A, FinishReason::PlayerDisconnect);

        let snapshot = engine
            .start(
                &[(A, Piece::Cross), (B, Piece::Circle)],
                GameSettings { board_size: 5, win_length: 4 },
                1,
            )
            .unwrap();
        assert_eq!(snapshot.occupied_count(), 0);
        assert_eq!(snapshot.acting_player, A);
        let board = engine.board().unwrap();
        assert_eq!(board.round, 1);
        assert_eq!(board.side(), 5);
        assert_eq!(engine.phase(), MatchPhase::InProgress);
        assert!(engine.moves().is_empty());
        assert!(engine.outcome().is_none());
    }

    #[test]
    fn test_reset_returns_to_waiting() {
        let mut engine = started_engine();
        engine.apply_move(A, Position::new(0, 0)).unwrap();
        engine.reset();
        assert_eq!(engine.phase(), MatchPhase::WaitingForPlayers);
        assert!(engine.board().is_none());
        assert!(engine.moves().is_empty());
    }

    #[test]
    fn test_random_playouts_always_terminate() {
        use rand::seq::SliceRandom;

        let mut rng = rand::thread_rng();
        let settings = GameSettings { board_size: 5, win_length: 4 };

        for _ in 0..50 {
            let mut engine = MatchEngine::new();
            engine
                .start(&[(A, Piece::Cross), (B, Piece::Circle)], settings, 0)
                .unwrap();

            let mut squares: Vec<Position> = (0u8..5)
                .flat_map(|y| (0u8..5).map(move |x| Position::new(x, y)))
                .collect();
            squares.shuffle(&mut rng);

            let mut finished = None;
            for (i, pos) in squares.iter().enumerate() {
                let player = if i % 2 == 0 { A } else { B };
                let applied = engine.apply_move(player, *pos).unwrap();
                if applied.finished.is_some() {
                    finished = applied.finished;
                    break;
                }
            }

            let outcome = finished.expect("a filled board always resolves");
            match outcome.reason {
                FinishReason::PlayerWin => {
                    assert!(outcome.winner.is_some());
                    assert!(outcome.line.is_some());
                }
                FinishReason::None => {
                    assert_eq!(engine.board().unwrap().occupied_count(), 25);
                }
                other => panic!("unexpected finish reason: {other}"),
            }
            assert_eq!(engine.phase(), MatchPhase::Finished);
        }
    }
}
