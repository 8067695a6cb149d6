//! Game Logic Module
//!
//! Pure, synchronous match logic. No I/O: the network layer feeds validated
//! packets in and broadcasts whatever these types commit.
//!
//! ## Module Structure
//!
//! - `board`: Board, piece, and player data model
//! - `win`: Win/draw detection scans
//! - `engine`: Authoritative match state machine

pub mod board;
pub mod engine;
pub mod win;

// Re-export key types
pub use board::{
    BoardSquare, BoardState, GameSettings, Move, Piece, PlayerId, PlayerProfile, Position,
};
pub use engine::{ConfigError, FinishReason, MatchEngine, MatchOutcome, MatchPhase, MoveError};
pub use win::{check_win, scan_board, BoardVerdict, WinLine};
