//! # Gridline Game Server
//!
//! Authoritative LAN server and headless client for two-player generalized
//! tic-tac-toe: an `N x N` board, first contiguous run of `W` in a row,
//! column, or diagonal wins.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    GRIDLINE SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Match logic (pure, no I/O)                │
//! │  ├── board.rs    - Board, pieces, players, settings          │
//! │  ├── win.rs      - Win/draw detection scans                  │
//! │  └── engine.rs   - Authoritative match state machine         │
//! │                                                              │
//! │  network/        - Networking (TCP, length-prefixed frames)  │
//! │  ├── protocol.rs - Packet types and payloads                 │
//! │  ├── codec.rs    - Frame encoding and restartable decoding   │
//! │  ├── session.rs  - Rooms, rosters, ownership                 │
//! │  ├── server.rs   - TCP server and connection lifecycle       │
//! │  └── client.rs   - Headless client for host applications     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority Model
//!
//! The server is the single source of truth. Clients send *requests*
//! (moves, settings, starts) and mirror whatever the server commits and
//! broadcasts back:
//! - Every board announcement is a **full snapshot**, never a delta, so a
//!   client that missed a frame heals on the next one.
//! - Invalid requests are dropped server-side with at most a unicast
//!   re-sync to the offender. The rest of the room never hears about them.
//! - Turn order, win detection, scorekeeping, and room ownership are
//!   decided exclusively in `game/` and `network/session.rs`.
//!
//! Both endpoints live in this crate, so a host application can embed the
//! server and a client in the same process and play over loopback.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::board::{BoardState, GameSettings, Move, Piece, PlayerId, PlayerProfile, Position};
pub use game::engine::{FinishReason, MatchEngine, MatchOutcome};
pub use game::win::WinLine;
pub use network::client::{ClientState, ConnectionPhase, GameClient, GamePhase};
pub use network::server::{GameServer, ServerConfig, DEFAULT_PORT};
pub use network::session::RoomManager;
pub use network::protocol::PROTOCOL_VERSION;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
