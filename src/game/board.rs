//! Board and Player Data Model
//!
//! Plain state types shared by the engine, the session layer, and the wire
//! protocol. Squares are only ever written through the match engine.

use serde::{Deserialize, Serialize};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum board side length.
pub const MAX_BOARD_SIZE: u8 = 32;

/// Maximum win-condition length.
pub const MAX_WIN_LENGTH: u8 = 32;

/// Default board side length for a fresh room.
pub const DEFAULT_BOARD_SIZE: u8 = 3;

/// Default win-condition length for a fresh room.
pub const DEFAULT_WIN_LENGTH: u8 = 3;

/// Maximum display-name length in bytes.
pub const MAX_NAME_LENGTH: usize = 31;

/// Fallback display name for blank requests.
pub const DEFAULT_PLAYER_NAME: &str = "Player";

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier, assigned by the server.
///
/// Ids start at 1 and are never reused for the lifetime of a server
/// instance; 0 means "no player" (empty squares, unassigned turn).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u8);

impl PlayerId {
    /// The reserved "no player" id.
    pub const NONE: PlayerId = PlayerId(0);

    /// Create from a raw id.
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Whether this id refers to an actual player.
    pub fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// PIECE SYMBOLS
// =============================================================================

/// Piece symbols, assigned to players in pool order (`Cross` first).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Piece {
    /// Unoccupied square sentinel.
    #[default]
    Empty = 0,
    /// First player symbol.
    Cross = 1,
    /// Second player symbol.
    Circle = 2,
    /// Reserve symbol.
    Triangle = 3,
    /// Reserve symbol.
    Square = 4,
    /// Reserve symbol.
    Octagon = 5,
    /// Reserve symbol.
    Hexagon = 6,
}

/// Assignable symbols in hand-out order.
pub const SYMBOL_POOL: [Piece; 6] = [
    Piece::Cross,
    Piece::Circle,
    Piece::Triangle,
    Piece::Square,
    Piece::Octagon,
    Piece::Hexagon,
];

impl Piece {
    /// Whether the piece marks an occupied square.
    #[inline]
    pub fn is_empty(self) -> bool {
        self == Piece::Empty
    }

    /// Short label for logs.
    pub fn label(self) -> &'static str {
        match self {
            Piece::Empty => "empty",
            Piece::Cross => "cross",
            Piece::Circle => "circle",
            Piece::Triangle => "triangle",
            Piece::Square => "square",
            Piece::Octagon => "octagon",
            Piece::Hexagon => "hexagon",
        }
    }
}

// =============================================================================
// POSITIONS AND SQUARES
// =============================================================================

/// A board coordinate: `x` is the column, `y` the row, both from 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
}

impl Position {
    /// Create a position.
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One cell of the board. Immutable once occupied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSquare {
    /// Occupying symbol, `Empty` if free.
    pub piece: Piece,
    /// Owning player, `PlayerId::NONE` if free.
    pub owner: PlayerId,
    /// Ply index at which the square was taken.
    pub ply: u16,
}

impl BoardSquare {
    /// Whether the square is still free.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.piece.is_empty()
    }
}

/// An applied move, kept in per-match history and echoed on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    /// Symbol placed.
    pub piece: Piece,
    /// Acting player.
    pub player: PlayerId,
    /// Ply index, from 0.
    pub ply: u16,
    /// Claimed square.
    pub pos: Position,
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Room-negotiable match settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    /// Board side length N.
    pub board_size: u8,
    /// Win-condition length W.
    pub win_length: u8,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
            win_length: DEFAULT_WIN_LENGTH,
        }
    }
}

impl GameSettings {
    /// Whether the pair satisfies `0 < W <= N <= MAX_BOARD_SIZE`.
    pub fn is_valid(&self) -> bool {
        self.board_size > 0
            && self.board_size <= MAX_BOARD_SIZE
            && self.win_length > 0
            && self.win_length <= self.board_size
            && self.win_length <= MAX_WIN_LENGTH
    }

    /// Apply a change request field by field, clamping the stored win length
    /// to the (possibly new) board size. Out-of-range fields are dropped
    /// rather than failing the whole request. Returns true if anything
    /// actually changed.
    pub fn apply_request(&mut self, requested: GameSettings) -> bool {
        let mut changed = false;

        if requested.board_size > 0
            && requested.board_size <= MAX_BOARD_SIZE
            && requested.board_size != self.board_size
        {
            self.board_size = requested.board_size;
            if self.win_length > self.board_size {
                self.win_length = self.board_size;
            }
            changed = true;
        }

        if requested.win_length > 0
            && requested.win_length <= self.board_size
            && requested.win_length != self.win_length
        {
            self.win_length = requested.win_length;
            changed = true;
        }

        changed
    }
}

// =============================================================================
// PLAYER PROFILE
// =============================================================================

/// A roster entry: everything the room and its clients know about a player.
///
/// Win counts persist across rematches within a room until a "new game"
/// start resets the scoreboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Server-assigned id.
    pub id: PlayerId,
    /// Display name, at most [`MAX_NAME_LENGTH`] bytes.
    pub name: String,
    /// Assigned symbol.
    pub piece: Piece,
    /// Matches won in this room.
    pub wins: u32,
    /// Whether this player owns the room.
    pub is_host: bool,
}

/// Trim and bound a requested display name, falling back to
/// [`DEFAULT_PLAYER_NAME`] for blank input.
pub fn sanitize_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let base = if trimmed.is_empty() {
        DEFAULT_PLAYER_NAME
    } else {
        trimmed
    };

    let mut name = String::new();
    for ch in base.chars() {
        if name.len() + ch.len_utf8() > MAX_NAME_LENGTH {
            break;
        }
        name.push(ch);
    }
    name
}

// =============================================================================
// BOARD STATE
// =============================================================================

/// The full board snapshot carried by `GameStart` and `BoardStateUpdate`.
///
/// Invariant: exactly the squares claimed by applied moves are non-empty.
/// Squares are written only by the match engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardState {
    /// Settings the board was built with.
    pub settings: GameSettings,
    /// Completed matches in this room before the current one.
    pub round: u16,
    /// Moves applied to this board so far.
    pub ply: u16,
    /// Player whose turn it is, `NONE` before a match starts.
    pub acting_player: PlayerId,
    /// Row-major `N * N` squares.
    squares: Vec<BoardSquare>,
}

impl BoardState {
    /// Create an empty board for the given settings.
    pub fn new(settings: GameSettings) -> Self {
        let side = settings.board_size as usize;
        Self {
            settings,
            round: 0,
            ply: 0,
            acting_player: PlayerId::NONE,
            squares: vec![BoardSquare::default(); side * side],
        }
    }

    /// Board side length N.
    #[inline]
    pub fn side(&self) -> u8 {
        self.settings.board_size
    }

    /// Whether signed coordinates fall on the board.
    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        let side = self.side() as i32;
        x >= 0 && x < side && y >= 0 && y < side
    }

    /// Square at a position known to be in bounds.
    #[inline]
    pub fn square_at(&self, pos: Position) -> BoardSquare {
        self.squares[self.index_of(pos)]
    }

    /// Square at a possibly out-of-range position.
    pub fn get(&self, pos: Position) -> Option<BoardSquare> {
        if self.in_bounds(pos.x as i32, pos.y as i32) {
            Some(self.square_at(pos))
        } else {
            None
        }
    }

    /// Number of occupied squares.
    pub fn occupied_count(&self) -> usize {
        self.squares.iter().filter(|s| !s.is_empty()).count()
    }

    /// Whether every square is occupied.
    pub fn is_full(&self) -> bool {
        self.squares.iter().all(|s| !s.is_empty())
    }

    /// Iterate all positions in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        let side = self.side();
        (0..side).flat_map(move |y| (0..side).map(move |x| Position::new(x, y)))
    }

    /// Structural checks for boards received off the wire: settings in
    /// range, square count matching the declared side, occupancy matching
    /// the declared ply. Rejecting malformed snapshots here keeps the
    /// indexing accessors panic-free.
    pub fn is_well_formed(&self) -> bool {
        let side = self.side() as usize;
        self.settings.is_valid()
            && self.squares.len() == side * side
            && self.occupied_count() == self.ply as usize
    }

    pub(crate) fn set_square(&mut self, pos: Position, square: BoardSquare) {
        let idx = self.index_of(pos);
        self.squares[idx] = square;
    }

    #[inline]
    fn index_of(&self, pos: Position) -> usize {
        pos.y as usize * self.side() as usize + pos.x as usize
    }
}
