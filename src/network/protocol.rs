//! Protocol Messages
//!
//! The closed packet set spoken between session server and session client.
//! Payloads are serialized with bincode; framing (header, length limits)
//! lives in [`crate::network::codec`].

use serde::{Deserialize, Serialize};

use crate::game::board::{BoardState, GameSettings, Move, Piece, PlayerId, PlayerProfile, Position};
use crate::game::engine::FinishReason;
use crate::game::win::WinLine;

/// Protocol revision spoken by this build. Mismatched peers are rejected
/// during the hello exchange.
pub const PROTOCOL_VERSION: u16 = 1;

// =============================================================================
// PACKET TYPES
// =============================================================================

/// Wire discriminant for each packet, fixed for protocol stability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    /// Server greets a new connection and assigns its player id.
    ServerHello = 0,
    /// Client answers the hello with its name.
    SetupReq = 1,
    /// Server confirms setup with a roster snapshot.
    SetupAck = 2,
    /// A player joined the room.
    NewPlayerJoin = 3,
    /// A player left the room.
    PlayerDisconnected = 4,
    /// Owner asks for new match settings.
    SettingsChangeReq = 5,
    /// Server announces accepted settings.
    SettingsUpdate = 6,
    /// Owner asks to start a match.
    GameStartRequest = 7,
    /// Server starts a match with the initial board.
    GameStart = 8,
    /// Player claims a square.
    MoveRequest = 9,
    /// Server broadcasts the committed board.
    BoardStateUpdate = 10,
    /// Server announces the match result.
    GameEnd = 11,
    /// Owner returns the room to the waiting state.
    BackToGameRoom = 12,
}

impl PacketType {
    /// Parse a wire discriminant. `None` for unknown values.
    pub fn from_u8(raw: u8) -> Option<PacketType> {
        match raw {
            0 => Some(PacketType::ServerHello),
            1 => Some(PacketType::SetupReq),
            2 => Some(PacketType::SetupAck),
            3 => Some(PacketType::NewPlayerJoin),
            4 => Some(PacketType::PlayerDisconnected),
            5 => Some(PacketType::SettingsChangeReq),
            6 => Some(PacketType::SettingsUpdate),
            7 => Some(PacketType::GameStartRequest),
            8 => Some(PacketType::GameStart),
            9 => Some(PacketType::MoveRequest),
            10 => Some(PacketType::BoardStateUpdate),
            11 => Some(PacketType::GameEnd),
            12 => Some(PacketType::BackToGameRoom),
            _ => None,
        }
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// First packet on every connection, server to client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    /// Server's protocol revision; the client closes on mismatch.
    pub protocol_version: u16,
    /// Id assigned to this connection.
    pub player_id: PlayerId,
}

/// Client's reply to the hello.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupReq {
    /// Client's protocol revision; the server closes on mismatch.
    pub protocol_version: u16,
    /// Requested display name (server-sanitized).
    pub player_name: String,
}

/// Setup confirmation carrying the full room snapshot.
///
/// Room ownership is decided by the server from join order, never claimed
/// by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupAck {
    /// The receiver's id (matches the hello).
    pub player_id: PlayerId,
    /// Symbol assigned to the receiver.
    pub piece: Piece,
    /// Current room owner.
    pub host_id: PlayerId,
    /// Current match settings.
    pub settings: GameSettings,
    /// Matches completed in this room.
    pub round: u16,
    /// Everyone in the room, the receiver included.
    pub players: Vec<PlayerProfile>,
}

/// Broadcast when a player joins; receivers upsert by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlayerJoin {
    /// The joining player.
    pub player: PlayerProfile,
}

/// Broadcast when a player leaves; receivers drop the roster entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDisconnected {
    /// The departed player.
    pub player_id: PlayerId,
}

/// Owner's request to change match settings. The server validates and
/// clamps before anything is announced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsChangeReq {
    /// Requested board size and win length.
    pub settings: GameSettings,
}

/// Broadcast only when a settings request actually changed something.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    /// The now-authoritative settings.
    pub settings: GameSettings,
}

/// Owner's request to start a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStartRequest {
    /// Reset the room scoreboard before starting (fresh series) instead of
    /// keeping win counts (rematch).
    pub new_game: bool,
}

/// Match start announcement with the initial board snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStart {
    /// Who requested the start (the owner).
    pub started_by: PlayerId,
    /// Who moves first.
    pub starting_player: PlayerId,
    /// Full empty board, including settings and round counter.
    pub board: BoardState,
    /// Roster at match start.
    pub players: Vec<PlayerProfile>,
}

/// Claim a square. Carries only the square: the server alone knows whose
/// turn it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Requested square.
    pub pos: Position,
}

/// Full committed board state, broadcast after every applied move and
/// unicast to re-sync a client whose request was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardStateUpdate {
    /// Full board snapshot (never a delta).
    pub board: BoardState,
    /// The move that produced this state, if any move has been made.
    pub last_move: Option<Move>,
    /// Roster with current win counts.
    pub players: Vec<PlayerProfile>,
}

/// Match result announcement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEnd {
    /// Why the match ended. A draw is `FinishReason::None` with no winner.
    pub reason: FinishReason,
    /// Winner profile with its updated win count, when there is one.
    pub winner: Option<PlayerProfile>,
    /// Winning line for display, present on `PlayerWin`.
    pub line: Option<WinLine>,
}

// =============================================================================
// PACKET ENVELOPE
// =============================================================================

/// Any packet, client- or server-originated. The wire discriminant lives in
/// the frame header, not in the payload encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    /// See [`ServerHello`].
    ServerHello(ServerHello),
    /// See [`SetupReq`].
    SetupReq(SetupReq),
    /// See [`SetupAck`].
    SetupAck(SetupAck),
    /// See [`NewPlayerJoin`].
    NewPlayerJoin(NewPlayerJoin),
    /// See [`PlayerDisconnected`].
    PlayerDisconnected(PlayerDisconnected),
    /// See [`SettingsChangeReq`].
    SettingsChangeReq(SettingsChangeReq),
    /// See [`SettingsUpdate`].
    SettingsUpdate(SettingsUpdate),
    /// See [`GameStartRequest`].
    GameStartRequest(GameStartRequest),
    /// See [`GameStart`].
    GameStart(GameStart),
    /// See [`MoveRequest`].
    MoveRequest(MoveRequest),
    /// See [`BoardStateUpdate`].
    BoardStateUpdate(BoardStateUpdate),
    /// See [`GameEnd`].
    GameEnd(GameEnd),
    /// Return to the waiting room; no payload.
    BackToGameRoom,
}

impl Packet {
    /// The wire discriminant for this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::ServerHello(_) => PacketType::ServerHello,
            Packet::SetupReq(_) => PacketType::SetupReq,
            Packet::SetupAck(_) => PacketType::SetupAck,
            Packet::NewPlayerJoin(_) => PacketType::NewPlayerJoin,
            Packet::PlayerDisconnected(_) => PacketType::PlayerDisconnected,
            Packet::SettingsChangeReq(_) => PacketType::SettingsChangeReq,
            Packet::SettingsUpdate(_) => PacketType::SettingsUpdate,
            Packet::GameStartRequest(_) => PacketType::GameStartRequest,
            Packet::GameStart(_) => PacketType::GameStart,
            Packet::MoveRequest(_) => PacketType::MoveRequest,
            Packet::BoardStateUpdate(_) => PacketType::BoardStateUpdate,
            Packet::GameEnd(_) => PacketType::GameEnd,
            Packet::BackToGameRoom => PacketType::BackToGameRoom,
        }
    }

    /// Serialize just the payload (header excluded).
    pub fn payload_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        match self {
            Packet::ServerHello(p) => bincode::serialize(p),
            Packet::SetupReq(p) => bincode::serialize(p),
            Packet::SetupAck(p) => bincode::serialize(p),
            Packet::NewPlayerJoin(p) => bincode::serialize(p),
            Packet::PlayerDisconnected(p) => bincode::serialize(p),
            Packet::SettingsChangeReq(p) => bincode::serialize(p),
            Packet::SettingsUpdate(p) => bincode::serialize(p),
            Packet::GameStartRequest(p) => bincode::serialize(p),
            Packet::GameStart(p) => bincode::serialize(p),
            Packet::MoveRequest(p) => bincode::serialize(p),
            Packet::BoardStateUpdate(p) => bincode::serialize(p),
            Packet::GameEnd(p) => bincode::serialize(p),
            Packet::BackToGameRoom => Ok(Vec::new()),
        }
    }

    /// Deserialize a payload for a known discriminant.
    pub fn from_payload(kind: PacketType, payload: &[u8]) -> Result<Packet, bincode::Error> {
        Ok(match kind {
            PacketType::ServerHello => Packet::ServerHello(bincode::deserialize(payload)?),
            PacketType::SetupReq => Packet::SetupReq(bincode::deserialize(payload)?),
            PacketType::SetupAck => Packet::SetupAck(bincode::deserialize(payload)?),
            PacketType::NewPlayerJoin => Packet::NewPlayerJoin(bincode::deserialize(payload)?),
            PacketType::PlayerDisconnected => {
                Packet::PlayerDisconnected(bincode::deserialize(payload)?)
            }
            PacketType::SettingsChangeReq => {
                Packet::SettingsChangeReq(bincode::deserialize(payload)?)
            }
            PacketType::SettingsUpdate => Packet::SettingsUpdate(bincode::deserialize(payload)?),
            PacketType::GameStartRequest => {
                Packet::GameStartRequest(bincode::deserialize(payload)?)
            }
            PacketType::GameStart => Packet::GameStart(bincode::deserialize(payload)?),
            PacketType::MoveRequest => Packet::MoveRequest(bincode::deserialize(payload)?),
            PacketType::BoardStateUpdate => {
                Packet::BoardStateUpdate(bincode::deserialize(payload)?)
            }
            PacketType::GameEnd => Packet::GameEnd(bincode::deserialize(payload)?),
            PacketType::BackToGameRoom => Packet::BackToGameRoom,
        })
    }
}
