//! Network Layer
//!
//! Length-prefixed TCP protocol plus the server and client endpoints.
//! This layer is transport and bookkeeping only - all game logic runs
//! through `game/`.

pub mod client;
pub mod codec;
pub mod protocol;
pub mod server;
pub mod session;

pub use client::{ClientError, ClientState, ConnectionPhase, GameClient, GamePhase};
pub use codec::{encode_packet, CodecError, FrameDecoder, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use protocol::{Packet, PacketType, PROTOCOL_VERSION};
pub use server::{GameServer, GameServerError, ServerConfig, DEFAULT_PORT};
pub use session::{GameRoom, RoomError, RoomId, RoomManager, ROOM_CAPACITY};
