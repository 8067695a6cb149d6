//! Headless game client.
//!
//! [`GameClient`] speaks the framed protocol of [`crate::network::codec`]
//! over a single TCP stream and mirrors the server's authoritative state.
//! It owns no rendering and no input loop: a host application drives it by
//! awaiting [`GameClient::next_packet`] and reacting to the accessors.
//!
//! Every state transition is driven by a received packet. Requests
//! ([`GameClient::send_move`], [`GameClient::request_settings`],
//! [`GameClient::request_start`], [`GameClient::request_back_to_room`]) are
//! speculative: the local mirror changes only when the server echoes the
//! effect back as a broadcast, so a rejected request simply changes nothing.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::game::board::{
    BoardState, GameSettings, Move, PlayerId, PlayerProfile, Position,
};
use crate::network::codec::{encode_packet, CodecError, FrameDecoder};
use crate::network::protocol::{
    GameEnd, GameStartRequest, MoveRequest, Packet, SettingsChangeReq,
    SetupReq, PROTOCOL_VERSION,
};

// =============================================================================
// STATE MACHINES
// =============================================================================

/// Transport and handshake progress, independent of what is on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No usable transport.
    Disconnected,
    /// TCP is up; the server's hello has not arrived yet.
    AwaitingHello,
    /// Hello exchanged, setup request sent, confirmation pending.
    SetupInProgress,
    /// Setup confirmed; the client is a room member.
    Connected,
}

/// Which screen a host application should be showing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// Not in any room.
    Menu,
    /// In a room, no match on the board.
    GameRoom,
    /// A match is (or just was) on the board.
    Game,
}

/// Fine-grained match progress within [`ClientState::Game`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GamePhase {
    /// No match context, or it was just torn down.
    Unknown,
    /// In the room, waiting for the owner to start.
    WaitingRoom,
    /// Match live, local player to move.
    MyTurn,
    /// Match live, opponent to move.
    NotMyTurn,
    /// Match over; the result is in [`GameClient::last_result`].
    GameFinished,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Client-side failures. Transport loss is an error, never a panic; the
/// client resets to the menu before surfacing it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    /// Frame-level failure on the inbound stream.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The server closed the connection.
    #[error("server closed the connection")]
    ConnectionLost,
    /// The server speaks a different protocol revision.
    #[error("server speaks protocol {server}, this client speaks {client}")]
    ProtocolMismatch {
        /// Revision announced by the server.
        server: u16,
        /// Revision compiled into this client.
        client: u16,
    },
    /// A request was issued before setup completed.
    #[error("not connected to a room")]
    NotConnected,
}

const READ_BUFFER_SIZE: usize = 4096;

// =============================================================================
// CLIENT
// =============================================================================

/// Async client mirroring one player's view of a room.
pub struct GameClient {
    stream: Option<TcpStream>,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
    player_name: String,
    connection: ConnectionPhase,
    state: ClientState,
    phase: GamePhase,
    player_id: PlayerId,
    host_id: PlayerId,
    settings: GameSettings,
    round: u16,
    players: Vec<PlayerProfile>,
    board: Option<BoardState>,
    moves: Vec<Move>,
    last_result: Option<GameEnd>,
}

impl GameClient {
    /// Open a TCP connection to a game server.
    ///
    /// Only the transport is established here; the hello/setup exchange is
    /// driven by [`Self::next_packet`] (or [`Self::complete_setup`]).
    pub async fn connect(
        addr: SocketAddr,
        player_name: &str,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        debug!("connected to {}", addr);
        Ok(Self {
            stream: Some(stream),
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; READ_BUFFER_SIZE],
            player_name: player_name.to_string(),
            connection: ConnectionPhase::AwaitingHello,
            state: ClientState::Menu,
            phase: GamePhase::Unknown,
            player_id: PlayerId::NONE,
            host_id: PlayerId::NONE,
            settings: GameSettings::default(),
            round: 0,
            players: Vec::new(),
            board: None,
            moves: Vec::new(),
            last_result: None,
        })
    }

    /// Receive the next packet, apply its state transition, and return it.
    ///
    /// Unknown and malformed frames from the server are skipped with a log
    /// line; framing violations and transport loss reset the client to the
    /// menu and surface as errors.
    pub async fn next_packet(&mut self) -> Result<Packet, ClientError> {
        loop {
            match self.decoder.next_packet() {
                Ok(Some(packet)) => {
                    self.apply(&packet).await?;
                    return Ok(packet);
                }
                Ok(None) => {}
                Err(err) if err.is_fatal() => {
                    self.reset_to_menu();
                    return Err(err.into());
                }
                Err(err) => {
                    debug!("skipping bad frame from server: {}", err);
                    continue;
                }
            }

            let stream = match self.stream.as_mut() {
                Some(stream) => stream,
                None => return Err(ClientError::NotConnected),
            };
            match stream.read(&mut self.read_buf).await {
                Ok(0) => {
                    self.reset_to_menu();
                    return Err(ClientError::ConnectionLost);
                }
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(err) => {
                    self.reset_to_menu();
                    return Err(err.into());
                }
            }
        }
    }

    /// Drive the connection until the server's setup confirmation has been
    /// applied and the client is a room member.
    pub async fn complete_setup(&mut self) -> Result<(), ClientError> {
        while self.connection != ConnectionPhase::Connected {
            self.next_packet().await?;
        }
        Ok(())
    }

    /// Request to claim a square. Takes effect only when the server echoes
    /// a board snapshot containing the move.
    pub async fn send_move(&mut self, pos: Position) -> Result<(), ClientError> {
        self.ensure_connected()?;
        self.send_packet(&Packet::MoveRequest(MoveRequest { pos })).await
    }

    /// Ask the server to change the room's match settings (owner only).
    pub async fn request_settings(
        &mut self,
        settings: GameSettings,
    ) -> Result<(), ClientError> {
        self.ensure_connected()?;
        self.send_packet(&Packet::SettingsChangeReq(SettingsChangeReq {
            settings,
        }))
        .await
    }

    /// Ask the server to start a match (owner only). `new_game` resets the
    /// room scoreboard; a rematch keeps it.
    pub async fn request_start(&mut self, new_game: bool) -> Result<(), ClientError> {
        self.ensure_connected()?;
        self.send_packet(&Packet::GameStartRequest(GameStartRequest {
            new_game,
        }))
        .await
    }

    /// Ask the server to return the room to its waiting state (owner only,
    /// after a finished match).
    pub async fn request_back_to_room(&mut self) -> Result<(), ClientError> {
        self.ensure_connected()?;
        self.send_packet(&Packet::BackToGameRoom).await
    }

    /// Close the connection and reset to the menu.
    pub fn disconnect(&mut self) {
        self.reset_to_menu();
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Current transport/handshake phase.
    pub fn connection(&self) -> ConnectionPhase {
        self.connection
    }

    /// Current screen-level state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Current match phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Id the server assigned to this client.
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Current room owner.
    pub fn host_id(&self) -> PlayerId {
        self.host_id
    }

    /// Whether this client owns the room.
    pub fn is_host(&self) -> bool {
        self.player_id.is_some() && self.player_id == self.host_id
    }

    /// Whether it is the local player's turn.
    pub fn is_my_turn(&self) -> bool {
        self.phase == GamePhase::MyTurn
    }

    /// Roster as last announced by the server, in join order.
    pub fn players(&self) -> &[PlayerProfile] {
        &self.players
    }

    /// Settings as last announced by the server.
    pub fn settings(&self) -> GameSettings {
        self.settings
    }

    /// Completed matches in this room.
    pub fn round(&self) -> u16 {
        self.round
    }

    /// Board mirror, `None` outside a match.
    pub fn board(&self) -> Option<&BoardState> {
        self.board.as_ref()
    }

    /// Moves observed in the current match, oldest first.
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// Result of the last finished match, until the room resets.
    pub fn last_result(&self) -> Option<&GameEnd> {
        self.last_result.as_ref()
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Apply one received packet to the local mirror.
    async fn apply(&mut self, packet: &Packet) -> Result<(), ClientError> {
        match packet {
            Packet::ServerHello(hello) => {
                if hello.protocol_version != PROTOCOL_VERSION {
                    let err = ClientError::ProtocolMismatch {
                        server: hello.protocol_version,
                        client: PROTOCOL_VERSION,
                    };
                    self.reset_to_menu();
                    return Err(err);
                }
                self.player_id = hello.player_id;
                self.connection = ConnectionPhase::SetupInProgress;
                let request = Packet::SetupReq(SetupReq {
                    protocol_version: PROTOCOL_VERSION,
                    player_name: self.player_name.clone(),
                });
                self.send_packet(&request).await?;
            }
            Packet::SetupAck(ack) => {
                self.connection = ConnectionPhase::Connected;
                self.state = ClientState::GameRoom;
                self.phase = GamePhase::WaitingRoom;
                self.player_id = ack.player_id;
                self.host_id = ack.host_id;
                self.settings = ack.settings;
                self.round = ack.round;
                self.players = ack.players.clone();
            }
            Packet::NewPlayerJoin(join) => {
                self.upsert_player(join.player.clone());
            }
            Packet::PlayerDisconnected(gone) => {
                self.players.retain(|p| p.id != gone.player_id);
                self.refresh_host();
            }
            Packet::SettingsUpdate(update) => {
                self.settings = update.settings;
            }
            Packet::GameStart(start) => {
                if !start.board.is_well_formed() {
                    warn!("discarding malformed board in start announcement");
                    return Ok(());
                }
                self.state = ClientState::Game;
                self.settings = start.board.settings;
                self.round = start.board.round;
                self.players = start.players.clone();
                self.moves.clear();
                self.last_result = None;
                self.phase = self.turn_phase(start.board.acting_player);
                self.board = Some(start.board.clone());
            }
            Packet::BoardStateUpdate(update) => {
                if self.state != ClientState::Game {
                    debug!("ignoring board snapshot outside a match");
                    return Ok(());
                }
                if !update.board.is_well_formed() {
                    warn!("discarding malformed board snapshot");
                    return Ok(());
                }
                self.settings = update.board.settings;
                self.round = update.board.round;
                self.players = update.players.clone();
                if let Some(mv) = update.last_move {
                    if self.moves.last() != Some(&mv) {
                        self.moves.push(mv);
                    }
                }
                self.phase = self.turn_phase(update.board.acting_player);
                self.board = Some(update.board.clone());
            }
            Packet::GameEnd(end) => {
                self.phase = GamePhase::GameFinished;
                if let Some(winner) = &end.winner {
                    self.upsert_player(winner.clone());
                }
                self.last_result = Some(end.clone());
            }
            Packet::BackToGameRoom => {
                self.state = ClientState::GameRoom;
                self.phase = GamePhase::WaitingRoom;
                self.board = None;
                self.moves.clear();
                self.last_result = None;
            }
            other => {
                debug!("unexpected {:?} from server", other.packet_type());
            }
        }
        Ok(())
    }

    /// Translate the acting player on a snapshot into a local phase.
    fn turn_phase(&self, acting: PlayerId) -> GamePhase {
        if !acting.is_some() {
            GamePhase::GameFinished
        } else if acting == self.player_id {
            GamePhase::MyTurn
        } else {
            GamePhase::NotMyTurn
        }
    }

    /// Replace or append a roster entry, preserving join order.
    fn upsert_player(&mut self, player: PlayerProfile) {
        match self.players.iter_mut().find(|p| p.id == player.id) {
            Some(entry) => *entry = player,
            None => self.players.push(player),
        }
    }

    /// Re-derive the owner after a roster removal. The server hands
    /// ownership down in join order, which the local roster preserves.
    fn refresh_host(&mut self) {
        self.host_id = self
            .players
            .first()
            .map(|p| p.id)
            .unwrap_or(PlayerId::NONE);
        for (idx, player) in self.players.iter_mut().enumerate() {
            player.is_host = idx == 0;
        }
    }

    async fn send_packet(&mut self, packet: &Packet) -> Result<(), ClientError> {
        let frame = encode_packet(packet)?;
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(ClientError::NotConnected),
        };
        if let Err(err) = stream.write_all(&frame).await {
            self.reset_to_menu();
            return Err(err.into());
        }
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.connection == ConnectionPhase::Connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// Drop the transport and all mirrored state. Dropping the stream
    /// closes the socket.
    fn reset_to_menu(&mut self) {
        self.stream = None;
        self.decoder = FrameDecoder::new();
        self.connection = ConnectionPhase::Disconnected;
        self.state = ClientState::Menu;
        self.phase = GamePhase::Unknown;
        self.host_id = PlayerId::NONE;
        self.players.clear();
        self.board = None;
        self.moves.clear();
        self.last_result = None;
    }
}

impl std::fmt::Debug for GameClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("player_id", &self.player_id)
            .field("connection", &self.connection)
            .field("state", &self.state)
            .field("phase", &self.phase)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
