//! TCP Game Server
//!
//! Async TCP server for LAN play. Accepts connections, runs the hello/setup
//! exchange, places players into rooms, and routes packets between the room
//! layer and the sockets. Designed to be embeddable: a client process can
//! bind it on a loopback or ephemeral port and join it like a remote peer.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::game::board::{PlayerId, Position};
use crate::network::codec::{encode_packet, FrameDecoder};
use crate::network::protocol::{
    NewPlayerJoin, Packet, PlayerDisconnected, ServerHello, SettingsChangeReq, SetupReq,
    PROTOCOL_VERSION,
};
use crate::network::session::{GameRoom, RoomManager};

/// Default LAN port.
pub const DEFAULT_PORT: u16 = 27015;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long a fresh connection may take to complete setup.
    pub setup_timeout: Duration,
    /// Close connections that send nothing for this long.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:27015".parse().unwrap(),
            max_connections: 64,
            setup_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Socket-level failure (bind, accept).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry entry for an accepted connection.
struct ConnectionInfo {
    /// Id assigned on accept.
    player_id: PlayerId,
    /// Accept time, for uptime logging.
    connected_at: Instant,
}

/// The game server: listener, room registry, and connection tasks.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Bound listener.
    listener: TcpListener,
    /// Actual bound address (resolves ephemeral ports).
    local_addr: SocketAddr,
    /// Room registry.
    rooms: Arc<RoomManager>,
    /// Accepted connections.
    connections: Arc<RwLock<BTreeMap<SocketAddr, ConnectionInfo>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Bind the listener. With a port of 0 the OS picks one; see
    /// [`GameServer::local_addr`].
    pub async fn bind(config: ServerConfig) -> Result<Self, GameServerError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            listener,
            local_addr,
            rooms: Arc::new(RoomManager::new()),
            connections: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        })
    }

    /// The address the listener actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until [`GameServer::shutdown`] is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        info!(
            "gridline server {} listening on {}",
            self.config.version, self.local_addr
        );

        let cleanup_rooms = self.rooms.clone();
        let cleanup_handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                cleanup_rooms.cleanup().await;
            }
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let open = self.connections.read().await.len();
                            if open >= self.config.max_connections {
                                warn!("connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("new connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Signal all tasks to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Open connection count.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Active room count.
    pub async fn room_count(&self) -> usize {
        self.rooms.room_count().await
    }

    /// Spawn the reader and writer tasks for one accepted connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let rooms = self.rooms.clone();
        let connections = self.connections.clone();
        let config = self.config.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let player_id = match rooms.allocate_player_id().await {
                Some(id) => id,
                None => {
                    warn!("player id space exhausted, dropping {}", addr);
                    return;
                }
            };

            {
                let mut conns = connections.write().await;
                conns.insert(
                    addr,
                    ConnectionInfo {
                        player_id,
                        connected_at: Instant::now(),
                    },
                );
            }

            let (mut reader, mut writer) = stream.into_split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<Packet>(64);

            // Writer task: frames queued packets onto the socket.
            let writer_task = tokio::spawn(async move {
                while let Some(packet) = msg_rx.recv().await {
                    match encode_packet(&packet) {
                        Ok(frame) => {
                            if writer.write_all(&frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("failed to encode outbound packet: {}", e);
                        }
                    }
                }
            });

            let _ = msg_tx
                .send(Packet::ServerHello(ServerHello {
                    protocol_version: PROTOCOL_VERSION,
                    player_id,
                }))
                .await;

            let mut decoder = FrameDecoder::new();
            let room = Self::perform_setup(
                addr,
                player_id,
                &mut reader,
                &mut decoder,
                &rooms,
                &msg_tx,
                config.setup_timeout,
            )
            .await;

            if let Some(room) = room {
                Self::connection_loop(
                    player_id,
                    &mut reader,
                    &mut decoder,
                    &room,
                    &msg_tx,
                    config.idle_timeout,
                    shutdown_rx,
                )
                .await;

                // Disconnect: roster removal and the forfeit announcement
                // happen exactly once, whoever reports the drop first.
                if let Some((room, outcome)) = rooms.remove_player(player_id).await {
                    info!("player {} ({}) left", player_id, outcome.profile.name);
                    let room = room.read().await;
                    room.broadcast(Packet::PlayerDisconnected(PlayerDisconnected {
                        player_id,
                    }));
                    if let Some(end) = outcome.game_end {
                        info!("match forfeited by player {} leaving", player_id);
                        room.broadcast(Packet::GameEnd(end));
                    }
                }
            }

            if let Some(info) = connections.write().await.remove(&addr) {
                debug!(
                    "connection {} (player {}) cleaned up after {:?}",
                    addr,
                    info.player_id,
                    info.connected_at.elapsed()
                );
            }

            // Writer drains and exits once every sender clone is gone.
            drop(msg_tx);
            let _ = writer_task.await;
        });
    }

    /// Run the setup exchange: wait for `SetupReq` under the deadline, check
    /// the protocol revision, and place the player in a room. Any deviation
    /// closes the connection (`None`).
    async fn perform_setup(
        addr: SocketAddr,
        player_id: PlayerId,
        reader: &mut OwnedReadHalf,
        decoder: &mut FrameDecoder,
        rooms: &Arc<RoomManager>,
        sender: &mpsc::Sender<Packet>,
        deadline: Duration,
    ) -> Option<Arc<RwLock<GameRoom>>> {
        let request = match tokio::time::timeout(deadline, Self::await_setup(reader, decoder)).await
        {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("{} dropped during setup", addr);
                return None;
            }
            Err(_) => {
                info!("setup deadline expired for {}", addr);
                return None;
            }
        };

        if request.protocol_version != PROTOCOL_VERSION {
            warn!(
                "protocol mismatch from {}: client speaks {}, server speaks {}",
                addr, request.protocol_version, PROTOCOL_VERSION
            );
            return None;
        }

        match rooms
            .place_player(player_id, &request.player_name, sender.clone())
            .await
        {
            Ok((room, ack, profile)) => {
                let _ = sender.send(Packet::SetupAck(ack)).await;
                let room_guard = room.read().await;
                info!(
                    "player {} ({}) joined room {}",
                    player_id,
                    profile.name,
                    hex::encode(&room_guard.id[..4])
                );
                room_guard.broadcast(Packet::NewPlayerJoin(NewPlayerJoin { player: profile }));
                drop(room_guard);
                Some(room)
            }
            Err(e) => {
                warn!("could not place player {}: {}", player_id, e);
                None
            }
        }
    }

    /// Read frames until the first packet arrives; it must be a `SetupReq`.
    async fn await_setup(
        reader: &mut OwnedReadHalf,
        decoder: &mut FrameDecoder,
    ) -> Option<SetupReq> {
        let mut buf = vec![0u8; 1024];
        loop {
            loop {
                match decoder.next_packet() {
                    Ok(Some(Packet::SetupReq(request))) => return Some(request),
                    Ok(Some(other)) => {
                        debug!("expected setup, got {:?}", other.packet_type());
                        return None;
                    }
                    Ok(None) => break,
                    Err(e) if e.is_fatal() => {
                        warn!("framing error during setup: {}", e);
                        return None;
                    }
                    Err(e) => debug!("discarded frame during setup: {}", e),
                }
            }
            match reader.read(&mut buf).await {
                Ok(0) => return None,
                Ok(n) => decoder.extend(&buf[..n]),
                Err(e) => {
                    debug!("read error during setup: {}", e);
                    return None;
                }
            }
        }
    }

    /// Per-connection read loop after setup. Exits on EOF, read error, idle
    /// timeout, fatal framing error, or shutdown.
    async fn connection_loop(
        player_id: PlayerId,
        reader: &mut OwnedReadHalf,
        decoder: &mut FrameDecoder,
        room: &Arc<RwLock<GameRoom>>,
        sender: &mpsc::Sender<Packet>,
        idle_timeout: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut buf = vec![0u8; 4096];

        'conn: loop {
            // Drain buffered frames before going back to the socket.
            loop {
                match decoder.next_packet() {
                    Ok(Some(packet)) => {
                        Self::handle_packet(player_id, packet, room, sender).await;
                    }
                    Ok(None) => break,
                    Err(e) if e.is_fatal() => {
                        warn!("closing connection of player {}: {}", player_id, e);
                        break 'conn;
                    }
                    Err(e) => {
                        debug!("ignoring bad frame from player {}: {}", player_id, e);
                    }
                }
            }

            tokio::select! {
                result = tokio::time::timeout(idle_timeout, reader.read(&mut buf)) => {
                    match result {
                        Ok(Ok(0)) => {
                            debug!("player {} closed the connection", player_id);
                            break;
                        }
                        Ok(Ok(n)) => decoder.extend(&buf[..n]),
                        Ok(Err(e)) => {
                            debug!("read error for player {}: {}", player_id, e);
                            break;
                        }
                        Err(_) => {
                            info!("player {} idle for {:?}, closing", player_id, idle_timeout);
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("shutdown: closing player {}", player_id);
                    break;
                }
            }
        }
    }

    /// Dispatch one client packet.
    async fn handle_packet(
        player_id: PlayerId,
        packet: Packet,
        room: &Arc<RwLock<GameRoom>>,
        sender: &mpsc::Sender<Packet>,
    ) {
        match packet {
            Packet::MoveRequest(request) => {
                Self::handle_move(player_id, request.pos, room, sender).await;
            }
            Packet::SettingsChangeReq(request) => {
                Self::handle_settings(player_id, request, room, sender).await;
            }
            Packet::GameStartRequest(request) => {
                Self::handle_start(player_id, request.new_game, room, sender).await;
            }
            Packet::BackToGameRoom => {
                Self::handle_back_to_room(player_id, room, sender).await;
            }
            other => {
                debug!(
                    "unexpected {:?} from player {}",
                    other.packet_type(),
                    player_id
                );
            }
        }
    }

    /// Apply a move. The room lock is held through the broadcasts so
    /// snapshots leave in commit order.
    async fn handle_move(
        player_id: PlayerId,
        pos: Position,
        room: &Arc<RwLock<GameRoom>>,
        sender: &mpsc::Sender<Packet>,
    ) {
        let mut room = room.write().await;
        match room.apply_move(player_id, pos) {
            Ok(outcome) => {
                debug!("player {} claimed {}", player_id, pos);
                room.broadcast(Packet::BoardStateUpdate(outcome.update));
                if let Some(end) = outcome.game_end {
                    info!("match over: {}", end.reason);
                    room.broadcast(Packet::GameEnd(end));
                }
            }
            Err(e) => {
                debug!("rejected move from player {}: {}", player_id, e);
                Self::resync(&room, sender);
            }
        }
    }

    /// Apply an owner's settings request; broadcast only on actual change.
    async fn handle_settings(
        player_id: PlayerId,
        request: SettingsChangeReq,
        room: &Arc<RwLock<GameRoom>>,
        sender: &mpsc::Sender<Packet>,
    ) {
        let mut room = room.write().await;
        match room.change_settings(player_id, request.settings) {
            Ok(Some(update)) => {
                info!(
                    "settings now {}x{} win {} (by player {})",
                    update.settings.board_size,
                    update.settings.board_size,
                    update.settings.win_length,
                    player_id
                );
                room.broadcast(Packet::SettingsUpdate(update));
            }
            Ok(None) => {
                debug!("settings request from player {} changed nothing", player_id);
            }
            Err(e) => {
                debug!("rejected settings request from player {}: {}", player_id, e);
                Self::resync(&room, sender);
            }
        }
    }

    /// Start a match on the owner's request.
    async fn handle_start(
        player_id: PlayerId,
        new_game: bool,
        room: &Arc<RwLock<GameRoom>>,
        sender: &mpsc::Sender<Packet>,
    ) {
        let mut room = room.write().await;
        match room.start_match(player_id, new_game) {
            Ok(start) => {
                info!(
                    "round {} starting in room {}, player {} to move",
                    start.board.round,
                    hex::encode(&room.id[..4]),
                    start.starting_player
                );
                room.broadcast(Packet::GameStart(start));
            }
            Err(e) => {
                debug!("rejected start request from player {}: {}", player_id, e);
                Self::resync(&room, sender);
            }
        }
    }

    /// Reset the room to waiting on the owner's request.
    async fn handle_back_to_room(
        player_id: PlayerId,
        room: &Arc<RwLock<GameRoom>>,
        sender: &mpsc::Sender<Packet>,
    ) {
        let mut room = room.write().await;
        match room.back_to_room(player_id) {
            Ok(()) => {
                debug!("room {} back to waiting", hex::encode(&room.id[..4]));
                room.broadcast(Packet::BackToGameRoom);
            }
            Err(e) => {
                debug!(
                    "rejected back-to-room request from player {}: {}",
                    player_id, e
                );
                Self::resync(&room, sender);
            }
        }
    }

    /// Re-assert authoritative state to one client after a rejection. Does
    /// nothing unless a match is live; the packet set has no error packet.
    /// Uses `try_send` so a stuffed queue cannot stall the room lock.
    fn resync(room: &GameRoom, sender: &mpsc::Sender<Packet>) {
        if let Some(update) = room.resync() {
            let _ = sender.try_send(Packet::BoardStateUpdate(update));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_bind_resolves_ephemeral_port() {
        let server = GameServer::bind(loopback_config()).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let server = Arc::new(GameServer::bind(loopback_config()).await.unwrap());

        let run_server = server.clone();
        let handle = tokio::spawn(async move { run_server.run().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        server.shutdown();
        handle.await.unwrap().unwrap();
    }
}
