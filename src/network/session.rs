//! Game Room Management
//!
//! Rooms pair two players, hold the authoritative match engine, and build
//! the packets the server fans out. Every mutation commits here before any
//! packet leaves the process; the connection layer only orchestrates locks
//! and sockets.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use crate::game::board::{
    sanitize_name, GameSettings, Piece, PlayerId, PlayerProfile, Position, SYMBOL_POOL,
};
use crate::game::engine::{
    ConfigError, FinishReason, MatchEngine, MatchOutcome, MatchPhase, MoveError,
};
use crate::network::protocol::{
    BoardStateUpdate, GameEnd, GameStart, Packet, SettingsUpdate, SetupAck,
};

/// Unique room identifier.
pub type RoomId = [u8; 16];

/// Players per room.
pub const ROOM_CAPACITY: usize = 2;

/// A connected room member: roster entry plus the channel to its writer task.
#[derive(Debug)]
pub struct RoomMember {
    /// Roster entry as broadcast to clients.
    pub profile: PlayerProfile,
    /// Outbound packet channel.
    pub sender: mpsc::Sender<Packet>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Rejected room operations. None of these mutate any state.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Room already has [`ROOM_CAPACITY`] members.
    #[error("room is full")]
    RoomFull,

    /// Joins are not accepted while a match is running.
    #[error("a match is in progress")]
    MatchInProgress,

    /// Operation restricted to the room owner.
    #[error("only the room owner may do this")]
    NotOwner,

    /// Start requested before the room filled up.
    #[error("room is not full yet")]
    NotEnoughPlayers,

    /// The player is not a member of this room.
    #[error("player {0} is not in this room")]
    PlayerNotFound(PlayerId),

    /// Engine rejected the start.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// =============================================================================
// GAME ROOM
// =============================================================================

/// What a departure produced. `game_end` is present only when the leave
/// forfeited a live match.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    /// The removed roster entry.
    pub profile: PlayerProfile,
    /// Forfeit announcement, built with updated win counts.
    pub game_end: Option<GameEnd>,
}

/// What an accepted move produced: the board broadcast and, when the move
/// ended the match, the result announcement.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    /// Committed board, broadcast to the whole room.
    pub update: BoardStateUpdate,
    /// Present when this move finished the match.
    pub game_end: Option<GameEnd>,
}

/// A two-player room: roster in join order, settings, scoreboard, and the
/// match engine. The first member owns the room; ownership passes down the
/// join order when the owner leaves.
pub struct GameRoom {
    /// Unique room identifier.
    pub id: RoomId,
    members: Vec<RoomMember>,
    settings: GameSettings,
    round: u16,
    engine: MatchEngine,
}

impl GameRoom {
    /// Create an empty room.
    pub fn new(id: RoomId, settings: GameSettings) -> Self {
        Self {
            id,
            members: Vec::with_capacity(ROOM_CAPACITY),
            settings,
            round: 0,
            engine: MatchEngine::new(),
        }
    }

    /// Current member count.
    pub fn player_count(&self) -> usize {
        self.members.len()
    }

    /// Whether no members remain.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether a join would currently be accepted.
    pub fn accepts_players(&self) -> bool {
        self.members.len() < ROOM_CAPACITY && !self.match_live()
    }

    /// The owning player, `PlayerId::NONE` for an empty room.
    pub fn owner_id(&self) -> PlayerId {
        self.members
            .first()
            .map(|m| m.profile.id)
            .unwrap_or(PlayerId::NONE)
    }

    /// Whether a match is currently being played.
    pub fn match_live(&self) -> bool {
        self.engine.phase() == MatchPhase::InProgress
    }

    /// Current match settings.
    pub fn settings(&self) -> GameSettings {
        self.settings
    }

    /// Matches completed in this room.
    pub fn round(&self) -> u16 {
        self.round
    }

    /// Roster snapshot in join order.
    pub fn roster(&self) -> Vec<PlayerProfile> {
        self.members.iter().map(|m| m.profile.clone()).collect()
    }

    fn member(&self, player_id: PlayerId) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.profile.id == player_id)
    }

    fn member_mut(&mut self, player_id: PlayerId) -> Option<&mut RoomMember> {
        self.members.iter_mut().find(|m| m.profile.id == player_id)
    }

    /// First pool symbol not held by a current member. Symbols freed by a
    /// departure are handed out again.
    fn free_symbol(&self) -> Option<Piece> {
        SYMBOL_POOL
            .iter()
            .copied()
            .find(|piece| !self.members.iter().any(|m| m.profile.piece == *piece))
    }

    fn refresh_owner(&mut self) {
        for (index, member) in self.members.iter_mut().enumerate() {
            member.profile.is_host = index == 0;
        }
    }

    fn award_win(&mut self, winner: PlayerId) {
        if let Some(member) = self.member_mut(winner) {
            member.profile.wins += 1;
        }
    }

    fn game_end_packet(&self, outcome: &MatchOutcome) -> GameEnd {
        GameEnd {
            reason: outcome.reason,
            winner: outcome
                .winner
                .and_then(|id| self.member(id).map(|m| m.profile.clone())),
            line: outcome.line.clone(),
        }
    }

    /// Add a player. The name is sanitized; the first free pool symbol is
    /// assigned; the first member becomes the owner.
    pub fn join(
        &mut self,
        player_id: PlayerId,
        requested_name: &str,
        sender: mpsc::Sender<Packet>,
    ) -> Result<PlayerProfile, RoomError> {
        if self.match_live() {
            return Err(RoomError::MatchInProgress);
        }
        if self.members.len() >= ROOM_CAPACITY {
            return Err(RoomError::RoomFull);
        }
        let piece = self.free_symbol().ok_or(RoomError::RoomFull)?;

        let profile = PlayerProfile {
            id: player_id,
            name: sanitize_name(requested_name),
            piece,
            wins: 0,
            is_host: self.members.is_empty(),
        };
        self.members.push(RoomMember {
            profile: profile.clone(),
            sender,
        });
        Ok(profile)
    }

    /// Room snapshot for one member's `SetupAck`.
    pub fn setup_snapshot(&self, player_id: PlayerId) -> Option<SetupAck> {
        let member = self.member(player_id)?;
        Some(SetupAck {
            player_id,
            piece: member.profile.piece,
            host_id: self.owner_id(),
            settings: self.settings,
            round: self.round,
            players: self.roster(),
        })
    }

    /// Remove a player, passing ownership down the join order. A live match
    /// is forfeited to the survivor (win counts and round updated before the
    /// announcement is built). `None` if the player was not a member.
    pub fn leave(&mut self, player_id: PlayerId) -> Option<LeaveOutcome> {
        let index = self
            .members
            .iter()
            .position(|m| m.profile.id == player_id)?;
        let removed = self.members.remove(index);
        self.refresh_owner();

        let game_end = match self.engine.forfeit(player_id, FinishReason::PlayerDisconnect) {
            Some(outcome) => {
                self.round = self.round.saturating_add(1);
                if let Some(winner) = outcome.winner {
                    self.award_win(winner);
                }
                Some(self.game_end_packet(&outcome))
            }
            None => None,
        };

        Some(LeaveOutcome {
            profile: removed.profile,
            game_end,
        })
    }

    /// Apply an owner's settings request. Accepted fields are clamped by
    /// [`GameSettings::apply_request`]; `Ok(None)` means nothing changed and
    /// nothing is to be broadcast.
    pub fn change_settings(
        &mut self,
        requester: PlayerId,
        requested: GameSettings,
    ) -> Result<Option<SettingsUpdate>, RoomError> {
        if requester != self.owner_id() {
            return Err(RoomError::NotOwner);
        }
        if self.match_live() {
            return Err(RoomError::MatchInProgress);
        }

        if self.settings.apply_request(requested) {
            Ok(Some(SettingsUpdate {
                settings: self.settings,
            }))
        } else {
            Ok(None)
        }
    }

    /// Start a match on the owner's request. `new_game` wipes the room
    /// scoreboard first; the round counter keeps counting either way. The
    /// owner moves first.
    pub fn start_match(
        &mut self,
        requester: PlayerId,
        new_game: bool,
    ) -> Result<GameStart, RoomError> {
        if requester != self.owner_id() {
            return Err(RoomError::NotOwner);
        }
        if self.members.len() < ROOM_CAPACITY {
            return Err(RoomError::NotEnoughPlayers);
        }

        if new_game {
            for member in &mut self.members {
                member.profile.wins = 0;
            }
        }

        let players: Vec<(PlayerId, Piece)> = self
            .members
            .iter()
            .map(|m| (m.profile.id, m.profile.piece))
            .collect();
        let board = self.engine.start(&players, self.settings, self.round)?;

        Ok(GameStart {
            started_by: requester,
            starting_player: board.acting_player,
            board,
            players: self.roster(),
        })
    }

    /// Apply a member's move. On success the caller broadcasts `update` and,
    /// when present, `game_end` (scoreboard and round already updated).
    pub fn apply_move(
        &mut self,
        player: PlayerId,
        pos: Position,
    ) -> Result<MoveOutcome, MoveError> {
        let applied = self.engine.apply_move(player, pos)?;

        let game_end = match &applied.finished {
            Some(outcome) => {
                self.round = self.round.saturating_add(1);
                if let Some(winner) = outcome.winner {
                    self.award_win(winner);
                }
                Some(self.game_end_packet(outcome))
            }
            None => None,
        };

        Ok(MoveOutcome {
            update: BoardStateUpdate {
                board: applied.board,
                last_move: Some(applied.mv),
                players: self.roster(),
            },
            game_end,
        })
    }

    /// Authoritative state re-assertion for one client whose request was
    /// rejected. `None` when no match is live (nothing to re-assert).
    pub fn resync(&self) -> Option<BoardStateUpdate> {
        if !self.match_live() {
            return None;
        }
        let board = self.engine.board()?.clone();
        Some(BoardStateUpdate {
            board,
            last_move: self.engine.moves().last().copied(),
            players: self.roster(),
        })
    }

    /// Owner's request to return the room to waiting-for-players. Rejected
    /// while a match is still running.
    pub fn back_to_room(&mut self, requester: PlayerId) -> Result<(), RoomError> {
        if requester != self.owner_id() {
            return Err(RoomError::NotOwner);
        }
        if self.match_live() {
            return Err(RoomError::MatchInProgress);
        }
        self.engine.reset();
        Ok(())
    }

    /// Send a packet to every member. A member with a full or closed queue
    /// is skipped rather than awaited, so one slow consumer cannot stall the
    /// room; board packets are full snapshots, so a skipped frame heals on
    /// the next send.
    pub fn broadcast(&self, packet: Packet) {
        for member in &self.members {
            let _ = member.sender.try_send(packet.clone());
        }
    }

    /// Send a packet to a single member, skipping rather than waiting.
    pub fn send_to(&self, player_id: PlayerId, packet: Packet) {
        if let Some(member) = self.member(player_id) {
            let _ = member.sender.try_send(packet);
        }
    }
}

// =============================================================================
// ROOM MANAGER
// =============================================================================

/// Registry of all active rooms plus the server-wide player id counter.
pub struct RoomManager {
    /// Active rooms.
    rooms: RwLock<BTreeMap<RoomId, Arc<RwLock<GameRoom>>>>,
    /// Player to room mapping.
    player_rooms: RwLock<BTreeMap<PlayerId, RoomId>>,
    /// Next id to hand out; u16 so exhaustion of the u8 wire space is
    /// detectable.
    next_player_id: RwLock<u16>,
    /// Settings new rooms open with.
    default_settings: GameSettings,
}

impl RoomManager {
    /// Create a manager whose new rooms use default settings.
    pub fn new() -> Self {
        Self::with_settings(GameSettings::default())
    }

    /// Create a manager with explicit defaults for new rooms.
    pub fn with_settings(default_settings: GameSettings) -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            player_rooms: RwLock::new(BTreeMap::new()),
            next_player_id: RwLock::new(1),
            default_settings,
        }
    }

    /// Allocate the next player id. Ids start at 1 and are never reused;
    /// `None` once the id space is exhausted.
    pub async fn allocate_player_id(&self) -> Option<PlayerId> {
        let mut next = self.next_player_id.write().await;
        if *next > u8::MAX as u16 {
            return None;
        }
        let id = PlayerId::new(*next as u8);
        *next += 1;
        Some(id)
    }

    /// Place a player in the first waiting room with space, opening a new
    /// room when none qualifies. Returns the room, the joiner's `SetupAck`,
    /// and the profile to announce.
    pub async fn place_player(
        &self,
        player_id: PlayerId,
        name: &str,
        sender: mpsc::Sender<Packet>,
    ) -> Result<(Arc<RwLock<GameRoom>>, SetupAck, PlayerProfile), RoomError> {
        let mut rooms = self.rooms.write().await;

        for room_arc in rooms.values() {
            let mut room = room_arc.write().await;
            if !room.accepts_players() {
                continue;
            }
            let profile = room.join(player_id, name, sender.clone())?;
            let ack = room
                .setup_snapshot(player_id)
                .ok_or(RoomError::PlayerNotFound(player_id))?;
            let room_id = room.id;
            drop(room);

            let mut player_rooms = self.player_rooms.write().await;
            player_rooms.insert(player_id, room_id);
            return Ok((room_arc.clone(), ack, profile));
        }

        let id = uuid::Uuid::new_v4().into_bytes();
        let mut room = GameRoom::new(id, self.default_settings);
        let profile = room.join(player_id, name, sender)?;
        let ack = room
            .setup_snapshot(player_id)
            .ok_or(RoomError::PlayerNotFound(player_id))?;

        let room_arc = Arc::new(RwLock::new(room));
        rooms.insert(id, room_arc.clone());
        let mut player_rooms = self.player_rooms.write().await;
        player_rooms.insert(player_id, id);
        Ok((room_arc, ack, profile))
    }

    /// Get a room by id.
    pub async fn get_room(&self, id: &RoomId) -> Option<Arc<RwLock<GameRoom>>> {
        let rooms = self.rooms.read().await;
        rooms.get(id).cloned()
    }

    /// Get the room a player is in.
    pub async fn player_room(&self, player_id: PlayerId) -> Option<Arc<RwLock<GameRoom>>> {
        let room_id = {
            let player_rooms = self.player_rooms.read().await;
            player_rooms.get(&player_id).copied()
        }?;
        self.get_room(&room_id).await
    }

    /// Remove a player from their room, dropping the room once empty.
    /// Returns the room (for follow-up broadcasts) and the leave outcome.
    pub async fn remove_player(
        &self,
        player_id: PlayerId,
    ) -> Option<(Arc<RwLock<GameRoom>>, LeaveOutcome)> {
        let mut rooms = self.rooms.write().await;
        let mut player_rooms = self.player_rooms.write().await;

        let room_id = player_rooms.remove(&player_id)?;
        let room_arc = rooms.get(&room_id).cloned()?;

        let outcome = {
            let mut room = room_arc.write().await;
            let outcome = room.leave(player_id)?;
            if room.is_empty() {
                rooms.remove(&room_id);
            }
            outcome
        };

        Some((room_arc, outcome))
    }

    /// Active room count.
    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }

    /// Drop rooms with no members left.
    pub async fn cleanup(&self) {
        let mut rooms = self.rooms.write().await;
        let mut to_remove = Vec::new();

        for (id, room) in rooms.iter() {
            if room.read().await.is_empty() {
                to_remove.push(*id);
            }
        }

        for id in to_remove {
            rooms.remove(&id);
        }
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
