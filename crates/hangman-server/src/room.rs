//! Room manager for the multi-room hangman server.
//!
//! Each room owns its roster, its game state and one outbound [`mpsc`]
//! sender per member. Sends report their outcome: a failed send means the
//! member's connection is gone, so the member is queued for eviction and
//! removed once the current operation has finished
//! (see [`Room::flush_evictions`]).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use hangman_core::guess::RoundState;
use hangman_core::protocol::{
    ClientId, GameEvent, Phase, ServerMessage, SessionOptions, TimerKind, validate_room_id,
};
use hangman_core::turn_order::TurnOrder;
use hangman_core::words::WordPool;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::GameSettings;
use crate::error::{MemberDeliveryFailure, RoomError};
use crate::timer::TimedEvent;

/// Handle to a per-member outbound channel.
///
/// The WebSocket write loop drains this receiver and forwards messages as
/// text frames.
pub type PlayerTx = mpsc::UnboundedSender<ServerMessage>;
pub type PlayerRx = mpsc::UnboundedReceiver<ServerMessage>;

pub type SharedRoom = Arc<Mutex<Room>>;

/// How long a created room may wait for its first member before it is
/// pruned.
pub const UNJOINED_ROOM_GRACE: Duration = Duration::from_secs(300);

/// A participant in a room.
#[derive(Debug)]
pub struct Member {
    pub id: ClientId,
    pub name: String,
    pub points: u32,
    pub ready: bool,
    pub took_turn: bool,
    pub away: bool,
    pub spectator: bool,
    tx: PlayerTx,
}

impl Member {
    /// Can hold a turn right now (turn order also requires readiness at
    /// build time).
    pub fn can_take_turn(&self) -> bool {
        !self.away && !self.spectator
    }
}

/// A single hangman room: one game session and its members.
///
/// All state is mutated under the room's mutex; timer tasks and member
/// connections both go through it.
pub struct Room {
    pub(crate) id: String,
    /// Weak self-reference handed to timer tasks.
    pub(crate) handle: Weak<Mutex<Room>>,
    pub(crate) settings: Arc<GameSettings>,
    pub(crate) members: BTreeMap<ClientId, Member>,
    next_client_id: ClientId,
    pub(crate) host_id: Option<ClientId>,
    pub(crate) phase: Phase,
    pub(crate) round: u32,
    pub(crate) current_turn: Option<ClientId>,
    pub(crate) turn_order: TurnOrder,
    pub(crate) options: SessionOptions,
    pub(crate) words: WordPool,
    pub(crate) round_state: Option<RoundState>,
    pub(crate) ready_timer: TimedEvent,
    pub(crate) round_timer: TimedEvent,
    pub(crate) turn_timer: TimedEvent,
    evictions: Vec<ClientId>,
    had_members: bool,
    created_at: Instant,
}

impl Room {
    /// Create a room wrapped in its mutex, wiring the self-reference its
    /// timers need.
    pub fn new_shared(id: &str, settings: Arc<GameSettings>) -> SharedRoom {
        Arc::new_cyclic(|handle| {
            Mutex::new(Room {
                id: id.to_string(),
                handle: handle.clone(),
                words: WordPool::new(Arc::clone(&settings.words)),
                settings,
                members: BTreeMap::new(),
                next_client_id: 1,
                host_id: None,
                phase: Phase::Ready,
                round: 0,
                current_turn: None,
                turn_order: TurnOrder::default(),
                options: SessionOptions::default(),
                round_state: None,
                ready_timer: TimedEvent::new(TimerKind::Ready),
                round_timer: TimedEvent::new(TimerKind::Round),
                turn_timer: TimedEvent::new(TimerKind::Turn),
                evictions: Vec::new(),
                had_members: false,
                created_at: Instant::now(),
            })
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// The last member has left, or nobody joined within
    /// [`UNJOINED_ROOM_GRACE`] of creation.
    pub fn is_abandoned(&self) -> bool {
        self.members.is_empty()
            && (self.had_members || self.created_at.elapsed() >= UNJOINED_ROOM_GRACE)
    }

    pub(crate) fn member_name(&self, id: ClientId) -> String {
        self.members
            .get(&id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| format!("Client {id}"))
    }

    // ── Membership ───────────────────────────────────────────────────────

    /// Add a member, announce them, and bring their view up to date.
    pub fn add_member(&mut self, name: &str, spectator: bool, tx: PlayerTx) -> ClientId {
        let id = self.next_client_id;
        self.next_client_id += 1;

        self.members.insert(
            id,
            Member {
                id,
                name: name.to_string(),
                points: 0,
                ready: false,
                took_turn: false,
                away: false,
                spectator,
                tx,
            },
        );
        self.had_members = true;
        info!(room = %self.id, client = id, name, spectator, "member joined");

        if self.host_id.is_none() {
            self.host_id = Some(id);
        }

        let room_id = self.id.clone();
        self.send_to(id, &ServerMessage::RoomJoined { room_id, client_id: id });
        self.broadcast_except(
            &ServerMessage::MemberJoined {
                client_id: id,
                name: name.to_string(),
                spectator,
            },
            id,
        );
        self.sync_state_to(id);

        let text = if spectator {
            format!("{name} joined as a spectator")
        } else {
            format!("{name} joined the room")
        };
        self.send_event(GameEvent::narrative(text), None);
        id
    }

    // ── Broadcast / sync ─────────────────────────────────────────────────

    /// Attempt a single delivery and report the outcome.
    fn deliver(member: &Member, msg: &ServerMessage) -> Result<(), MemberDeliveryFailure> {
        member
            .tx
            .send(msg.clone())
            .map_err(|_| MemberDeliveryFailure { client_id: member.id })
    }

    fn queue_eviction(evictions: &mut Vec<ClientId>, failure: MemberDeliveryFailure) {
        if !evictions.contains(&failure.client_id) {
            warn!(client = failure.client_id, "{failure}; evicting member");
            evictions.push(failure.client_id);
        }
    }

    /// Send a message to a specific member. Returns whether it was delivered.
    pub fn send_to(&mut self, id: ClientId, msg: &ServerMessage) -> bool {
        let Some(member) = self.members.get(&id) else {
            return false;
        };
        match Self::deliver(member, msg) {
            Ok(()) => true,
            Err(failure) => {
                Self::queue_eviction(&mut self.evictions, failure);
                false
            }
        }
    }

    /// Broadcast a message to **all** members.
    pub fn broadcast(&mut self, msg: &ServerMessage) {
        for member in self.members.values() {
            if let Err(failure) = Self::deliver(member, msg) {
                Self::queue_eviction(&mut self.evictions, failure);
            }
        }
    }

    /// Broadcast a message to all members **except** `exclude_id`.
    pub fn broadcast_except(&mut self, msg: &ServerMessage, exclude_id: ClientId) {
        for member in self.members.values().filter(|m| m.id != exclude_id) {
            if let Err(failure) = Self::deliver(member, msg) {
                Self::queue_eviction(&mut self.evictions, failure);
            }
        }
    }

    /// Send a game event to everyone, or only to `targets`.
    pub fn send_event(&mut self, event: GameEvent, targets: Option<&[ClientId]>) {
        let msg = ServerMessage::from(event);
        match targets {
            None => self.broadcast(&msg),
            Some(targets) => {
                for &id in targets {
                    self.send_to(id, &msg);
                }
            }
        }
    }

    /// Push the room's current state to a newly joined member so their view
    /// converges without replaying history.
    pub fn sync_state_to(&mut self, id: ClientId) {
        let mut snapshot = vec![
            ServerMessage::PhaseChanged { phase: self.phase },
            ServerMessage::SessionOptionsChanged {
                options: self.options,
            },
        ];
        if let Some(host) = self.host_id {
            snapshot.push(ServerMessage::HostChanged { client_id: host });
        }

        for member in self.members.values().filter(|m| m.id != id) {
            snapshot.push(ServerMessage::MemberJoined {
                client_id: member.id,
                name: member.name.clone(),
                spectator: member.spectator,
            });
            snapshot.push(ServerMessage::ReadyStatus {
                client_id: member.id,
                ready: member.ready,
            });
            snapshot.push(ServerMessage::TurnStatus {
                client_id: member.id,
                took_turn: member.took_turn,
            });
            snapshot.push(ServerMessage::Points {
                client_id: member.id,
                points: member.points,
            });
            if member.away {
                snapshot.push(ServerMessage::AwayStatus {
                    client_id: member.id,
                    away: true,
                });
            }
        }

        if self.phase == Phase::InProgress
            && let Some(state) = &self.round_state
        {
            snapshot.push(
                GameEvent::narrative(format!(
                    "Round {} in progress. Word: {}",
                    self.round,
                    state.masked()
                ))
                .into(),
            );
            snapshot.push(GameEvent::Strikes(state.strikes()).into());
            if !state.options().hard_mode {
                for letter in state.guessed_letters() {
                    snapshot.push(GameEvent::LetterGuessed(letter).into());
                }
            }
            snapshot.push(ServerMessage::CurrentTurn {
                client_id: self.current_turn,
            });
        }

        for msg in &snapshot {
            if !self.send_to(id, msg) {
                break;
            }
        }
    }

    /// Remove every member whose delivery failed, running the normal
    /// departure path for each. Removal can broadcast and fail again, so
    /// this loops until the queue is empty.
    pub fn flush_evictions(&mut self) {
        while let Some(id) = self.evictions.pop() {
            if self.members.contains_key(&id) {
                debug!(room = %self.id, client = id, "evicting disconnected member");
                self.remove_member(id);
            }
        }
    }
}

/// Public view of a room for `GET /api/rooms`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RoomSummary {
    pub room_id: String,
    pub members: usize,
    pub phase: Phase,
}

/// Manages all active rooms.
///
/// Thread-safe: the outer `RwLock` allows concurrent reads (e.g. looking up
/// rooms) while writes (create / remove) take exclusive access.  Each room
/// is individually `Mutex`-protected so independent rooms never contend.
pub struct RoomManager {
    rooms: RwLock<HashMap<String, SharedRoom>>,
    settings: Arc<GameSettings>,
}

impl RoomManager {
    pub fn new(settings: GameSettings) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            settings: Arc::new(settings),
        }
    }

    /// Create a new room with the given ID.
    pub async fn create_room(&self, room_id: &str) -> Result<(), RoomError> {
        validate_room_id(room_id).map_err(RoomError::InvalidRoomId)?;
        self.prune_abandoned().await;

        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(room_id) {
            return Err(RoomError::AlreadyExists(room_id.to_string()));
        }
        rooms.insert(
            room_id.to_string(),
            Room::new_shared(room_id, Arc::clone(&self.settings)),
        );
        info!(room = room_id, "room created");
        Ok(())
    }

    /// Look up a room by ID.
    pub async fn get_room(&self, room_id: &str) -> Option<SharedRoom> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).cloned()
    }

    /// Add a member to a room.
    ///
    /// Returns `(client_id, PlayerRx, room)` so the caller can wire up the
    /// WebSocket write loop. The join confirmation and state snapshot are
    /// already queued on the receiver.
    pub async fn join_room(
        &self,
        room_id: &str,
        name: &str,
        spectator: bool,
    ) -> Result<(ClientId, PlayerRx, SharedRoom), RoomError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RoomError::EmptyName);
        }
        let room_arc = self
            .get_room(room_id)
            .await
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = {
            let mut room = room_arc.lock().await;
            let id = room.add_member(name, spectator, tx);
            room.flush_evictions();
            id
        };
        Ok((client_id, rx, room_arc))
    }

    /// Remove a member after an explicit leave or a closed connection.
    /// Drops the room once it is empty.
    ///
    /// Takes the room the member joined rather than its id: client ids are
    /// per room, and the id may by now name a newer room.
    pub async fn leave_room(&self, room_arc: &SharedRoom, client_id: ClientId) {
        let (room_id, abandoned) = {
            let mut room = room_arc.lock().await;
            room.remove_member(client_id);
            room.flush_evictions();
            (room.id.clone(), room.is_abandoned())
        };
        if abandoned {
            let mut rooms = self.rooms.write().await;
            if let Some(current) = rooms.get(&room_id)
                && Arc::ptr_eq(current, room_arc)
                && current.lock().await.is_abandoned()
            {
                rooms.remove(&room_id);
                info!(room = %room_id, "removed empty room");
            }
        }
    }

    /// Summaries of active rooms, sorted by ID.
    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        self.prune_abandoned().await;
        let rooms: Vec<SharedRoom> = self.rooms.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(rooms.len());
        for room in rooms {
            let room = room.lock().await;
            summaries.push(RoomSummary {
                room_id: room.id().to_string(),
                members: room.member_count(),
                phase: room.phase(),
            });
        }
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }

    /// Drop rooms emptied by evictions (which happen inside the room and
    /// cannot reach the manager) and rooms nobody joined. Busy rooms are
    /// skipped.
    async fn prune_abandoned(&self) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|room_id, room| {
            let abandoned = room.try_lock().map(|r| r.is_abandoned()).unwrap_or(false);
            if abandoned {
                info!(room = %room_id, "removed empty room");
            }
            !abandoned
        });
    }
}
