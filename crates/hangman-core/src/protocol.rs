use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Per-room identifier of a connected member.
pub type ClientId = u64;

/// Top-level lifecycle state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Lobby: readiness and option changes are accepted.
    Ready,
    /// A session is running; rounds and turns are tracked by timers.
    InProgress,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Ready => f.write_str("READY"),
            Phase::InProgress => f.write_str("IN_PROGRESS"),
        }
    }
}

/// Which countdown a [`ServerMessage::Timer`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerKind {
    Ready,
    Round,
    Turn,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::Ready => f.write_str("ready"),
            TimerKind::Round => f.write_str("round"),
            TimerKind::Turn => f.write_str("turn"),
        }
    }
}

/// Options chosen by the session creator while the room is in [`Phase::Ready`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Repeated letters are re-scored and `LETTER_GUESSED` is never broadcast.
    #[serde(default)]
    pub hard_mode: bool,
    /// A correct guess takes one strike away.
    #[serde(default)]
    pub remove_strike_on_correct_guess: bool,
}

/// Away toggle sent by a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwayStatus {
    pub client_id: ClientId,
    pub away: bool,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Create a new room with the given ID.
    CreateRoom { room_id: String },

    /// Join an existing room with the given ID and display name.
    JoinRoom {
        room_id: String,
        name: String,
        #[serde(default)]
        spectator: bool,
    },

    /// Mark (or unmark) this member as ready for the next session.
    Ready { ready: bool },

    /// A single-line turn command: `guess <word>`, `letter <char>` or `skip`.
    Turn { command: String },

    /// Replace the session options (host only, lobby only).
    SessionOptions(SessionOptions),

    /// Toggle away status.
    AwayStatus(AwayStatus),

    /// Leave the room.
    Leave,

    /// Ping to check connection
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// A room was successfully created.
    RoomCreated { room_id: String },

    /// Successfully joined a room.
    RoomJoined { room_id: String, client_id: ClientId },

    /// Room-related error (e.g. "room ID taken", "room not found").
    RoomError { message: String },

    /// A member is present in the room.
    MemberJoined {
        client_id: ClientId,
        name: String,
        spectator: bool,
    },

    /// A member left or was evicted.
    MemberLeft { client_id: ClientId },

    /// The session creator changed.
    HostChanged { client_id: ClientId },

    PhaseChanged { phase: Phase },

    ReadyStatus { client_id: ClientId, ready: bool },

    /// Every member's ready flag was cleared.
    ResetReady,

    TurnStatus { client_id: ClientId, took_turn: bool },

    /// Every member's "took turn" flag was cleared.
    ResetTurnStatus,

    /// The member whose turn it is, or `None` if nobody is eligible.
    CurrentTurn { client_id: Option<ClientId> },

    Points { client_id: ClientId, points: u32 },

    /// Countdown tick; `None` means the timer was cancelled.
    Timer {
        kind: TimerKind,
        remaining: Option<u32>,
    },

    SessionOptionsChanged { options: SessionOptions },

    AwayStatus { client_id: ClientId, away: bool },

    /// A textual game event, see [`GameEvent`].
    GameEvent { text: String },

    /// Error message (only ever sent to the member that caused it)
    Error { message: String },

    /// Pong response to ping
    Pong,
}

impl From<GameEvent> for ServerMessage {
    fn from(event: GameEvent) -> Self {
        ServerMessage::GameEvent {
            text: event.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Game events
// ---------------------------------------------------------------------------

const STRIKES_PREFIX: &str = "STRIKES:";
const LETTER_GUESSED_PREFIX: &str = "LETTER_GUESSED:";

/// The textual event vocabulary carried by [`ServerMessage::GameEvent`].
///
/// `STRIKES:<n>` and `LETTER_GUESSED:<C>` are machine-readable; anything
/// else is narrative text meant for display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Strikes(u8),
    LetterGuessed(char),
    Narrative(String),
}

impl GameEvent {
    pub fn narrative(text: impl Into<String>) -> Self {
        GameEvent::Narrative(text.into())
    }
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameEvent::Strikes(n) => write!(f, "{STRIKES_PREFIX}{n}"),
            GameEvent::LetterGuessed(c) => write!(f, "{LETTER_GUESSED_PREFIX}{c}"),
            GameEvent::Narrative(text) => f.write_str(text),
        }
    }
}

impl FromStr for GameEvent {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(n) = s.strip_prefix(STRIKES_PREFIX).and_then(|n| n.parse().ok()) {
            return Ok(GameEvent::Strikes(n));
        }
        if let Some(rest) = s.strip_prefix(LETTER_GUESSED_PREFIX) {
            let mut chars = rest.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                return Ok(GameEvent::LetterGuessed(c));
            }
        }
        Ok(GameEvent::Narrative(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Turn commands
// ---------------------------------------------------------------------------

/// A parsed turn command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnCommand {
    /// Guess the whole word (uppercased).
    Guess(String),
    /// Guess a single letter (uppercased).
    Letter(char),
    Skip,
}

/// Why a turn command could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid command. Use /guess <word>, /letter <letter>, or /skip")]
    Unknown,
    #[error("Invalid command format. Use /guess <word>")]
    BadWord,
    #[error("Please enter a single letter")]
    BadLetter,
}

impl FromStr for TurnCommand {
    type Err = CommandError;

    /// Keywords are case-insensitive and may carry a leading `/`.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (keyword, argument) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (line, ""),
        };
        let keyword = keyword.strip_prefix('/').unwrap_or(keyword);

        match keyword.to_ascii_lowercase().as_str() {
            "guess" => {
                if argument.is_empty() || !argument.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(CommandError::BadWord);
                }
                Ok(TurnCommand::Guess(argument.to_ascii_uppercase()))
            }
            "letter" => {
                let mut chars = argument.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphabetic() => {
                        Ok(TurnCommand::Letter(c.to_ascii_uppercase()))
                    }
                    _ => Err(CommandError::BadLetter),
                }
            }
            "skip" => Ok(TurnCommand::Skip),
            _ => Err(CommandError::Unknown),
        }
    }
}

// ---------------------------------------------------------------------------
// Room ID validation
// ---------------------------------------------------------------------------

/// Validate a room ID.
///
/// Room IDs must be non-empty, alphanumeric, and fewer than 20 characters.
pub fn validate_room_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("Room ID cannot be empty".to_string());
    }
    if id.len() >= 20 {
        return Err("Room ID must be fewer than 20 characters".to_string());
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Room ID must be alphanumeric".to_string());
    }
    Ok(())
}
