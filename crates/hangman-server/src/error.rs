use hangman_core::guess::GuessError;
use hangman_core::protocol::{ClientId, CommandError, Phase};
use hangman_core::turn_order::TurnOrderError;
use thiserror::Error;

/// Why a member's request was refused.
///
/// Every variant is recovered locally: only the acting member is told, and
/// the room keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("It's not your turn")]
    NotCurrentTurnOwner,
    #[error("That can't be done while the room is {phase}")]
    RoomNotReady { phase: Phase },
    #[error("No eligible player can take a turn")]
    NoEligiblePlayer,
    #[error("{0}")]
    MalformedAction(String),
    #[error("Only the host can change session options")]
    NotHost,
    #[error("Spectators can't do that")]
    Spectator,
    #[error("Client {0} is not in this room")]
    UnknownMember(ClientId),
}

impl From<CommandError> for ActionError {
    fn from(err: CommandError) -> Self {
        ActionError::MalformedAction(err.to_string())
    }
}

impl From<GuessError> for ActionError {
    fn from(err: GuessError) -> Self {
        ActionError::MalformedAction(err.to_string())
    }
}

impl From<TurnOrderError> for ActionError {
    fn from(err: TurnOrderError) -> Self {
        match err {
            TurnOrderError::NoEligiblePlayer => ActionError::NoEligiblePlayer,
            TurnOrderError::NotInOrder(id) => ActionError::UnknownMember(id),
        }
    }
}

/// A send to a member's outbound channel failed; the member is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("delivery to client {client_id} failed")]
pub struct MemberDeliveryFailure {
    pub client_id: ClientId,
}

/// Errors from creating, finding or joining rooms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("{0}")]
    InvalidRoomId(String),
    #[error("Room '{0}' already exists")]
    AlreadyExists(String),
    #[error("Room '{0}' not found")]
    NotFound(String),
    #[error("Display name cannot be empty")]
    EmptyName,
}
