//! Turn order for one round.
//!
//! The order is fixed once built; only removal of a departing member changes
//! it. Eligibility (away / spectating) can change afterwards, so
//! [`TurnOrder::next_player`] re-checks it on every call.

use rand::rng;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::protocol::ClientId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TurnOrderError {
    /// Nobody in the order is currently eligible.
    #[error("no eligible player")]
    NoEligiblePlayer,
    /// The given turn owner is not part of this order.
    #[error("client {0} is not in the turn order")]
    NotInOrder(ClientId),
}

/// What the order needs to know about a member when it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub id: ClientId,
    pub ready: bool,
    pub away: bool,
    pub spectator: bool,
}

impl Candidate {
    fn is_eligible(&self) -> bool {
        self.ready && !self.away && !self.spectator
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOrder {
    order: Vec<ClientId>,
}

impl TurnOrder {
    /// Keep ready, present, non-spectating candidates and shuffle them.
    ///
    /// An empty order is valid; callers get
    /// [`TurnOrderError::NoEligiblePlayer`] when they ask for a player.
    pub fn build(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let mut order: Vec<ClientId> = candidates
            .into_iter()
            .filter(Candidate::is_eligible)
            .map(|c| c.id)
            .collect();
        order.shuffle(&mut rng());
        Self { order }
    }

    /// An order taken as-is, without filtering or shuffling.
    pub fn from_ids(order: Vec<ClientId>) -> Self {
        Self { order }
    }

    pub fn ids(&self) -> &[ClientId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.order.contains(&id)
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    /// The entry before `id`, wrapping around. `None` if `id` is absent or
    /// the only entry.
    pub fn previous(&self, id: ClientId) -> Option<ClientId> {
        let index = self.order.iter().position(|&c| c == id)?;
        if self.order.len() < 2 {
            return None;
        }
        let prev = (index + self.order.len() - 1) % self.order.len();
        Some(self.order[prev])
    }

    /// Remove a departing member. Returns whether it was present.
    pub fn remove(&mut self, id: ClientId) -> bool {
        let before = self.order.len();
        self.order.retain(|&c| c != id);
        self.order.len() != before
    }

    /// The next eligible player after `current`.
    ///
    /// With no current owner the scan starts at the first entry; otherwise it
    /// starts one past the owner and wraps. `is_eligible` is consulted at
    /// call time for every candidate.
    pub fn next_player(
        &self,
        current: Option<ClientId>,
        is_eligible: impl Fn(ClientId) -> bool,
    ) -> Result<ClientId, TurnOrderError> {
        let start = match current {
            None => 0,
            Some(owner) => {
                let index = self
                    .order
                    .iter()
                    .position(|&c| c == owner)
                    .ok_or(TurnOrderError::NotInOrder(owner))?;
                index + 1
            }
        };

        let n = self.order.len();
        (0..n)
            .map(|offset| self.order[(start + offset) % n])
            .find(|&id| is_eligible(id))
            .ok_or(TurnOrderError::NoEligiblePlayer)
    }
}
