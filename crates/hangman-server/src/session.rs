//! Session lifecycle and turn handling for a [`Room`].
//!
//! Lifecycle hooks run in this order:
//!
//! 1. `start_session` (all required members ready, or the ready timer ran out)
//! 2. `start_round` → `start_turn`
//! 3. `end_turn` → `start_turn` on every valid action or turn-timer expiry
//! 4. `end_round` when the word is solved, completed, struck out, or the
//!    round timer runs out; then the next round or `end_session`
//!
//! Everything here is synchronous and runs under the room's mutex, so a
//! timer expiry and a member action for the same room never interleave.

use hangman_core::guess::{RoundProgress, RoundState, StrikeChange};
use hangman_core::protocol::{
    AwayStatus, ClientId, ClientMessage, GameEvent, Phase, ServerMessage, SessionOptions,
    TimerKind, TurnCommand,
};
use hangman_core::turn_order::{Candidate, TurnOrder};
use tracing::{debug, info, warn};

use crate::error::ActionError;
use crate::room::Room;
use crate::timer::{TimedEvent, TimerHost};

/// Why a round finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundEnd {
    /// The guess engine reported the round over.
    Guessed,
    /// The round timer ran out.
    TimedOut,
}

impl Room {
    // ── Inbound ──────────────────────────────────────────────────────────

    /// Validate and apply a message from a member already in this room.
    ///
    /// Rejections are reported to the sender only and leave the room
    /// untouched. Members whose delivery failed along the way are evicted
    /// before returning.
    pub fn handle_client_message(
        &mut self,
        client_id: ClientId,
        msg: ClientMessage,
    ) -> Result<(), ActionError> {
        let result = match msg {
            ClientMessage::Ready { ready } => self.set_ready(client_id, ready),
            ClientMessage::Turn { command } => self.handle_turn_action(client_id, &command),
            ClientMessage::SessionOptions(options) => self.set_session_options(client_id, options),
            ClientMessage::AwayStatus(status) => self.set_away(client_id, status),
            ClientMessage::Leave => {
                self.remove_member(client_id);
                Ok(())
            }
            ClientMessage::Ping => {
                self.send_to(client_id, &ServerMessage::Pong);
                Ok(())
            }
            ClientMessage::CreateRoom { .. } | ClientMessage::JoinRoom { .. } => Err(
                ActionError::MalformedAction("Already in a room".to_string()),
            ),
        };

        if let Err(err) = &result {
            debug!(room = %self.id, client = client_id, error = %err, "action rejected");
            self.send_to(
                client_id,
                &ServerMessage::Error {
                    message: err.to_string(),
                },
            );
        }
        self.flush_evictions();
        result
    }

    fn set_ready(&mut self, client_id: ClientId, ready: bool) -> Result<(), ActionError> {
        let member = self
            .members
            .get_mut(&client_id)
            .ok_or(ActionError::UnknownMember(client_id))?;
        if self.phase != Phase::Ready {
            return Err(ActionError::RoomNotReady { phase: self.phase });
        }
        if member.spectator {
            return Err(ActionError::Spectator);
        }
        if member.ready == ready {
            return Ok(());
        }
        member.ready = ready;
        let name = member.name.clone();

        self.broadcast(&ServerMessage::ReadyStatus { client_id, ready });
        if ready {
            self.send_event(GameEvent::narrative(format!("{name} is ready")), None);
            if !self.ready_timer.is_active() {
                self.start_timer(TimerKind::Ready);
            }
        } else {
            self.send_event(GameEvent::narrative(format!("{name} is no longer ready")), None);
            if self.ready_count() == 0 {
                self.cancel_timer(TimerKind::Ready);
            }
        }
        self.check_ready();
        Ok(())
    }

    /// Start the session as soon as every player is ready and there are
    /// enough of them.
    fn check_ready(&mut self) {
        if self.phase != Phase::Ready {
            return;
        }
        let ready = self.ready_count();
        let all_ready = self
            .members
            .values()
            .filter(|m| !m.spectator)
            .all(|m| m.ready);
        if all_ready && ready >= self.settings.min_players {
            self.start_session();
        }
    }

    fn ready_count(&self) -> usize {
        self.members.values().filter(|m| m.ready).count()
    }

    fn set_session_options(
        &mut self,
        client_id: ClientId,
        options: SessionOptions,
    ) -> Result<(), ActionError> {
        if !self.members.contains_key(&client_id) {
            return Err(ActionError::UnknownMember(client_id));
        }
        if self.phase != Phase::Ready {
            return Err(ActionError::RoomNotReady { phase: self.phase });
        }
        if self.host_id != Some(client_id) {
            return Err(ActionError::NotHost);
        }

        self.options = options;
        info!(
            room = %self.id,
            hard_mode = options.hard_mode,
            remove_strike_on_correct_guess = options.remove_strike_on_correct_guess,
            "session options updated"
        );
        self.broadcast(&ServerMessage::SessionOptionsChanged { options });
        let on_off = |flag: bool| if flag { "on" } else { "off" };
        self.send_event(
            GameEvent::narrative(format!(
                "Session options updated: hard mode {}, remove strike on correct guess {}",
                on_off(options.hard_mode),
                on_off(options.remove_strike_on_correct_guess)
            )),
            None,
        );
        Ok(())
    }

    /// Record an away toggle. Turn order picks it up lazily on the next
    /// advance.
    fn set_away(&mut self, client_id: ClientId, status: AwayStatus) -> Result<(), ActionError> {
        if status.client_id != client_id {
            return Err(ActionError::MalformedAction(
                "You can only change your own away status".to_string(),
            ));
        }
        let member = self
            .members
            .get_mut(&client_id)
            .ok_or(ActionError::UnknownMember(client_id))?;
        if member.away == status.away {
            return Ok(());
        }
        member.away = status.away;
        let text = if status.away {
            format!("{} is away", member.name)
        } else {
            format!("{} is back", member.name)
        };

        self.broadcast(&ServerMessage::AwayStatus {
            client_id,
            away: status.away,
        });
        self.send_event(GameEvent::narrative(text), None);
        Ok(())
    }

    // ── Turn actions ─────────────────────────────────────────────────────

    /// Handle `guess <word>`, `letter <char>` or `skip` from the current
    /// turn owner.
    fn handle_turn_action(&mut self, client_id: ClientId, command: &str) -> Result<(), ActionError> {
        let name = self
            .members
            .get(&client_id)
            .map(|m| m.name.clone())
            .ok_or(ActionError::UnknownMember(client_id))?;
        if self.phase != Phase::InProgress || self.round_state.is_none() {
            return Err(ActionError::RoomNotReady { phase: self.phase });
        }
        if self.current_turn != Some(client_id) {
            return Err(ActionError::NotCurrentTurnOwner);
        }
        let command: TurnCommand = command.parse()?;

        let progress = match command {
            TurnCommand::Guess(word) => self.apply_word_guess(client_id, &name, &word),
            TurnCommand::Letter(letter) => self.apply_letter_guess(client_id, &name, letter)?,
            TurnCommand::Skip => {
                self.send_event(GameEvent::narrative(format!("{name} skipped their turn")), None);
                RoundProgress::Continues
            }
        };

        if let Some(member) = self.members.get_mut(&client_id) {
            member.took_turn = true;
        }
        self.broadcast(&ServerMessage::TurnStatus {
            client_id,
            took_turn: true,
        });
        self.send_event(GameEvent::narrative(format!("{name} finished their turn")), None);

        if progress.ends_round() {
            self.end_round(RoundEnd::Guessed);
        } else {
            self.end_turn();
        }
        Ok(())
    }

    fn apply_word_guess(&mut self, client_id: ClientId, name: &str, guess: &str) -> RoundProgress {
        let Some(state) = self.round_state.as_mut() else {
            return RoundProgress::Continues;
        };
        let result = state.guess_word(guess);
        let secret = state.word().to_string();
        debug!(room = %self.id, client = client_id, ?result, "word guess");

        if result.progress == RoundProgress::Solved {
            self.award_points(client_id, result.points);
            if result.strike_change == StrikeChange::Removed {
                self.send_event(GameEvent::Strikes(result.strikes), None);
                self.send_event(
                    GameEvent::narrative(format!(
                        "{name} removed a strike by guessing the word correctly!"
                    )),
                    None,
                );
            }
            self.send_event(
                GameEvent::narrative(format!(
                    "{name} guessed the correct word '{secret}' and got {} points!",
                    result.points
                )),
                None,
            );
        } else {
            self.send_event(GameEvent::Strikes(result.strikes), None);
            self.send_event(
                GameEvent::narrative(format!("{name} guessed '{guess}' and it was wrong")),
                None,
            );
            if result.progress == RoundProgress::StruckOut {
                self.announce_struck_out(&secret);
            }
        }
        result.progress
    }

    fn apply_letter_guess(
        &mut self,
        client_id: ClientId,
        name: &str,
        letter: char,
    ) -> Result<RoundProgress, ActionError> {
        let Some(state) = self.round_state.as_mut() else {
            return Err(ActionError::RoomNotReady { phase: self.phase });
        };
        let result = state.guess_letter(letter)?;
        let letter = letter.to_ascii_uppercase();
        let secret = state.word().to_string();
        let masked = state.masked();
        let hard_mode = state.options().hard_mode;
        debug!(room = %self.id, client = client_id, %letter, ?result, "letter guess");

        if !hard_mode {
            self.send_event(GameEvent::LetterGuessed(letter), None);
        }

        if result.matches > 0 {
            self.award_points(client_id, result.points);
            if result.strike_change == StrikeChange::Removed {
                self.send_event(GameEvent::Strikes(result.strikes), None);
                self.send_event(
                    GameEvent::narrative(format!("{name} removed a strike by guessing correctly!")),
                    None,
                );
            }
            self.send_event(
                GameEvent::narrative(format!(
                    "{name} guessed '{letter}' and there were {} {letter}'s which yielded {} points",
                    result.matches, result.points
                )),
                None,
            );
            self.send_event(GameEvent::narrative(format!("Current word: {masked}")), None);
            if result.progress == RoundProgress::Completed {
                self.send_event(
                    GameEvent::narrative(format!("Word completed! The word was '{secret}'")),
                    None,
                );
            }
        } else {
            self.send_event(GameEvent::Strikes(result.strikes), None);
            self.send_event(
                GameEvent::narrative(format!("{name} guessed '{letter}', which isn't in the word")),
                None,
            );
            if result.progress == RoundProgress::StruckOut {
                self.announce_struck_out(&secret);
            }
        }
        Ok(result.progress)
    }

    fn announce_struck_out(&mut self, secret: &str) {
        self.send_event(
            GameEvent::narrative(format!("Maximum strikes reached! The word was '{secret}'")),
            None,
        );
    }

    fn award_points(&mut self, client_id: ClientId, points: u32) {
        let Some(member) = self.members.get_mut(&client_id) else {
            return;
        };
        member.points += points;
        let total = member.points;
        self.broadcast(&ServerMessage::Points {
            client_id,
            points: total,
        });
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    fn start_session(&mut self) {
        info!(room = %self.id, players = self.ready_count(), "session starting");
        self.cancel_timer(TimerKind::Ready);
        self.phase = Phase::InProgress;
        self.broadcast(&ServerMessage::PhaseChanged {
            phase: Phase::InProgress,
        });
        self.round = 0;
        self.current_turn = None;
        self.send_event(
            GameEvent::narrative(format!(
                "New game started! {} rounds to play",
                self.settings.max_rounds
            )),
            None,
        );
        self.start_round();
    }

    fn start_round(&mut self) {
        self.round += 1;
        self.cancel_timer(TimerKind::Round);

        let word = self.words.draw();
        let state = RoundState::new(word, self.options);
        let masked = state.masked();
        self.round_state = Some(state);

        self.turn_order = TurnOrder::build(self.members.values().map(|m| Candidate {
            id: m.id,
            ready: m.ready,
            away: m.away,
            spectator: m.spectator,
        }));
        self.current_turn = None;
        info!(
            room = %self.id,
            round = self.round,
            players = self.turn_order.len(),
            "round starting"
        );

        self.reset_turn_status();
        self.send_event(GameEvent::Strikes(0), None);
        self.send_event(
            GameEvent::narrative(format!("Round {} started! Word: {masked}", self.round)),
            None,
        );
        if self.settings.round_duration.is_some() {
            self.start_timer(TimerKind::Round);
        }
        self.start_turn();
    }

    fn start_turn(&mut self) {
        self.cancel_timer(TimerKind::Turn);

        let from = self.current_turn.filter(|&id| self.turn_order.contains(id));
        let members = &self.members;
        let next = self.turn_order.next_player(from, |id| {
            members.get(&id).is_some_and(|m| m.can_take_turn())
        });

        match next {
            Ok(id) => {
                self.current_turn = Some(id);
                let name = self.member_name(id);
                debug!(room = %self.id, client = id, "turn starting");
                self.broadcast(&ServerMessage::CurrentTurn { client_id: Some(id) });
                self.send_event(GameEvent::narrative(format!("It's {name}'s turn")), None);
            }
            Err(err) => {
                let err = ActionError::from(err);
                warn!(room = %self.id, round = self.round, "{err}; turn has no owner");
                self.current_turn = None;
                self.broadcast(&ServerMessage::CurrentTurn { client_id: None });
                self.send_event(
                    GameEvent::narrative(format!("{err}; waiting for someone to return")),
                    None,
                );
            }
        }
        self.start_timer(TimerKind::Turn);
    }

    fn end_turn(&mut self) {
        self.cancel_timer(TimerKind::Turn);
        // Every action or expiry passes the turn on; it never ends the round
        // by itself.
        self.start_turn();
    }

    fn on_turn_expired(&mut self) {
        if self.phase != Phase::InProgress {
            return;
        }
        if let Some(owner) = self.current_turn {
            let name = self.member_name(owner);
            self.send_event(GameEvent::narrative(format!("{name} ran out of time")), None);
        }
        self.end_turn();
    }

    fn end_round(&mut self, reason: RoundEnd) {
        if self.phase != Phase::InProgress {
            return;
        }
        self.cancel_timer(TimerKind::Round);
        if let Some(state) = self.round_state.take()
            && reason == RoundEnd::TimedOut
        {
            self.send_event(
                GameEvent::narrative(format!("Time's up! The word was '{}'", state.word())),
                None,
            );
        }
        info!(room = %self.id, round = self.round, ?reason, "round ended");

        let scoreboard = self.scoreboard();
        self.send_event(GameEvent::narrative(format!("Scoreboard:\n{scoreboard}")), None);

        if self.round >= self.settings.max_rounds {
            self.end_session();
        } else {
            self.start_round();
        }
    }

    fn end_session(&mut self) {
        info!(room = %self.id, rounds = self.round, "session ending");
        self.turn_order.clear();
        self.current_turn = None;
        self.round_state = None;
        self.cancel_timer(TimerKind::Turn);
        self.cancel_timer(TimerKind::Round);
        self.cancel_timer(TimerKind::Ready);
        self.reset_turn_status();
        self.reset_ready_status();

        let scoreboard = self.scoreboard();
        self.send_event(
            GameEvent::narrative(format!("Game Over! Final scores:\n{scoreboard}")),
            None,
        );

        let ids: Vec<ClientId> = self.members.keys().copied().collect();
        for id in ids {
            if let Some(member) = self.members.get_mut(&id) {
                member.points = 0;
            }
            self.broadcast(&ServerMessage::Points {
                client_id: id,
                points: 0,
            });
        }

        self.round = 0;
        self.phase = Phase::Ready;
        self.broadcast(&ServerMessage::PhaseChanged { phase: Phase::Ready });
    }

    fn on_ready_expired(&mut self) {
        if self.phase != Phase::Ready {
            return;
        }
        let ready = self.ready_count();
        if ready >= self.settings.min_players {
            self.start_session();
        } else {
            self.send_event(
                GameEvent::narrative(format!(
                    "Not enough players ready ({ready}/{}); ready check reset",
                    self.settings.min_players
                )),
                None,
            );
            self.reset_ready_status();
        }
    }

    /// Remove a member after a leave, a closed connection or an eviction.
    ///
    /// If they held the turn, the next eligible member takes over; if the
    /// room is now empty, timers stop and any session ends.
    pub fn remove_member(&mut self, client_id: ClientId) {
        let Some(member) = self.members.remove(&client_id) else {
            return;
        };
        info!(room = %self.id, client = client_id, remaining = self.members.len(), "member removed");

        let held_turn = self.current_turn == Some(client_id);
        let resume_from = if held_turn {
            self.turn_order.previous(client_id)
        } else {
            None
        };
        self.turn_order.remove(client_id);

        self.broadcast(&ServerMessage::MemberLeft { client_id });
        self.send_event(GameEvent::narrative(format!("{} left the room", member.name)), None);

        if self.host_id == Some(client_id) {
            self.host_id = self.members.keys().next().copied();
            if let Some(host) = self.host_id {
                self.broadcast(&ServerMessage::HostChanged { client_id: host });
            }
        }

        if self.members.is_empty() {
            self.cancel_timer(TimerKind::Ready);
            self.cancel_timer(TimerKind::Round);
            self.cancel_timer(TimerKind::Turn);
            if self.phase == Phase::InProgress {
                self.end_session();
            }
            return;
        }

        match self.phase {
            Phase::InProgress if held_turn => {
                self.current_turn = resume_from;
                self.start_turn();
            }
            Phase::InProgress => {}
            Phase::Ready => {
                if self.ready_count() == 0 {
                    self.cancel_timer(TimerKind::Ready);
                }
                self.check_ready();
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    /// Members by descending score, one line each.
    pub fn scoreboard(&self) -> String {
        let mut members: Vec<_> = self.members.values().collect();
        members.sort_by(|a, b| b.points.cmp(&a.points));
        members
            .iter()
            .map(|m| format!("{}: {} points", m.name, m.points))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn reset_turn_status(&mut self) {
        for member in self.members.values_mut() {
            member.took_turn = false;
        }
        self.broadcast(&ServerMessage::ResetTurnStatus);
    }

    fn reset_ready_status(&mut self) {
        for member in self.members.values_mut() {
            member.ready = false;
        }
        self.broadcast(&ServerMessage::ResetReady);
    }

    fn start_timer(&mut self, kind: TimerKind) {
        let duration = match kind {
            TimerKind::Ready => self.settings.ready_duration,
            TimerKind::Turn => self.settings.turn_duration,
            TimerKind::Round => match self.settings.round_duration {
                Some(duration) => duration,
                None => return,
            },
        };
        let handle = self.handle.clone();
        self.timer_mut(kind).start(handle, duration);
        self.broadcast(&ServerMessage::Timer {
            kind,
            remaining: Some(duration.as_secs().try_into().unwrap_or(u32::MAX)),
        });
    }

    /// Cancel a timer, telling members only if it was running.
    fn cancel_timer(&mut self, kind: TimerKind) {
        if self.timer_mut(kind).cancel() {
            self.broadcast(&ServerMessage::Timer {
                kind,
                remaining: None,
            });
        }
    }
}

impl TimerHost for Room {
    fn timer_mut(&mut self, kind: TimerKind) -> &mut TimedEvent {
        match kind {
            TimerKind::Ready => &mut self.ready_timer,
            TimerKind::Round => &mut self.round_timer,
            TimerKind::Turn => &mut self.turn_timer,
        }
    }

    fn on_timer_tick(&mut self, kind: TimerKind, remaining: u32) {
        self.broadcast(&ServerMessage::Timer {
            kind,
            remaining: Some(remaining),
        });
        self.flush_evictions();
    }

    fn on_timer_expired(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Ready => self.on_ready_expired(),
            TimerKind::Round => self.end_round(RoundEnd::TimedOut),
            TimerKind::Turn => self.on_turn_expired(),
        }
        self.flush_evictions();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use hangman_core::words::WordList;
    use tokio::sync::mpsc;

    use crate::config::GameSettings;
    use crate::room::{PlayerRx, SharedRoom};

    fn settings() -> GameSettings {
        GameSettings {
            max_rounds: 1,
            words: Arc::new(WordList::new(["cat"]).unwrap()),
            ..GameSettings::default()
        }
    }

    struct Table {
        room: SharedRoom,
        ids: Vec<ClientId>,
        rxs: BTreeMap<ClientId, PlayerRx>,
    }

    impl Table {
        async fn new(names: &[&str], settings: GameSettings) -> Self {
            let room = Room::new_shared("test", Arc::new(settings));
            let mut ids = Vec::new();
            let mut rxs = BTreeMap::new();
            {
                let mut guard = room.lock().await;
                for name in names {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let id = guard.add_member(name, false, tx);
                    ids.push(id);
                    rxs.insert(id, rx);
                }
            }
            Self { room, ids, rxs }
        }

        /// Everyone readies up; the session starts and inboxes are emptied.
        async fn started(names: &[&str], settings: GameSettings) -> Self {
            let mut table = Self::new(names, settings).await;
            table.ready_all().await;
            assert_eq!(table.room.lock().await.phase(), Phase::InProgress);
            table.drain_all();
            table
        }

        async fn ready_all(&mut self) {
            let mut room = self.room.lock().await;
            for &id in &self.ids {
                room.handle_client_message(id, ClientMessage::Ready { ready: true })
                    .unwrap();
            }
        }

        fn drain(&mut self, id: ClientId) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            if let Some(rx) = self.rxs.get_mut(&id) {
                while let Ok(msg) = rx.try_recv() {
                    out.push(msg);
                }
            }
            out
        }

        fn drain_all(&mut self) {
            let ids: Vec<ClientId> = self.rxs.keys().copied().collect();
            for id in ids {
                self.drain(id);
            }
        }

        fn events(&mut self, id: ClientId) -> Vec<String> {
            events(&self.drain(id))
        }
    }

    fn events(msgs: &[ServerMessage]) -> Vec<String> {
        msgs.iter()
            .filter_map(|msg| match msg {
                ServerMessage::GameEvent { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn turn(command: &str) -> ClientMessage {
        ClientMessage::Turn {
            command: command.to_string(),
        }
    }

    fn owner(room: &Room) -> ClientId {
        room.current_turn.expect("a turn owner")
    }

    fn other(table: &Table, id: ClientId) -> ClientId {
        table.ids.iter().copied().find(|&c| c != id).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn session_starts_once_everyone_is_ready() {
        let mut table = Table::new(&["Ann", "Bob"], settings()).await;
        let (ann, bob) = (table.ids[0], table.ids[1]);
        {
            let mut room = table.room.lock().await;
            room.handle_client_message(ann, ClientMessage::Ready { ready: true })
                .unwrap();
            assert_eq!(room.phase(), Phase::Ready);
            assert!(room.ready_timer.is_active());
        }
        table.drain_all();

        let mut room = table.room.lock().await;
        room.handle_client_message(bob, ClientMessage::Ready { ready: true })
            .unwrap();
        assert_eq!(room.phase(), Phase::InProgress);
        assert_eq!(room.round, 1);
        assert!(!room.ready_timer.is_active());
        assert!(room.turn_timer.is_active());
        assert_eq!(room.turn_order.len(), 2);
        assert!(room.turn_order.contains(owner(&room)));
        assert_eq!(room.round_state.as_ref().unwrap().word(), "CAT");
        drop(room);

        let msgs = table.drain(ann);
        assert!(msgs.contains(&ServerMessage::PhaseChanged {
            phase: Phase::InProgress
        }));
        let texts = events(&msgs);
        assert!(texts.contains(&"STRIKES:0".to_string()));
        assert!(texts.contains(&"Round 1 started! Word: _ _ _".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn spectators_cannot_ready_up() {
        let table = Table::new(&["Ann"], settings()).await;
        let mut room = table.room.lock().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let watcher = room.add_member("Wes", true, tx);
        assert_eq!(
            room.handle_client_message(watcher, ClientMessage::Ready { ready: true }),
            Err(ActionError::Spectator)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_owner_may_act() {
        let mut table = Table::started(&["Ann", "Bob"], settings()).await;
        let mut room = table.room.lock().await;
        let current = owner(&room);
        let waiting = other(&table, current);

        assert_eq!(
            room.handle_client_message(waiting, turn("letter c")),
            Err(ActionError::NotCurrentTurnOwner)
        );
        assert_eq!(room.current_turn, Some(current));
        assert!(room.round_state.as_ref().unwrap().guessed_letters().is_empty());
        drop(room);

        assert_eq!(
            table.drain(waiting),
            vec![ServerMessage::Error {
                message: "It's not your turn".into()
            }]
        );
        assert!(table.drain(current).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn letters_and_word_guesses_score() {
        let mut table = Table::started(
            &["Ann", "Bob"],
            GameSettings {
                max_rounds: 2,
                ..settings()
            },
        )
        .await;
        let mut room = table.room.lock().await;
        let first = owner(&room);
        let second = other(&table, first);
        let (first_name, second_name) = (room.member_name(first), room.member_name(second));

        room.handle_client_message(first, turn("letter c")).unwrap();
        assert_eq!(room.members.get(&first).unwrap().points, 1);
        assert_eq!(room.current_turn, Some(second));
        drop(room);

        let texts = table.events(second);
        assert_eq!(
            texts,
            vec![
                "LETTER_GUESSED:C".to_string(),
                format!("{first_name} guessed 'C' and there were 1 C's which yielded 1 points"),
                "Current word: C _ _".to_string(),
                format!("{first_name} finished their turn"),
                format!("It's {second_name}'s turn"),
            ]
        );

        let mut room = table.room.lock().await;
        room.handle_client_message(second, turn("guess cat")).unwrap();
        assert_eq!(room.members.get(&second).unwrap().points, 4);
        assert_eq!(room.round, 2);
        assert_eq!(room.round_state.as_ref().unwrap().masked(), "_ _ _");
        drop(room);

        let texts = table.events(first);
        assert!(texts.contains(&format!(
            "{second_name} guessed the correct word 'CAT' and got 4 points!"
        )));
        assert!(texts.contains(&format!(
            "Scoreboard:\n{second_name}: 4 points\n{first_name}: 1 points"
        )));
        assert!(texts.contains(&"Round 2 started! Word: _ _ _".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn six_misses_end_the_round_and_the_session() {
        let mut table = Table::started(&["Ann", "Bob"], settings()).await;
        let watcher = table.ids[0];
        let mut room = table.room.lock().await;
        for letter in ['b', 'd', 'e', 'f', 'g', 'h'] {
            let current = owner(&room);
            room.handle_client_message(current, turn(&format!("letter {letter}")))
                .unwrap();
        }

        assert_eq!(room.phase(), Phase::Ready);
        assert_eq!(room.round, 0);
        assert!(room.round_state.is_none());
        assert!(room.turn_order.is_empty());
        assert!(!room.turn_timer.is_active());
        for &id in &table.ids {
            let member = room.members.get(&id).unwrap();
            assert_eq!(member.points, 0);
            assert!(!member.ready);
        }
        drop(room);

        let texts = table.events(watcher);
        assert!(texts.contains(&"STRIKES:6".to_string()));
        assert!(texts.contains(&"Maximum strikes reached! The word was 'CAT'".to_string()));
        assert!(texts.iter().any(|t| t.starts_with("Game Over! Final scores:\n")));
    }

    #[tokio::test(start_paused = true)]
    async fn six_misses_end_only_the_round_when_rounds_remain() {
        let mut table = Table::started(
            &["Ann", "Bob"],
            GameSettings {
                max_rounds: 2,
                ..settings()
            },
        )
        .await;
        let watcher = table.ids[0];
        let mut room = table.room.lock().await;
        for letter in ['b', 'd', 'e', 'f', 'g', 'h'] {
            let current = owner(&room);
            room.handle_client_message(current, turn(&format!("letter {letter}")))
                .unwrap();
        }

        assert_eq!(room.phase(), Phase::InProgress);
        assert_eq!(room.round, 2);
        let state = room.round_state.as_ref().unwrap();
        assert_eq!(state.strikes(), 0);
        assert!(state.guessed_letters().is_empty());
        assert!(room.current_turn.is_some());
        drop(room);

        let texts = table.events(watcher);
        let revealed = texts
            .iter()
            .position(|t| t == "Maximum strikes reached! The word was 'CAT'")
            .unwrap();
        let next_round = texts
            .iter()
            .position(|t| t == "Round 2 started! Word: _ _ _")
            .unwrap();
        assert!(revealed < next_round);
        assert!(!texts.iter().any(|t| t.starts_with("Game Over!")));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_letter_is_rejected_in_normal_mode() {
        let mut table = Table::started(&["Ann", "Bob"], settings()).await;
        let mut room = table.room.lock().await;
        let first = owner(&room);
        let second = other(&table, first);
        room.handle_client_message(first, turn("letter c")).unwrap();
        drop(room);
        table.drain_all();

        let mut room = table.room.lock().await;
        assert!(matches!(
            room.handle_client_message(second, turn("letter C")),
            Err(ActionError::MalformedAction(_))
        ));
        assert_eq!(room.current_turn, Some(second));
        assert_eq!(room.members.get(&second).unwrap().points, 0);
        drop(room);

        assert!(matches!(
            table.drain(second).as_slice(),
            [ServerMessage::Error { .. }]
        ));
        assert!(table.drain(first).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hard_mode_scores_a_repeated_letter_again() {
        let mut table = Table::new(&["Ann", "Bob"], settings()).await;
        let host = table.ids[0];
        {
            let mut room = table.room.lock().await;
            room.handle_client_message(
                host,
                ClientMessage::SessionOptions(SessionOptions {
                    hard_mode: true,
                    remove_strike_on_correct_guess: false,
                }),
            )
            .unwrap();
        }
        table.ready_all().await;
        table.drain_all();

        let mut room = table.room.lock().await;
        let first = owner(&room);
        let second = other(&table, first);
        room.handle_client_message(first, turn("letter c")).unwrap();
        room.handle_client_message(second, turn("letter c")).unwrap();
        assert_eq!(room.members.get(&first).unwrap().points, 1);
        assert_eq!(room.members.get(&second).unwrap().points, 1);
        drop(room);

        let texts = table.events(first);
        assert!(!texts.iter().any(|t| t.starts_with("LETTER_GUESSED:")));
    }

    #[tokio::test(start_paused = true)]
    async fn strike_removal_is_announced_before_the_guess() {
        let mut table = Table::new(&["Ann", "Bob"], settings()).await;
        let host = table.ids[0];
        {
            let mut room = table.room.lock().await;
            room.handle_client_message(
                host,
                ClientMessage::SessionOptions(SessionOptions {
                    hard_mode: false,
                    remove_strike_on_correct_guess: true,
                }),
            )
            .unwrap();
        }
        table.ready_all().await;

        let mut room = table.room.lock().await;
        let first = owner(&room);
        let second = other(&table, first);
        room.handle_client_message(first, turn("letter x")).unwrap();
        room.handle_client_message(second, turn("letter z")).unwrap();
        assert_eq!(room.round_state.as_ref().unwrap().strikes(), 2);
        assert_eq!(room.current_turn, Some(first));
        drop(room);
        table.drain_all();

        let mut room = table.room.lock().await;
        room.handle_client_message(first, turn("letter a")).unwrap();
        assert_eq!(room.round_state.as_ref().unwrap().strikes(), 1);
        let name = room.member_name(first);
        drop(room);

        let texts = table.events(second);
        assert_eq!(
            &texts[..4],
            &[
                "LETTER_GUESSED:A".to_string(),
                "STRIKES:1".to_string(),
                format!("{name} removed a strike by guessing correctly!"),
                format!("{name} guessed 'A' and there were 1 A's which yielded 1 points"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_commands_stay_private() {
        let mut table = Table::started(&["Ann", "Bob"], settings()).await;
        let mut room = table.room.lock().await;
        let current = owner(&room);
        let waiting = other(&table, current);

        assert!(matches!(
            room.handle_client_message(current, turn("dance")),
            Err(ActionError::MalformedAction(_))
        ));
        assert_eq!(room.current_turn, Some(current));
        drop(room);

        assert!(table.drain(waiting).is_empty());
        assert!(matches!(
            table.drain(current).as_slice(),
            [ServerMessage::Error { .. }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_owner_passes_the_turn_on() {
        let table = Table::started(&["Ann", "Bob", "Cid"], settings()).await;
        let mut room = table.room.lock().await;
        let order = room.turn_order.ids().to_vec();
        let current = owner(&room);
        let index = order.iter().position(|&id| id == current).unwrap();
        let expected = order[(index + 1) % order.len()];

        room.handle_client_message(current, ClientMessage::Leave)
            .unwrap();
        assert_eq!(room.current_turn, Some(expected));
        assert!(!room.turn_order.contains(current));
        assert_eq!(room.phase(), Phase::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delivery_evicts_the_owner() {
        let mut table = Table::started(&["Ann", "Bob", "Cid"], settings()).await;
        let mut room = table.room.lock().await;
        let current = owner(&room);
        let others: Vec<ClientId> = table
            .ids
            .iter()
            .copied()
            .filter(|&id| id != current)
            .collect();
        let (away, remaining) = (others[0], others[1]);
        table.rxs.remove(&current);

        room.handle_client_message(
            away,
            ClientMessage::AwayStatus(AwayStatus {
                client_id: away,
                away: true,
            }),
        )
        .unwrap();

        assert!(room.members.get(&current).is_none());
        assert_eq!(room.member_count(), 2);
        assert_eq!(room.current_turn, Some(remaining));
        drop(room);

        assert!(table.drain(remaining).contains(&ServerMessage::MemberLeft {
            client_id: current
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn away_members_are_skipped() {
        let table = Table::started(&["Ann", "Bob", "Cid"], settings()).await;
        let mut room = table.room.lock().await;
        let order = room.turn_order.ids().to_vec();
        let current = owner(&room);
        let index = order.iter().position(|&id| id == current).unwrap();
        let next = order[(index + 1) % 3];
        let after_next = order[(index + 2) % 3];

        room.handle_client_message(
            next,
            ClientMessage::AwayStatus(AwayStatus {
                client_id: next,
                away: true,
            }),
        )
        .unwrap();
        room.handle_client_message(current, turn("skip")).unwrap();
        assert_eq!(room.current_turn, Some(after_next));
    }

    #[tokio::test(start_paused = true)]
    async fn away_status_for_someone_else_is_rejected() {
        let table = Table::new(&["Ann", "Bob"], settings()).await;
        let (ann, bob) = (table.ids[0], table.ids[1]);
        let mut room = table.room.lock().await;
        assert!(matches!(
            room.handle_client_message(
                ann,
                ClientMessage::AwayStatus(AwayStatus {
                    client_id: bob,
                    away: true
                })
            ),
            Err(ActionError::MalformedAction(_))
        ));
        assert!(!room.members.get(&bob).unwrap().away);
    }

    #[tokio::test(start_paused = true)]
    async fn turn_timer_expiry_passes_the_turn() {
        let mut table = Table::started(
            &["Ann", "Bob"],
            GameSettings {
                turn_duration: Duration::from_secs(5),
                ..settings()
            },
        )
        .await;
        let (current, name) = {
            let room = table.room.lock().await;
            let current = owner(&room);
            (current, room.member_name(current))
        };
        let waiting = other(&table, current);

        tokio::time::sleep(Duration::from_millis(5500)).await;

        assert_eq!(table.room.lock().await.current_turn, Some(waiting));
        let msgs = table.drain(waiting);
        assert!(msgs.contains(&ServerMessage::Timer {
            kind: TimerKind::Turn,
            remaining: Some(1)
        }));
        assert!(events(&msgs).contains(&format!("{name} ran out of time")));
    }

    #[tokio::test(start_paused = true)]
    async fn round_timer_reveals_the_word() {
        let mut table = Table::started(
            &["Ann", "Bob"],
            GameSettings {
                round_duration: Some(Duration::from_secs(20)),
                turn_duration: Duration::from_secs(60),
                ..settings()
            },
        )
        .await;
        let ann = table.ids[0];

        tokio::time::sleep(Duration::from_millis(20_500)).await;

        assert_eq!(table.room.lock().await.phase(), Phase::Ready);
        let texts = table.events(ann);
        assert!(texts.contains(&"Time's up! The word was 'CAT'".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_timer_starts_with_enough_players() {
        let table = Table::new(
            &["Ann", "Bob", "Cid"],
            GameSettings {
                ready_duration: Duration::from_secs(10),
                ..settings()
            },
        )
        .await;
        let cid = table.ids[2];
        {
            let mut room = table.room.lock().await;
            for &id in &table.ids[..2] {
                room.handle_client_message(id, ClientMessage::Ready { ready: true })
                    .unwrap();
            }
            assert_eq!(room.phase(), Phase::Ready);
        }

        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let room = table.room.lock().await;
        assert_eq!(room.phase(), Phase::InProgress);
        assert_eq!(room.turn_order.len(), 2);
        assert!(!room.turn_order.contains(cid));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_timer_resets_without_enough_players() {
        let mut table = Table::new(
            &["Ann", "Bob"],
            GameSettings {
                ready_duration: Duration::from_secs(10),
                ..settings()
            },
        )
        .await;
        let ann = table.ids[0];
        table
            .room
            .lock()
            .await
            .handle_client_message(ann, ClientMessage::Ready { ready: true })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let room = table.room.lock().await;
        assert_eq!(room.phase(), Phase::Ready);
        assert!(!room.members.get(&ann).unwrap().ready);
        drop(room);
        let msgs = table.drain(ann);
        assert!(msgs.contains(&ServerMessage::ResetReady));
        assert!(
            events(&msgs).contains(&"Not enough players ready (1/2); ready check reset".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn options_are_host_only_and_only_while_ready() {
        let mut table = Table::new(&["Ann", "Bob"], settings()).await;
        let (ann, bob) = (table.ids[0], table.ids[1]);
        let options = SessionOptions {
            hard_mode: true,
            remove_strike_on_correct_guess: true,
        };
        {
            let mut room = table.room.lock().await;
            assert_eq!(
                room.handle_client_message(bob, ClientMessage::SessionOptions(options)),
                Err(ActionError::NotHost)
            );
            assert_eq!(room.options, SessionOptions::default());
            room.handle_client_message(ann, ClientMessage::SessionOptions(options))
                .unwrap();
            assert_eq!(room.options, options);
        }
        assert!(table
            .drain(bob)
            .contains(&ServerMessage::SessionOptionsChanged { options }));

        table.ready_all().await;
        let mut room = table.room.lock().await;
        assert_eq!(
            room.handle_client_message(ann, ClientMessage::SessionOptions(SessionOptions::default())),
            Err(ActionError::RoomNotReady {
                phase: Phase::InProgress
            })
        );
        assert_eq!(room.options, options);
    }

    #[tokio::test(start_paused = true)]
    async fn host_moves_to_the_next_member() {
        let mut table = Table::new(&["Ann", "Bob"], settings()).await;
        let (ann, bob) = (table.ids[0], table.ids[1]);
        let mut room = table.room.lock().await;
        room.handle_client_message(ann, ClientMessage::Leave).unwrap();
        assert_eq!(room.host_id, Some(bob));
        drop(room);
        assert!(table
            .drain(bob)
            .contains(&ServerMessage::HostChanged { client_id: bob }));
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_sees_the_round_in_progress() {
        let table = Table::started(&["Ann", "Bob"], settings()).await;
        let mut room = table.room.lock().await;
        let current = owner(&room);
        room.handle_client_message(current, turn("letter c")).unwrap();
        let next = owner(&room);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = room.add_member("Wes", true, tx);
        let mut msgs = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            msgs.push(msg);
        }

        assert!(msgs.contains(&ServerMessage::PhaseChanged {
            phase: Phase::InProgress
        }));
        assert!(msgs.contains(&ServerMessage::CurrentTurn {
            client_id: Some(next)
        }));
        let texts = events(&msgs);
        assert!(texts.contains(&"Round 1 in progress. Word: C _ _".to_string()));
        assert!(texts.contains(&"LETTER_GUESSED:C".to_string()));
        assert!(!room.turn_order.contains(watcher));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_room_returns_to_ready() {
        let table = Table::started(&["Ann", "Bob"], settings()).await;
        let mut room = table.room.lock().await;
        for &id in &table.ids {
            room.handle_client_message(id, ClientMessage::Leave).unwrap();
        }
        assert_eq!(room.phase(), Phase::Ready);
        assert!(room.is_abandoned());
        assert!(!room.turn_timer.is_active());
        assert!(room.current_turn.is_none());
    }

    #[tokio::test]
    async fn scoreboard_sorts_by_points_then_join_order() {
        let table = Table::new(&["Ann", "Bob", "Cid"], settings()).await;
        let mut room = table.room.lock().await;
        room.members.get_mut(&table.ids[1]).unwrap().points = 3;
        room.members.get_mut(&table.ids[2]).unwrap().points = 3;
        assert_eq!(
            room.scoreboard(),
            "Bob: 3 points\nCid: 3 points\nAnn: 0 points"
        );
    }
}
