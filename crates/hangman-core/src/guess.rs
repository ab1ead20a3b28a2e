//! Word/guess engine: the secret word of one round, guessed letters, strikes
//! and scoring.
//!
//! This module is transport-agnostic; it reports what happened through
//! [`GuessResult`] and leaves messaging to the caller.

use std::collections::HashSet;

use thiserror::Error;

use crate::protocol::SessionOptions;

/// Strikes at which a round is lost.
pub const MAX_STRIKES: u8 = 6;

/// Points per unrevealed letter awarded for solving the whole word.
pub const WORD_BONUS_PER_LETTER: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuessError {
    /// Normal mode only: the letter is already in the guessed set.
    #[error("That letter has already been guessed")]
    AlreadyGuessed(char),
    #[error("Please enter a single letter")]
    NotALetter(char),
}

/// How a guess moved the strike counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeChange {
    Unchanged,
    Added,
    /// A correct guess took a strike away (`remove_strike_on_correct_guess`).
    Removed,
}

/// Whether the round survives a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundProgress {
    Continues,
    /// The whole word was guessed.
    Solved,
    /// Every letter of the word is now in the guessed set.
    Completed,
    /// Strikes reached [`MAX_STRIKES`].
    StruckOut,
}

impl RoundProgress {
    pub fn ends_round(self) -> bool {
        !matches!(self, RoundProgress::Continues)
    }
}

/// Outcome of a single guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessResult {
    /// Occurrences of the guessed letter (letter guesses) or 0.
    pub matches: usize,
    /// Points the guesser earned.
    pub points: u32,
    pub strike_change: StrikeChange,
    /// Strike count after the guess.
    pub strikes: u8,
    pub progress: RoundProgress,
}

impl GuessResult {
    pub fn is_correct(&self) -> bool {
        self.points > 0
    }
}

/// State of the current round.
#[derive(Debug, Clone)]
pub struct RoundState {
    word: String,
    guessed: HashSet<char>,
    strikes: u8,
    options: SessionOptions,
}

impl RoundState {
    /// `word` is uppercased; options are frozen for the round.
    pub fn new(word: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            word: word.into().to_ascii_uppercase(),
            guessed: HashSet::new(),
            strikes: 0,
            options,
        }
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn strikes(&self) -> u8 {
        self.strikes
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn is_guessed(&self, letter: char) -> bool {
        self.guessed.contains(&letter.to_ascii_uppercase())
    }

    /// Guessed letters in alphabetical order.
    pub fn guessed_letters(&self) -> Vec<char> {
        let mut letters: Vec<char> = self.guessed.iter().copied().collect();
        letters.sort_unstable();
        letters
    }

    /// Letter positions not yet revealed.
    pub fn unrevealed(&self) -> usize {
        self.word
            .chars()
            .filter(|c| !self.guessed.contains(c))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.unrevealed() == 0
    }

    /// The word with unrevealed letters replaced by `_`, e.g. `C _ T`.
    pub fn masked(&self) -> String {
        self.word
            .chars()
            .map(|c| if self.guessed.contains(&c) { c } else { '_' })
            .map(String::from)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Guess the whole word (case-insensitive).
    ///
    /// A match awards [`WORD_BONUS_PER_LETTER`] per unrevealed letter and ends
    /// the round; a miss adds a strike.
    pub fn guess_word(&mut self, candidate: &str) -> GuessResult {
        if candidate.trim().eq_ignore_ascii_case(&self.word) {
            let points = WORD_BONUS_PER_LETTER * self.unrevealed() as u32;
            let strike_change = self.reward_correct_guess();
            return GuessResult {
                matches: 0,
                points,
                strike_change,
                strikes: self.strikes,
                progress: RoundProgress::Solved,
            };
        }

        self.add_strike();
        GuessResult {
            matches: 0,
            points: 0,
            strike_change: StrikeChange::Added,
            strikes: self.strikes,
            progress: self.strike_progress(),
        }
    }

    /// Guess a single letter.
    ///
    /// In normal mode a repeated letter is rejected without touching any
    /// state. In hard mode it is processed again as if new, so a repeated
    /// correct letter scores again.
    pub fn guess_letter(&mut self, letter: char) -> Result<GuessResult, GuessError> {
        if !letter.is_ascii_alphabetic() {
            return Err(GuessError::NotALetter(letter));
        }
        let letter = letter.to_ascii_uppercase();
        if !self.options.hard_mode && self.guessed.contains(&letter) {
            return Err(GuessError::AlreadyGuessed(letter));
        }

        let matches = self.word.chars().filter(|&c| c == letter).count();
        self.guessed.insert(letter);

        if matches == 0 {
            self.add_strike();
            return Ok(GuessResult {
                matches,
                points: 0,
                strike_change: StrikeChange::Added,
                strikes: self.strikes,
                progress: self.strike_progress(),
            });
        }

        let strike_change = self.reward_correct_guess();
        let progress = if self.is_complete() {
            RoundProgress::Completed
        } else {
            RoundProgress::Continues
        };
        Ok(GuessResult {
            matches,
            points: matches as u32,
            strike_change,
            strikes: self.strikes,
            progress,
        })
    }

    fn reward_correct_guess(&mut self) -> StrikeChange {
        if self.options.remove_strike_on_correct_guess && self.strikes > 0 {
            self.strikes -= 1;
            StrikeChange::Removed
        } else {
            StrikeChange::Unchanged
        }
    }

    fn add_strike(&mut self) {
        self.strikes = (self.strikes + 1).min(MAX_STRIKES);
    }

    fn strike_progress(&self) -> RoundProgress {
        if self.strikes >= MAX_STRIKES {
            RoundProgress::StruckOut
        } else {
            RoundProgress::Continues
        }
    }
}
