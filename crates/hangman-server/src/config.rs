//! Command-line / environment configuration and the per-room game settings
//! derived from it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hangman_core::words::WordList;
use tracing::{info, warn};

#[derive(Debug, Clone, Parser)]
#[command(name = "hangman-server")]
#[command(about = "Multi-room hangman game server", long_about = None)]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Word list, one word per line (built-in list when omitted)
    #[arg(long, env = "HANGMAN_WORDS_FILE")]
    pub words_file: Option<PathBuf>,

    /// Rounds per session
    #[arg(long, env = "HANGMAN_MAX_ROUNDS", default_value_t = 5)]
    pub max_rounds: u32,

    /// Seconds a member has to act on their turn
    #[arg(long, env = "HANGMAN_TURN_SECONDS", default_value_t = 30)]
    pub turn_seconds: u32,

    /// Optional hard deadline per round
    #[arg(long, env = "HANGMAN_ROUND_SECONDS")]
    pub round_seconds: Option<u32>,

    /// Seconds the ready check waits after the first member readies up
    #[arg(long, env = "HANGMAN_READY_SECONDS", default_value_t = 30)]
    pub ready_seconds: u32,

    /// Ready members needed to start a session
    #[arg(long, env = "HANGMAN_MIN_PLAYERS", default_value_t = 2)]
    pub min_players: usize,
}

impl ServerConfig {
    /// Build the settings shared by every room, loading the word list.
    pub fn game_settings(&self) -> GameSettings {
        let words = match &self.words_file {
            Some(path) => load_words(path),
            None => WordList::builtin(),
        };
        GameSettings {
            max_rounds: self.max_rounds.max(1),
            turn_duration: Duration::from_secs(self.turn_seconds.max(1).into()),
            round_duration: self
                .round_seconds
                .filter(|&secs| secs > 0)
                .map(|secs| Duration::from_secs(secs.into())),
            ready_duration: Duration::from_secs(self.ready_seconds.max(1).into()),
            min_players: self.min_players.max(1),
            words: Arc::new(words),
        }
    }
}

/// Immutable settings every room is created with.
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub max_rounds: u32,
    pub turn_duration: Duration,
    /// `None` disables the round timer.
    pub round_duration: Option<Duration>,
    pub ready_duration: Duration,
    pub min_players: usize,
    pub words: Arc<WordList>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            turn_duration: Duration::from_secs(30),
            round_duration: None,
            ready_duration: Duration::from_secs(30),
            min_players: 2,
            words: Arc::new(WordList::builtin()),
        }
    }
}

/// Read a word list from disk, falling back to the built-in list when the
/// file is missing, unreadable or has no usable words.
fn load_words(path: &Path) -> WordList {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read word list; using built-in words");
            return WordList::builtin();
        }
    };

    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    match WordList::new(&lines) {
        Ok(list) => {
            let skipped = lines.len() - list.len();
            if skipped > 0 {
                warn!(path = %path.display(), skipped, "skipped non-alphabetic words");
            }
            info!(path = %path.display(), count = list.len(), "loaded word list");
            list
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "word list unusable; using built-in words");
            WordList::builtin()
        }
    }
}
