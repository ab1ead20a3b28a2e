//! Secret-word source and the per-room draw pool.

use std::sync::Arc;

use rand::rng;
use rand::seq::SliceRandom;
use thiserror::Error;

/// Words used when no word list is configured.
const BUILTIN_WORDS: &[&str] = &[
    "ANCHOR", "BANANA", "CACTUS", "DRAGON", "ENGINE", "FALCON", "GALAXY", "HAMMER", "ISLAND",
    "JIGSAW", "KETTLE", "LANTERN", "MAGNET", "NEBULA", "OYSTER", "PILLOW", "QUARTZ", "ROCKET",
    "SADDLE", "TUNDRA", "UMBRELLA", "VELVET", "WALRUS", "XYLOPHONE", "YOGURT", "ZIPPER",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WordListError {
    #[error("word list contains no usable words")]
    Empty,
}

/// A validated, non-empty list of uppercase ASCII words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    /// Normalise `words` (trim + uppercase) and drop anything that is not
    /// purely alphabetic.
    pub fn new<I, S>(words: I) -> Result<Self, WordListError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_ascii_uppercase())
            .filter(|w| !w.is_empty() && w.chars().all(|c| c.is_ascii_alphabetic()))
            .collect();
        if words.is_empty() {
            return Err(WordListError::Empty);
        }
        Ok(Self { words })
    }

    pub fn builtin() -> Self {
        Self {
            words: BUILTIN_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

/// Draws secret words without replacement.
///
/// When every word has been drawn the pool is refilled from the full list, so
/// a word can only repeat after the whole list has been used.
#[derive(Debug, Clone)]
pub struct WordPool {
    source: Arc<WordList>,
    remaining: Vec<String>,
}

impl WordPool {
    pub fn new(source: Arc<WordList>) -> Self {
        Self {
            source,
            remaining: Vec::new(),
        }
    }

    /// Number of words left before the next refill.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn draw(&mut self) -> String {
        if self.remaining.is_empty() {
            self.refill();
        }
        // The source list is never empty, so a refilled pool always yields.
        self.remaining.pop().unwrap_or_default()
    }

    fn refill(&mut self) {
        self.remaining = self.source.words().to_vec();
        self.remaining.shuffle(&mut rng());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn normalises_and_filters_words() {
        let list = WordList::new(["  cat ", "", "dog2", "Bird"]).unwrap();
        assert_eq!(list.words(), &["CAT".to_string(), "BIRD".to_string()]);
    }

    #[test]
    fn empty_list_is_rejected() {
        assert_eq!(WordList::new(["", "  ", "42"]), Err(WordListError::Empty));
    }

    #[test]
    fn draws_without_replacement_then_refills() {
        let list = Arc::new(WordList::new(["one", "two", "three"]).unwrap());
        let mut pool = WordPool::new(list);

        let first: HashSet<String> = (0..3).map(|_| pool.draw()).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(pool.remaining(), 0);

        let second: HashSet<String> = (0..3).map(|_| pool.draw()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn builtin_list_is_valid() {
        let builtin = WordList::builtin();
        assert_eq!(WordList::new(builtin.words()).unwrap(), builtin);
    }
}
