//! Transport-agnostic hangman rules shared by the server and any client.

pub mod guess;
pub mod protocol;
pub mod turn_order;
pub mod words;
