#![doc = include_str!("../README.md")]

mod handler;
mod trie;

pub use handler::HandlerId;
pub use trie::{PatternDispatcher, PatternIter};
