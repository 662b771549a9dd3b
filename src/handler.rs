//! Opaque handler identity.
//!
//! The trie never stores or invokes callables directly — it stores
//! [`HandlerId`] tokens in its `permanent`/`oneshot` sets and leaves mapping
//! a token back to a callable (and invoking it) to the caller. This keeps
//! the core free of `dyn Fn` storage lifetimes and `Send`/`Sync` questions
//! that belong to whatever façade sits on top of it.

use std::fmt;

/// An opaque, comparable handle standing in for a registered callback.
///
/// Two ids are equal iff they were constructed from the same token. Callers
/// that already have a natural identity for their handlers (a pointer, an
/// index into a `Vec`, a generated counter) wrap it in a `HandlerId` via
/// [`HandlerId::new`] or `From<u64>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Wraps a caller-chosen token as a handler identity.
    pub const fn new(token: u64) -> Self {
        Self(token)
    }

    /// Returns the token this id was constructed from.
    pub const fn token(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({})", self.0)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for HandlerId {
    fn from(token: u64) -> Self {
        Self::new(token)
    }
}
