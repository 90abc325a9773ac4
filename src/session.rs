//! Crawl session identity
//!
//! Each crawler gets a session number for log labelling. The counter lives in a
//! [`SessionRegistry`] owned by whoever builds crawlers, so two factories never share it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Diagnostic identity of one crawler instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic source of session ids
#[derive(Debug, Default)]
pub struct SessionRegistry {
    issued: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next session id, starting at 1
    pub fn next_session(&self) -> SessionId {
        SessionId(self.issued.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Number of sessions issued so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}
