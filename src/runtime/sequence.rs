//! Request-generation tokens.
//!
//! Each logical resource owns a `RequestSequencer`. Every fetch takes a ticket; when the
//! response arrives it is applied only if no newer ticket was issued in the meantime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Issues monotonically increasing generation numbers for one resource.
#[derive(Debug, Clone, Default)]
pub struct RequestSequencer {
    latest: Arc<AtomicU64>,
}

/// Proof of which generation a request belongs to.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, superseding every earlier ticket.
    pub fn begin(&self) -> RequestTicket {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket {
            id,
            latest: Arc::clone(&self.latest),
        }
    }

    /// Supersedes all outstanding tickets without starting a request.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

impl RequestTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True while no newer request for the same resource has started.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.id
    }
}
