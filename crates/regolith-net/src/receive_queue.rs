//! The mutex-guarded packet queue between the receiver thread and the
//! main loop.
//!
//! The receiver thread's only job is to pull datagrams off the socket and
//! append them here; the main loop locks once per tick, copies everything
//! out in arrival order, and clears the arena. Datagrams that do not fit
//! the bounded arena are dropped — the protocol tolerates loss.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tracing::trace;

/// Default arena capacity (enough for several ticks of traffic).
const DEFAULT_ARENA_CAPACITY: usize = 1 << 20;

/// Bounded linear arena of received datagrams plus their arrival order.
pub struct ReceiveQueue {
    arena: Vec<u8>,
    capacity: usize,
    entries: Vec<(usize, usize, SocketAddr)>,
}

/// The queue as shared between the receiver thread and the main loop.
pub type SharedReceiveQueue = Arc<Mutex<ReceiveQueue>>;

impl ReceiveQueue {
    /// Creates a queue with the given arena capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            arena: Vec::with_capacity(capacity),
            capacity,
            entries: Vec::new(),
        }
    }

    /// Creates a queue with the default capacity, wrapped for sharing.
    pub fn shared() -> SharedReceiveQueue {
        Arc::new(Mutex::new(Self::new(DEFAULT_ARENA_CAPACITY)))
    }

    /// Appends one datagram. Returns `false` (dropping it) when the arena
    /// is full.
    pub fn push(&mut self, bytes: &[u8], from: SocketAddr) -> bool {
        if self.arena.len() + bytes.len() > self.capacity {
            trace!(len = bytes.len(), "receive arena full, dropping datagram");
            return false;
        }
        let offset = self.arena.len();
        self.arena.extend_from_slice(bytes);
        self.entries.push((offset, bytes.len(), from));
        true
    }

    /// Copies every queued datagram out in arrival order and clears the
    /// arena.
    pub fn drain_into(&mut self, out: &mut Vec<(Vec<u8>, SocketAddr)>) {
        for &(offset, len, addr) in &self.entries {
            out.push((self.arena[offset..offset + len].to_vec(), addr));
        }
        self.entries.clear();
        self.arena.clear();
    }

    /// Number of queued datagrams.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
