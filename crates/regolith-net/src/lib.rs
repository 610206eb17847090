//! The networked simulation core: authoritative server world, predicting
//! client world, and the receive queue the server's receiver thread feeds.
//!
//! Both sides are plain state machines over datagrams: `handle_datagram`
//! consumes a received packet and pushes replies into an [`Outbox`], and a
//! per-tick entry point advances the simulation. The socket layer lives in
//! the application crate; everything here is deterministic and testable
//! without I/O.

mod client;
mod receive_queue;
mod server;


use std::net::SocketAddr;

pub use client::ClientWorld;
pub use receive_queue::{ReceiveQueue, SharedReceiveQueue};
pub use server::{ClientRecord, ServerWorld};

use regolith_sim::SimParams;

/// Datagrams queued for sending; the socket layer drains this after every
/// tick.
#[derive(Debug, Default)]
pub struct Outbox {
    /// Encoded datagrams and their destinations, in send order.
    pub datagrams: Vec<(Vec<u8>, SocketAddr)>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one datagram.
    pub fn push(&mut self, bytes: Vec<u8>, to: SocketAddr) {
        self.datagrams.push((bytes, to));
    }

    /// Removes and returns all queued datagrams.
    pub fn drain(&mut self) -> Vec<(Vec<u8>, SocketAddr)> {
        std::mem::take(&mut self.datagrams)
    }

    /// Number of queued datagrams.
    pub fn len(&self) -> usize {
        self.datagrams.len()
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.datagrams.is_empty()
    }
}

/// World and replication tunables shared by both sides.
#[derive(Debug, Clone)]
pub struct NetParams {
    /// Chunks along one grid edge.
    pub grid_edge: u32,
    /// Voxel edge length in world units.
    pub voxel_size: f32,
    /// Snapshots per second.
    pub snapshot_rate: f32,
    /// Pending-command ring capacity per player.
    pub command_ring_capacity: usize,
    /// Simulation tunables (must match on both sides).
    pub sim: SimParams,
}

impl Default for NetParams {
    fn default() -> Self {
        Self {
            grid_edge: 5,
            voxel_size: 9.0,
            snapshot_rate: 25.0,
            command_ring_capacity: 64,
            sim: SimParams::default(),
        }
    }
}

/// Component drift beyond which the server orders a client correction.
pub const CORRECTION_PRECISION: f32 = 0.1;

/// Hard-update batching: chunks per datagram.
pub const HARD_UPDATE_CHUNKS_PER_PACKET: usize = 8;
