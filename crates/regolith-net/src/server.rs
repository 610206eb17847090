//! The authoritative server world.
//!
//! One record per connected client, one avatar per record (the same id
//! indexes both tables). Inputs are queued per player and applied through
//! the shared simulation step every tick; at the snapshot rate the server
//! builds the voxel delta, checks every client's reported prediction
//! against the authoritative state, and sends one snapshot per client.

use std::net::SocketAddr;

use glam::Vec3;
use tracing::{debug, info, warn};

use regolith_protocol::{
    decode_packet, encode_packet, ChunkMods, DeltaChunk, DeltaVoxel, HardUpdateChunk, Packet,
    PacketMode, PlayerInit, PlayerSnapshot, VoxelMod, VOXEL_PREDICTION_OK,
};
use regolith_sim::{step_player, CommandRing, Player};
use regolith_voxel::{voxel_index, VoxelGrid};

use crate::{NetParams, Outbox, CORRECTION_PRECISION, HARD_UPDATE_CHUNKS_PER_PACKET};

/// Most predicted voxel writes remembered per chunk per interval; the rest
/// are dropped and corrected by the next snapshot's delta instead.
const MAX_TRACKED_MODS_PER_CHUNK: usize = 80;

/// Per-client bookkeeping on the server.
pub struct ClientRecord {
    /// Stable client id; index into the client and player tables.
    pub id: u16,
    /// Display name from the join packet.
    pub name: String,
    /// Datagram return address.
    pub addr: SocketAddr,
    /// Last snapshot tick the client acknowledged.
    pub last_ack_tick: u64,
    /// Client tick of the last accepted input packet.
    pub last_client_tick: u64,
    /// The client's last self-reported position.
    pub reported_p: Vec3,
    /// The client's last self-reported facing direction.
    pub reported_d: Vec3,
    /// The client has sent at least one input packet since joining.
    pub received_commands: bool,
    /// The client sent commands during the current snapshot interval.
    pub commands_this_interval: bool,
    /// Predicted voxel writes reported since the last snapshot.
    pub pending_mods: Vec<ChunkMods>,
    /// Corrections were ordered; further inputs are ignored until the
    /// client confirms it resynced.
    pub needs_ack_prediction_error: bool,
}

/// The server-side game state.
pub struct ServerWorld {
    grid: VoxelGrid,
    players: Vec<Player>,
    clients: Vec<ClientRecord>,
    rings: Vec<CommandRing>,
    tick: u64,
    snapshot_accumulator: f32,
    params: NetParams,
}

impl ServerWorld {
    /// Builds the starting world and an empty client table.
    pub fn new(params: NetParams) -> Self {
        Self {
            grid: VoxelGrid::initial_world(params.grid_edge, params.voxel_size),
            players: Vec::new(),
            clients: Vec::new(),
            rings: Vec::new(),
            tick: 0,
            snapshot_accumulator: 0.0,
            params,
        }
    }

    /// Current server tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The authoritative voxel grid.
    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Mutable grid access for the host (scripted terrain, render hooks).
    pub fn grid_mut(&mut self) -> &mut VoxelGrid {
        &mut self.grid
    }

    /// All avatars, indexed by client id.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// All client records, indexed by client id.
    pub fn clients(&self) -> &[ClientRecord] {
        &self.clients
    }

    /// Consumes one received datagram. Malformed packets are dropped
    /// without touching any state.
    pub fn handle_datagram(&mut self, data: &[u8], from: SocketAddr, out: &mut Outbox) {
        let (header, packet) = match decode_packet(data) {
            Ok(decoded) => decoded,
            Err(error) => {
                debug!(%error, %from, "dropping malformed datagram");
                return;
            }
        };
        if header.mode != PacketMode::Client {
            return;
        }

        match packet {
            Packet::ClientJoin { name } => self.accept_join(name, from, out),
            Packet::InputState {
                commands,
                final_p,
                final_d,
                modified,
            } => self.ingest_input(header.client_id, header.tick, commands, final_p, final_d, modified),
            Packet::PredictionErrorCorrection { tick } => {
                if let Some(client) = self.clients.get_mut(header.client_id as usize) {
                    debug!(client = client.id, tick, "prediction error acknowledged");
                    client.needs_ack_prediction_error = false;
                    client.last_client_tick = tick;
                }
            }
            Packet::AckGameStateReception { tick } => {
                if let Some(client) = self.clients.get_mut(header.client_id as usize) {
                    client.last_ack_tick = client.last_ack_tick.max(tick);
                }
            }
            _ => {}
        }
    }

    /// Advances the simulation by one fixed step and dispatches snapshots
    /// at the snapshot rate.
    pub fn step(&mut self, dt: f32, out: &mut Outbox) {
        self.tick += 1;

        for (slot, player) in self.players.iter_mut().enumerate() {
            for tagged in self.rings[slot].drain_all() {
                step_player(player, &mut self.grid, &tagged.command, &self.params.sim);
            }
        }

        self.snapshot_accumulator += dt;
        if self.snapshot_accumulator > 1.0 / self.params.snapshot_rate {
            self.dispatch_snapshots(out);
            self.snapshot_accumulator = 0.0;
        }
    }

    fn accept_join(&mut self, name: String, from: SocketAddr, out: &mut Outbox) {
        let id = self.players.len() as u16;
        info!(%name, client = id, %from, "client joined");

        let player = Player::new(id, name.clone());
        self.players.push(player);
        self.rings
            .push(CommandRing::new(self.params.command_ring_capacity));
        self.clients.push(ClientRecord {
            id,
            name,
            addr: from,
            last_ack_tick: 0,
            last_client_tick: 0,
            reported_p: self.players[id as usize].p,
            reported_d: self.players[id as usize].d,
            received_commands: false,
            commands_this_interval: false,
            pending_mods: Vec::new(),
            needs_ack_prediction_error: false,
        });

        // Handshake: the assigned id plus every avatar, newcomer included.
        let players = self
            .players
            .iter()
            .map(|p| PlayerInit {
                id: p.id,
                name: p.name.clone(),
                p: p.p,
                d: p.d,
            })
            .collect();
        out.push(
            encode_packet(id, self.tick, &Packet::ServerHandshake { client_id: id, players }),
            from,
        );

        self.send_hard_updates(from, out);

        // Fan the newcomer out to everyone else.
        let init = PlayerInit {
            id,
            name: self.players[id as usize].name.clone(),
            p: self.players[id as usize].p,
            d: self.players[id as usize].d,
        };
        for client in &self.clients {
            if client.id != id {
                out.push(
                    encode_packet(client.id, self.tick, &Packet::ClientJoined { player: init.clone() }),
                    client.addr,
                );
            }
        }
    }

    /// Streams the whole grid as hard-update packets, 8 chunks per
    /// datagram; the first packet carries the stream total.
    fn send_hard_updates(&self, to: SocketAddr, out: &mut Outbox) {
        let total = self.grid.chunk_count() as u32;
        let mut first = true;
        let mut slot = 0usize;
        while slot < self.grid.chunk_count() {
            let batch_end = (slot + HARD_UPDATE_CHUNKS_PER_PACKET).min(self.grid.chunk_count());
            let chunks = (slot..batch_end)
                .map(|s| HardUpdateChunk {
                    chunk_index: s as u16,
                    voxels: self.grid.chunk_by_slot(s).map_or_else(Vec::new, |c| c.volume().to_vec()),
                })
                .collect();
            out.push(
                encode_packet(
                    0,
                    self.tick,
                    &Packet::ChunkVoxelsHardUpdate {
                        is_first: first,
                        total_chunk_count: total,
                        chunks,
                    },
                ),
                to,
            );
            first = false;
            slot = batch_end;
        }
    }

    fn ingest_input(
        &mut self,
        client_id: u16,
        client_tick: u64,
        commands: Vec<regolith_sim::InputCommand>,
        final_p: Vec3,
        final_d: Vec3,
        modified: Vec<ChunkMods>,
    ) {
        let slot = client_id as usize;
        let Some(client) = self.clients.get_mut(slot) else {
            warn!(client_id, "input from unknown client");
            return;
        };
        if client.needs_ack_prediction_error {
            // The client has not resynced yet; its inputs are stale.
            return;
        }

        client.received_commands = true;
        client.commands_this_interval = true;
        client.reported_p = final_p;
        client.reported_d = final_d;

        // The packet carries every command the client considers
        // unacknowledged, newest at tick `client_tick`. Commands already
        // ingested on an earlier packet are skipped by their implied tick.
        let count = commands.len() as u64;
        let first_tick = client_tick.saturating_sub(count.saturating_sub(1));
        for (i, command) in commands.into_iter().enumerate() {
            let implied_tick = first_tick + i as u64;
            if implied_tick <= client.last_client_tick {
                continue;
            }
            self.rings[slot].push(implied_tick, command);
        }
        client.last_client_tick = client.last_client_tick.max(client_tick);

        for incoming in modified {
            let entry = client
                .pending_mods
                .iter_mut()
                .find(|m| m.chunk_index == incoming.chunk_index);
            match entry {
                Some(existing) => {
                    let room = MAX_TRACKED_MODS_PER_CHUNK.saturating_sub(existing.voxels.len());
                    existing.voxels.extend(incoming.voxels.into_iter().take(room));
                }
                None => {
                    let mut chunk = incoming;
                    chunk.voxels.truncate(MAX_TRACKED_MODS_PER_CHUNK);
                    client.pending_mods.push(chunk);
                }
            }
        }
    }

    fn dispatch_snapshots(&mut self, out: &mut Outbox) {
        // Authoritative voxel delta for the closing interval.
        let voxel_delta: Vec<DeltaChunk> = self
            .grid
            .modified_chunks()
            .map(|chunk| DeltaChunk {
                chunk_index: self
                    .grid
                    .chunk_slot(chunk.coord)
                    .unwrap_or_default() as u16,
                voxels: chunk
                    .modification_delta()
                    .map(|(index, prev, next)| DeltaVoxel { index, prev, next })
                    .collect(),
            })
            .collect();

        for slot in 0..self.clients.len() {
            if !self.clients[slot].received_commands {
                continue;
            }

            // Per-client voxel prediction check: echo every reported voxel
            // with either the confirmation sentinel or the authoritative
            // value.
            let mut need_voxel_correction = false;
            let corrections: Vec<ChunkMods> = self.clients[slot]
                .pending_mods
                .iter()
                .map(|mods| ChunkMods {
                    chunk_index: mods.chunk_index,
                    voxels: mods
                        .voxels
                        .iter()
                        .map(|voxel| {
                            let actual = self
                                .grid
                                .voxel_by_indices(
                                    mods.chunk_index as usize,
                                    voxel_index(voxel.x as usize, voxel.y as usize, voxel.z as usize),
                                )
                                .unwrap_or(0);
                            let value = if actual == voxel.value {
                                VOXEL_PREDICTION_OK
                            } else {
                                need_voxel_correction = true;
                                actual
                            };
                            VoxelMod {
                                x: voxel.x,
                                y: voxel.y,
                                z: voxel.z,
                                value,
                            }
                        })
                        .collect(),
                })
                .collect();

            // Transform drift check against the client's self-report.
            let player = &self.players[slot];
            let dp = (self.clients[slot].reported_p - player.p).abs();
            let dd = (self.clients[slot].reported_d - player.d).abs();
            let drifted = dp.max_element() > CORRECTION_PRECISION
                || dd.max_element() > CORRECTION_PRECISION;
            let need_correction = drifted || need_voxel_correction;

            if need_correction {
                debug!(
                    client = self.clients[slot].id,
                    drifted, need_voxel_correction, "ordering client correction"
                );
                // Everything the client sent before resyncing is invalid.
                self.rings[slot].clear();
                self.clients[slot].needs_ack_prediction_error = true;
            }

            let players: Vec<PlayerSnapshot> = self
                .players
                .iter()
                .enumerate()
                .map(|(i, p)| PlayerSnapshot {
                    id: p.id,
                    p: p.p,
                    d: p.d,
                    v: p.v,
                    u: p.u,
                    r: p.r,
                    action_flags: p.action_flags,
                    is_rolling: p.rolling_mode,
                    need_correction: i == slot && need_correction,
                    need_voxel_correction: i == slot && need_voxel_correction,
                    is_to_ignore: !self.clients[i].commands_this_interval,
                })
                .collect();

            let packet = Packet::GameStateSnapshot {
                voxel_delta: voxel_delta.clone(),
                last_ack_tick: self.clients[slot].last_client_tick,
                corrections,
                players,
            };
            out.push(
                encode_packet(self.clients[slot].id, self.tick, &packet),
                self.clients[slot].addr,
            );

            self.clients[slot].pending_mods.clear();
        }

        for client in &mut self.clients {
            client.commands_this_interval = false;
        }
        self.grid.close_interval();
    }

}
