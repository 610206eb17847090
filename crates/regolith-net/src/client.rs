//! The predicting client world.
//!
//! The client runs the same simulation step as the server, optimistically,
//! tagging every command with its own tick and keeping it until the server
//! acknowledges it. Snapshots apply the authoritative voxel delta and
//! remote player states directly; for the local player a correction means
//! snapping to the server transform and silently replaying every pending
//! command.

use std::net::SocketAddr;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use regolith_protocol::{
    decode_packet, encode_packet, ChunkMods, DeltaChunk, Packet, PacketHeader, PacketMode,
    PlayerSnapshot, VoxelMod, VOXEL_PREDICTION_OK,
};
use regolith_sim::{step_player, CommandRing, InputCommand, Player};
use regolith_voxel::{voxel_coord_of_index, voxel_index, VoxelGrid, CHUNK_VOLUME};

use crate::{NetParams, Outbox};

/// The client-side game state.
pub struct ClientWorld {
    grid: VoxelGrid,
    players: Vec<Player>,
    slot_by_id: FxHashMap<u16, usize>,
    local_id: Option<u16>,
    name: String,
    tick: u64,
    ring: CommandRing,
    server_addr: SocketAddr,
    chunks_expected: u32,
    chunks_received: u32,
    params: NetParams,
}

impl ClientWorld {
    /// Creates a client for the given server address. The world starts
    /// empty and is filled by the hard-update stream after joining.
    pub fn new(name: impl Into<String>, server_addr: SocketAddr, params: NetParams) -> Self {
        Self {
            grid: VoxelGrid::new(params.grid_edge, params.voxel_size),
            players: Vec::new(),
            slot_by_id: FxHashMap::default(),
            local_id: None,
            name: name.into(),
            tick: 0,
            ring: CommandRing::new(params.command_ring_capacity),
            server_addr,
            chunks_expected: 0,
            chunks_received: 0,
            params,
        }
    }

    /// Current client tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The id the server assigned, once the handshake arrived.
    pub fn local_id(&self) -> Option<u16> {
        self.local_id
    }

    /// The predicted local voxel grid.
    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Renderer hook: chunks whose mesh must be re-extracted.
    pub fn grid_mut(&mut self) -> &mut VoxelGrid {
        &mut self.grid
    }

    /// All known avatars.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// The locally controlled avatar.
    pub fn local_player(&self) -> Option<&Player> {
        let id = self.local_id?;
        self.slot_by_id.get(&id).map(|&slot| &self.players[slot])
    }

    /// Number of commands not yet acknowledged by the server.
    pub fn pending_commands(&self) -> usize {
        self.ring.len()
    }

    /// `(received, expected)` progress of the join-time hard update.
    pub fn hard_update_progress(&self) -> (u32, u32) {
        (self.chunks_received, self.chunks_expected)
    }

    /// `true` once every hard-update chunk has arrived.
    pub fn world_ready(&self) -> bool {
        self.chunks_expected > 0 && self.chunks_received >= self.chunks_expected
    }

    /// Queues the join request.
    pub fn send_join(&self, out: &mut Outbox) {
        out.push(
            encode_packet(0, self.tick, &Packet::ClientJoin { name: self.name.clone() }),
            self.server_addr,
        );
    }

    /// Runs one predicted tick: advances the clock, applies the command
    /// locally, and sends every unacknowledged command plus the predicted
    /// outcome to the server.
    pub fn tick_input(&mut self, command: InputCommand, out: &mut Outbox) {
        self.tick += 1;
        let Some(id) = self.local_id else {
            return;
        };
        let Some(&slot) = self.slot_by_id.get(&id) else {
            return;
        };

        self.ring.push(self.tick, command);
        step_player(&mut self.players[slot], &mut self.grid, &command, &self.params.sim);
        self.send_input_state(slot, out);
    }

    fn send_input_state(&mut self, slot: usize, out: &mut Outbox) {
        let commands: Vec<InputCommand> = self.ring.iter().map(|t| t.command).collect();

        // Everything written locally since the last send is a prediction
        // the server will confirm or override.
        let modified: Vec<ChunkMods> = self
            .grid
            .modified_chunks()
            .map(|chunk| ChunkMods {
                chunk_index: self.grid.chunk_slot(chunk.coord).unwrap_or_default() as u16,
                voxels: chunk
                    .modification_delta()
                    .map(|(index, _prev, next)| {
                        let local = voxel_coord_of_index(index);
                        VoxelMod {
                            x: local.x as u8,
                            y: local.y as u8,
                            z: local.z as u8,
                            value: next,
                        }
                    })
                    .collect(),
            })
            .collect();
        self.grid.close_interval();

        let id = self.local_id.unwrap_or_default();
        let packet = Packet::InputState {
            commands,
            final_p: self.players[slot].p,
            final_d: self.players[slot].d,
            modified,
        };
        out.push(encode_packet(id, self.tick, &packet), self.server_addr);
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
        if header.mode != PacketMode::Server {
            return;
        }

        match packet {
            Packet::ServerHandshake { client_id, players } => {
                info!(client_id, "handshake received");
                self.local_id = Some(client_id);
                for init in players {
                    self.upsert_player(init.id, &init.name, init.p, init.d);
                }
            }
            Packet::ChunkVoxelsHardUpdate {
                is_first,
                total_chunk_count,
                chunks,
            } => {
                if is_first {
                    self.chunks_expected = total_chunk_count;
                    self.chunks_received = 0;
                }
                for hard in &chunks {
                    if hard.voxels.len() != CHUNK_VOLUME {
                        continue;
                    }
                    if let Some(chunk) = self.grid.chunk_by_slot_mut(hard.chunk_index as usize) {
                        let mut volume = [0u8; CHUNK_VOLUME];
                        volume.copy_from_slice(&hard.voxels);
                        chunk.write_volume(&volume);
                        self.chunks_received += 1;
                    }
                }
            }
            Packet::ClientJoined { player } => {
                if Some(player.id) != self.local_id {
                    info!(id = player.id, name = %player.name, "peer joined");
                    self.upsert_player(player.id, &player.name, player.p, player.d);
                }
            }
            Packet::GameStateSnapshot {
                voxel_delta,
                last_ack_tick,
                corrections,
                players,
            } => self.apply_snapshot(&header, voxel_delta, last_ack_tick, corrections, players, out),
            _ => {}
        }
    }

    fn upsert_player(&mut self, id: u16, name: &str, p: glam::Vec3, d: glam::Vec3) {
        if let Some(&slot) = self.slot_by_id.get(&id) {
            self.players[slot].p = p;
            self.players[slot].d = d;
            return;
        }
        let slot = self.players.len();
        self.players.push(Player::with_transform(id, name, p, d));
        self.slot_by_id.insert(id, slot);
    }

    fn apply_snapshot(
        &mut self,
        header: &PacketHeader,
        voxel_delta: Vec<DeltaChunk>,
        last_ack_tick: u64,
        corrections: Vec<ChunkMods>,
        players: Vec<PlayerSnapshot>,
        out: &mut Outbox,
    ) {
        // Voxels the server confirmed: the local prediction already holds
        // the right value, so the delta must not disturb them.
        let confirmed: FxHashSet<(u16, u16)> = corrections
            .iter()
            .flat_map(|mods| {
                mods.voxels
                    .iter()
                    .filter(|v| v.value == VOXEL_PREDICTION_OK)
                    .map(move |v| {
                        (
                            mods.chunk_index,
                            voxel_index(v.x as usize, v.y as usize, v.z as usize),
                        )
                    })
            })
            .collect();

        for delta in &voxel_delta {
            let Some(chunk) = self.grid.chunk_by_slot_mut(delta.chunk_index as usize) else {
                continue;
            };
            for voxel in &delta.voxels {
                if confirmed.contains(&(delta.chunk_index, voxel.index)) {
                    continue;
                }
                chunk.set_index_untracked(voxel.index, voxel.next);
            }
        }

        // Authoritative overrides for mispredicted voxels.
        for mods in &corrections {
            let Some(chunk) = self.grid.chunk_by_slot_mut(mods.chunk_index as usize) else {
                continue;
            };
            for voxel in &mods.voxels {
                if voxel.value != VOXEL_PREDICTION_OK {
                    chunk.set_index_untracked(
                        voxel_index(voxel.x as usize, voxel.y as usize, voxel.z as usize),
                        voxel.value,
                    );
                }
            }
        }

        let local_id = self.local_id;
        let mut own_snapshot: Option<PlayerSnapshot> = None;
        for snapshot in players {
            if Some(snapshot.id) == local_id {
                own_snapshot = Some(snapshot);
                continue;
            }
            if let Some(&slot) = self.slot_by_id.get(&snapshot.id) {
                let player = &mut self.players[slot];
                player.p = snapshot.p;
                player.d = snapshot.d;
                player.v = snapshot.v;
                player.u = snapshot.u;
                player.r = snapshot.r;
                player.action_flags = snapshot.action_flags;
                player.rolling_mode = snapshot.is_rolling;
            }
        }

        if let (Some(own), Some(id)) = (own_snapshot, local_id) {
            self.ring.discard_acknowledged(last_ack_tick);

            if own.need_correction {
                debug!(
                    tick = self.tick,
                    pending = self.ring.len(),
                    "applying server correction"
                );
                if let Some(&slot) = self.slot_by_id.get(&id) {
                    {
                        let player = &mut self.players[slot];
                        player.p = own.p;
                        player.d = own.d;
                        player.v = own.v;
                        player.u = own.u;
                        player.r = own.r;
                    }
                    // Silent replay of everything the server has not seen.
                    let pending: Vec<_> = self.ring.iter().copied().collect();
                    for tagged in &pending {
                        step_player(
                            &mut self.players[slot],
                            &mut self.grid,
                            &tagged.command,
                            &self.params.sim,
                        );
                    }
                }
                out.push(
                    encode_packet(id, self.tick, &Packet::PredictionErrorCorrection { tick: self.tick }),
                    self.server_addr,
                );
            }
        }

        let id = local_id.unwrap_or_default();
        out.push(
            encode_packet(id, self.tick, &Packet::AckGameStateReception { tick: header.tick }),
            self.server_addr,
        );
    }
}
