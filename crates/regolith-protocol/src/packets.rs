//! Packet kinds and their wire layout.

use glam::{Quat, Vec3};

use regolith_sim::InputCommand;
use regolith_voxel::CHUNK_VOLUME;

use crate::codec::{ByteReader, ByteWriter, CodecError};

/// Size of the common packet header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Sentinel density in a per-client voxel correction meaning "your
/// prediction for this voxel was right, keep it".
pub const VOXEL_PREDICTION_OK: u8 = 255;

/// Top bit of the hard-update chunk count, set on the first packet of a
/// stream (whose count field carries the stream total).
const HARD_UPDATE_FIRST_BIT: u32 = 1 << 31;

/// Who sent a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketMode {
    Client = 0,
    Server = 1,
}

// Client → server packet type bytes.
const CPT_JOIN: u8 = 0;
const CPT_INPUT_STATE: u8 = 1;
const CPT_PREDICTION_ERROR_CORRECTION: u8 = 2;
const CPT_ACK_GAME_STATE: u8 = 3;

// Server → client packet type bytes.
const SPT_HANDSHAKE: u8 = 0;
const SPT_CHUNK_VOXELS_HARD_UPDATE: u8 = 1;
const SPT_CLIENT_JOINED: u8 = 2;
const SPT_GAME_STATE_SNAPSHOT: u8 = 3;

/// The 16-byte header every datagram starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Sender side.
    pub mode: PacketMode,
    /// Type byte, scoped by `mode`.
    pub packet_type: u8,
    /// Sending (or addressed) client id.
    pub client_id: u16,
    /// Total datagram size including this header.
    pub total_size: u32,
    /// Sender's current tick.
    pub tick: u64,
}

impl PacketHeader {
    fn write(&self, w: &mut ByteWriter) {
        w.write_u8(self.mode as u8);
        w.write_u8(self.packet_type);
        w.write_u16(self.client_id);
        w.write_u32(self.total_size);
        w.write_u64(self.tick);
    }

    fn read(r: &mut ByteReader) -> Result<Self, CodecError> {
        let mode = match r.read_u8()? {
            0 => PacketMode::Client,
            1 => PacketMode::Server,
            other => return Err(CodecError::UnknownMode(other)),
        };
        Ok(Self {
            mode,
            packet_type: r.read_u8()?,
            client_id: r.read_u16()?,
            total_size: r.read_u32()?,
            tick: r.read_u64()?,
        })
    }
}

/// Initial state of one player, sent in handshakes and join fan-outs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInit {
    pub id: u16,
    pub name: String,
    pub p: Vec3,
    pub d: Vec3,
}

/// One voxel write reported by a client, chunk-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelMod {
    pub x: u8,
    pub y: u8,
    pub z: u8,
    pub value: u8,
}

/// Voxel writes grouped by chunk (linear chunk index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMods {
    pub chunk_index: u16,
    pub voxels: Vec<VoxelMod>,
}

/// One voxel of the authoritative delta: linear voxel index plus the value
/// before and after the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaVoxel {
    pub index: u16,
    pub prev: u8,
    pub next: u8,
}

/// Authoritative modifications of one chunk over the last interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaChunk {
    pub chunk_index: u16,
    pub voxels: Vec<DeltaVoxel>,
}

/// A full chunk volume replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardUpdateChunk {
    pub chunk_index: u16,
    /// Exactly [`CHUNK_VOLUME`] densities.
    pub voxels: Vec<u8>,
}

/// Replicated per-player state inside a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub id: u16,
    pub p: Vec3,
    pub d: Vec3,
    pub v: Vec3,
    pub u: Vec3,
    pub r: Quat,
    pub action_flags: u32,
    pub is_rolling: bool,
    pub need_correction: bool,
    pub need_voxel_correction: bool,
    pub is_to_ignore: bool,
}

impl PlayerSnapshot {
    const FLAG_ROLLING: u8 = 1 << 0;
    const FLAG_NEED_CORRECTION: u8 = 1 << 1;
    const FLAG_NEED_VOXEL_CORRECTION: u8 = 1 << 2;
    const FLAG_IS_TO_IGNORE: u8 = 1 << 3;

    fn flag_byte(&self) -> u8 {
        let mut flags = 0;
        if self.is_rolling {
            flags |= Self::FLAG_ROLLING;
        }
        if self.need_correction {
            flags |= Self::FLAG_NEED_CORRECTION;
        }
        if self.need_voxel_correction {
            flags |= Self::FLAG_NEED_VOXEL_CORRECTION;
        }
        if self.is_to_ignore {
            flags |= Self::FLAG_IS_TO_IGNORE;
        }
        flags
    }
}

/// Every packet kind of the protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Client asks to join with a display name.
    ClientJoin { name: String },
    /// Server accepts a join: the assigned id plus every existing player.
    ServerHandshake {
        client_id: u16,
        players: Vec<PlayerInit>,
    },
    /// Full chunk replacements streamed after a handshake; at most 8
    /// chunks per datagram. `is_first` marks the packet whose
    /// `total_chunk_count` sizes the whole stream.
    ChunkVoxelsHardUpdate {
        is_first: bool,
        total_chunk_count: u32,
        chunks: Vec<HardUpdateChunk>,
    },
    /// Another client joined; initialize its avatar.
    ClientJoined { player: PlayerInit },
    /// Client inputs since the last acknowledgment, the client's final
    /// predicted transform, and its predicted voxel edits.
    InputState {
        commands: Vec<InputCommand>,
        final_p: Vec3,
        final_d: Vec3,
        modified: Vec<ChunkMods>,
    },
    /// Authoritative world delta plus per-client corrections.
    GameStateSnapshot {
        voxel_delta: Vec<DeltaChunk>,
        last_ack_tick: u64,
        corrections: Vec<ChunkMods>,
        players: Vec<PlayerSnapshot>,
    },
    /// Client confirms it has resynced after a correction.
    PredictionErrorCorrection { tick: u64 },
    /// Client acknowledges a snapshot tick.
    AckGameStateReception { tick: u64 },
}

impl Packet {
    fn mode(&self) -> PacketMode {
        match self {
            Packet::ClientJoin { .. }
            | Packet::InputState { .. }
            | Packet::PredictionErrorCorrection { .. }
            | Packet::AckGameStateReception { .. } => PacketMode::Client,
            _ => PacketMode::Server,
        }
    }

    fn type_byte(&self) -> u8 {
        match self {
            Packet::ClientJoin { .. } => CPT_JOIN,
            Packet::InputState { .. } => CPT_INPUT_STATE,
            Packet::PredictionErrorCorrection { .. } => CPT_PREDICTION_ERROR_CORRECTION,
            Packet::AckGameStateReception { .. } => CPT_ACK_GAME_STATE,
            Packet::ServerHandshake { .. } => SPT_HANDSHAKE,
            Packet::ChunkVoxelsHardUpdate { .. } => SPT_CHUNK_VOXELS_HARD_UPDATE,
            Packet::ClientJoined { .. } => SPT_CLIENT_JOINED,
            Packet::GameStateSnapshot { .. } => SPT_GAME_STATE_SNAPSHOT,
        }
    }
}

fn write_player_init(w: &mut ByteWriter, init: &PlayerInit) {
    w.write_u16(init.id);
    w.write_string(&init.name);
    w.write_vec3(init.p);
    w.write_vec3(init.d);
}

fn read_player_init(r: &mut ByteReader) -> Result<PlayerInit, CodecError> {
    Ok(PlayerInit {
        id: r.read_u16()?,
        name: r.read_string()?,
        p: r.read_vec3()?,
        d: r.read_vec3()?,
    })
}

fn write_chunk_mods(w: &mut ByteWriter, mods: &[ChunkMods]) {
    w.write_u32(mods.len() as u32);
    for chunk in mods {
        w.write_u16(chunk.chunk_index);
        w.write_u32(chunk.voxels.len() as u32);
        for voxel in &chunk.voxels {
            w.write_u8(voxel.x);
            w.write_u8(voxel.y);
            w.write_u8(voxel.z);
            w.write_u8(voxel.value);
        }
    }
}

fn read_chunk_mods(r: &mut ByteReader) -> Result<Vec<ChunkMods>, CodecError> {
    let chunk_count = r.read_u32()? as usize;
    let mut mods = Vec::with_capacity(chunk_count.min(256));
    for _ in 0..chunk_count {
        let chunk_index = r.read_u16()?;
        let voxel_count = r.read_u32()? as usize;
        let mut voxels = Vec::with_capacity(voxel_count.min(CHUNK_VOLUME));
        for _ in 0..voxel_count {
            voxels.push(VoxelMod {
                x: r.read_u8()?,
                y: r.read_u8()?,
                z: r.read_u8()?,
                value: r.read_u8()?,
            });
        }
        mods.push(ChunkMods { chunk_index, voxels });
    }
    Ok(mods)
}

fn write_body(w: &mut ByteWriter, packet: &Packet) {
    match packet {
        Packet::ClientJoin { name } => {
            w.write_string(name);
        }
        Packet::ServerHandshake { client_id, players } => {
            w.write_u16(*client_id);
            w.write_u32(players.len() as u32);
            for player in players {
                write_player_init(w, player);
            }
        }
        Packet::ChunkVoxelsHardUpdate {
            is_first,
            total_chunk_count,
            chunks,
        } => {
            let mut count_field = *total_chunk_count & !HARD_UPDATE_FIRST_BIT;
            if *is_first {
                count_field |= HARD_UPDATE_FIRST_BIT;
            }
            w.write_u32(count_field);
            w.write_u32(chunks.len() as u32);
            for chunk in chunks {
                w.write_u16(chunk.chunk_index);
                w.write_bytes(&chunk.voxels);
            }
        }
        Packet::ClientJoined { player } => {
            write_player_init(w, player);
        }
        Packet::InputState {
            commands,
            final_p,
            final_d,
            modified,
        } => {
            w.write_u32(commands.len() as u32);
            for cmd in commands {
                w.write_u32(cmd.action_flags);
                w.write_f32(cmd.mouse_dx);
                w.write_f32(cmd.mouse_dy);
                w.write_u8(cmd.flags);
                w.write_f32(cmd.dt);
            }
            w.write_vec3(*final_p);
            w.write_vec3(*final_d);
            write_chunk_mods(w, modified);
        }
        Packet::GameStateSnapshot {
            voxel_delta,
            last_ack_tick,
            corrections,
            players,
        } => {
            w.write_u32(voxel_delta.len() as u32);
            for chunk in voxel_delta {
                w.write_u16(chunk.chunk_index);
                w.write_u32(chunk.voxels.len() as u32);
                for voxel in &chunk.voxels {
                    w.write_u16(voxel.index);
                    w.write_u8(voxel.prev);
                    w.write_u8(voxel.next);
                }
            }
            w.write_u64(*last_ack_tick);
            write_chunk_mods(w, corrections);
            w.write_u32(players.len() as u32);
            for player in players {
                w.write_u16(player.id);
                w.write_vec3(player.p);
                w.write_vec3(player.d);
                w.write_vec3(player.v);
                w.write_vec3(player.u);
                w.write_quat(player.r);
                w.write_u32(player.action_flags);
                w.write_u8(player.flag_byte());
            }
        }
        Packet::PredictionErrorCorrection { tick } => {
            w.write_u64(*tick);
        }
        Packet::AckGameStateReception { tick } => {
            w.write_u64(*tick);
        }
    }
}

fn read_body(header: &PacketHeader, r: &mut ByteReader) -> Result<Packet, CodecError> {
    match (header.mode, header.packet_type) {
        (PacketMode::Client, CPT_JOIN) => Ok(Packet::ClientJoin {
            name: r.read_string()?,
        }),
        (PacketMode::Client, CPT_INPUT_STATE) => {
            let command_count = r.read_u32()? as usize;
            let mut commands = Vec::with_capacity(command_count.min(1024));
            for _ in 0..command_count {
                commands.push(InputCommand {
                    action_flags: r.read_u32()?,
                    mouse_dx: r.read_f32()?,
                    mouse_dy: r.read_f32()?,
                    flags: r.read_u8()?,
                    dt: r.read_f32()?,
                });
            }
            let final_p = r.read_vec3()?;
            let final_d = r.read_vec3()?;
            let modified = read_chunk_mods(r)?;
            Ok(Packet::InputState {
                commands,
                final_p,
                final_d,
                modified,
            })
        }
        (PacketMode::Client, CPT_PREDICTION_ERROR_CORRECTION) => {
            Ok(Packet::PredictionErrorCorrection {
                tick: r.read_u64()?,
            })
        }
        (PacketMode::Client, CPT_ACK_GAME_STATE) => Ok(Packet::AckGameStateReception {
            tick: r.read_u64()?,
        }),
        (PacketMode::Server, SPT_HANDSHAKE) => {
            let client_id = r.read_u16()?;
            let player_count = r.read_u32()? as usize;
            let mut players = Vec::with_capacity(player_count.min(256));
            for _ in 0..player_count {
                players.push(read_player_init(r)?);
            }
            Ok(Packet::ServerHandshake { client_id, players })
        }
        (PacketMode::Server, SPT_CHUNK_VOXELS_HARD_UPDATE) => {
            let count_field = r.read_u32()?;
            let is_first = count_field & HARD_UPDATE_FIRST_BIT != 0;
            let total_chunk_count = count_field & !HARD_UPDATE_FIRST_BIT;
            let chunk_count = r.read_u32()? as usize;
            let mut chunks = Vec::with_capacity(chunk_count.min(8));
            for _ in 0..chunk_count {
                let chunk_index = r.read_u16()?;
                let voxels = r.read_bytes(CHUNK_VOLUME)?.to_vec();
                chunks.push(HardUpdateChunk { chunk_index, voxels });
            }
            Ok(Packet::ChunkVoxelsHardUpdate {
                is_first,
                total_chunk_count,
                chunks,
            })
        }
        (PacketMode::Server, SPT_CLIENT_JOINED) => Ok(Packet::ClientJoined {
            player: read_player_init(r)?,
        }),
        (PacketMode::Server, SPT_GAME_STATE_SNAPSHOT) => {
            let delta_count = r.read_u32()? as usize;
            let mut voxel_delta = Vec::with_capacity(delta_count.min(256));
            for _ in 0..delta_count {
                let chunk_index = r.read_u16()?;
                let voxel_count = r.read_u32()? as usize;
                let mut voxels = Vec::with_capacity(voxel_count.min(CHUNK_VOLUME));
                for _ in 0..voxel_count {
                    voxels.push(DeltaVoxel {
                        index: r.read_u16()?,
                        prev: r.read_u8()?,
                        next: r.read_u8()?,
                    });
                }
                voxel_delta.push(DeltaChunk { chunk_index, voxels });
            }
            let last_ack_tick = r.read_u64()?;
            let corrections = read_chunk_mods(r)?;
            let player_count = r.read_u32()? as usize;
            let mut players = Vec::with_capacity(player_count.min(256));
            for _ in 0..player_count {
                let id = r.read_u16()?;
                let p = r.read_vec3()?;
                let d = r.read_vec3()?;
                let v = r.read_vec3()?;
                let u = r.read_vec3()?;
                let rot = r.read_quat()?;
                let action_flags = r.read_u32()?;
                let flags = r.read_u8()?;
                players.push(PlayerSnapshot {
                    id,
                    p,
                    d,
                    v,
                    u,
                    r: rot,
                    action_flags,
                    is_rolling: flags & PlayerSnapshot::FLAG_ROLLING != 0,
                    need_correction: flags & PlayerSnapshot::FLAG_NEED_CORRECTION != 0,
                    need_voxel_correction: flags & PlayerSnapshot::FLAG_NEED_VOXEL_CORRECTION != 0,
                    is_to_ignore: flags & PlayerSnapshot::FLAG_IS_TO_IGNORE != 0,
                });
            }
            Ok(Packet::GameStateSnapshot {
                voxel_delta,
                last_ack_tick,
                corrections,
                players,
            })
        }
        (mode, packet_type) => Err(CodecError::UnknownPacketType {
            mode: mode as u8,
            packet_type,
        }),
    }
}

/// Serializes a packet into a complete datagram with a back-filled size
/// field.
pub fn encode_packet(client_id: u16, tick: u64, packet: &Packet) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(HEADER_SIZE + 64);
    let header = PacketHeader {
        mode: packet.mode(),
        packet_type: packet.type_byte(),
        client_id,
        total_size: 0,
        tick,
    };
    header.write(&mut w);
    write_body(&mut w, packet);
    let total = w.len() as u32;
    // total_size sits right after mode, type, and client_id.
    w.patch_u32(4, total);
    w.into_bytes()
}

/// Parses a datagram, validating that the declared size matches the bytes
/// actually received.
pub fn decode_packet(data: &[u8]) -> Result<(PacketHeader, Packet), CodecError> {
    let mut r = ByteReader::new(data);
    let header = PacketHeader::read(&mut r)?;
    if header.total_size as usize != data.len() {
        return Err(CodecError::SizeMismatch {
            declared: header.total_size,
            actual: data.len(),
        });
    }
    let packet = read_body(&header, &mut r)?;
    Ok((header, packet))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(packet: Packet) -> (PacketHeader, Packet) {
        let bytes = encode_packet(7, 42, &packet);
        let (header, decoded) = decode_packet(&bytes).expect("roundtrip should decode");
        assert_eq!(decoded, packet);
        (header, decoded)
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode_packet(0x0201, 0x0807_0605_0403_0201, &Packet::ClientJoin {
            name: String::new(),
        });
        assert_eq!(bytes[0], PacketMode::Client as u8);
        assert_eq!(bytes[1], 0); // join type byte
        assert_eq!(&bytes[2..4], &[0x01, 0x02]); // client id LE
        assert_eq!(
            u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            bytes.len() as u32
        );
        assert_eq!(
            &bytes[8..16],
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn test_client_join_roundtrip() {
        let (header, _) = roundtrip(Packet::ClientJoin {
            name: "alice".into(),
        });
        assert_eq!(header.client_id, 7);
        assert_eq!(header.tick, 42);
        assert_eq!(header.mode, PacketMode::Client);
    }

    #[test]
    fn test_handshake_roundtrip() {
        roundtrip(Packet::ServerHandshake {
            client_id: 3,
            players: vec![
                PlayerInit {
                    id: 0,
                    name: "host".into(),
                    p: Vec3::new(1.0, 2.0, 3.0),
                    d: Vec3::Z,
                },
                PlayerInit {
                    id: 1,
                    name: "peer".into(),
                    p: Vec3::splat(-9.0),
                    d: Vec3::X,
                },
            ],
        });
    }

    #[test]
    fn test_hard_update_roundtrip() {
        let chunk = HardUpdateChunk {
            chunk_index: 31,
            voxels: (0..CHUNK_VOLUME).map(|i| (i % 251) as u8).collect(),
        };
        roundtrip(Packet::ChunkVoxelsHardUpdate {
            is_first: true,
            total_chunk_count: 125,
            chunks: vec![chunk],
        });
    }

    #[test]
    fn test_hard_update_first_bit_does_not_corrupt_count() {
        let packet = Packet::ChunkVoxelsHardUpdate {
            is_first: false,
            total_chunk_count: 125,
            chunks: vec![],
        };
        let bytes = encode_packet(0, 0, &packet);
        let (_, decoded) = decode_packet(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_input_state_roundtrip() {
        roundtrip(Packet::InputState {
            commands: vec![
                InputCommand {
                    action_flags: 0b1_0000_0001,
                    mouse_dx: 4.5,
                    mouse_dy: -2.25,
                    flags: InputCommand::FLAG_ROLLING | InputCommand::FLAG_PHYSICS,
                    dt: 0.02,
                },
                InputCommand::idle(0.02),
            ],
            final_p: Vec3::new(10.0, -20.0, 30.0),
            final_d: Vec3::Z,
            modified: vec![ChunkMods {
                chunk_index: 12,
                voxels: vec![VoxelMod {
                    x: 1,
                    y: 2,
                    z: 3,
                    value: 200,
                }],
            }],
        });
    }

    #[test]
    fn test_snapshot_roundtrip() {
        roundtrip(Packet::GameStateSnapshot {
            voxel_delta: vec![DeltaChunk {
                chunk_index: 5,
                voxels: vec![
                    DeltaVoxel {
                        index: 100,
                        prev: 0,
                        next: 200,
                    },
                    DeltaVoxel {
                        index: 101,
                        prev: 255,
                        next: 60,
                    },
                ],
            }],
            last_ack_tick: 900,
            corrections: vec![ChunkMods {
                chunk_index: 5,
                voxels: vec![
                    VoxelMod {
                        x: 4,
                        y: 6,
                        z: 4,
                        value: VOXEL_PREDICTION_OK,
                    },
                    VoxelMod {
                        x: 4,
                        y: 6,
                        z: 5,
                        value: 120,
                    },
                ],
            }],
            players: vec![PlayerSnapshot {
                id: 0,
                p: Vec3::new(1.0, 2.0, 3.0),
                d: Vec3::Z,
                v: Vec3::X,
                u: Vec3::Y,
                r: Quat::IDENTITY,
                action_flags: 5,
                is_rolling: true,
                need_correction: true,
                need_voxel_correction: false,
                is_to_ignore: false,
            }],
        });
    }

    #[test]
    fn test_tick_packets_roundtrip() {
        roundtrip(Packet::PredictionErrorCorrection { tick: u64::MAX });
        roundtrip(Packet::AckGameStateReception { tick: 0 });
        roundtrip(Packet::ClientJoined {
            player: PlayerInit {
                id: 9,
                name: "bob".into(),
                p: Vec3::ZERO,
                d: Vec3::Z,
            },
        });
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let mut bytes = encode_packet(0, 0, &Packet::ClientJoin { name: "x".into() });
        bytes.push(0); // one trailing byte the header does not account for
        assert!(matches!(
            decode_packet(&bytes),
            Err(CodecError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let mut bytes = encode_packet(0, 0, &Packet::ClientJoin { name: "x".into() });
        bytes[1] = 200; // bogus type byte
        assert!(matches!(
            decode_packet(&bytes),
            Err(CodecError::UnknownPacketType { .. })
        ));
    }

    #[test]
    fn test_truncated_datagram_is_rejected() {
        let bytes = encode_packet(0, 0, &Packet::ClientJoin { name: "abcdef".into() });
        // Chop the body but keep a consistent header by re-declaring the
        // size; the string length prefix now overruns.
        let mut cut = bytes[..HEADER_SIZE + 4].to_vec();
        let total = cut.len() as u32;
        cut[4..8].copy_from_slice(&total.to_le_bytes());
        assert!(matches!(
            decode_packet(&cut),
            Err(CodecError::UnexpectedEnd { .. })
        ));
    }
}
