//! Wire protocol for Regolith.
//!
//! Every datagram starts with a fixed 16-byte header carrying the sender
//! mode, packet type, client id, the total datagram size, and the
//! sender's tick. Integers and floats are little-endian; strings are
//! length-prefixed UTF-8. A datagram whose length disagrees with the
//! header's size field is discarded without touching any state.

mod codec;
mod packets;

pub use codec::{ByteReader, ByteWriter, CodecError};
pub use packets::{
    decode_packet, encode_packet, ChunkMods, DeltaChunk, DeltaVoxel, HardUpdateChunk, Packet,
    PacketHeader, PacketMode, PlayerInit, PlayerSnapshot, VoxelMod, HEADER_SIZE,
    VOXEL_PREDICTION_OK,
};
