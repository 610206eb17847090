//! Voxel terrain storage for Regolith.
//!
//! The world is a fixed grid of 16×16×16 density chunks, allocated eagerly
//! for every grid cell. Each chunk tracks which voxels changed since the
//! last replication interval (and their pre-modification values) so the
//! server can build compact deltas. Terraforming brushes and the initial
//! world construction live in [`terraform`].

mod chunk;
mod grid;
mod terraform;

pub use chunk::{voxel_coord_of_index, voxel_index, Chunk, CHUNK_EDGE, CHUNK_VOLUME};
pub use grid::{EdgeValue, VoxelGrid};
