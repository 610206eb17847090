//! Surface extraction for Regolith voxel chunks.
//!
//! A marching-cubes pass over every 2×2×2 voxel pair turns the density
//! field into a triangle soup. The same cell routine feeds both the render
//! mesh (chunk-local vertex buffers) and the collision engine (world-space
//! triangle lists); the only difference is the vertex sink.

mod extract;
mod tables;

pub use extract::{emit_cell_triangles, extract_chunk_mesh, MAX_VERTICES_PER_CHUNK};
pub use tables::{CORNER_OFFSETS, EDGE_CORNERS, TRIANGLE_TABLE};
