//! The world grid: a dense cube of chunks plus the world↔voxel transform.
//!
//! Voxel space (`xs`) measures in voxels from the grid's minimum corner;
//! world space measures in world units centered on the grid. The grid is a
//! cube of `grid_edge³` chunks, all allocated up front.

use glam::{IVec3, Vec3};

use crate::chunk::{voxel_index, Chunk, CHUNK_EDGE};

/// Result of a neighbor-tolerant voxel lookup: the density, or air plus an
/// "absent" marker when the coordinate leaves the allocated grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeValue {
    /// The density (0 when the neighbor chunk does not exist).
    pub value: u8,
    /// `true` if the lookup crossed into a nonexistent chunk.
    pub absent: bool,
}

/// A fixed cube of voxel chunks.
pub struct VoxelGrid {
    chunks: Vec<Chunk>,
    grid_edge: i32,
    voxel_size: f32,
}

impl VoxelGrid {
    /// Allocates an all-air grid of `grid_edge³` chunks.
    pub fn new(grid_edge: u32, voxel_size: f32) -> Self {
        let edge = grid_edge as i32;
        let mut chunks = Vec::with_capacity((edge * edge * edge) as usize);
        for z in 0..edge {
            for y in 0..edge {
                for x in 0..edge {
                    chunks.push(Chunk::new(IVec3::new(x, y, z)));
                }
            }
        }
        Self {
            chunks,
            grid_edge: edge,
            voxel_size,
        }
    }

    /// Number of chunks along one grid edge.
    #[inline]
    pub fn grid_edge(&self) -> i32 {
        self.grid_edge
    }

    /// Total chunk count (`grid_edge³`).
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Edge length of one voxel in world units.
    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    /// Extent of the grid in voxels along one axis.
    #[inline]
    pub fn voxel_extent(&self) -> i32 {
        self.grid_edge * CHUNK_EDGE as i32
    }

    /// World-space position of voxel (0,0,0): the grid is centered on the
    /// world origin.
    #[inline]
    pub fn origin(&self) -> Vec3 {
        -Vec3::splat(self.grid_edge as f32 * CHUNK_EDGE as f32 / 2.0) * self.voxel_size
    }

    /// Transforms a world-space point into voxel space.
    #[inline]
    pub fn world_to_voxel(&self, ws: Vec3) -> Vec3 {
        (ws - self.origin()) / self.voxel_size
    }

    /// Transforms a voxel-space point into world space.
    #[inline]
    pub fn voxel_to_world(&self, xs: Vec3) -> Vec3 {
        xs * self.voxel_size + self.origin()
    }

    /// Linear index of a chunk coordinate, or `None` outside the grid.
    pub fn chunk_slot(&self, coord: IVec3) -> Option<usize> {
        let e = self.grid_edge;
        if coord.x >= 0 && coord.x < e && coord.y >= 0 && coord.y < e && coord.z >= 0 && coord.z < e
        {
            Some((coord.z * e * e + coord.y * e + coord.x) as usize)
        } else {
            None
        }
    }

    /// Grid coordinate for a linear chunk index.
    pub fn chunk_coord_of_slot(&self, slot: usize) -> IVec3 {
        let e = self.grid_edge as usize;
        IVec3::new(
            (slot % e) as i32,
            (slot / e % e) as i32,
            (slot / (e * e)) as i32,
        )
    }

    /// The chunk at a grid coordinate.
    pub fn chunk(&self, coord: IVec3) -> Option<&Chunk> {
        self.chunk_slot(coord).map(|slot| &self.chunks[slot])
    }

    /// Mutable access to the chunk at a grid coordinate.
    pub fn chunk_mut(&mut self, coord: IVec3) -> Option<&mut Chunk> {
        self.chunk_slot(coord).map(move |slot| &mut self.chunks[slot])
    }

    /// The chunk at a linear index (as carried on the wire).
    pub fn chunk_by_slot(&self, slot: usize) -> Option<&Chunk> {
        self.chunks.get(slot)
    }

    /// Mutable access to the chunk at a linear index.
    pub fn chunk_by_slot_mut(&mut self, slot: usize) -> Option<&mut Chunk> {
        self.chunks.get_mut(slot)
    }

    /// Rounds a voxel-space position to the voxel containing it.
    #[inline]
    pub fn voxel_coord(&self, xs: Vec3) -> IVec3 {
        xs.round().as_ivec3()
    }

    /// The chunk containing a voxel-space point, if inside the grid.
    pub fn chunk_of_point(&self, xs: Vec3) -> Option<&Chunk> {
        let v = self.voxel_coord(xs);
        self.in_bounds(v)
            .then(|| self.chunk(v / CHUNK_EDGE as i32))
            .flatten()
    }

    /// `true` if a global voxel coordinate lies inside the grid.
    #[inline]
    pub fn in_bounds(&self, v: IVec3) -> bool {
        let extent = self.voxel_extent();
        v.x >= 0 && v.x < extent && v.y >= 0 && v.y < extent && v.z >= 0 && v.z < extent
    }

    /// Density at a global voxel coordinate, or `None` outside the grid.
    pub fn voxel_value(&self, v: IVec3) -> Option<u8> {
        if !self.in_bounds(v) {
            return None;
        }
        let chunk = self.chunk(v / CHUNK_EDGE as i32)?;
        let local = v - chunk.bottom_corner;
        Some(chunk.get(local.x as usize, local.y as usize, local.z as usize))
    }

    /// Writes a density at a global voxel coordinate, recording it in the
    /// owning chunk's interval tracking. Returns `false` outside the grid.
    pub fn set_voxel(&mut self, v: IVec3, value: u8) -> bool {
        if !self.in_bounds(v) {
            return false;
        }
        if let Some(chunk) = self.chunk_mut(v / CHUNK_EDGE as i32) {
            let local = v - chunk.bottom_corner;
            chunk.set(local.x as usize, local.y as usize, local.z as usize, value);
            true
        } else {
            false
        }
    }

    /// Neighbor-resolving lookup relative to a chunk. Local coordinates may
    /// equal 16 on any axis, in which case the value comes from the +x/+y/+z
    /// neighbor. A missing neighbor reads as air with `absent` set.
    pub fn edge_voxel_value(&self, chunk_coord: IVec3, x: usize, y: usize, z: usize) -> EdgeValue {
        let mut offset = IVec3::ZERO;
        let mut local = (x, y, z);
        if x == CHUNK_EDGE {
            local.0 = 0;
            offset.x = 1;
        }
        if y == CHUNK_EDGE {
            local.1 = 0;
            offset.y = 1;
        }
        if z == CHUNK_EDGE {
            local.2 = 0;
            offset.z = 1;
        }
        match self.chunk(chunk_coord + offset) {
            Some(chunk) => EdgeValue {
                value: chunk.get(local.0, local.1, local.2),
                absent: false,
            },
            None => EdgeValue {
                value: 0,
                absent: true,
            },
        }
    }

    /// The eight densities of the voxel pair anchored at a global voxel
    /// coordinate, reading missing chunks as air. Corner order matches the
    /// surface-extraction tables.
    pub fn cell_values_or_air(&self, anchor: IVec3) -> [u8; 8] {
        let at = |d: IVec3| self.voxel_value(anchor + d).unwrap_or(0);
        [
            at(IVec3::new(0, 0, 0)),
            at(IVec3::new(1, 0, 0)),
            at(IVec3::new(1, 0, 1)),
            at(IVec3::new(0, 0, 1)),
            at(IVec3::new(0, 1, 0)),
            at(IVec3::new(1, 1, 0)),
            at(IVec3::new(1, 1, 1)),
            at(IVec3::new(0, 1, 1)),
        ]
    }

    /// Chunks with a non-empty modification list.
    pub fn modified_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| c.is_modified())
    }

    /// Closes the replication interval on every chunk.
    pub fn close_interval(&mut self) {
        for chunk in &mut self.chunks {
            chunk.close_interval();
        }
    }

    /// Collects and clears the mesh-dirty flags; the renderer re-extracts
    /// these chunks.
    pub fn drain_dirty_meshes(&mut self) -> Vec<IVec3> {
        let mut dirty = Vec::new();
        for chunk in &mut self.chunks {
            if chunk.dirty_mesh {
                chunk.dirty_mesh = false;
                dirty.push(chunk.coord);
            }
        }
        dirty
    }

    /// Writes a density without interval tracking. Used by world
    /// construction and by replication when applying authoritative data
    /// that must not be re-reported as a local edit.
    pub fn set_voxel_untracked(&mut self, v: IVec3, value: u8) {
        if !self.in_bounds(v) {
            return;
        }
        if let Some(chunk) = self.chunk_mut(v / CHUNK_EDGE as i32) {
            let local = v - chunk.bottom_corner;
            chunk.set_untracked(local.x as usize, local.y as usize, local.z as usize, value);
        }
    }

    /// Density via a linear chunk index and voxel index (wire addressing).
    pub fn voxel_by_indices(&self, chunk_slot: usize, index: u16) -> Option<u8> {
        self.chunks
            .get(chunk_slot)
            .map(|c| c.volume()[index as usize])
    }

    /// Density via a linear chunk index and local coordinate.
    pub fn voxel_by_local(&self, chunk_slot: usize, x: usize, y: usize, z: usize) -> Option<u8> {
        self.chunks
            .get(chunk_slot)
            .map(|c| c.volume()[voxel_index(x, y, z) as usize])
    }
}
