//! Dense 16³ density chunks with per-interval modification tracking.
//!
//! A voxel is an 8-bit density; values at or above the surface threshold
//! are solid. Every write through [`Chunk::set`] records the voxel's
//! pre-modification value the first time it is touched within the current
//! replication interval, so a snapshot can carry `(index, prev, next)`
//! triples. [`Chunk::close_interval`] clears the tracking state once the
//! interval has been serialized.

use glam::IVec3;
use rustc_hash::FxHashMap;

/// Side length of a chunk in voxels.
pub const CHUNK_EDGE: usize = 16;

/// Total number of voxels in a chunk (16³).
pub const CHUNK_VOLUME: usize = CHUNK_EDGE * CHUNK_EDGE * CHUNK_EDGE;

/// Converts a chunk-local coordinate to a linear voxel index (x fastest).
#[inline]
pub fn voxel_index(x: usize, y: usize, z: usize) -> u16 {
    debug_assert!(x < CHUNK_EDGE && y < CHUNK_EDGE && z < CHUNK_EDGE);
    (z * CHUNK_EDGE * CHUNK_EDGE + y * CHUNK_EDGE + x) as u16
}

/// Converts a linear voxel index back to a chunk-local coordinate.
#[inline]
pub fn voxel_coord_of_index(index: u16) -> IVec3 {
    let i = index as usize;
    IVec3::new(
        (i % CHUNK_EDGE) as i32,
        (i / CHUNK_EDGE % CHUNK_EDGE) as i32,
        (i / (CHUNK_EDGE * CHUNK_EDGE)) as i32,
    )
}

/// A 16³ block of voxel densities addressed by an integer grid coordinate.
///
/// Chunks live for the lifetime of the world. The modification list holds
/// each touched voxel index exactly once per interval; the history map
/// holds the value the voxel had when the interval started.
pub struct Chunk {
    /// Grid coordinate of this chunk.
    pub coord: IVec3,
    /// Voxel-space coordinate of the chunk's (0,0,0) corner (`coord * 16`).
    pub bottom_corner: IVec3,
    voxels: Box<[u8; CHUNK_VOLUME]>,
    modified: Vec<u16>,
    history: FxHashMap<u16, u8>,
    /// Surface mesh is stale and must be re-extracted.
    pub dirty_mesh: bool,
    /// Vertex data must be re-uploaded by the renderer.
    pub dirty_for_gpu: bool,
}

impl Chunk {
    /// Creates an all-air chunk at the given grid coordinate.
    pub fn new(coord: IVec3) -> Self {
        Self {
            coord,
            bottom_corner: coord * CHUNK_EDGE as i32,
            voxels: Box::new([0u8; CHUNK_VOLUME]),
            modified: Vec::new(),
            history: FxHashMap::default(),
            dirty_mesh: false,
            dirty_for_gpu: false,
        }
    }

    /// Returns the density at a chunk-local coordinate.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        self.voxels[voxel_index(x, y, z) as usize]
    }

    /// Writes a density, capturing the pre-image on the first write to this
    /// voxel in the current interval.
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: u8) {
        let index = voxel_index(x, y, z);
        let current = self.voxels[index as usize];
        if current == value {
            return;
        }
        if !self.history.contains_key(&index) {
            self.history.insert(index, current);
            self.modified.push(index);
        }
        self.voxels[index as usize] = value;
        self.dirty_mesh = true;
        self.dirty_for_gpu = true;
    }

    /// Replaces the entire voxel volume without touching the interval
    /// tracking. Used for initial construction and hard updates, where the
    /// receiver is not expected to re-replicate the data.
    pub fn write_volume(&mut self, values: &[u8; CHUNK_VOLUME]) {
        self.voxels.copy_from_slice(values);
        self.dirty_mesh = true;
        self.dirty_for_gpu = true;
    }

    /// Writes a single density without interval tracking (world
    /// construction path).
    #[inline]
    pub fn set_untracked(&mut self, x: usize, y: usize, z: usize, value: u8) {
        self.voxels[voxel_index(x, y, z) as usize] = value;
        self.dirty_mesh = true;
        self.dirty_for_gpu = true;
    }

    /// Writes a density by linear index without interval tracking
    /// (replication apply path).
    #[inline]
    pub fn set_index_untracked(&mut self, index: u16, value: u8) {
        self.voxels[index as usize] = value;
        self.dirty_mesh = true;
        self.dirty_for_gpu = true;
    }

    /// The raw voxel volume, linearized x-fastest.
    #[inline]
    pub fn volume(&self) -> &[u8; CHUNK_VOLUME] {
        &self.voxels
    }

    /// Indices modified since the last interval close, in first-write order.
    pub fn modified_voxels(&self) -> &[u16] {
        &self.modified
    }

    /// The pre-modification value of a voxel, if it was written this
    /// interval.
    pub fn history_value(&self, index: u16) -> Option<u8> {
        self.history.get(&index).copied()
    }

    /// Returns `true` if any voxel changed since the last interval close.
    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Iterates `(index, previous, next)` for every modified voxel.
    pub fn modification_delta(&self) -> impl Iterator<Item = (u16, u8, u8)> + '_ {
        self.modified.iter().map(move |&index| {
            let prev = self.history[&index];
            let next = self.voxels[index as usize];
            (index, prev, next)
        })
    }

    /// Clears the modification list, the history, and the GPU-dirty flag.
    /// Called after the interval has been serialized into a snapshot.
    pub fn close_interval(&mut self) {
        self.modified.clear();
        self.history.clear();
        self.dirty_for_gpu = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chunk_is_air() {
        let chunk = Chunk::new(IVec3::new(1, 2, 3));
        assert_eq!(chunk.bottom_corner, IVec3::new(16, 32, 48));
        assert_eq!(chunk.get(0, 0, 0), 0);
        assert_eq!(chunk.get(15, 15, 15), 0);
        assert!(!chunk.is_modified());
    }

    #[test]
    fn test_index_roundtrip() {
        for z in 0..CHUNK_EDGE {
            for y in 0..CHUNK_EDGE {
                for x in 0..CHUNK_EDGE {
                    let index = voxel_index(x, y, z);
                    assert_eq!(
                        voxel_coord_of_index(index),
                        IVec3::new(x as i32, y as i32, z as i32)
                    );
                }
            }
        }
    }

    #[test]
    fn test_history_captures_first_preimage() {
        let mut chunk = Chunk::new(IVec3::ZERO);
        chunk.set_untracked(4, 5, 6, 100);

        chunk.set(4, 5, 6, 150);
        chunk.set(4, 5, 6, 200);

        let index = voxel_index(4, 5, 6);
        // Pre-image is the value at interval start, not the intermediate one.
        assert_eq!(chunk.history_value(index), Some(100));
        // The index appears exactly once.
        assert_eq!(chunk.modified_voxels(), &[index]);
        assert_eq!(chunk.get(4, 5, 6), 200);
    }

    #[test]
    fn test_modification_list_matches_history() {
        let mut chunk = Chunk::new(IVec3::ZERO);
        for i in 0..10u8 {
            chunk.set(i as usize, 0, 0, 50 + i);
        }
        chunk.set(3, 0, 0, 9); // re-touch one voxel

        assert_eq!(chunk.modified_voxels().len(), 10);
        for &index in chunk.modified_voxels() {
            assert!(chunk.history_value(index).is_some());
        }
    }

    #[test]
    fn test_set_same_value_records_nothing() {
        let mut chunk = Chunk::new(IVec3::ZERO);
        chunk.set(0, 0, 0, 0);
        assert!(!chunk.is_modified());
        assert!(!chunk.dirty_mesh);
    }

    #[test]
    fn test_close_interval_clears_tracking() {
        let mut chunk = Chunk::new(IVec3::ZERO);
        chunk.set(1, 1, 1, 255);
        assert!(chunk.is_modified());
        assert!(chunk.dirty_for_gpu);

        chunk.close_interval();
        assert!(!chunk.is_modified());
        assert!(!chunk.dirty_for_gpu);
        assert_eq!(chunk.history_value(voxel_index(1, 1, 1)), None);
        // The value itself survives the interval close.
        assert_eq!(chunk.get(1, 1, 1), 255);
    }

    #[test]
    fn test_modification_delta() {
        let mut chunk = Chunk::new(IVec3::ZERO);
        chunk.set_untracked(2, 0, 0, 40);
        chunk.set(2, 0, 0, 90);

        let delta: Vec<_> = chunk.modification_delta().collect();
        assert_eq!(delta, vec![(voxel_index(2, 0, 0), 40, 90)]);
    }

    #[test]
    fn test_write_volume_skips_tracking() {
        let mut chunk = Chunk::new(IVec3::ZERO);
        let volume = [7u8; CHUNK_VOLUME];
        chunk.write_volume(&volume);
        assert_eq!(chunk.get(9, 9, 9), 7);
        assert!(!chunk.is_modified());
        assert!(chunk.dirty_mesh);
    }
}
