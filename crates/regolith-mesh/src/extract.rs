//! Cell-level triangle emission and whole-chunk mesh extraction.

use glam::{IVec3, Vec3};

use regolith_voxel::{VoxelGrid, CHUNK_EDGE, CHUNK_VOLUME};

use crate::tables::{CORNER_OFFSETS, EDGE_CORNERS, TRIANGLE_TABLE};

/// Vertex cap per chunk mesh: at most 5 triangles per cell over half the
/// cells produce geometry in practice.
pub const MAX_VERTICES_PER_CHUNK: usize = 5 * CHUNK_VOLUME / 2;

/// Interpolated vertex on a cell edge. The corner with the smaller density
/// goes on the left of the lerp so the parameter is oriented consistently.
fn edge_vertex(values: &[u8; 8], edge: usize, cell: IVec3, surface_level: u8) -> Vec3 {
    let (mut c0, mut c1) = EDGE_CORNERS[edge];
    let mut v0 = values[c0] as f32;
    let mut v1 = values[c1] as f32;
    if v0 > v1 {
        std::mem::swap(&mut v0, &mut v1);
        std::mem::swap(&mut c0, &mut c1);
    }
    let t = (surface_level as f32 - v0) / (v1 - v0);
    let p0 = (cell + CORNER_OFFSETS[c0]).as_vec3();
    let p1 = (cell + CORNER_OFFSETS[c1]).as_vec3();
    p0 + t * (p1 - p0)
}

/// Emits the surface triangles of one voxel pair into `sink`, in the table's
/// CCW order. Vertices are in the same space as `cell` (chunk-local or
/// voxel-space, depending on the caller).
pub fn emit_cell_triangles(
    values: &[u8; 8],
    cell: IVec3,
    surface_level: u8,
    sink: &mut impl FnMut(Vec3),
) {
    let mut mask = 0usize;
    for (i, &value) in values.iter().enumerate() {
        if value > surface_level {
            mask |= 1 << i;
        }
    }

    for &edge in TRIANGLE_TABLE[mask].iter() {
        if edge < 0 {
            break;
        }
        sink(edge_vertex(values, edge as usize, cell, surface_level));
    }
}

/// Gathers the eight densities of the cell anchored at `(x, y, z)` inside a
/// chunk, reaching into +x/+y/+z neighbors where a coordinate hits 16.
/// Returns `None` if a required neighbor chunk does not exist.
fn cell_values(
    grid: &VoxelGrid,
    chunk_coord: IVec3,
    x: usize,
    y: usize,
    z: usize,
) -> Option<[u8; 8]> {
    let mut values = [0u8; 8];
    for (i, offset) in CORNER_OFFSETS.iter().enumerate() {
        let edge = grid.edge_voxel_value(
            chunk_coord,
            x + offset.x as usize,
            y + offset.y as usize,
            z + offset.z as usize,
        );
        if edge.absent {
            return None;
        }
        values[i] = edge.value;
    }
    Some(values)
}

/// Extracts the surface mesh of one chunk into `out` as chunk-local
/// vertices, three per triangle.
///
/// The three boundary faces that read +x/+y/+z neighbors are done first,
/// then the interior; cells whose neighbor corners fall outside the grid
/// are skipped, so edge-of-world chunks produce partial meshes. For a given
/// density field the vertex sequence is deterministic.
pub fn extract_chunk_mesh(grid: &VoxelGrid, chunk_coord: IVec3, surface_level: u8, out: &mut Vec<Vec3>) {
    out.clear();
    let edge = CHUNK_EDGE;

    let mut sink = |v: Vec3, out: &mut Vec<Vec3>| {
        if out.len() < MAX_VERTICES_PER_CHUNK {
            out.push(v);
        }
    };

    // +x face, including the shared +z column.
    if grid.chunk(chunk_coord + IVec3::X).is_some() {
        let x = edge - 1;
        for z in 0..edge {
            for y in 0..edge - 1 {
                if let Some(values) = cell_values(grid, chunk_coord, x, y, z) {
                    emit_cell_triangles(
                        &values,
                        IVec3::new(x as i32, y as i32, z as i32),
                        surface_level,
                        &mut |v| sink(v, out),
                    );
                }
            }
        }
    }

    // +y face, including shared edges with +x and +z.
    if grid.chunk(chunk_coord + IVec3::Y).is_some() {
        let y = edge - 1;
        for z in 0..edge {
            for x in 0..edge {
                if let Some(values) = cell_values(grid, chunk_coord, x, y, z) {
                    emit_cell_triangles(
                        &values,
                        IVec3::new(x as i32, y as i32, z as i32),
                        surface_level,
                        &mut |v| sink(v, out),
                    );
                }
            }
        }
    }

    // +z face.
    if grid.chunk(chunk_coord + IVec3::Z).is_some() {
        let z = edge - 1;
        for y in 0..edge - 1 {
            for x in 0..edge - 1 {
                if let Some(values) = cell_values(grid, chunk_coord, x, y, z) {
                    emit_cell_triangles(
                        &values,
                        IVec3::new(x as i32, y as i32, z as i32),
                        surface_level,
                        &mut |v| sink(v, out),
                    );
                }
            }
        }
    }

    // Interior cells never leave the chunk.
    let Some(chunk) = grid.chunk(chunk_coord) else {
        return;
    };
    for z in 0..edge - 1 {
        for y in 0..edge - 1 {
            for x in 0..edge - 1 {
                let values = [
                    chunk.get(x, y, z),
                    chunk.get(x + 1, y, z),
                    chunk.get(x + 1, y, z + 1),
                    chunk.get(x, y, z + 1),
                    chunk.get(x, y + 1, z),
                    chunk.get(x + 1, y + 1, z),
                    chunk.get(x + 1, y + 1, z + 1),
                    chunk.get(x, y + 1, z + 1),
                ];
                emit_cell_triangles(
                    &values,
                    IVec3::new(x as i32, y as i32, z as i32),
                    surface_level,
                    &mut |v| sink(v, out),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: u8 = 60;

    fn filled_grid(fill: u8) -> VoxelGrid {
        let mut grid = VoxelGrid::new(3, 9.0);
        let extent = grid.voxel_extent();
        for z in 0..extent {
            for y in 0..extent {
                for x in 0..extent {
                    grid.set_voxel(IVec3::new(x, y, z), fill);
                }
            }
        }
        grid.close_interval();
        grid
    }

    #[test]
    fn test_air_chunk_produces_no_triangles() {
        let grid = VoxelGrid::new(3, 9.0);
        let mut out = Vec::new();
        extract_chunk_mesh(&grid, IVec3::new(1, 1, 1), SURFACE, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_solid_chunk_with_solid_neighbors_produces_no_triangles() {
        let grid = filled_grid(255);
        let mut out = Vec::new();
        // Center chunk: all neighbors exist and are fully solid.
        extract_chunk_mesh(&grid, IVec3::new(1, 1, 1), SURFACE, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_single_solid_voxel_produces_closed_surface() {
        let mut grid = VoxelGrid::new(3, 9.0);
        grid.set_voxel(IVec3::new(24, 24, 24), 255);
        grid.close_interval();

        let mut out = Vec::new();
        extract_chunk_mesh(&grid, IVec3::new(1, 1, 1), SURFACE, &mut out);
        // One isolated voxel cuts 8 single-corner cells, one triangle each.
        assert_eq!(out.len(), 24);
        assert_eq!(out.len() % 3, 0);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let mut grid = VoxelGrid::new(3, 9.0);
        grid.construct_sphere(Vec3::ZERO, 80.0);

        let mut a = Vec::new();
        let mut b = Vec::new();
        extract_chunk_mesh(&grid, IVec3::new(1, 1, 1), SURFACE, &mut a);
        extract_chunk_mesh(&grid, IVec3::new(1, 1, 1), SURFACE, &mut b);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_vertices_stay_near_chunk_bounds() {
        let mut grid = VoxelGrid::new(3, 9.0);
        grid.construct_sphere(Vec3::ZERO, 80.0);

        let mut out = Vec::new();
        extract_chunk_mesh(&grid, IVec3::new(1, 1, 1), SURFACE, &mut out);
        assert!(out.len() <= MAX_VERTICES_PER_CHUNK);
        for v in &out {
            // Chunk-local coordinates, boundary cells reach one voxel over.
            assert!(v.x >= 0.0 && v.x <= 16.0);
            assert!(v.y >= 0.0 && v.y <= 16.0);
            assert!(v.z >= 0.0 && v.z <= 16.0);
        }
    }

    #[test]
    fn test_vertex_interpolation_weights_by_density() {
        // A lone corner at 120 against air: density crosses 60 exactly
        // halfway along each cut edge.
        let mut values = [0u8; 8];
        values[0] = 120;
        let mut out = Vec::new();
        emit_cell_triangles(&values, IVec3::ZERO, SURFACE, &mut |v| out.push(v));
        assert_eq!(out.len(), 3);
        for v in &out {
            let d = (*v - Vec3::ZERO).length();
            assert!((d - 0.5).abs() < 1e-5, "vertex {v} not at edge midpoint");
        }
    }

    #[test]
    fn test_boundary_face_uses_neighbor_data() {
        let mut grid = VoxelGrid::new(2, 9.0);
        // Solid voxel in the first voxel of the +x neighbor chunk; the seam
        // between chunk 0 and chunk 1 must produce triangles in chunk 0.
        grid.set_voxel(IVec3::new(16, 8, 8), 255);
        grid.close_interval();

        let mut out = Vec::new();
        extract_chunk_mesh(&grid, IVec3::ZERO, SURFACE, &mut out);
        assert!(
            !out.is_empty(),
            "seam cells should see the neighbor's solid voxel"
        );
    }

    #[test]
    fn test_missing_neighbor_skips_boundary_cells() {
        let mut grid = VoxelGrid::new(1, 9.0);
        // Single-chunk world: nothing beyond the +x face.
        grid.set_voxel(IVec3::new(15, 8, 8), 255);
        grid.close_interval();

        let mut out = Vec::new();
        extract_chunk_mesh(&grid, IVec3::ZERO, SURFACE, &mut out);
        // The interior cells around (14, 7..8, 7..8) still triangulate; the
        // x == 15 cells are skipped without panicking.
        assert!(!out.is_empty());
        for v in &out {
            assert!(v.x <= 15.0 + 1e-5);
        }
    }
}
