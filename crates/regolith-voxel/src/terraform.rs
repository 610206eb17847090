//! Terraforming brushes and initial world construction.
//!
//! The terraform brush adjusts densities inside a sphere of voxels, scaled
//! by distance from the center and by the frame's `dt` so the tool's rate
//! is time-based rather than tick-based. The ray variant walks the
//! player's view ray until it meets the surface, then applies the brush
//! there.

use glam::{IVec3, Vec3};

use crate::grid::VoxelGrid;

impl VoxelGrid {
    /// Adjusts densities in a sphere of `radius` voxels around `center`.
    ///
    /// Each voxel moves by `±round(proportion · rate · dt)` where
    /// `proportion = 1 − d²/r²`, clamped to the valid density range.
    /// The sphere may span several chunks; every touched chunk records the
    /// change in its interval tracking.
    pub fn terraform(&mut self, center: IVec3, radius: u32, additive: bool, dt: f32, rate: f32) {
        let coefficient = if additive { 1.0 } else { -1.0 };
        let radius = radius as f32;
        let radius_squared = radius * radius;
        let bottom_corner = center - IVec3::splat(radius as i32);
        let diameter = radius as i32 * 2 + 1;

        for z in 0..diameter {
            for y in 0..diameter {
                for x in 0..diameter {
                    let v = bottom_corner + IVec3::new(x, y, z);
                    let diff = (v - center).as_vec3();
                    let distance_squared = diff.length_squared();
                    if distance_squared > radius_squared {
                        continue;
                    }
                    let Some(current) = self.voxel_value(v) else {
                        continue;
                    };
                    let proportion = 1.0 - distance_squared / radius_squared;
                    let delta = (proportion * coefficient * rate * dt).round() as i32;
                    let next = (current as i32 + delta).clamp(0, 255) as u8;
                    self.set_voxel(v, next);
                }
            }
        }
    }

    /// Walks a world-space ray in steps of `max_range / 10` voxels and
    /// applies the terraform brush at the first voxel whose density exceeds
    /// `surface_level`. Returns `true` if the ray met the surface.
    pub fn ray_terraform(
        &mut self,
        ws_origin: Vec3,
        ws_direction: Vec3,
        max_range: f32,
        dt: f32,
        additive: bool,
        surface_level: u8,
        radius: u32,
        rate: f32,
    ) -> bool {
        let start = self.world_to_voxel(ws_origin);
        let max_range = max_range / self.voxel_size();
        let step = max_range / 10.0;
        let max_range_squared = max_range * max_range;

        let mut current = start;
        while (current - start).length_squared() < max_range_squared {
            let v = self.voxel_coord(current);
            if let Some(value) = self.voxel_value(v) {
                if value > surface_level {
                    self.terraform(v, radius, additive, dt, rate);
                    return true;
                }
            }
            current += step * ws_direction;
        }
        false
    }

    /// Fills a solid sphere of density falling off from the center
    /// (`proportion · 255`). World construction only; bypasses interval
    /// tracking.
    pub fn construct_sphere(&mut self, ws_center: Vec3, ws_radius: f32) {
        let center = self.voxel_coord(self.world_to_voxel(ws_center));
        let radius = (ws_radius / self.voxel_size()).round();
        let radius_squared = radius * radius;
        let bottom_corner = center - IVec3::splat(radius as i32);
        let diameter = radius as i32 * 2 + 1;

        for z in 0..diameter {
            for y in 0..diameter {
                for x in 0..diameter {
                    let v = bottom_corner + IVec3::new(x, y, z);
                    let diff = (v - center).as_vec3();
                    let distance_squared = diff.length_squared();
                    if distance_squared <= radius_squared {
                        let proportion = 1.0 - distance_squared / radius_squared;
                        self.set_voxel_untracked(v, (proportion * 255.0) as u8);
                    }
                }
            }
        }
    }

    /// Fills a one-voxel-thick solid square slab centered on a world point.
    /// World construction only; bypasses interval tracking.
    pub fn construct_plane(&mut self, ws_origin: Vec3, ws_radius: f32) {
        let origin = self.voxel_coord(self.world_to_voxel(ws_origin));
        let radius = (ws_radius / self.voxel_size()).round() as i32;
        let bottom_corner = origin - IVec3::new(radius, 0, radius);
        let diameter = radius * 2 + 1;

        for z in 0..diameter {
            for x in 0..diameter {
                let v = bottom_corner + IVec3::new(x, 0, z);
                self.set_voxel_untracked(v, 255);
            }
        }
    }

    /// Builds the starting world: two overlapping density spheres.
    pub fn initial_world(grid_edge: u32, voxel_size: f32) -> VoxelGrid {
        let mut grid = VoxelGrid::new(grid_edge, voxel_size);
        grid.construct_sphere(Vec3::new(80.0, 70.0, 0.0), 60.0);
        grid.construct_sphere(Vec3::new(-80.0, -50.0, 0.0), 120.0);
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_grid() -> VoxelGrid {
        VoxelGrid::new(5, 9.0)
    }

    #[test]
    fn test_terraform_additive_raises_center_most() {
        let mut grid = test_grid();
        let center = IVec3::new(40, 40, 40);
        grid.terraform(center, 2, true, 1.0 / 50.0, 700.0);

        let center_value = grid.voxel_value(center).unwrap();
        let edge_value = grid.voxel_value(center + IVec3::new(1, 0, 0)).unwrap();
        // proportion 1 at the center: round(1 · 700 · 0.02) = 14.
        assert_eq!(center_value, 14);
        assert!(edge_value < center_value);
        assert!(edge_value > 0);
    }

    #[test]
    fn test_terraform_destructive_clamps_at_zero() {
        let mut grid = test_grid();
        let center = IVec3::new(40, 40, 40);
        grid.terraform(center, 2, false, 1.0 / 50.0, 700.0);
        assert_eq!(grid.voxel_value(center), Some(0));
    }

    #[test]
    fn test_terraform_additive_clamps_at_max() {
        let mut grid = test_grid();
        let center = IVec3::new(40, 40, 40);
        grid.set_voxel(center, 250);
        grid.close_interval();
        grid.terraform(center, 2, true, 1.0, 700.0);
        assert_eq!(grid.voxel_value(center), Some(255));
    }

    #[test]
    fn test_terraform_crosses_chunk_boundary() {
        let mut grid = test_grid();
        // Centered on the first voxel of chunk (1,0,0): the brush reaches
        // back into chunk (0,0,0).
        grid.terraform(IVec3::new(16, 8, 8), 2, true, 1.0, 700.0);
        assert!(grid.chunk(IVec3::new(0, 0, 0)).unwrap().is_modified());
        assert!(grid.chunk(IVec3::new(1, 0, 0)).unwrap().is_modified());
    }

    #[test]
    fn test_terraform_records_history_once() {
        let mut grid = test_grid();
        let center = IVec3::new(40, 40, 40);
        grid.terraform(center, 2, true, 1.0 / 50.0, 700.0);
        grid.terraform(center, 2, true, 1.0 / 50.0, 700.0);

        let chunk = grid.chunk(IVec3::new(2, 2, 2)).unwrap();
        let index_of_center = crate::voxel_index(8, 8, 8);
        // Pre-image is from before the first brush application.
        assert_eq!(chunk.history_value(index_of_center), Some(0));
        let listed = chunk
            .modified_voxels()
            .iter()
            .filter(|&&i| i == index_of_center)
            .count();
        assert_eq!(listed, 1);
    }

    #[test]
    fn test_ray_terraform_hits_solid() {
        let mut grid = test_grid();
        grid.construct_sphere(Vec3::new(80.0, 70.0, 0.0), 60.0);
        grid.close_interval();

        // Aim from outside the sphere straight at its center.
        let origin = Vec3::new(80.0, 140.0, 0.0);
        let direction = Vec3::new(0.0, -1.0, 0.0);
        let hit = grid.ray_terraform(origin, direction, 70.0, 1.0 / 50.0, false, 60, 2, 700.0);
        assert!(hit);
        assert!(grid.modified_chunks().count() > 0);
    }

    #[test]
    fn test_ray_terraform_misses_air() {
        let mut grid = test_grid();
        let hit = grid.ray_terraform(
            Vec3::ZERO,
            Vec3::new(0.0, 1.0, 0.0),
            70.0,
            1.0 / 50.0,
            false,
            60,
            2,
            700.0,
        );
        assert!(!hit);
        assert_eq!(grid.modified_chunks().count(), 0);
    }

    #[test]
    fn test_destroy_on_empty_voxel_stays_zero() {
        let mut grid = test_grid();
        let center = IVec3::new(40, 40, 40);
        grid.terraform(center, 2, false, 1.0 / 50.0, 700.0);
        grid.terraform(center, 2, false, 1.0 / 50.0, 700.0);
        assert_eq!(grid.voxel_value(center), Some(0));
    }

    #[test]
    fn test_initial_world_probe_values() {
        let grid = VoxelGrid::initial_world(5, 9.0);
        // The center of the first sphere is fully solid.
        let solid = grid.voxel_coord(grid.world_to_voxel(Vec3::new(80.0, 70.0, 0.0)));
        assert_eq!(grid.voxel_value(solid), Some(255));
        // A point outside both spheres (and outside the grid box) is air.
        let far = grid.voxel_coord(grid.world_to_voxel(Vec3::new(300.0, 300.0, 300.0)));
        assert_eq!(grid.voxel_value(far).unwrap_or(0), 0);
    }

    #[test]
    fn test_initial_world_has_no_open_interval() {
        let grid = VoxelGrid::initial_world(5, 9.0);
        assert_eq!(grid.modified_chunks().count(), 0);
    }

    #[test]
    fn test_construct_plane_fills_slab() {
        let mut grid = test_grid();
        grid.construct_plane(Vec3::ZERO, 60.0);
        let center = grid.voxel_coord(grid.world_to_voxel(Vec3::ZERO));
        assert_eq!(grid.voxel_value(center), Some(255));
        assert_eq!(grid.voxel_value(center + IVec3::new(3, 0, 3)), Some(255));
        assert_eq!(grid.voxel_value(center + IVec3::new(0, 1, 0)), Some(0));
    }
}
