//! Swept unit-sphere vs triangle-soup collision in ellipsoid space.
//!
//! Detection follows the classic face / vertex / edge ordering: the face
//! test solves the sphere-plane contact times, projects the contact point
//! into the triangle, and falls back to quadratic vertex and edge tests
//! when the face contact lies outside. A sphere that starts embedded in a
//! triangle's plane is pushed out along the normal and re-tested. Response
//! slides the remaining velocity along the contact plane and recurses.

use glam::{IVec3, Vec3};

use regolith_mesh::emit_cell_triangles;
use regolith_voxel::{VoxelGrid, CHUNK_EDGE};

/// Maximum number of slide-and-retry response iterations.
pub const MAX_COLLISION_RECURSION: u32 = 5;

/// Gap left between the sphere and the contact plane after response.
const VERY_CLOSE_DISTANCE: f32 = 0.0;

/// Which primitive the sphere hit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPrimitive {
    /// Triangle interior.
    #[default]
    Face,
    /// Triangle edge.
    Edge,
    /// Triangle corner.
    Vertex,
}

/// Result of a swept collision query, in ellipsoid space.
#[derive(Debug, Clone)]
pub struct Collision {
    /// A collision occurred somewhere along the motion.
    pub detected: bool,
    /// No contact on the outermost sweep: the sphere is airborne.
    pub in_air: bool,
    /// The sphere started embedded below a triangle plane.
    pub under_terrain: bool,
    /// Primitive of the earliest contact.
    pub primitive: CollisionPrimitive,
    /// Final sphere center.
    pub es_at: Vec3,
    /// Remaining (slid) velocity.
    pub es_velocity: Vec3,
    /// Contact point on the surface.
    pub es_contact: Vec3,
    /// Normal of the sliding plane.
    pub es_normal: Vec3,
    /// Distance traveled to the earliest contact.
    pub es_distance: f32,
}

impl Default for Collision {
    fn default() -> Self {
        Self {
            detected: false,
            in_air: false,
            under_terrain: false,
            primitive: CollisionPrimitive::Face,
            es_at: Vec3::ZERO,
            es_velocity: Vec3::ZERO,
            es_contact: Vec3::ZERO,
            es_normal: Vec3::ZERO,
            es_distance: 1000.0,
        }
    }
}

/// Point-in-triangle by three cross-product sign checks.
fn point_in_triangle(point: Vec3, a: Vec3, b: Vec3, c: Vec3) -> bool {
    let d1 = (c - b).cross(point - b).dot((c - b).cross(a - b));
    if d1 < 0.0 {
        return false;
    }
    let d2 = (c - a).cross(point - a).dot((c - a).cross(b - a));
    if d2 < 0.0 {
        return false;
    }
    let d3 = (b - a).cross(point - a).dot((b - a).cross(c - a));
    d3 >= 0.0
}

/// Smallest root of `at² + bt + c = 0` in `(0, max_r)`, if any.
fn smallest_root(a: f32, b: f32, c: f32, max_r: f32) -> Option<f32> {
    let determinant = b * b - 4.0 * a * c;
    if determinant < 0.0 {
        return None;
    }
    let sqrt_d = determinant.sqrt();
    let mut r1 = (-b - sqrt_d) / (2.0 * a);
    let mut r2 = (-b + sqrt_d) / (2.0 * a);
    if r1 > r2 {
        std::mem::swap(&mut r1, &mut r2);
    }
    if r1 > 0.0 && r1 < max_r {
        return Some(r1);
    }
    if r2 > 0.0 && r2 < max_r {
        return Some(r2);
    }
    None
}

fn check_vertex(
    es_velocity: Vec3,
    es_center: Vec3,
    es_vertex: Vec3,
    es_surface_normal: Vec3,
    collision: &mut Collision,
) {
    let a = es_velocity.length_squared();
    let b = 2.0 * es_velocity.dot(es_center - es_vertex);
    let c = (es_vertex - es_center).length_squared() - 1.0;

    if let Some(t) = smallest_root(a, b, c, 1.0) {
        let es_distance = (t * es_velocity).length();
        if es_distance < collision.es_distance {
            collision.detected = true;
            collision.primitive = CollisionPrimitive::Vertex;
            collision.es_distance = es_distance;
            collision.es_contact = es_vertex;
            collision.es_normal = es_surface_normal;
        }
    }
}

fn check_edge(
    es_velocity: Vec3,
    es_center: Vec3,
    es_vertex_a: Vec3,
    es_vertex_b: Vec3,
    es_surface_normal: Vec3,
    collision: &mut Collision,
) {
    let edge = es_vertex_b - es_vertex_a;
    let to_vertex = es_vertex_a - es_center;

    let a = edge.length_squared() * -es_velocity.length_squared() + es_velocity.dot(edge).powi(2);
    let b = edge.length_squared() * 2.0 * es_velocity.dot(to_vertex)
        - 2.0 * es_velocity.dot(edge) * to_vertex.dot(edge);
    let c = edge.length_squared() * (1.0 - to_vertex.length_squared()) + to_vertex.dot(edge).powi(2);

    if let Some(t) = smallest_root(a, b, c, 1.0) {
        let along = (edge.dot(es_velocity) * t - edge.dot(to_vertex)) / edge.length_squared();
        if (0.0..=1.0).contains(&along) {
            let contact = es_vertex_a + along * edge;
            let es_distance = (t * es_velocity).length();
            if es_distance < collision.es_distance {
                collision.detected = true;
                collision.primitive = CollisionPrimitive::Edge;
                collision.es_distance = es_distance;
                collision.es_contact = contact;
                collision.es_normal = es_surface_normal;
            }
        }
    }
}

/// Tests one triangle against the moving unit sphere, keeping the earliest
/// contact in `closest`.
fn collide_with_triangle(triangle: &[Vec3; 3], es_center: Vec3, es_velocity: Vec3, closest: &mut Collision) {
    let [a, b, c] = *triangle;
    let normal = (b - a).cross(c - a).normalize_or_zero();
    if normal == Vec3::ZERO {
        return;
    }

    // Back-facing triangles cannot be hit.
    if es_velocity.normalize_or_zero().dot(normal) > 0.0 {
        return;
    }

    let plane_constant = -a.dot(normal);
    let normal_dot_velocity = es_velocity.dot(normal);
    let sphere_plane_distance = es_center.dot(normal) + plane_constant;

    let mut edges_and_vertices_only = false;
    if normal_dot_velocity == 0.0 {
        if sphere_plane_distance.abs() >= 1.0 {
            return;
        }
        edges_and_vertices_only = true;
    }

    let mut found_face = false;
    if !edges_and_vertices_only {
        // Times at which the sphere surface rests on the plane.
        let mut t0 = (1.0 - sphere_plane_distance) / normal_dot_velocity;
        let mut t1 = (-1.0 - sphere_plane_distance) / normal_dot_velocity;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > 1.0 || t1 < 0.0 {
            return;
        }
        let t0 = t0.max(0.0);

        let contact = es_center + t0 * es_velocity - normal;
        if point_in_triangle(contact, a, b, c) {
            let es_distance = (es_velocity * t0).length();
            if es_distance < closest.es_distance {
                let sphere_point_plane_distance = (es_center - normal).dot(normal) + plane_constant;
                if sphere_point_plane_distance < 0.0 && !closest.under_terrain {
                    // Embedded: push out along the normal and re-test from
                    // the corrected start.
                    let corrected = es_center - normal * sphere_point_plane_distance;
                    closest.under_terrain = true;
                    closest.es_at = corrected;
                    closest.es_normal = normal;
                    collide_with_triangle(triangle, corrected, es_velocity, closest);
                    return;
                }

                found_face = true;
                closest.detected = true;
                closest.primitive = CollisionPrimitive::Face;
                closest.es_distance = es_distance;
                closest.es_contact = contact;
                closest.es_normal = normal;
            }
        }
    }

    if !found_face {
        check_vertex(es_velocity, es_center, a, normal, closest);
        check_vertex(es_velocity, es_center, b, normal, closest);
        check_vertex(es_velocity, es_center, c, normal, closest);

        check_edge(es_velocity, es_center, a, b, normal, closest);
        check_edge(es_velocity, es_center, b, c, normal, closest);
        check_edge(es_velocity, es_center, c, a, normal, closest);
    }
}

/// Sweeps an ellipsoid of radii `ws_size` from `ws_center` along
/// `ws_velocity` against the voxel surface, sliding along contacts.
pub fn collide(
    grid: &VoxelGrid,
    ws_center: Vec3,
    ws_size: Vec3,
    ws_velocity: Vec3,
    surface_level: u8,
) -> Collision {
    collide_recursive(grid, ws_center, ws_size, ws_velocity, surface_level, 0, Vec3::ZERO)
}

fn collide_recursive(
    grid: &VoxelGrid,
    ws_center: Vec3,
    ws_size: Vec3,
    ws_velocity: Vec3,
    surface_level: u8,
    depth: u32,
    previous_normal: Vec3,
) -> Collision {
    let es_center = ws_center / ws_size;
    let es_velocity = ws_velocity / ws_size;

    // Voxel-space AABB of the swept motion, padded by the ellipsoid radii.
    let ws_destination = ws_center + ws_velocity;
    let lo = ws_center.min(ws_destination) - ws_size;
    let hi = ws_center.max(ws_destination) + ws_size;
    let xs_min = grid.world_to_voxel(lo).floor().as_ivec3();
    let xs_max = grid.world_to_voxel(hi).ceil().as_ivec3();
    let range = xs_max - xs_min;

    let max_vertices = 3 * 5 * (range.dot(range) as usize) / 2;
    let mut vertices: Vec<Vec3> = Vec::new();
    for z in xs_min.z..xs_max.z {
        for y in xs_min.y..xs_max.y {
            for x in xs_min.x..xs_max.x {
                let anchor = IVec3::new(x, y, z);
                let values = grid.cell_values_or_air(anchor);
                emit_cell_triangles(&values, anchor, surface_level, &mut |v| {
                    if vertices.len() < max_vertices {
                        vertices.push(v);
                    }
                });
            }
        }
    }

    // Voxel space → world space → ellipsoid space.
    let half_extent = grid.grid_edge() as f32 * CHUNK_EDGE as f32 / 2.0;
    let voxel_size = grid.voxel_size();
    let mut closest = Collision::default();
    for triangle in vertices.chunks_exact(3) {
        let es_triangle = [
            (triangle[0] - half_extent) * voxel_size / ws_size,
            (triangle[1] - half_extent) * voxel_size / ws_size,
            (triangle[2] - half_extent) * voxel_size / ws_size,
        ];
        collide_with_triangle(&es_triangle, es_center, es_velocity, &mut closest);
    }

    if closest.detected {
        let es_destination = es_center + es_velocity;

        let mut es_new_position = es_center;
        if closest.es_distance >= VERY_CLOSE_DISTANCE {
            let direction = es_velocity.normalize_or_zero();
            es_new_position = es_center + direction * (closest.es_distance - VERY_CLOSE_DISTANCE);
            closest.es_contact -= VERY_CLOSE_DISTANCE * direction;
        }

        // Slide the destination onto the plane through the contact point.
        let slide_normal = (es_new_position - closest.es_contact).normalize_or_zero();
        let plane_constant = -closest.es_contact.dot(slide_normal);
        let destination_distance = es_destination.dot(slide_normal) + plane_constant;
        let es_new_destination = es_destination - destination_distance * slide_normal;
        let es_new_velocity = es_new_destination - closest.es_contact;

        let done = es_new_velocity.length_squared() < VERY_CLOSE_DISTANCE * VERY_CLOSE_DISTANCE
            || depth >= MAX_COLLISION_RECURSION;
        if done {
            Collision {
                detected: true,
                under_terrain: closest.under_terrain,
                primitive: closest.primitive,
                es_at: es_new_position,
                es_velocity: es_new_velocity,
                es_contact: closest.es_contact,
                es_normal: slide_normal,
                es_distance: closest.es_distance,
                in_air: false,
            }
        } else {
            collide_recursive(
                grid,
                es_new_position * ws_size,
                ws_size,
                es_new_velocity * ws_size,
                surface_level,
                depth + 1,
                slide_normal,
            )
        }
    } else {
        Collision {
            detected: depth > 0,
            in_air: true,
            es_at: (ws_center + ws_velocity) / ws_size,
            es_velocity: ws_velocity / ws_size,
            es_normal: previous_normal,
            ..Collision::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: u8 = 60;

    /// A 3³-chunk grid with unit voxels, solid below voxel y = 24
    /// (world y ≈ -0.235 after density interpolation).
    fn floor_grid() -> VoxelGrid {
        let mut grid = VoxelGrid::new(3, 1.0);
        let extent = grid.voxel_extent();
        for z in 0..extent {
            for y in 0..24 {
                for x in 0..extent {
                    grid.set_voxel(IVec3::new(x, y, z), 255);
                }
            }
        }
        grid.close_interval();
        grid
    }

    /// World-space height of the iso-surface in [`floor_grid`].
    const FLOOR_Y: f32 = -(60.0 / 255.0);

    #[test]
    fn test_sphere_falls_onto_half_space() {
        let grid = floor_grid();
        let size = Vec3::ONE;
        let result = collide(&grid, Vec3::new(0.0, 1.0, 0.0), size, Vec3::new(0.0, -2.0, 0.0), SURFACE);

        assert!(result.detected);
        assert!(
            result.es_normal.abs_diff_eq(Vec3::Y, 1e-3),
            "normal {:?} should match the half-space normal",
            result.es_normal
        );
        // Resting position: floor height + radius, within the epsilon gap.
        let expected_y = FLOOR_Y + 1.0;
        assert!(
            (result.es_at.y - expected_y).abs() < 1e-3,
            "rest height {} vs expected {}",
            result.es_at.y,
            expected_y
        );
    }

    #[test]
    fn test_resting_sphere_does_not_reenter_terrain() {
        let grid = floor_grid();
        let size = Vec3::ONE;
        let first = collide(&grid, Vec3::new(0.0, 1.0, 0.0), size, Vec3::new(0.0, -2.0, 0.0), SURFACE);
        assert!(first.detected);

        // A follow-up query from the rest position with zero velocity must
        // not flag the sphere as embedded.
        let second = collide(&grid, first.es_at * size, size, Vec3::ZERO, SURFACE);
        assert!(!second.under_terrain);
        assert!(!second.detected);
    }

    #[test]
    fn test_free_flight_translates_without_contact() {
        let grid = floor_grid();
        let size = Vec3::splat(2.0);
        let center = Vec3::new(0.0, 10.0, 0.0);
        let velocity = Vec3::new(1.0, 1.0, 0.0);
        let result = collide(&grid, center, size, velocity, SURFACE);

        assert!(!result.detected);
        assert!(result.in_air);
        let expected = (center + velocity) / size;
        assert!(result.es_at.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_sliding_keeps_tangential_velocity() {
        let grid = floor_grid();
        let size = Vec3::ONE;
        // Falling while moving forward: the response should slide along the
        // floor rather than stop dead.
        let result = collide(
            &grid,
            Vec3::new(0.0, 1.0, 0.0),
            size,
            Vec3::new(1.5, -2.0, 0.0),
            SURFACE,
        );

        assert!(result.detected);
        assert!(
            result.es_velocity.y.abs() < 1e-2,
            "vertical velocity {} should be absorbed",
            result.es_velocity.y
        );
        assert!(
            result.es_velocity.x > 0.3,
            "forward velocity {} should survive the slide",
            result.es_velocity.x
        );
    }

    #[test]
    fn test_ellipsoid_radii_scale_contact() {
        let grid = floor_grid();
        // A taller ellipsoid comes to rest with its center higher up.
        let tall = collide(
            &grid,
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::new(1.0, 2.0, 1.0),
            Vec3::new(0.0, -6.0, 0.0),
            SURFACE,
        );
        assert!(tall.detected);
        let world_rest = tall.es_at * Vec3::new(1.0, 2.0, 1.0);
        assert!(
            (world_rest.y - (FLOOR_Y + 2.0)).abs() < 1e-2,
            "tall ellipsoid rest height {}",
            world_rest.y
        );
    }

    #[test]
    fn test_smallest_root_orders_solutions() {
        // (t-1)(t-3) = t² - 4t + 3
        assert_eq!(smallest_root(1.0, -4.0, 3.0, 10.0), Some(1.0));
        // Both roots negative.
        assert_eq!(smallest_root(1.0, 4.0, 3.0, 10.0), None);
        // No real roots.
        assert_eq!(smallest_root(1.0, 0.0, 3.0, 10.0), None);
    }

    #[test]
    fn test_point_in_triangle() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 0.0, 0.0);
        let c = Vec3::new(0.0, 0.0, 2.0);
        assert!(point_in_triangle(Vec3::new(0.5, 0.0, 0.5), a, b, c));
        assert!(!point_in_triangle(Vec3::new(2.0, 0.0, 2.0), a, b, c));
    }
}
