//! The per-tick player step.
//!
//! Runs identically on client and server: mouse look, then mode-specific
//! integration through the swept collision engine, then the terraform
//! tool. Standing mode deliberately changes nothing but the replicated
//! flags.

use glam::Vec3;

use regolith_physics::collide;
use regolith_voxel::VoxelGrid;

use crate::input::{Action, InputCommand};
use crate::player::{AnimationState, PhysicsState, Player};

/// Simulation tunables. Defaults match the shipped game balance.
#[derive(Debug, Clone)]
pub struct SimParams {
    /// Mouse-look sensitivity (degrees per count per second).
    pub mouse_sensitivity: f32,
    /// Gravity along the player's down vector.
    pub gravity: f32,
    /// Ground friction coefficient.
    pub terrain_roughness: f32,
    /// Lateral acceleration from held movement keys.
    pub movement_acceleration: f32,
    /// Terraform tool reach in world units.
    pub terraform_range: f32,
    /// Terraform brush radius in voxels.
    pub terraform_radius: u32,
    /// Terraform rate in density units per second.
    pub terraform_rate: f32,
    /// Iso-surface threshold.
    pub surface_level: u8,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            mouse_sensitivity: 15.0,
            gravity: 9.81,
            terrain_roughness: 0.5,
            movement_acceleration: 2.0,
            terraform_range: 70.0,
            terraform_radius: 2,
            terraform_rate: 700.0,
            surface_level: 60,
        }
    }
}

struct MovementAxes {
    right: Vec3,
    up: Vec3,
    forward: Vec3,
}

fn movement_axes(view_direction: Vec3, up: Vec3) -> MovementAxes {
    let right = view_direction.cross(up);
    let forward = up.cross(right);
    MovementAxes { right, up, forward }
}

/// Rotates the facing direction by the command's mouse deltas around the
/// world up axis, then around the local right axis. Rotations that would
/// pull the view too close to vertical are rejected.
fn mouse_look(player: &mut Player, dx: f32, dy: f32, dt: f32, sensitivity: f32) {
    if dx == 0.0 && dy == 0.0 {
        return;
    }
    let up = Vec3::Y;

    let x_angle = (-dx).to_radians() * sensitivity * dt;
    let y_angle = (-dy).to_radians() * sensitivity * dt;

    let mut result = glam::Quat::from_axis_angle(up, x_angle) * player.d;
    let pitch_axis = result.cross(up).normalize_or_zero();
    if pitch_axis != Vec3::ZERO {
        result = glam::Quat::from_axis_angle(pitch_axis, y_angle) * result;
    }
    let result = result.normalize();

    let limit = 0.99;
    if result.dot(up).abs() < limit {
        player.d = result;
    }
}

fn rolling_step(player: &mut Player, grid: &VoxelGrid, cmd: &InputCommand, params: &SimParams) {
    let dt = cmd.dt;

    if player.is_entering {
        // Launch: keep accelerating along the view direction until the
        // first contact.
        player.entering_acceleration += dt * 2.0;
        player.v = player.entering_acceleration * player.d;
    } else {
        match player.physics_state {
            PhysicsState::InAir => {
                player.v += -player.u * params.gravity * dt;
            }
            PhysicsState::OnGround => {
                let axes = movement_axes(player.d, player.u);
                let mut lateral = Vec3::ZERO;
                if Action::Forward.is_set(cmd.action_flags) {
                    lateral.z += params.movement_acceleration;
                }
                if Action::Left.is_set(cmd.action_flags) {
                    lateral.x -= params.movement_acceleration;
                }
                if Action::Back.is_set(cmd.action_flags) {
                    lateral.z -= params.movement_acceleration;
                }
                if Action::Right.is_set(cmd.action_flags) {
                    lateral.x += params.movement_acceleration;
                }

                let acceleration =
                    lateral.x * axes.right + lateral.y * axes.up + lateral.z * axes.forward;
                player.v += acceleration * dt * 10.0;
                player.v -= player.u * params.gravity * dt;

                let friction = -player.v * params.terrain_roughness * params.gravity * 0.5;
                player.v += friction * dt;
            }
        }
    }

    let collision = collide(grid, player.p, player.size, player.v * dt, params.surface_level);
    if collision.detected {
        if player.is_entering {
            player.is_entering = false;
        }

        if player.physics_state == PhysicsState::InAir {
            // Landing: keep only the forward component of the approach.
            let axes = movement_axes(player.d, player.u);
            player.v = player.v.project_onto_normalized(axes.forward.normalize_or_zero());
            player.v = player.v.normalize_or_zero();
        }

        player.p = collision.es_at * player.size;
        // Contact changed the gravity pull direction.
        player.u = (collision.es_normal * player.size).normalize_or_zero();
        if player.u == Vec3::ZERO {
            player.u = Vec3::Y;
        }
        player.physics_state = PhysicsState::OnGround;
    } else {
        player.p = collision.es_at * player.size;
        if dt > 0.0 {
            player.v = (collision.es_velocity * player.size) / dt;
        }
        player.physics_state = PhysicsState::InAir;
    }
}

/// Standing mode: a wire-compatible placeholder. The mode is replicated
/// but the avatar does not integrate, so state must stay untouched here.
fn standing_step(_player: &mut Player, _grid: &VoxelGrid, _cmd: &InputCommand, _params: &SimParams) {}

fn free_fly_step(player: &mut Player, grid: &VoxelGrid, cmd: &InputCommand, params: &SimParams) {
    let up = Vec3::Y;
    let right = player.d.cross(up).normalize_or_zero();
    let forward = up.cross(right).normalize_or_zero();

    let mut force = Vec3::ZERO;
    if Action::Forward.is_set(cmd.action_flags) {
        force += forward;
    }
    if Action::Back.is_set(cmd.action_flags) {
        force -= forward;
    }
    if Action::Right.is_set(cmd.action_flags) {
        force += right;
    }
    if Action::Left.is_set(cmd.action_flags) {
        force -= right;
    }
    if Action::Up.is_set(cmd.action_flags) {
        force += up;
    }
    if Action::Down.is_set(cmd.action_flags) {
        force -= up;
    }
    force *= 20.0 * player.size.x;

    // Walls still stop a free-flyer.
    let collision = collide(grid, player.p, player.size, force * cmd.dt, params.surface_level);
    player.p = collision.es_at * player.size;
}

fn update_animation(player: &mut Player) {
    let flags = player.action_flags;
    let mut state = AnimationState::Idle;
    if Action::Forward.is_set(flags) {
        state = if Action::Run.is_set(flags) {
            AnimationState::Run
        } else {
            AnimationState::Walk
        };
    }
    if player.physics_state == PhysicsState::InAir {
        state = AnimationState::Hover;
    }
    player.animation = state;
}

/// Advances one player by one command against the grid.
pub fn step_player(player: &mut Player, grid: &mut VoxelGrid, cmd: &InputCommand, params: &SimParams) {
    player.action_flags = cmd.action_flags;
    player.rolling_mode = cmd.is_rolling();
    player.physics_enabled = cmd.physics_enabled();

    mouse_look(player, cmd.mouse_dx, cmd.mouse_dy, cmd.dt, params.mouse_sensitivity);

    if player.physics_enabled {
        if player.rolling_mode {
            rolling_step(player, grid, cmd, params);
        } else {
            standing_step(player, grid, cmd, params);
        }
    } else {
        free_fly_step(player, grid, cmd, params);
    }

    if Action::TerraformDestroy.is_set(cmd.action_flags) {
        grid.ray_terraform(
            player.p,
            player.d,
            params.terraform_range,
            cmd.dt,
            false,
            params.surface_level,
            params.terraform_radius,
            params.terraform_rate,
        );
    }
    if Action::TerraformAdd.is_set(cmd.action_flags) {
        grid.ray_terraform(
            player.p,
            player.d,
            params.terraform_range,
            cmd.dt,
            true,
            params.surface_level,
            params.terraform_radius,
            params.terraform_rate,
        );
    }

    update_animation(player);
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    const DT: f32 = 1.0 / 50.0;

    fn empty_grid() -> VoxelGrid {
        VoxelGrid::new(5, 9.0)
    }

    fn centered_player() -> Player {
        let mut player = Player::new(0, "tester");
        player.p = Vec3::ZERO;
        player.d = Vec3::Z;
        player.is_entering = false;
        player
    }

    #[test]
    fn test_mouse_look_keeps_direction_unit() {
        let mut grid = empty_grid();
        let mut player = centered_player();
        let mut cmd = InputCommand::idle(DT);
        cmd.mouse_dx = 35.0;
        cmd.mouse_dy = -20.0;

        for _ in 0..50 {
            step_player(&mut player, &mut grid, &cmd, &SimParams::default());
            assert!((player.d.length() - 1.0).abs() < 1e-5);
            assert!(player.d.dot(Vec3::Y).abs() <= 0.99);
        }
    }

    #[test]
    fn test_mouse_look_rejects_vertical_flip() {
        let mut grid = empty_grid();
        let mut player = centered_player();
        let mut cmd = InputCommand::idle(DT);
        cmd.mouse_dy = 500.0;

        // Pull straight up far past the clamp: direction stops short of
        // the pole instead of flipping.
        for _ in 0..200 {
            step_player(&mut player, &mut grid, &cmd, &SimParams::default());
        }
        assert!(player.d.dot(Vec3::Y).abs() <= 0.99);
    }

    #[test]
    fn test_gravity_pulls_airborne_player() {
        let mut grid = empty_grid();
        let mut player = centered_player();
        let cmd = InputCommand::idle(DT);

        let start_y = player.p.y;
        for _ in 0..10 {
            step_player(&mut player, &mut grid, &cmd, &SimParams::default());
        }
        assert!(player.p.y < start_y);
        assert_eq!(player.physics_state, PhysicsState::InAir);
    }

    #[test]
    fn test_entering_launch_moves_along_view() {
        let mut grid = empty_grid();
        let mut player = centered_player();
        player.is_entering = true;
        player.entering_acceleration = 5.0;
        let cmd = InputCommand::idle(DT);

        step_player(&mut player, &mut grid, &cmd, &SimParams::default());
        assert!(player.p.z > 0.0);
        assert!(player.is_entering);
        assert!(player.entering_acceleration > 5.0);
    }

    #[test]
    fn test_standing_mode_changes_nothing() {
        let mut grid = empty_grid();
        let mut player = centered_player();
        let mut cmd = InputCommand::idle(DT);
        cmd.flags = InputCommand::FLAG_PHYSICS; // standing, physics on
        cmd.action_flags = Action::Forward.bit();

        let before_p = player.p;
        let before_v = player.v;
        step_player(&mut player, &mut grid, &cmd, &SimParams::default());
        assert_eq!(player.p, before_p);
        assert_eq!(player.v, before_v);
        assert!(!player.rolling_mode);
    }

    #[test]
    fn test_free_fly_translates_directly() {
        let mut grid = empty_grid();
        let mut player = centered_player();
        let mut cmd = InputCommand::idle(DT);
        cmd.flags = InputCommand::FLAG_ROLLING; // physics off
        cmd.action_flags = Action::Up.bit();

        step_player(&mut player, &mut grid, &cmd, &SimParams::default());
        // 20 · size.x · dt straight up.
        let expected = 20.0 * player.size.x * DT;
        assert!((player.p.y - expected).abs() < 1e-3);
    }

    #[test]
    fn test_terraform_destroy_digs_ahead() {
        let mut grid = VoxelGrid::initial_world(5, 9.0);
        let mut player = centered_player();
        // Stand near the first sphere, look at its center.
        player.p = Vec3::new(80.0, 140.0, 0.0);
        player.d = Vec3::new(0.0, -1.0, 0.0);
        player.physics_enabled = true;

        let mut cmd = InputCommand::idle(DT);
        cmd.action_flags = Action::TerraformDestroy.bit();
        step_player(&mut player, &mut grid, &cmd, &SimParams::default());

        assert!(grid.modified_chunks().count() > 0, "the tool should have dug");
    }

    #[test]
    fn test_landing_sets_ground_state_and_up_vector() {
        let mut grid = empty_grid();
        // Solid slab under the spawn column.
        for z in 30..50 {
            for y in 30..36 {
                for x in 30..50 {
                    grid.set_voxel(IVec3::new(x, y, z), 255);
                }
            }
        }
        grid.close_interval();

        // Slab top voxel y=35 → world y = 35·9 − 360 = −45; start above it.
        let mut player = centered_player();
        player.p = Vec3::new(0.0, -20.0, 0.0);
        player.v = Vec3::ZERO;
        let cmd = InputCommand::idle(DT);

        let params = SimParams::default();
        let mut landed = false;
        for _ in 0..400 {
            step_player(&mut player, &mut grid, &cmd, &params);
            if player.physics_state == PhysicsState::OnGround {
                landed = true;
                break;
            }
        }
        assert!(landed, "player should land on the slab");
        assert!(player.u.dot(Vec3::Y) > 0.9, "up vector {:?}", player.u);
    }

    #[test]
    fn test_step_is_deterministic() {
        let run = || {
            let mut grid = VoxelGrid::initial_world(5, 9.0);
            let mut player = Player::new(0, "det");
            let mut cmd = InputCommand::idle(DT);
            cmd.action_flags = Action::Forward.bit();
            cmd.mouse_dx = 3.0;
            for _ in 0..60 {
                step_player(&mut player, &mut grid, &cmd, &SimParams::default());
            }
            (player.p, player.v, player.d, player.u)
        };
        assert_eq!(run(), run());
    }
}
