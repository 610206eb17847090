//! Player avatar state.
//!
//! The original implementation kept per-player data in a handle-table of
//! components; since every player carries exactly one of each, the state
//! is flattened into this struct. Everything here except the name is
//! replicated in snapshots.

use glam::{Quat, Vec3};

/// Ground contact state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhysicsState {
    /// Last sweep ended on a surface.
    OnGround,
    /// No contact on the last sweep.
    #[default]
    InAir,
}

/// Replicated animation cycle selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AnimationState {
    #[default]
    Idle = 0,
    Walk = 1,
    Run = 2,
    Hover = 3,
    Sitting = 4,
    Sliding = 5,
}

/// A player avatar.
#[derive(Debug, Clone)]
pub struct Player {
    /// Stable client id; doubles as the index into the server tables.
    pub id: u16,
    /// Display name from the join packet.
    pub name: String,
    /// World position.
    pub p: Vec3,
    /// Facing direction, unit length.
    pub d: Vec3,
    /// Gravity-up vector, unit length; follows the contact normal while
    /// rolling.
    pub u: Vec3,
    /// World velocity.
    pub v: Vec3,
    /// Replicated orientation.
    pub r: Quat,
    /// Ellipsoid radii.
    pub size: Vec3,
    /// Held action bits of the last applied command.
    pub action_flags: u32,
    /// Rolling-ball mode (standing mode when false).
    pub rolling_mode: bool,
    /// Physics integration enabled (free-fly when false).
    pub physics_enabled: bool,
    /// Ground contact state.
    pub physics_state: PhysicsState,
    /// Initial launch: accelerate along the view direction until the first
    /// contact.
    pub is_entering: bool,
    /// Launch speed, grows while entering.
    pub entering_acceleration: f32,
    /// Movement input velocity (standing mode bookkeeping).
    pub input_velocity: Vec3,
    /// Replicated animation cycle.
    pub animation: AnimationState,
}

/// Spawn position used for every new avatar.
pub const SPAWN_POSITION: Vec3 = Vec3::new(-140.0, 140.0, -140.0);

/// Launch speed at spawn.
const SPAWN_LAUNCH_SPEED: f32 = 5.0;

impl Player {
    /// Creates an avatar at the spawn point, facing the world center,
    /// rolling, and in its entering launch.
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        let p = SPAWN_POSITION;
        Self {
            id,
            name: name.into(),
            p,
            d: (-p).normalize(),
            u: Vec3::Y,
            v: Vec3::ZERO,
            r: Quat::IDENTITY,
            size: Vec3::splat(2.0),
            action_flags: 0,
            rolling_mode: true,
            physics_enabled: true,
            physics_state: PhysicsState::InAir,
            is_entering: true,
            entering_acceleration: SPAWN_LAUNCH_SPEED,
            input_velocity: Vec3::ZERO,
            animation: AnimationState::Idle,
        }
    }

    /// Creates an avatar at an explicit position and direction (remote
    /// players built from replication packets).
    pub fn with_transform(id: u16, name: impl Into<String>, p: Vec3, d: Vec3) -> Self {
        let mut player = Self::new(id, name);
        player.p = p;
        player.d = if d.length_squared() > 0.0 {
            d.normalize()
        } else {
            Vec3::Z
        };
        player
    }
}

impl AnimationState {
    /// Wire value → state, unknown values fall back to idle.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Walk,
            2 => Self::Run,
            3 => Self::Hover,
            4 => Self::Sitting,
            5 => Self::Sliding,
            _ => Self::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawned_player_faces_world_center() {
        let player = Player::new(0, "alice");
        assert!((player.d.length() - 1.0).abs() < 1e-5);
        assert!(player.d.dot(-SPAWN_POSITION.normalize()) > 0.999);
        assert!(player.is_entering);
        assert!(player.rolling_mode);
    }

    #[test]
    fn test_with_transform_normalizes_direction() {
        let player = Player::with_transform(3, "bob", Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0));
        assert!((player.d.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_animation_state_roundtrip() {
        for value in 0..=5u8 {
            let state = AnimationState::from_u8(value);
            assert_eq!(state as u8, value);
        }
        assert_eq!(AnimationState::from_u8(99), AnimationState::Idle);
    }
}
