//! Swept-sphere collision for Regolith.
//!
//! Player avatars are ellipsoids; collision runs in "ellipsoid space",
//! where positions are divided by the ellipsoid radii so the avatar
//! becomes a unit sphere. Triangles come straight from the voxel density
//! field through the shared marching-cubes routine, and the response
//! slides the sphere along contact planes, recursing a bounded number of
//! times.

mod sweep;

pub use sweep::{collide, Collision, CollisionPrimitive, MAX_COLLISION_RECURSION};
