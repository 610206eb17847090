//! Player simulation for Regolith.
//!
//! One step consumes an [`InputCommand`] and advances a [`Player`] against
//! the voxel grid. The step is deterministic and runs unchanged on both
//! sides of the wire: the client uses it to predict, the server to
//! decide, and reconciliation to replay.

mod input;
mod player;
mod step;

pub use input::{Action, CommandRing, InputCommand, TaggedCommand, DEFAULT_COMMAND_RING_CAPACITY};
pub use player::{AnimationState, PhysicsState, Player};
pub use step::{step_player, SimParams};
