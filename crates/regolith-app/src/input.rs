//! Turns raw key/mouse state into simulation commands.
//!
//! The rolling-mode toggle is edge-triggered: it flips on a press that
//! follows a release, not while the key is held.

use regolith_sim::{Action, InputCommand};

/// Raw input for one frame, as reported by the host's input layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputFrame {
    pub forward: bool,
    pub left: bool,
    pub back: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub run: bool,
    pub terraform_add: bool,
    pub terraform_destroy: bool,
    /// The mode-toggle key (E).
    pub toggle_roll: bool,
    pub mouse_dx: f32,
    pub mouse_dy: f32,
}

/// Stateful sampler producing one [`InputCommand`] per tick.
pub struct InputSampler {
    rolling: bool,
    physics: bool,
    toggle_was_down: bool,
}

impl InputSampler {
    /// Starts in rolling mode with physics enabled, matching a freshly
    /// spawned avatar.
    pub fn new() -> Self {
        Self {
            rolling: true,
            physics: true,
            toggle_was_down: false,
        }
    }

    /// Current rolling mode.
    pub fn is_rolling(&self) -> bool {
        self.rolling
    }

    /// Enables or disables physics (free-fly when disabled).
    pub fn set_physics(&mut self, enabled: bool) {
        self.physics = enabled;
    }

    /// Builds the command for one tick.
    pub fn sample(&mut self, frame: &InputFrame, dt: f32) -> InputCommand {
        if frame.toggle_roll && !self.toggle_was_down {
            self.rolling = !self.rolling;
        }
        self.toggle_was_down = frame.toggle_roll;

        let mut action_flags = 0u32;
        let mut set = |held: bool, action: Action| {
            if held {
                action_flags |= action.bit();
            }
        };
        set(frame.forward, Action::Forward);
        set(frame.left, Action::Left);
        set(frame.back, Action::Back);
        set(frame.right, Action::Right);
        set(frame.up, Action::Up);
        set(frame.down, Action::Down);
        set(frame.run, Action::Run);
        set(frame.terraform_add, Action::TerraformAdd);
        set(frame.terraform_destroy, Action::TerraformDestroy);

        let mut flags = 0u8;
        if self.rolling {
            flags |= InputCommand::FLAG_ROLLING;
        }
        if self.physics {
            flags |= InputCommand::FLAG_PHYSICS;
        }

        InputCommand {
            action_flags,
            mouse_dx: frame.mouse_dx,
            mouse_dy: frame.mouse_dy,
            flags,
            dt,
        }
    }
}

impl Default for InputSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 50.0;

    #[test]
    fn test_held_keys_become_action_bits() {
        let mut sampler = InputSampler::new();
        let frame = InputFrame {
            forward: true,
            run: true,
            terraform_destroy: true,
            ..InputFrame::default()
        };
        let cmd = sampler.sample(&frame, DT);
        assert!(Action::Forward.is_set(cmd.action_flags));
        assert!(Action::Run.is_set(cmd.action_flags));
        assert!(Action::TerraformDestroy.is_set(cmd.action_flags));
        assert!(!Action::Back.is_set(cmd.action_flags));
    }

    #[test]
    fn test_roll_toggle_is_edge_triggered() {
        let mut sampler = InputSampler::new();
        assert!(sampler.is_rolling());

        let held = InputFrame {
            toggle_roll: true,
            ..InputFrame::default()
        };
        let released = InputFrame::default();

        // Press: flips once, then holding does nothing.
        sampler.sample(&held, DT);
        assert!(!sampler.is_rolling());
        sampler.sample(&held, DT);
        sampler.sample(&held, DT);
        assert!(!sampler.is_rolling());

        // Release then press again: flips back.
        sampler.sample(&released, DT);
        sampler.sample(&held, DT);
        assert!(sampler.is_rolling());
    }

    #[test]
    fn test_mode_bits_follow_sampler_state() {
        let mut sampler = InputSampler::new();
        let cmd = sampler.sample(&InputFrame::default(), DT);
        assert!(cmd.is_rolling());
        assert!(cmd.physics_enabled());

        sampler.set_physics(false);
        let cmd = sampler.sample(&InputFrame::default(), DT);
        assert!(!cmd.physics_enabled());
    }
}
