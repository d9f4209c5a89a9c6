//! # Input
//!
//! Input boundary between device polling and the simulation.
//!
//! ## Classes
//! - `InputSample`: raw per-tick device state (axes + held buttons)
//! - `TickInput`: what the simulation consumes (axes + held flags + edges)
//! - `InputTracker`: polling edge detector turning samples into tick inputs
//! - `ActionKind` / `ActionEdge`: discrete actions as sent over the wire
//! - `CharacterInput`: component carrying the next tick's input to a character

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// Actions
// ============================================================================

/// Discrete player actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
pub enum ActionKind {
    Sprint,
    Crouch,
    Prone,
    Dive,
    Aim,
    Jump,
}

impl ActionKind {
    /// All actions, in a fixed order.
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Sprint,
        ActionKind::Crouch,
        ActionKind::Prone,
        ActionKind::Dive,
        ActionKind::Aim,
        ActionKind::Jump,
    ];

    /// Actions whose held state matters to the simulation, so both edges are sent.
    pub fn is_held_action(self) -> bool {
        matches!(self, ActionKind::Sprint | ActionKind::Aim)
    }

    /// Bit used by [`ActionSet`].
    pub fn bit(self) -> u8 {
        match self {
            ActionKind::Sprint => 1 << 0,
            ActionKind::Crouch => 1 << 1,
            ActionKind::Prone => 1 << 2,
            ActionKind::Dive => 1 << 3,
            ActionKind::Aim => 1 << 4,
            ActionKind::Jump => 1 << 5,
        }
    }
}

/// Which transition of a button an action event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
pub enum ActionEdge {
    Pressed,
    Released,
}

/// Small set of action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionSet(u8);

impl ActionSet {
    pub fn contains(&self, action: ActionKind) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn insert(&mut self, action: ActionKind) {
        self.0 |= action.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

// ============================================================================
// Input Sample (device side)
// ============================================================================

/// Raw input for one tick, as delivered by the input-collection collaborator.
///
/// Axes are in `[-1, 1]` per component but not necessarily unit length.
/// Buttons carry their *held* state; edges are derived by [`InputTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Reflect)]
pub struct InputSample {
    /// x = strafe right, y = forward
    pub move_axes: Vec2,
    /// Look delta this tick (x = yaw right, y = pitch up)
    pub look_axes: Vec2,
    pub sprint: bool,
    pub crouch: bool,
    pub prone: bool,
    pub dive: bool,
    pub aim: bool,
    pub jump: bool,
}

impl InputSample {
    /// Held state of one action.
    pub fn held(&self, action: ActionKind) -> bool {
        match action {
            ActionKind::Sprint => self.sprint,
            ActionKind::Crouch => self.crouch,
            ActionKind::Prone => self.prone,
            ActionKind::Dive => self.dive,
            ActionKind::Aim => self.aim,
            ActionKind::Jump => self.jump,
        }
    }

    /// Move axes clamped into the unit square.
    pub fn clamped_move(&self) -> Vec2 {
        self.move_axes.clamp(Vec2::NEG_ONE, Vec2::ONE)
    }
}

// ============================================================================
// Tick Input (simulation side)
// ============================================================================

/// Edge-detected input consumed by one simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Reflect)]
pub struct TickInput {
    pub move_axes: Vec2,
    pub look_axes: Vec2,
    pub sprint_held: bool,
    pub aim_held: bool,
    pub aim_pressed: bool,
    pub aim_released: bool,
    pub crouch_pressed: bool,
    pub prone_pressed: bool,
    pub dive_pressed: bool,
    pub jump_pressed: bool,
}

impl TickInput {
    /// Input with only movement axes set.
    pub fn moving(move_axes: Vec2) -> Self {
        Self {
            move_axes,
            ..default()
        }
    }

    /// Builder: hold sprint.
    pub fn with_sprint(mut self) -> Self {
        self.sprint_held = true;
        self
    }

    /// Set the flag for one action edge.
    pub fn apply_edge(&mut self, action: ActionKind, edge: ActionEdge) {
        match (action, edge) {
            (ActionKind::Sprint, ActionEdge::Pressed) => self.sprint_held = true,
            (ActionKind::Sprint, ActionEdge::Released) => self.sprint_held = false,
            (ActionKind::Aim, ActionEdge::Pressed) => {
                self.aim_held = true;
                self.aim_pressed = true;
            }
            (ActionKind::Aim, ActionEdge::Released) => {
                self.aim_held = false;
                self.aim_released = true;
            }
            (ActionKind::Crouch, ActionEdge::Pressed) => self.crouch_pressed = true,
            (ActionKind::Prone, ActionEdge::Pressed) => self.prone_pressed = true,
            (ActionKind::Dive, ActionEdge::Pressed) => self.dive_pressed = true,
            (ActionKind::Jump, ActionEdge::Pressed) => self.jump_pressed = true,
            // Toggle/one-shot actions only act on press.
            (_, ActionEdge::Released) => {}
        }
    }

    /// Clear one-shot edges and the look delta, keeping axes and held flags.
    pub fn clear_edges(&mut self) {
        self.look_axes = Vec2::ZERO;
        self.aim_pressed = false;
        self.aim_released = false;
        self.crouch_pressed = false;
        self.prone_pressed = false;
        self.dive_pressed = false;
        self.jump_pressed = false;
    }
}

// ============================================================================
// Input Tracker
// ============================================================================

/// Polling edge detector.
///
/// The driver calls [`InputTracker::read_input`] once per tick; the tracker
/// compares each button against the previous tick's held state.
#[derive(Debug, Clone, Default)]
pub struct InputTracker {
    previous: InputSample,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a raw sample to a tick input, detecting edges.
    pub fn read_input(&mut self, sample: &InputSample) -> TickInput {
        let mut input = TickInput {
            move_axes: sample.clamped_move(),
            look_axes: sample.look_axes,
            sprint_held: sample.sprint,
            aim_held: sample.aim,
            ..default()
        };

        for (action, edge) in self.edges(sample) {
            input.apply_edge(action, edge);
        }

        self.previous = *sample;
        input
    }

    /// Button transitions between the previous sample and `sample`, in [`ActionKind::ALL`] order.
    ///
    /// Does not advance the tracker.
    pub fn edges(&self, sample: &InputSample) -> Vec<(ActionKind, ActionEdge)> {
        ActionKind::ALL
            .iter()
            .filter_map(|&action| {
                match (self.previous.held(action), sample.held(action)) {
                    (false, true) => Some((action, ActionEdge::Pressed)),
                    (true, false) => Some((action, ActionEdge::Released)),
                    _ => None,
                }
            })
            .collect()
    }

    /// Advance the tracker without producing a tick input.
    pub fn commit(&mut self, sample: &InputSample) {
        self.previous = *sample;
    }
}

// ============================================================================
// Character Input Component
// ============================================================================

/// Input waiting to be consumed by the next simulation step of a character.
#[derive(Component, Debug, Clone, Default, Reflect)]
#[reflect(Component)]
pub struct CharacterInput {
    pub pending: TickInput,
}

impl CharacterInput {
    /// Take this tick's input. Edges fire once; axes and held flags persist.
    pub fn take(&mut self) -> TickInput {
        let input = self.pending;
        self.pending.clear_edges();
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_edge_fires_once() {
        let mut tracker = InputTracker::new();
        let held = InputSample {
            crouch: true,
            ..default()
        };

        let first = tracker.read_input(&held);
        assert!(first.crouch_pressed);

        let second = tracker.read_input(&held);
        assert!(!second.crouch_pressed);
    }

    #[test]
    fn test_aim_press_and_release() {
        let mut tracker = InputTracker::new();
        let pressed = tracker.read_input(&InputSample {
            aim: true,
            ..default()
        });
        assert!(pressed.aim_pressed && pressed.aim_held && !pressed.aim_released);

        let released = tracker.read_input(&InputSample::default());
        assert!(released.aim_released && !released.aim_held && !released.aim_pressed);
    }

    #[test]
    fn test_sprint_is_level_triggered() {
        let mut tracker = InputTracker::new();
        let sample = InputSample {
            sprint: true,
            ..default()
        };
        assert!(tracker.read_input(&sample).sprint_held);
        assert!(tracker.read_input(&sample).sprint_held);
    }

    #[test]
    fn test_move_axes_clamped() {
        let mut tracker = InputTracker::new();
        let input = tracker.read_input(&InputSample {
            move_axes: Vec2::new(3.0, -2.0),
            ..default()
        });
        assert_eq!(input.move_axes, Vec2::new(1.0, -1.0));
    }

    #[test]
    fn test_edges_reported_in_order() {
        let tracker = InputTracker::new();
        let edges = tracker.edges(&InputSample {
            jump: true,
            sprint: true,
            ..default()
        });
        assert_eq!(
            edges,
            vec![
                (ActionKind::Sprint, ActionEdge::Pressed),
                (ActionKind::Jump, ActionEdge::Pressed),
            ]
        );
    }

    #[test]
    fn test_character_input_take_clears_edges() {
        let mut input = CharacterInput::default();
        input.pending.move_axes = Vec2::Y;
        input.pending.sprint_held = true;
        input.pending.dive_pressed = true;

        let first = input.take();
        assert!(first.dive_pressed);

        let second = input.take();
        assert!(!second.dive_pressed);
        assert!(second.sprint_held);
        assert_eq!(second.move_axes, Vec2::Y);
    }

    #[test]
    fn test_action_set() {
        let mut set = ActionSet::default();
        assert!(set.is_empty());
        set.insert(ActionKind::Dive);
        assert!(set.contains(ActionKind::Dive));
        assert!(!set.contains(ActionKind::Crouch));
    }
}
