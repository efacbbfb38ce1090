use serde::{Deserialize, Serialize};
use std::fmt;

/// What the caller wants the robot to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Collect,
    Place,
    Shoot,
    Stow,
}

/// Column of the target grid or loading station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Left,
    Middle,
    Right,
}

/// Row of the target grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Mid,
    High,
}

/// Game piece carried or requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePiece {
    Cone,
    Cube,
}

/// Qualifiers that select how an action is carried out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    /// Work relative to the floor (ground pickup)
    #[serde(default)]
    pub ground: bool,
    /// Wait for the operator instead of sensors to trigger the hand-off
    #[serde(default)]
    pub manual: bool,
}

/// Immutable high-level request.
///
/// Operations are plain values: they are built once by the caller, checked by
/// the validator, consumed by task construction and may be copied into tasks
/// and telemetry for introspection. The builder methods return new values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    action: Action,
    slot: Slot,
    #[serde(default = "default_level")]
    level: Level,
    payload: GamePiece,
    #[serde(default)]
    modifiers: Modifiers,
}

fn default_level() -> Level {
    Level::Mid
}

impl Operation {
    pub fn new(action: Action, slot: Slot, payload: GamePiece) -> Self {
        Self {
            action,
            slot,
            level: default_level(),
            payload,
            modifiers: Modifiers::default(),
        }
    }

    pub fn collect(slot: Slot, payload: GamePiece) -> Self {
        Self::new(Action::Collect, slot, payload)
    }

    pub fn place(slot: Slot, level: Level, payload: GamePiece) -> Self {
        Self::new(Action::Place, slot, payload).at_level(level)
    }

    pub fn shoot(payload: GamePiece) -> Self {
        Self::new(Action::Shoot, Slot::Middle, payload)
    }

    pub fn stow() -> Self {
        Self::new(Action::Stow, Slot::Middle, GamePiece::Cube)
    }

    pub fn at_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn on_ground(mut self) -> Self {
        self.modifiers.ground = true;
        self
    }

    pub fn manual(mut self) -> Self {
        self.modifiers.manual = true;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn action(&self) -> Action {
        self.action
    }
    pub fn slot(&self) -> Slot {
        self.slot
    }
    pub fn level(&self) -> Level {
        self.level
    }
    pub fn payload(&self) -> GamePiece {
        self.payload
    }
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }
    pub fn is_ground(&self) -> bool {
        self.modifiers.ground
    }
    pub fn is_manual(&self) -> bool {
        self.modifiers.manual
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?} {:?}@{:?}",
            self.action, self.payload, self.slot, self.level
        )?;
        if self.modifiers.ground {
            write!(f, " [ground]")?;
        }
        if self.modifiers.manual {
            write!(f, " [manual]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_do_not_share_state() {
        let base = Operation::collect(Slot::Left, GamePiece::Cone);
        let ground = base.on_ground();
        assert!(!base.is_ground());
        assert!(ground.is_ground());
        assert_eq!(ground.action(), Action::Collect);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let op: Operation =
            serde_yaml::from_str("action: place\nslot: right\npayload: cube\n").unwrap();
        assert_eq!(op.action(), Action::Place);
        assert_eq!(op.level(), Level::Mid);
        assert!(!op.is_manual());
    }

    #[test]
    fn test_display() {
        let op = Operation::collect(Slot::Left, GamePiece::Cube).on_ground();
        assert_eq!(op.to_string(), "Collect Cube Left@Mid [ground]");
    }
}
