//! Operation to task dispatch
//!
//! Dispatch is closed: [`select_variant`] is a total, pure function of the
//! operation's (ground, manual, action) that names one [`TaskVariant`], and
//! each variant has exactly one constructor.

use crate::tasks::{self, Manipulator};
use gantry_core::{Action, GantryError, GantryResult, Operation, Task, TaskFactory};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskVariant {
    GroundCollect,
    ManualPlace,
    ManualCollect,
    AutoPlace,
    AutoCollect,
    Shoot,
    Stow,
}

impl fmt::Display for TaskVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskVariant::GroundCollect => "ground-collect",
            TaskVariant::ManualPlace => "manual-place",
            TaskVariant::ManualCollect => "manual-collect",
            TaskVariant::AutoPlace => "automatic-place",
            TaskVariant::AutoCollect => "automatic-collect",
            TaskVariant::Shoot => "shoot",
            TaskVariant::Stow => "stow",
        };
        f.write_str(name)
    }
}

/// Pick the task variant for an operation
pub fn select_variant(operation: &Operation) -> GantryResult<TaskVariant> {
    let variant = match (operation.is_ground(), operation.is_manual(), operation.action()) {
        (true, _, Action::Collect) => TaskVariant::GroundCollect,
        (true, _, action) => {
            return Err(GantryError::construction(
                "dispatch",
                format!("no ground variant for {:?}", action),
            ))
        }
        (false, true, Action::Place) => TaskVariant::ManualPlace,
        (false, true, Action::Collect) => TaskVariant::ManualCollect,
        (false, false, Action::Place) => TaskVariant::AutoPlace,
        (false, false, Action::Collect) => TaskVariant::AutoCollect,
        (false, _, Action::Shoot) => TaskVariant::Shoot,
        (false, _, Action::Stow) => TaskVariant::Stow,
    };
    Ok(variant)
}

/// Dispatch table of the robot node
pub struct ManipulatorDispatcher {
    manipulator: Manipulator,
}

impl ManipulatorDispatcher {
    pub fn new(manipulator: Manipulator) -> Self {
        Self { manipulator }
    }

    pub fn build_variant(
        &self,
        variant: TaskVariant,
        operation: &Operation,
    ) -> GantryResult<Box<dyn Task>> {
        let m = &self.manipulator;
        let task: Box<dyn Task> = match variant {
            TaskVariant::GroundCollect => Box::new(tasks::ground_collect(m)),
            TaskVariant::AutoCollect => Box::new(tasks::auto_collect(m)),
            TaskVariant::ManualCollect => Box::new(tasks::manual_collect(m)),
            TaskVariant::AutoPlace => Box::new(tasks::auto_place(m, operation.level())?),
            TaskVariant::ManualPlace => Box::new(tasks::manual_place(m, operation.level())?),
            TaskVariant::Shoot => Box::new(tasks::shoot(m)),
            TaskVariant::Stow => Box::new(tasks::stow(m)),
        };
        Ok(task)
    }
}

impl TaskFactory for ManipulatorDispatcher {
    fn build(&self, operation: &Operation) -> GantryResult<Box<dyn Task>> {
        let variant = select_variant(operation)?;
        log::debug!("Dispatching '{}' as {}", operation, variant);
        self.build_variant(variant, operation)
    }
}

/// Dispatch table of the arm node: it only stows itself
pub struct ArmStowDispatcher {
    manipulator: Manipulator,
}

impl ArmStowDispatcher {
    pub fn new(manipulator: Manipulator) -> Self {
        Self { manipulator }
    }
}

impl TaskFactory for ArmStowDispatcher {
    fn build(&self, operation: &Operation) -> GantryResult<Box<dyn Task>> {
        match operation.action() {
            Action::Stow => {
                let stow = self.manipulator.config.arm.stow;
                Ok(self.manipulator.arm_to("arm_to_stow", stow) as Box<dyn Task>)
            }
            action => Err(GantryError::construction(
                "arm",
                format!("arm only handles Stow, not {:?}", action),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{GamePiece, Modifiers, Slot};

    const ACTIONS: [Action; 4] = [Action::Collect, Action::Place, Action::Shoot, Action::Stow];

    fn op(ground: bool, manual: bool, action: Action) -> Operation {
        Operation::new(action, Slot::Left, GamePiece::Cube).with_modifiers(Modifiers { ground, manual })
    }

    #[test]
    fn test_dispatch_table_is_exhaustive() {
        use TaskVariant::*;
        let expected = |ground: bool, manual: bool, action: Action| -> Option<TaskVariant> {
            match (ground, manual, action) {
                (true, _, Action::Collect) => Some(GroundCollect),
                (true, _, _) => None,
                (false, true, Action::Place) => Some(ManualPlace),
                (false, true, Action::Collect) => Some(ManualCollect),
                (false, false, Action::Place) => Some(AutoPlace),
                (false, false, Action::Collect) => Some(AutoCollect),
                (false, _, Action::Shoot) => Some(Shoot),
                (false, _, Action::Stow) => Some(Stow),
            }
        };

        let mut checked = 0;
        for ground in [false, true] {
            for manual in [false, true] {
                for action in ACTIONS {
                    let selected = select_variant(&op(ground, manual, action)).ok();
                    assert_eq!(
                        selected,
                        expected(ground, manual, action),
                        "ground={} manual={} action={:?}",
                        ground,
                        manual,
                        action
                    );
                    checked += 1;
                }
            }
        }
        assert_eq!(checked, 16);
    }

    #[test]
    fn test_ground_ignores_manual_flag() {
        assert_eq!(
            select_variant(&op(true, true, Action::Collect)).unwrap(),
            TaskVariant::GroundCollect
        );
    }

    #[test]
    fn test_ground_place_is_a_construction_error() {
        let err = select_variant(&op(true, false, Action::Place)).unwrap_err();
        assert!(matches!(err, GantryError::Construction { .. }));
    }
}
