//! Operation validator
//!
//! A [`RuleSet`] is an ordered list of stateless [`OperationRule`]s checked
//! before any task is built. Checks short-circuit on the first violation and
//! never touch node or hardware state, so a rejected operation leaves the
//! robot exactly as it was.
//!
//! The built-in rules cover the manipulator's geometry. The table-driven
//! ones read their limits from [`DomainConstraints`], which is part of the
//! robot configuration.

use crate::core::{Action, GamePiece, Operation, Slot};
use crate::error::RejectionCause;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a rule refused an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleViolation {
    pub rule: &'static str,
    pub reason: String,
}

impl RuleViolation {
    pub fn new(rule: &'static str, reason: impl Into<String>) -> Self {
        Self {
            rule,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.reason)
    }
}

impl From<RuleViolation> for RejectionCause {
    fn from(violation: RuleViolation) -> Self {
        RejectionCause::Invalid {
            rule: violation.rule,
            reason: violation.reason,
        }
    }
}

/// A single validation rule
///
/// Rules are pure: the same operation always gets the same answer.
pub trait OperationRule: Send + Sync {
    /// Stable rule name, reported in rejections
    fn name(&self) -> &'static str;

    fn check(&self, operation: &Operation) -> Result<(), RuleViolation>;
}

/// Ordered collection of rules attached to a node
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn OperationRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, rule: impl OperationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Rules every manipulator node enforces
    pub fn manipulator(constraints: &DomainConstraints) -> Self {
        Self::new()
            .with(GroundRequiresCollect)
            .with(MiddleSlotUnreachable)
            .with(CubeOnlySlots::new(constraints.cube_only_slots.clone()))
            .with(ShootablePayload::new(constraints.shootable_payloads.clone()))
    }

    /// Check every rule in order, stopping at the first violation
    pub fn check(&self, operation: &Operation) -> Result<(), RuleViolation> {
        for rule in &self.rules {
            if let Err(violation) = rule.check(operation) {
                log::debug!("Rule '{}' rejected {}: {}", rule.name(), operation, violation.reason);
                return Err(violation);
            }
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Static limits of the playing field and mechanism
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConstraints {
    /// Slots that only hold cubes
    #[serde(default = "default_cube_only_slots")]
    pub cube_only_slots: Vec<Slot>,
    /// Payloads the shooter can launch
    #[serde(default = "default_shootable_payloads")]
    pub shootable_payloads: Vec<GamePiece>,
}

fn default_cube_only_slots() -> Vec<Slot> {
    vec![Slot::Middle]
}

fn default_shootable_payloads() -> Vec<GamePiece> {
    vec![GamePiece::Cube]
}

impl Default for DomainConstraints {
    fn default() -> Self {
        Self {
            cube_only_slots: default_cube_only_slots(),
            shootable_payloads: default_shootable_payloads(),
        }
    }
}

/// Only collection can be done from the floor
pub struct GroundRequiresCollect;

impl OperationRule for GroundRequiresCollect {
    fn name(&self) -> &'static str {
        "ground_requires_collect"
    }

    fn check(&self, operation: &Operation) -> Result<(), RuleViolation> {
        if operation.is_ground() && operation.action() != Action::Collect {
            return Err(RuleViolation::new(
                self.name(),
                format!("{:?} cannot be performed on the ground", operation.action()),
            ));
        }
        Ok(())
    }
}

/// The loading station has no middle collection slot
pub struct MiddleSlotUnreachable;

impl OperationRule for MiddleSlotUnreachable {
    fn name(&self) -> &'static str {
        "middle_slot_unreachable"
    }

    fn check(&self, operation: &Operation) -> Result<(), RuleViolation> {
        if operation.action() == Action::Collect && operation.slot() == Slot::Middle {
            return Err(RuleViolation::new(
                self.name(),
                "cannot collect from the middle slot",
            ));
        }
        Ok(())
    }
}

/// Cones cannot be placed in cube-only slots
pub struct CubeOnlySlots {
    slots: Vec<Slot>,
}

impl CubeOnlySlots {
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }
}

impl OperationRule for CubeOnlySlots {
    fn name(&self) -> &'static str {
        "cube_only_slot"
    }

    fn check(&self, operation: &Operation) -> Result<(), RuleViolation> {
        if operation.action() == Action::Place
            && operation.payload() == GamePiece::Cone
            && self.slots.contains(&operation.slot())
        {
            return Err(RuleViolation::new(
                self.name(),
                format!("slot {:?} only holds cubes", operation.slot()),
            ));
        }
        Ok(())
    }
}

/// Shooting needs a payload the shooter can launch
pub struct ShootablePayload {
    payloads: Vec<GamePiece>,
}

impl ShootablePayload {
    pub fn new(payloads: Vec<GamePiece>) -> Self {
        Self { payloads }
    }
}

impl OperationRule for ShootablePayload {
    fn name(&self) -> &'static str {
        "shootable_payload"
    }

    fn check(&self, operation: &Operation) -> Result<(), RuleViolation> {
        if operation.action() == Action::Shoot && !self.payloads.contains(&operation.payload()) {
            return Err(RuleViolation::new(
                self.name(),
                format!("{:?} cannot be shot", operation.payload()),
            ));
        }
        Ok(())
    }
}

/// Restricts a node to a fixed set of actions
pub struct AllowedActions {
    actions: Vec<Action>,
}

impl AllowedActions {
    pub fn new(actions: impl Into<Vec<Action>>) -> Self {
        Self {
            actions: actions.into(),
        }
    }
}

impl OperationRule for AllowedActions {
    fn name(&self) -> &'static str {
        "allowed_actions"
    }

    fn check(&self, operation: &Operation) -> Result<(), RuleViolation> {
        if !self.actions.contains(&operation.action()) {
            return Err(RuleViolation::new(
                self.name(),
                format!("{:?} is not handled here", operation.action()),
            ));
        }
        Ok(())
    }
}
