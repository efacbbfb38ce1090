//! Error types for the GANTRY core
//!
//! Two families live here:
//!
//! - [`GantryError`]: faults raised while building, starting, ticking or
//!   aborting tasks, and while loading configuration.
//! - [`Rejection`]: the synchronous answer to a submission that was not
//!   accepted. A rejection never changes the addressed node's state.

use std::fmt;
use thiserror::Error;

/// Main error type for GANTRY operations
#[derive(Debug, Error)]
pub enum GantryError {
    /// A task could not be constructed (bad configuration, missing calibration)
    #[error("Failed to construct task '{task}': {reason}")]
    Construction { task: String, reason: String },

    /// A hardware capability reported a fault
    #[error("Hardware fault on '{device}': {reason}")]
    Hardware { device: String, reason: String },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A node name or id did not resolve
    #[error("Unknown resource node '{0}'")]
    UnknownNode(String),

    /// A task panicked inside start/tick/abort
    #[error("Task '{task}' panicked: {message}")]
    TaskPanic { task: String, message: String },

    /// A composite could not hand work to another node, or a delegated task
    /// ended without completing
    #[error("Delegation from '{task}' to '{node}' failed: {reason}")]
    Delegation {
        task: String,
        node: String,
        reason: String,
    },

    /// A lifecycle method was called in the wrong state
    #[error("Task '{task}' cannot {action} while {state}")]
    Lifecycle {
        task: String,
        action: &'static str,
        state: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GantryError {
    pub fn construction(task: impl Into<String>, reason: impl Into<String>) -> Self {
        GantryError::Construction {
            task: task.into(),
            reason: reason.into(),
        }
    }

    pub fn hardware(device: impl Into<String>, reason: impl Into<String>) -> Self {
        GantryError::Hardware {
            device: device.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        GantryError::Config(msg.into())
    }

    pub fn delegation(
        task: impl Into<String>,
        node: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        GantryError::Delegation {
            task: task.into(),
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for GANTRY operations
pub type GantryResult<T> = Result<T, GantryError>;

/// Why a submission was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionCause {
    /// The node already owns an active task
    Busy { active: &'static str },
    /// A validator rule refused the operation
    Invalid { rule: &'static str, reason: String },
    /// Task construction or `start()` failed; the node stayed idle
    Construction(String),
    /// The node does not accept operations, only delegated tasks
    NoDispatcher,
    /// The addressed node does not exist
    UnknownNode,
}

impl RejectionCause {
    /// Short stable code for telemetry and scripting
    pub fn code(&self) -> &'static str {
        match self {
            Self::Busy { .. } => "busy",
            Self::Invalid { .. } => "invalid",
            Self::Construction(_) => "construction",
            Self::NoDispatcher => "no_dispatcher",
            Self::UnknownNode => "unknown_node",
        }
    }
}

impl fmt::Display for RejectionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy { active } => write!(f, "busy (running '{}')", active),
            Self::Invalid { rule, reason } => write!(f, "invalid [{}]: {}", rule, reason),
            Self::Construction(reason) => write!(f, "construction fault: {}", reason),
            Self::NoDispatcher => write!(f, "node does not accept operations"),
            Self::UnknownNode => write!(f, "unknown node"),
        }
    }
}

/// A submission that was not accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{node}' rejected request: {cause}")]
pub struct Rejection {
    pub node: String,
    pub cause: RejectionCause,
}

impl Rejection {
    pub fn new(node: impl Into<String>, cause: RejectionCause) -> Self {
        Self {
            node: node.into(),
            cause,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.cause, RejectionCause::Busy { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.cause, RejectionCause::Invalid { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_display_carries_cause() {
        let rejection = Rejection::new(
            "robot",
            RejectionCause::Invalid {
                rule: "ground_requires_collect",
                reason: "ground place is not possible".to_string(),
            },
        );
        let text = rejection.to_string();
        assert!(text.contains("robot"));
        assert!(text.contains("ground_requires_collect"));
        assert!(rejection.is_invalid());
        assert!(!rejection.is_busy());
        assert_eq!(rejection.cause.code(), "invalid");
    }

    #[test]
    fn test_error_constructors() {
        let err = GantryError::construction("place", "no setpoint for level high");
        assert!(matches!(err, GantryError::Construction { .. }));
        assert!(err.to_string().contains("no setpoint"));
    }
}
