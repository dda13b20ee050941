//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`RvcError`]
//! via `#[from]` or an explicit `into_domain` helper.

use crate::command::Nack;

/// Workspace-level error.
#[derive(Debug, thiserror::Error)]
pub enum RvcError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("command rejected")]
    Rejected(#[from] Nack),

    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("bridge is not running")]
    Stopped,
}

/// A value or a configuration table failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("instance must not be empty")]
    EmptyInstance,

    #[error("instance {0:?} is not a bus instance number")]
    NonNumericInstance(String),

    #[error("instance {instance} is claimed by both {first} and {second}")]
    OverlappingInstance {
        instance: String,
        first: String,
        second: String,
    },

    #[error("{0} has no stop instance")]
    NoStopInstance(String),

    #[error("unknown device type {0:?}")]
    UnknownDeviceType(String),

    #[error("{field} must be {constraint}")]
    OutOfRange {
        field: &'static str,
        constraint: &'static str,
    },
}

/// An action targeted a device that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} {id:?} not found")]
pub struct NotFoundError {
    pub kind: &'static str,
    pub id: String,
}

impl NotFoundError {
    #[must_use]
    pub fn new(kind: &'static str, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}
