//! # ECS Error Types
//!
//! Errors fall into three classes:
//!
//! - **Configuration errors** (`TooManyComponentTypes`, `ComponentNotRegistered`,
//!   `ConflictingFilter`, `InvalidConfig`) are programming mistakes. They are
//!   returned immediately from the setup call that caused them.
//! - **Not-found conditions** (`EntityNotFound`) are expected under deferred
//!   mutation. Queries report them as `None` / `false`; only calls that must
//!   tell the caller "nothing happened" return them as errors.
//! - **System failures** (`System`) are produced by a system's update and are
//!   contained by the scheduler: the failing system is skipped for the rest
//!   of the tick, every other system still runs.

use thiserror::Error;

use crate::ecs::EntityId;

/// Errors that can occur in the ECS runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// More distinct component types were registered than the bitmask can hold.
    #[error("too many component types: the limit is {limit}")]
    TooManyComponentTypes {
        /// The maximum number of component types.
        limit: usize,
    },

    /// A component type was used before being registered.
    #[error("component type not registered: {0}")]
    ComponentNotRegistered(&'static str),

    /// A system was registered with a filter that can never match, or that
    /// names a component slot nobody registered.
    #[error("conflicting filter for system `{system}`: {reason}")]
    ConflictingFilter {
        /// Name of the offending system.
        system: String,
        /// What is wrong with the filter.
        reason: String,
    },

    /// The entity is not in the live table.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Attaching the child would make an entity its own ancestor.
    #[error("hierarchy cycle: {child} is an ancestor of {parent}")]
    HierarchyCycle {
        /// The requested parent.
        parent: EntityId,
        /// The requested child.
        child: EntityId,
    },

    /// A store held a value of a different type than requested.
    #[error("component type mismatch: expected {expected}, found {found}")]
    ComponentTypeMismatch {
        /// The type the caller asked for.
        expected: &'static str,
        /// The type the store holds.
        found: &'static str,
    },

    /// A system update failed.
    #[error("system `{system}` failed: {reason}")]
    System {
        /// Name of the failing system.
        system: String,
        /// Failure description.
        reason: String,
    },

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EcsError {
    /// Builds a [`EcsError::System`] failure for the named system.
    #[must_use]
    pub fn system(system: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::System {
            system: system.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that indicate a setup mistake rather than a
    /// runtime condition.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::TooManyComponentTypes { .. }
                | Self::ComponentNotRegistered(_)
                | Self::ConflictingFilter { .. }
                | Self::InvalidConfig(_)
        )
    }
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EcsError::TooManyComponentTypes { limit: 64 };
        assert_eq!(err.to_string(), "too many component types: the limit is 64");

        let err = EcsError::system("movement", "bad tile");
        assert_eq!(err.to_string(), "system `movement` failed: bad tile");
    }

    #[test]
    fn test_configuration_class() {
        assert!(EcsError::TooManyComponentTypes { limit: 64 }.is_configuration());
        assert!(EcsError::ComponentNotRegistered("Guid").is_configuration());
        assert!(!EcsError::EntityNotFound(EntityId::from_raw(3)).is_configuration());
        assert!(!EcsError::system("a", "b").is_configuration());
    }
}
