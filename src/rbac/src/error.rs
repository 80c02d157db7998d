//! Error types for the RBAC engine

use crate::types::RoleId;
use thiserror::Error;

/// RBAC engine errors
///
/// Structural failures are expected conditions (an administrator will legitimately try an
/// invalid move) and are returned to the caller as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RbacError {
    /// Unknown role, user assignment or grant
    #[error("Not found: {0}")]
    NotFound(String),

    /// Reparent would create a cycle or make a role its own parent
    #[error("Circular dependency: {0}")]
    CircularDependency(String),

    /// Create or reparent would place a role deeper than the configured maximum
    #[error("Maximum hierarchy depth ({max_depth} levels) exceeded: {detail}")]
    DepthLimitExceeded {
        /// Configured maximum level
        max_depth: u32,
        /// What was rejected
        detail: String,
    },

    /// Mutation attempted on a system role
    #[error("Protected role: {0}")]
    ProtectedRole(String),

    /// Malformed input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Role name collision on create
    #[error("Duplicate role name: {0}")]
    DuplicateRole(String),

    /// Delete rejected because the role still has children
    #[error("Role {role_id} still has {children} child role(s)")]
    RoleHasChildren {
        /// Role that was to be deleted
        role_id: RoleId,
        /// Number of direct children
        children: usize,
    },

    /// Repository failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RbacError {
    /// Shorthand for an unknown role id
    pub fn role_not_found(id: RoleId) -> Self {
        Self::NotFound(format!("role {}", id))
    }

    /// Whether the error is one of the structural rejections a caller should surface
    /// to the user rather than treat as an outage
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Configuration(_))
    }
}

/// Result type for RBAC operations
pub type Result<T> = std::result::Result<T, RbacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RbacError::role_not_found(42);
        assert_eq!(err.to_string(), "Not found: role 42");

        let err = RbacError::DepthLimitExceeded {
            max_depth: 10,
            detail: "role 'intern' would be at level 11".to_string(),
        };
        assert!(err.to_string().contains("10 levels"));
    }

    #[test]
    fn test_rejection_classification() {
        assert!(RbacError::CircularDependency("a -> a".to_string()).is_rejection());
        assert!(RbacError::RoleHasChildren { role_id: 1, children: 2 }.is_rejection());
        assert!(!RbacError::Storage("connection reset".to_string()).is_rejection());
    }
}
