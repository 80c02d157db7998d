//! Core role types

use crate::error::{RbacError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique role identifier
pub type RoleId = i64;

/// Unique user identifier (e.g., "user:alice@example.com")
pub type UserId = String;

/// Default maximum hierarchy level (root is level 0)
pub const MAX_DEPTH: u32 = 10;

/// Maximum length of a role name
const MAX_NAME_LENGTH: usize = 64;

/// A node in the role forest
///
/// `hierarchy_level` is derived from `parent_role_id` by the store and is never
/// accepted from callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role identifier
    pub id: RoleId,

    /// Unique slug-like name (e.g., "team_lead")
    pub name: String,

    /// Human readable name
    pub display_name: String,

    /// Optional free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Parent role, absent for roots
    #[serde(default)]
    pub parent_role_id: Option<RoleId>,

    /// Depth in the tree, root = 0
    #[serde(default)]
    pub hierarchy_level: u32,

    /// System roles cannot be reparented or deleted
    #[serde(default)]
    pub is_system: bool,

    /// Inactive roles contribute nothing to the users holding them
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Role {
    /// Whether this role is a root of its tree
    pub fn is_root(&self) -> bool {
        self.parent_role_id.is_none()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.id)
    }
}

/// Input for creating a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    /// Unique slug-like name
    pub name: String,

    /// Human readable name
    pub display_name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Optional parent
    #[serde(default)]
    pub parent_role_id: Option<RoleId>,

    /// Mark the role as a protected system role
    #[serde(default)]
    pub is_system: bool,
}

impl NewRole {
    /// Create a root role definition
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: None,
            parent_role_id: None,
            is_system: false,
        }
    }

    /// Set the parent role
    pub fn with_parent(mut self, parent_role_id: RoleId) -> Self {
        self.parent_role_id = Some(parent_role_id);
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark as system role
    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// Validate name and display name
    pub fn validate(&self) -> Result<()> {
        validate_role_name(&self.name)?;

        if self.display_name.trim().is_empty() {
            return Err(RbacError::ValidationError(format!(
                "Role '{}' must have a display name",
                self.name
            )));
        }

        Ok(())
    }
}

/// Partial update of the descriptive fields of a role
///
/// Structural fields (parent, level, system flag) are absent: the parent
/// changes through `set_parent` only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpdate {
    /// New display name
    #[serde(default)]
    pub display_name: Option<String>,

    /// New description (`Some(None)` clears it)
    #[serde(default)]
    pub description: Option<Option<String>>,

    /// Activate or deactivate
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Who a permission query is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    /// A single role and its ancestor chain
    Role(RoleId),
    /// Every active role held by a user
    User(UserId),
}

impl From<RoleId> for Subject {
    fn from(id: RoleId) -> Self {
        Subject::Role(id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Role(id) => write!(f, "role:{}", id),
            Subject::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Check that a role name is slug-like: lowercase ASCII letters, digits, `_` and `-`,
/// starting with a letter
pub fn validate_role_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RbacError::ValidationError(
            "Role name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(RbacError::ValidationError(format!(
            "Role name '{}' exceeds {} characters",
            name, MAX_NAME_LENGTH
        )));
    }

    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_valid = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

    if !starts_with_letter || !rest_valid {
        return Err(RbacError::ValidationError(format!(
            "Role name '{}' must be a lowercase slug (a-z, 0-9, '_', '-')",
            name
        )));
    }

    Ok(())
}
