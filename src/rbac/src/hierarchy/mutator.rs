//! Structural mutations of the role forest
//!
//! Every operation validates completely before touching the store, so a rejected
//! mutation leaves the graph exactly as it was. Levels are always derived here, never
//! taken from callers.

use super::store::RoleStore;
use super::validator::CycleValidator;
use crate::config::DeletePolicy;
use crate::error::{RbacError, Result};
use crate::permissions::{PermissionGrant, PermissionRemoval};
use crate::types::{NewRole, Role, RoleId, RoleUpdate, UserId};
use std::collections::VecDeque;
use tracing::debug;

/// Result of a reparent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reparented {
    /// The moved role after the change
    pub role: Role,
    /// Every role whose parent or level changed (the moved role first)
    pub updated: Vec<Role>,
}

/// Result of a delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    /// The removed role
    pub role: Role,
    /// Children moved to the deleted role's parent, and their re-levelled descendants
    pub updated: Vec<Role>,
}

/// Applies validated structural changes to a store
pub struct HierarchyMutator<'a> {
    store: &'a mut RoleStore,
    delete_policy: DeletePolicy,
}

impl<'a> HierarchyMutator<'a> {
    /// Create a mutator with the default delete policy
    pub fn new(store: &'a mut RoleStore) -> Self {
        Self {
            store,
            delete_policy: DeletePolicy::default(),
        }
    }

    /// Set what happens to children when their parent is deleted
    pub fn with_delete_policy(mut self, delete_policy: DeletePolicy) -> Self {
        self.delete_policy = delete_policy;
        self
    }

    /// Create a role; its level is derived from the parent
    ///
    /// # Errors
    ///
    /// `ValidationError`, `DuplicateRole`, `NotFound` (parent), `DepthLimitExceeded`
    pub fn create_role(&mut self, input: NewRole) -> Result<Role> {
        input.validate()?;

        if self.store.get_by_name(&input.name).is_some() {
            return Err(RbacError::DuplicateRole(input.name));
        }

        let hierarchy_level = match input.parent_role_id {
            None => 0,
            Some(parent_id) => {
                let parent = self.store.require(parent_id)?;
                if CycleValidator::new(&*self.store).exceeds_depth(parent_id) {
                    return Err(RbacError::DepthLimitExceeded {
                        max_depth: self.store.max_depth(),
                        detail: format!(
                            "'{}' would be at level {} under '{}'",
                            input.name,
                            parent.hierarchy_level + 1,
                            parent.name
                        ),
                    });
                }
                parent.hierarchy_level + 1
            }
        };

        let role = Role {
            id: self.store.allocate_id(),
            name: input.name,
            display_name: input.display_name,
            description: input.description,
            parent_role_id: input.parent_role_id,
            hierarchy_level,
            is_system: input.is_system,
            is_active: true,
        };

        debug!("Creating role {} at level {}", role, role.hierarchy_level);
        self.store.insert_role(role.clone());

        Ok(role)
    }

    /// Move a role (with its subtree) under a new parent, or to the top level
    ///
    /// # Errors
    ///
    /// Checked in order: `NotFound` (role or parent), `ProtectedRole`,
    /// `CircularDependency` (self-parent or descendant parent), `DepthLimitExceeded`.
    pub fn set_parent(&mut self, role_id: RoleId, new_parent: Option<RoleId>) -> Result<Reparented> {
        let role = self.store.require(role_id)?;
        if let Some(parent_id) = new_parent {
            self.store.require(parent_id)?;
        }

        if role.is_system {
            return Err(RbacError::ProtectedRole(format!(
                "system role '{}' cannot be reparented",
                role.name
            )));
        }

        let validator = CycleValidator::new(&*self.store);

        if let Some(parent_id) = new_parent {
            if parent_id == role_id {
                return Err(RbacError::CircularDependency(format!(
                    "role '{}' cannot be its own parent",
                    role.name
                )));
            }
            if validator.would_create_cycle(role_id, parent_id) {
                return Err(RbacError::CircularDependency(format!(
                    "role {} is a descendant of '{}'",
                    parent_id, role.name
                )));
            }
            if validator.exceeds_depth(parent_id) {
                return Err(RbacError::DepthLimitExceeded {
                    max_depth: self.store.max_depth(),
                    detail: format!("parent {} is already at the deepest level", parent_id),
                });
            }
        }

        if validator.subtree_exceeds_depth(role_id, new_parent) {
            return Err(RbacError::DepthLimitExceeded {
                max_depth: self.store.max_depth(),
                detail: format!(
                    "moving '{}' would push its descendants ({} levels) too deep",
                    role.name,
                    self.store.subtree_height(role_id)
                ),
            });
        }

        if role.parent_role_id == new_parent {
            let role = role.clone();
            return Ok(Reparented {
                role,
                updated: Vec::new(),
            });
        }

        // Validation is complete; nothing below can fail for existing ids
        self.store.relink(role_id, new_parent)?;
        let updated = self.relevel_subtree(role_id)?;
        let role = self.store.require(role_id)?.clone();

        debug!(
            "Reparented {} under {:?}; {} role(s) updated",
            role,
            new_parent,
            updated.len()
        );

        Ok(Reparented { role, updated })
    }

    /// Update descriptive fields of a role
    ///
    /// # Errors
    ///
    /// `NotFound`, `ValidationError` (blank display name), `ProtectedRole` (deactivating a
    /// system role)
    pub fn update_role(&mut self, role_id: RoleId, update: RoleUpdate) -> Result<Role> {
        let existing = self.store.require(role_id)?;

        if let Some(name) = &update.display_name {
            if name.trim().is_empty() {
                return Err(RbacError::ValidationError(format!(
                    "Role '{}' must have a display name",
                    existing.name
                )));
            }
        }
        if existing.is_system && update.is_active == Some(false) {
            return Err(RbacError::ProtectedRole(format!(
                "system role '{}' cannot be deactivated",
                existing.name
            )));
        }

        let role = self.store.role_mut(role_id)?;
        if let Some(display_name) = update.display_name {
            role.display_name = display_name;
        }
        if let Some(description) = update.description {
            role.description = description;
        }
        if let Some(is_active) = update.is_active {
            role.is_active = is_active;
        }

        Ok(role.clone())
    }

    /// Delete a role, its grants and its user assignments
    ///
    /// # Errors
    ///
    /// `NotFound`, `ProtectedRole` (system role, or a system child under
    /// `ReparentToGrandparent`), `RoleHasChildren` under `Reject`
    pub fn delete_role(&mut self, role_id: RoleId) -> Result<Deleted> {
        let role = self.store.require(role_id)?;

        if role.is_system {
            return Err(RbacError::ProtectedRole(format!(
                "system role '{}' cannot be deleted",
                role.name
            )));
        }

        let children: Vec<RoleId> = self.store.child_ids(role_id).collect();
        let grandparent = role.parent_role_id;

        if !children.is_empty() {
            match self.delete_policy {
                DeletePolicy::Reject => {
                    return Err(RbacError::RoleHasChildren {
                        role_id,
                        children: children.len(),
                    });
                }
                DeletePolicy::ReparentToGrandparent => {
                    if let Some(system_child) = children
                        .iter()
                        .filter_map(|c| self.store.get(*c))
                        .find(|c| c.is_system)
                    {
                        return Err(RbacError::ProtectedRole(format!(
                            "system role '{}' cannot be moved off deleted parent '{}'",
                            system_child.name, role.name
                        )));
                    }
                }
            }
        }

        // Children move up one level, so depth can only shrink
        let mut updated = Vec::new();
        for child in children {
            self.store.relink(child, grandparent)?;
            updated.extend(self.relevel_subtree(child)?);
        }

        let removed = self.store.remove_role(role_id)?;
        debug!("Deleted {}; {} role(s) re-levelled", removed, updated.len());

        Ok(Deleted {
            role: removed,
            updated,
        })
    }

    /// Add or replace a grant
    ///
    /// Returns the grant it replaced, if any.
    pub fn add_grant(&mut self, grant: PermissionGrant) -> Result<Option<PermissionGrant>> {
        grant.validate()?;
        self.store.require(grant.role_id)?;
        Ok(self.store.put_grant(grant))
    }

    /// Remove the grants matching `removal`
    ///
    /// # Errors
    ///
    /// `NotFound` if the role is unknown or nothing matched
    pub fn remove_grants(&mut self, removal: &PermissionRemoval) -> Result<Vec<PermissionGrant>> {
        self.store.require(removal.role_id)?;

        let removed = self.store.remove_grants(removal);
        if removed.is_empty() {
            return Err(RbacError::NotFound(format!(
                "permission {}:{} on role {}",
                removal.resource, removal.action, removal.role_id
            )));
        }

        Ok(removed)
    }

    /// Give a user a role; returns `false` if already held
    pub fn assign_role(&mut self, user: UserId, role_id: RoleId) -> Result<bool> {
        if user.trim().is_empty() {
            return Err(RbacError::ValidationError(
                "User id cannot be empty".to_string(),
            ));
        }
        self.store.require(role_id)?;
        Ok(self.store.assign(user, role_id))
    }

    /// Take a role from a user
    pub fn revoke_role(&mut self, user: &str, role_id: RoleId) -> Result<()> {
        if self.store.revoke(user, role_id) {
            Ok(())
        } else {
            Err(RbacError::NotFound(format!(
                "role {} assignment for user '{}'",
                role_id, user
            )))
        }
    }

    /// Recompute levels for `root` and every descendant from the parent links
    ///
    /// Returns the roles whose level changed, plus `root` itself first.
    fn relevel_subtree(&mut self, root: RoleId) -> Result<Vec<Role>> {
        let root_level = match self.store.require(root)?.parent_role_id {
            None => 0,
            Some(parent) => self.store.require(parent)?.hierarchy_level + 1,
        };

        let mut updated = Vec::new();
        let mut queue = VecDeque::from([(root, root_level)]);

        while let Some((id, level)) = queue.pop_front() {
            let previous = self.store.require(id)?.hierarchy_level;
            self.store.set_level(id, level)?;
            if id == root || previous != level {
                updated.push(self.store.require(id)?.clone());
            }
            queue.extend(self.store.child_ids(id).map(|c| (c, level + 1)));
        }

        Ok(updated)
    }
}
