//! Rebuilding the role forest from persisted rows
//!
//! Stored `hierarchy_level` values are never trusted: levels are derived with a
//! breadth-first (Kahn-style) pass from the roots. Any role the pass cannot reach sits on
//! a cycle, which is reported with its full path.

use super::store::RoleStore;
use crate::error::{RbacError, Result};
use crate::permissions::PermissionGrant;
use crate::types::{validate_role_name, Role, RoleId, UserId, MAX_DEPTH};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Builds a validated `RoleStore` from flat role, grant and assignment rows
///
/// # Example
///
/// ```rust
/// use cretoai_rbac::hierarchy::RoleStoreBuilder;
/// use cretoai_rbac::Role;
///
/// let admin = Role {
///     id: 1,
///     name: "admin".to_string(),
///     display_name: "Administrator".to_string(),
///     description: None,
///     parent_role_id: None,
///     hierarchy_level: 0,
///     is_system: true,
///     is_active: true,
/// };
///
/// let store = RoleStoreBuilder::new().role(admin).build().unwrap();
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RoleStoreBuilder {
    roles: Vec<Role>,
    grants: Vec<PermissionGrant>,
    assignments: Vec<(UserId, RoleId)>,
    max_depth: u32,
}

impl RoleStoreBuilder {
    /// Create a new builder with the default maximum depth
    pub fn new() -> Self {
        Self {
            roles: Vec::new(),
            grants: Vec::new(),
            assignments: Vec::new(),
            max_depth: MAX_DEPTH,
        }
    }

    /// Set the maximum hierarchy level
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Add a role row
    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Add many role rows
    pub fn roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    /// Add grant rows
    pub fn grants(mut self, grants: impl IntoIterator<Item = PermissionGrant>) -> Self {
        self.grants.extend(grants);
        self
    }

    /// Add user assignment rows
    pub fn assignments(mut self, assignments: impl IntoIterator<Item = (UserId, RoleId)>) -> Self {
        self.assignments.extend(assignments);
        self
    }

    /// Validate the rows and build the store
    ///
    /// # Errors
    ///
    /// - `DuplicateRole` for a repeated id or name
    /// - `ValidationError` for a malformed name or grant
    /// - `NotFound` for a parent, grant or assignment pointing at an unknown role
    /// - `CircularDependency` with the cycle path if the parent links loop
    /// - `DepthLimitExceeded` if a derived level is above the maximum
    pub fn build(self) -> Result<RoleStore> {
        let mut by_id: HashMap<RoleId, Role> = HashMap::with_capacity(self.roles.len());
        let mut names: HashSet<String> = HashSet::with_capacity(self.roles.len());

        for role in self.roles {
            validate_role_name(&role.name)?;
            if !names.insert(role.name.clone()) {
                return Err(RbacError::DuplicateRole(role.name));
            }
            if by_id.contains_key(&role.id) {
                return Err(RbacError::DuplicateRole(format!("id {}", role.id)));
            }
            by_id.insert(role.id, role);
        }

        // Reverse edges: parent -> children
        let mut children: HashMap<RoleId, Vec<RoleId>> = HashMap::new();
        for role in by_id.values() {
            if let Some(parent) = role.parent_role_id {
                if !by_id.contains_key(&parent) {
                    return Err(RbacError::NotFound(format!(
                        "parent role {} of '{}'",
                        parent, role.name
                    )));
                }
                children.entry(parent).or_default().push(role.id);
            }
        }

        // Breadth-first from roots, assigning levels
        let mut levels: HashMap<RoleId, u32> = HashMap::with_capacity(by_id.len());
        let mut order: Vec<RoleId> = Vec::with_capacity(by_id.len());
        let mut queue: VecDeque<(RoleId, u32)> = by_id
            .values()
            .filter(|r| r.parent_role_id.is_none())
            .map(|r| (r.id, 0))
            .collect();

        while let Some((id, level)) = queue.pop_front() {
            levels.insert(id, level);
            order.push(id);
            if let Some(kids) = children.get(&id) {
                queue.extend(kids.iter().map(|k| (*k, level + 1)));
            }
        }

        if order.len() != by_id.len() {
            let path = Self::find_cycle(&by_id, &levels);
            return Err(RbacError::CircularDependency(path));
        }

        let mut store = RoleStore::with_max_depth(self.max_depth);

        for id in order {
            let Some(mut role) = by_id.remove(&id) else {
                continue;
            };
            let level = levels.get(&id).copied().unwrap_or_default();

            if level > self.max_depth {
                return Err(RbacError::DepthLimitExceeded {
                    max_depth: self.max_depth,
                    detail: format!("role '{}' is at level {}", role.name, level),
                });
            }
            if role.hierarchy_level != level {
                warn!(
                    "Role '{}' stored at level {} but derives level {}; using derived level",
                    role.name, role.hierarchy_level, level
                );
                role.hierarchy_level = level;
            }

            store.insert_role(role);
        }

        for grant in self.grants {
            grant.validate()?;
            if !store.contains(grant.role_id) {
                return Err(RbacError::NotFound(format!(
                    "role {} for grant '{}'",
                    grant.role_id, grant
                )));
            }
            store.put_grant(grant);
        }

        for (user, role_id) in self.assignments {
            if !store.contains(role_id) {
                return Err(RbacError::NotFound(format!(
                    "role {} assigned to user '{}'",
                    role_id, user
                )));
            }
            store.assign(user, role_id);
        }

        debug!("Role store built with {} roles", store.len());

        Ok(store)
    }

    /// Walk parent links from an unreached role until a role repeats
    fn find_cycle(by_id: &HashMap<RoleId, Role>, reached: &HashMap<RoleId, u32>) -> String {
        let Some(start) = by_id.keys().filter(|id| !reached.contains_key(*id)).min() else {
            return "Unknown cycle detected".to_string();
        };

        let mut path: Vec<RoleId> = Vec::new();
        let mut current = Some(*start);

        while let Some(id) = current {
            if let Some(pos) = path.iter().position(|p| *p == id) {
                let name = |id: &RoleId| {
                    by_id
                        .get(id)
                        .map(|r| r.name.clone())
                        .unwrap_or_else(|| id.to_string())
                };
                let mut cycle: Vec<String> = path[pos..].iter().map(name).collect();
                cycle.push(name(&id));
                return cycle.join(" -> ");
            }
            path.push(id);
            current = by_id.get(&id).and_then(|r| r.parent_role_id);
        }

        "Unknown cycle detected".to_string()
    }
}

impl Default for RoleStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
