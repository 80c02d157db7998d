//! In-memory role forest
//!
//! `RoleStore` is the canonical graph: roles indexed by id with the parent stored as an id,
//! a child adjacency index, the direct grants of every role and user assignments. It is
//! `Clone` so writers can mutate a private copy and publish it as a new snapshot.

use crate::error::{RbacError, Result};
use crate::permissions::{GrantKey, PermissionGrant, PermissionRemoval};
use crate::types::{Role, RoleId, UserId, MAX_DEPTH};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Canonical role graph snapshot
#[derive(Debug, Clone)]
pub struct RoleStore {
    /// Roles by id
    roles: BTreeMap<RoleId, Role>,

    /// Direct children by parent id
    children: HashMap<RoleId, BTreeSet<RoleId>>,

    /// Role id by unique name
    names: HashMap<String, RoleId>,

    /// Direct grants by role id
    grants: HashMap<RoleId, BTreeMap<GrantKey, PermissionGrant>>,

    /// Held roles by user
    user_roles: HashMap<UserId, BTreeSet<RoleId>>,

    /// Next id handed out by `allocate_id`
    next_id: RoleId,

    /// Incremented on every published mutation
    version: u64,

    /// Maximum hierarchy level
    max_depth: u32,
}

impl RoleStore {
    /// Create an empty store with the default maximum depth
    pub fn new() -> Self {
        Self::with_max_depth(MAX_DEPTH)
    }

    /// Create an empty store with a custom maximum depth
    pub fn with_max_depth(max_depth: u32) -> Self {
        Self {
            roles: BTreeMap::new(),
            children: HashMap::new(),
            names: HashMap::new(),
            grants: HashMap::new(),
            user_roles: HashMap::new(),
            next_id: 1,
            version: 0,
            max_depth,
        }
    }

    /// Get a role by id
    pub fn get(&self, id: RoleId) -> Option<&Role> {
        self.roles.get(&id)
    }

    /// Get a role by id or fail with `NotFound`
    pub fn require(&self, id: RoleId) -> Result<&Role> {
        self.get(id).ok_or_else(|| RbacError::role_not_found(id))
    }

    /// Get a role by its unique name
    pub fn get_by_name(&self, name: &str) -> Option<&Role> {
        self.names.get(name).and_then(|id| self.roles.get(id))
    }

    /// Whether a role exists
    pub fn contains(&self, id: RoleId) -> bool {
        self.roles.contains_key(&id)
    }

    /// All roles ordered by id
    pub fn all(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// Number of roles
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether the store holds no roles
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Root roles ordered by id
    pub fn roots(&self) -> impl Iterator<Item = &Role> {
        self.roles.values().filter(|r| r.is_root())
    }

    /// Ids of the direct children of a role
    pub fn child_ids(&self, id: RoleId) -> impl Iterator<Item = RoleId> + '_ {
        self.children.get(&id).into_iter().flatten().copied()
    }

    /// Direct children of a role ordered by id
    pub fn children(&self, id: RoleId) -> Vec<&Role> {
        self.child_ids(id).filter_map(|c| self.roles.get(&c)).collect()
    }

    /// Number of direct children
    pub fn child_count(&self, id: RoleId) -> usize {
        self.children.get(&id).map_or(0, |c| c.len())
    }

    /// Ancestors of a role, nearest first, excluding the role itself
    ///
    /// Iterative; the visited set guarantees termination even if the parent links were
    /// corrupted into a loop.
    pub fn ancestors(&self, id: RoleId) -> Vec<&Role> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut current = self.roles.get(&id).and_then(|r| r.parent_role_id);

        while let Some(parent_id) = current {
            if !visited.insert(parent_id) {
                break;
            }
            let Some(parent) = self.roles.get(&parent_id) else {
                break;
            };
            chain.push(parent);
            current = parent.parent_role_id;
        }

        chain
    }

    /// Ids of every descendant of a role, breadth first
    pub fn descendants(&self, id: RoleId) -> Vec<RoleId> {
        let mut result = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut queue: VecDeque<RoleId> = self.child_ids(id).collect();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current);
            queue.extend(self.child_ids(current));
        }

        result
    }

    /// Number of levels below a role (0 for a leaf)
    pub fn subtree_height(&self, id: RoleId) -> u32 {
        let mut height = 0;
        let mut visited = HashSet::from([id]);
        let mut queue: VecDeque<(RoleId, u32)> = self.child_ids(id).map(|c| (c, 1)).collect();

        while let Some((current, depth)) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            height = height.max(depth);
            queue.extend(self.child_ids(current).map(|c| (c, depth + 1)));
        }

        height
    }

    /// Direct grants of a role
    pub fn grants_for(&self, id: RoleId) -> impl Iterator<Item = &PermissionGrant> {
        self.grants.get(&id).into_iter().flat_map(|g| g.values())
    }

    /// Every stored grant
    pub fn all_grants(&self) -> impl Iterator<Item = &PermissionGrant> {
        self.grants.values().flat_map(|g| g.values())
    }

    /// Roles held by a user, ordered by id
    pub fn roles_of_user(&self, user: &str) -> Vec<RoleId> {
        self.user_roles
            .get(user)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether the user has any assignment at all
    pub fn has_user(&self, user: &str) -> bool {
        self.user_roles.contains_key(user)
    }

    /// Every `(user, role)` assignment
    pub fn assignments(&self) -> impl Iterator<Item = (&UserId, RoleId)> {
        self.user_roles
            .iter()
            .flat_map(|(user, roles)| roles.iter().map(move |r| (user, *r)))
    }

    /// Snapshot version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Maximum hierarchy level
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    // ------------------------------------------------------------------
    // Mutation primitives, reachable only through the mutator and builder
    // ------------------------------------------------------------------

    pub(crate) fn allocate_id(&mut self) -> RoleId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn insert_role(&mut self, role: Role) {
        if let Some(parent) = role.parent_role_id {
            self.children.entry(parent).or_default().insert(role.id);
        }
        self.names.insert(role.name.clone(), role.id);
        self.next_id = self.next_id.max(role.id + 1);
        self.roles.insert(role.id, role);
    }

    pub(crate) fn role_mut(&mut self, id: RoleId) -> Result<&mut Role> {
        self.roles
            .get_mut(&id)
            .ok_or_else(|| RbacError::role_not_found(id))
    }

    /// Relink `id` under `new_parent`, keeping the child index in sync
    pub(crate) fn relink(&mut self, id: RoleId, new_parent: Option<RoleId>) -> Result<()> {
        let role = self.role_mut(id)?;
        let old_parent = std::mem::replace(&mut role.parent_role_id, new_parent);

        if let Some(old) = old_parent {
            if let Some(siblings) = self.children.get_mut(&old) {
                siblings.remove(&id);
                if siblings.is_empty() {
                    self.children.remove(&old);
                }
            }
        }
        if let Some(new) = new_parent {
            self.children.entry(new).or_default().insert(id);
        }

        Ok(())
    }

    pub(crate) fn set_level(&mut self, id: RoleId, level: u32) -> Result<()> {
        self.role_mut(id)?.hierarchy_level = level;
        Ok(())
    }

    /// Remove a role with its grants and assignments; the role must be childless
    pub(crate) fn remove_role(&mut self, id: RoleId) -> Result<Role> {
        self.relink(id, None)?;
        let role = self
            .roles
            .remove(&id)
            .ok_or_else(|| RbacError::role_not_found(id))?;

        self.names.remove(&role.name);
        self.children.remove(&id);
        self.grants.remove(&id);
        self.user_roles.retain(|_, roles| {
            roles.remove(&id);
            !roles.is_empty()
        });

        Ok(role)
    }

    pub(crate) fn put_grant(&mut self, grant: PermissionGrant) -> Option<PermissionGrant> {
        self.grants
            .entry(grant.role_id)
            .or_default()
            .insert(grant.key(), grant)
    }

    pub(crate) fn remove_grants(&mut self, removal: &PermissionRemoval) -> Vec<PermissionGrant> {
        let Some(role_grants) = self.grants.get_mut(&removal.role_id) else {
            return Vec::new();
        };

        let keys: Vec<GrantKey> = role_grants
            .values()
            .filter(|g| removal.matches(g))
            .map(|g| g.key())
            .collect();

        let removed = keys
            .iter()
            .filter_map(|k| role_grants.remove(k))
            .collect();

        if role_grants.is_empty() {
            self.grants.remove(&removal.role_id);
        }

        removed
    }

    pub(crate) fn assign(&mut self, user: UserId, role: RoleId) -> bool {
        self.user_roles.entry(user).or_default().insert(role)
    }

    pub(crate) fn revoke(&mut self, user: &str, role: RoleId) -> bool {
        let Some(roles) = self.user_roles.get_mut(user) else {
            return false;
        };
        let removed = roles.remove(&role);
        if roles.is_empty() {
            self.user_roles.remove(user);
        }
        removed
    }

    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

impl Default for RoleStore {
    fn default() -> Self {
        Self::new()
    }
}
