//! Role storage seam
//!
//! The engine writes through a `RoleRepository` before publishing a mutation and rebuilds
//! its graph from one at startup. Rows mirror the persisted tables: `roles` keyed by id,
//! `role_permissions` keyed by role and grant tuple, `user_roles` keyed by user and role.

use crate::error::Result;
use crate::permissions::{GrantKey, PermissionGrant};
use crate::types::{Role, RoleId, UserId};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Role storage trait
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// All role rows
    async fn load_roles(&self) -> Result<Vec<Role>>;

    /// All grant rows
    async fn load_grants(&self) -> Result<Vec<PermissionGrant>>;

    /// All user assignments
    async fn load_assignments(&self) -> Result<Vec<(UserId, RoleId)>>;

    /// Insert or replace role rows in one write
    async fn save_roles(&self, roles: &[Role]) -> Result<()>;

    /// Delete a role with its grants and assignments, and save the re-linked children,
    /// in one write
    async fn delete_role(&self, role_id: RoleId, reparented: &[Role]) -> Result<()>;

    /// Insert or replace a grant row
    async fn save_grant(&self, grant: &PermissionGrant) -> Result<()>;

    /// Delete grant rows
    async fn delete_grants(&self, grants: &[PermissionGrant]) -> Result<()>;

    /// Insert an assignment
    async fn save_assignment(&self, user: &str, role_id: RoleId) -> Result<()>;

    /// Delete an assignment
    async fn delete_assignment(&self, user: &str, role_id: RoleId) -> Result<()>;
}

#[derive(Debug, Default)]
struct Tables {
    roles: BTreeMap<RoleId, Role>,
    grants: BTreeMap<(RoleId, GrantKey), PermissionGrant>,
    user_roles: BTreeSet<(UserId, RoleId)>,
}

/// In-memory repository
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoleRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRoleRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository pre-populated with rows
    ///
    /// Rows are stored as given; validation happens when an engine loads them.
    pub fn with_rows(
        roles: impl IntoIterator<Item = Role>,
        grants: impl IntoIterator<Item = PermissionGrant>,
        assignments: impl IntoIterator<Item = (UserId, RoleId)>,
    ) -> Self {
        let tables = Tables {
            roles: roles.into_iter().map(|r| (r.id, r)).collect(),
            grants: grants
                .into_iter()
                .map(|g| ((g.role_id, g.key()), g))
                .collect(),
            user_roles: assignments.into_iter().collect(),
        };

        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    /// Number of stored role rows
    pub async fn role_count(&self) -> usize {
        self.tables.read().await.roles.len()
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn load_roles(&self) -> Result<Vec<Role>> {
        let tables = self.tables.read().await;
        Ok(tables.roles.values().cloned().collect())
    }

    async fn load_grants(&self) -> Result<Vec<PermissionGrant>> {
        let tables = self.tables.read().await;
        Ok(tables.grants.values().cloned().collect())
    }

    async fn load_assignments(&self) -> Result<Vec<(UserId, RoleId)>> {
        let tables = self.tables.read().await;
        Ok(tables.user_roles.iter().cloned().collect())
    }

    async fn save_roles(&self, roles: &[Role]) -> Result<()> {
        let mut tables = self.tables.write().await;
        for role in roles {
            tables.roles.insert(role.id, role.clone());
        }
        Ok(())
    }

    async fn delete_role(&self, role_id: RoleId, reparented: &[Role]) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.roles.remove(&role_id);
        tables.grants.retain(|(owner, _), _| *owner != role_id);
        tables.user_roles.retain(|(_, held)| *held != role_id);
        for role in reparented {
            tables.roles.insert(role.id, role.clone());
        }
        Ok(())
    }

    async fn save_grant(&self, grant: &PermissionGrant) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .grants
            .insert((grant.role_id, grant.key()), grant.clone());
        Ok(())
    }

    async fn delete_grants(&self, grants: &[PermissionGrant]) -> Result<()> {
        let mut tables = self.tables.write().await;
        for grant in grants {
            tables.grants.remove(&(grant.role_id, grant.key()));
        }
        Ok(())
    }

    async fn save_assignment(&self, user: &str, role_id: RoleId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.user_roles.insert((user.to_string(), role_id));
        Ok(())
    }

    async fn delete_assignment(&self, user: &str, role_id: RoleId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.user_roles.remove(&(user.to_string(), role_id));
        Ok(())
    }
}
