//! RBAC engine
//!
//! Serves the role administration and permission query operations over a versioned
//! snapshot of the role graph, with write-through persistence, caching, audit and metrics.
//!
//! # Architecture
//!
//! ```text
//! mutation → writer gate → clone snapshot → HierarchyMutator → RoleRepository → publish
//!                                                                                 ↓
//!                                                          [cache cleared] [audit] [metrics]
//!
//! query → Arc<RoleStore> → [cache] → PermissionResolver / EligibleParentResolver
//! ```
//!
//! Readers never wait for writers: they clone the published `Arc` and work on it. A
//! mutation that fails validation or persistence is dropped with its private copy.

pub mod audit;
pub mod cache;
pub mod metrics;

pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use cache::{CacheConfig, CacheStats, PermissionCache};
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::config::RbacConfig;
use crate::error::Result;
use crate::hierarchy::{
    flatten_tree, EligibleParentResolver, HierarchyMutator, RoleStore, RoleStoreBuilder, TreeRow,
};
use crate::permissions::{
    EffectivePermission, PermissionGrant, PermissionRemoval, PermissionResolver, RequestContext,
};
use crate::repository::{InMemoryRoleRepository, RoleRepository};
use crate::types::{NewRole, Role, RoleId, RoleUpdate, Subject};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// A role with its ancestor chain and direct children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleHierarchy {
    /// The role itself
    pub role: Role,
    /// Ancestors ordered root first, ending with the direct parent
    pub parent_roles: Vec<Role>,
    /// Direct children
    pub child_roles: Vec<Role>,
}

/// Main RBAC engine
pub struct RbacEngine {
    /// Published graph snapshot
    snapshot: RwLock<Arc<RoleStore>>,

    /// Serializes mutations
    writer: Mutex<()>,

    /// Write-through storage
    repository: Arc<dyn RoleRepository>,

    /// Effective permission cache
    cache: Option<PermissionCache>,

    /// Metrics collector
    metrics: Option<MetricsCollector>,

    /// Mutation audit trail
    audit: AuditLog,

    /// Engine configuration
    config: RbacConfig,
}

impl RbacEngine {
    /// Create an empty engine backed by an in-memory repository
    pub fn new(config: RbacConfig) -> Result<Self> {
        config.validate()?;
        let store = RoleStore::with_max_depth(config.max_depth);
        Ok(Self::from_parts(
            config,
            store,
            Arc::new(InMemoryRoleRepository::new()),
        ))
    }

    /// Load the role graph from a repository
    ///
    /// # Errors
    ///
    /// `Configuration` for an invalid config, `Storage` if the repository fails, and the
    /// `RoleStoreBuilder` errors if the stored rows are cyclic, too deep or inconsistent.
    pub async fn load(config: RbacConfig, repository: Arc<dyn RoleRepository>) -> Result<Self> {
        config.validate()?;

        let roles = repository.load_roles().await?;
        let grants = repository.load_grants().await?;
        let assignments = repository.load_assignments().await?;

        let store = RoleStoreBuilder::new()
            .max_depth(config.max_depth)
            .roles(roles)
            .grants(grants)
            .assignments(assignments)
            .build()
            .map_err(|e| {
                warn!("Refusing to load role graph: {}", e);
                e
            })?;

        info!(
            "Loaded {} roles and {} grants from repository",
            store.len(),
            store.all_grants().count()
        );

        Ok(Self::from_parts(config, store, repository))
    }

    fn from_parts(config: RbacConfig, store: RoleStore, repository: Arc<dyn RoleRepository>) -> Self {
        let cache = config.enable_cache.then(|| {
            PermissionCache::new(CacheConfig {
                capacity: config.cache_capacity,
                ttl: config.cache_ttl(),
            })
        });
        let metrics = config.enable_metrics.then(MetricsCollector::new);

        info!(
            "RbacEngine initialized with max_depth={}, delete_policy={:?}, cache={}, metrics={}",
            config.max_depth, config.delete_policy, config.enable_cache, config.enable_metrics
        );

        Self {
            snapshot: RwLock::new(Arc::new(store)),
            writer: Mutex::new(()),
            repository,
            cache,
            metrics,
            audit: AuditLog::new(config.audit_capacity),
            config,
        }
    }

    /// Current published snapshot
    pub fn snapshot(&self) -> Arc<RoleStore> {
        self.snapshot.read().clone()
    }

    /// Engine configuration
    pub fn config(&self) -> &RbacConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Role queries
    // ------------------------------------------------------------------

    /// Get a role by id
    pub fn get_role(&self, role_id: RoleId) -> Result<Role> {
        self.snapshot().require(role_id).cloned()
    }

    /// All roles ordered by id
    pub fn list_roles(&self) -> Vec<Role> {
        self.snapshot().all().cloned().collect()
    }

    /// A role with its ancestors (root first) and direct children
    pub fn get_role_hierarchy(&self, role_id: RoleId) -> Result<RoleHierarchy> {
        let store = self.snapshot();
        let role = store.require(role_id)?.clone();

        let mut parent_roles: Vec<Role> = store.ancestors(role_id).into_iter().cloned().collect();
        parent_roles.reverse();

        let child_roles = store.children(role_id).into_iter().cloned().collect();

        Ok(RoleHierarchy {
            role,
            parent_roles,
            child_roles,
        })
    }

    /// Roles the given role may be moved under
    pub fn get_eligible_parent_roles(&self, role_id: RoleId) -> Result<Vec<Role>> {
        let store = self.snapshot();
        let eligible = EligibleParentResolver::new(&store)
            .exclude_system(self.config.exclude_system_parents)
            .eligible_parents(role_id)?;
        Ok(eligible.into_iter().cloned().collect())
    }

    /// Flattened tree rows for display
    pub fn role_tree(&self) -> Vec<TreeRow> {
        flatten_tree(&self.snapshot())
    }

    /// Direct grants of a role
    pub fn list_permissions(&self, role_id: RoleId) -> Result<Vec<PermissionGrant>> {
        let store = self.snapshot();
        store.require(role_id)?;
        Ok(store.grants_for(role_id).cloned().collect())
    }

    /// Roles held by a user, ordered by id
    pub fn get_user_roles(&self, user: &str) -> Vec<Role> {
        let store = self.snapshot();
        store
            .roles_of_user(user)
            .into_iter()
            .filter_map(|id| store.get(id).cloned())
            .collect()
    }

    // ------------------------------------------------------------------
    // Permission queries
    // ------------------------------------------------------------------

    /// Effective permissions of a role or user
    pub async fn get_effective_permissions(
        &self,
        subject: &Subject,
        context: Option<&RequestContext>,
    ) -> Result<Vec<EffectivePermission>> {
        let store = self.snapshot();

        if let Some(cache) = &self.cache {
            if let Some(set) = cache.get_set(store.version(), subject, context) {
                self.note_cache(true).await;
                return Ok(set.into_vec());
            }
            self.note_cache(false).await;
        }

        let set = PermissionResolver::new(&store).effective_for_subject(subject, context)?;
        debug!("Resolved {} effective permissions for {}", set.len(), subject);

        if let Some(cache) = &self.cache {
            cache.put_set(store.version(), subject, context, set.clone());
        }

        Ok(set.into_vec())
    }

    /// Whether `subject` may perform `action` on `resource`
    pub async fn check_permission(
        &self,
        subject: &Subject,
        resource: &str,
        action: &str,
        context: Option<&RequestContext>,
    ) -> Result<bool> {
        let start = Instant::now();
        let store = self.snapshot();

        if let Some(cache) = &self.cache {
            if let Some(allowed) =
                cache.get_decision(store.version(), subject, resource, action, context)
            {
                self.note_cache(true).await;
                self.finish_check(allowed, start).await;
                return Ok(allowed);
            }
            self.note_cache(false).await;
        }

        let decisive = PermissionResolver::new(&store).decide(subject, resource, action, context)?;
        let allowed = decisive.as_ref().is_some_and(|e| e.is_granted);

        match &decisive {
            Some(entry) => debug!(
                "{} {}:{} for {} by {}:{} on role {}",
                if allowed { "Allowed" } else { "Denied" },
                resource,
                action,
                subject,
                entry.resource,
                entry.action,
                entry.source_role_id
            ),
            None => debug!("Denied {}:{} for {}: no matching grant", resource, action, subject),
        }

        if let Some(cache) = &self.cache {
            cache.put_decision(store.version(), subject, resource, action, context, allowed);
        }

        self.finish_check(allowed, start).await;
        Ok(allowed)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Create a role
    pub async fn create_role(&self, input: NewRole) -> Result<Role> {
        let (_gate, mut draft) = self.begin().await;

        let role = self.checked("create_role", self.mutator(&mut draft).create_role(input)).await?;
        self.checked(
            "create_role",
            self.repository.save_roles(std::slice::from_ref(&role)).await,
        )
        .await?;

        self.publish(draft).await;
        self.audit.record(
            AuditAction::RoleCreated,
            role.id,
            json!({ "name": role.name, "parent_role_id": role.parent_role_id }),
        );
        info!("Created role {} at level {}", role, role.hierarchy_level);

        Ok(role)
    }

    /// Update the descriptive fields of a role
    pub async fn update_role(&self, role_id: RoleId, update: RoleUpdate) -> Result<Role> {
        let (_gate, mut draft) = self.begin().await;

        let details = serde_json::to_value(&update).unwrap_or_default();
        let role = self
            .checked("update_role", self.mutator(&mut draft).update_role(role_id, update))
            .await?;
        self.checked(
            "update_role",
            self.repository.save_roles(std::slice::from_ref(&role)).await,
        )
        .await?;

        self.publish(draft).await;
        self.audit.record(AuditAction::RoleUpdated, role_id, details);
        info!("Updated role {}", role);

        Ok(role)
    }

    /// Move a role under a new parent, or to the top level with `None`
    ///
    /// Re-levels the whole subtree. Setting the current parent again is a no-op.
    pub async fn set_role_parent(&self, role_id: RoleId, parent: Option<RoleId>) -> Result<Role> {
        let (_gate, mut draft) = self.begin().await;
        let previous = draft.get(role_id).and_then(|r| r.parent_role_id);

        let moved = self
            .checked("set_role_parent", self.mutator(&mut draft).set_parent(role_id, parent))
            .await?;
        if moved.updated.is_empty() {
            debug!("Role {} already under {:?}", moved.role, parent);
            return Ok(moved.role);
        }

        self.checked("set_role_parent", self.repository.save_roles(&moved.updated).await)
            .await?;

        self.publish(draft).await;
        self.audit.record(
            AuditAction::ParentChanged,
            role_id,
            json!({
                "from": previous,
                "to": parent,
                "relevelled": moved.updated.len(),
            }),
        );
        info!(
            "Moved role {} from {:?} to {:?}; {} role(s) re-levelled",
            moved.role,
            previous,
            parent,
            moved.updated.len()
        );

        Ok(moved.role)
    }

    /// Delete a role with its grants and assignments
    ///
    /// Children are handled by the configured delete policy.
    pub async fn delete_role(&self, role_id: RoleId) -> Result<()> {
        let (_gate, mut draft) = self.begin().await;

        let deleted = self
            .checked("delete_role", self.mutator(&mut draft).delete_role(role_id))
            .await?;
        self.checked(
            "delete_role",
            self.repository.delete_role(role_id, &deleted.updated).await,
        )
        .await?;

        self.publish(draft).await;
        self.audit.record(
            AuditAction::RoleDeleted,
            role_id,
            json!({
                "name": deleted.role.name,
                "reparented": deleted.updated.iter().map(|r| r.id).collect::<Vec<_>>(),
            }),
        );
        info!("Deleted role {}", deleted.role);

        Ok(())
    }

    /// Add a grant, replacing the outcome of an existing grant with the same key
    pub async fn add_permission(&self, grant: PermissionGrant) -> Result<()> {
        let (_gate, mut draft) = self.begin().await;

        let replaced = self
            .checked("add_permission", self.mutator(&mut draft).add_grant(grant.clone()))
            .await?;
        self.checked("add_permission", self.repository.save_grant(&grant).await)
            .await?;

        self.publish(draft).await;
        self.audit.record(
            AuditAction::PermissionAdded,
            grant.role_id,
            json!({ "grant": grant, "replaced": replaced.is_some() }),
        );
        info!("Added {} to role {}", grant, grant.role_id);

        Ok(())
    }

    /// Remove grants; returns how many were removed
    ///
    /// Without a context every context of the resource/action pair is removed.
    pub async fn remove_permission(&self, removal: PermissionRemoval) -> Result<usize> {
        let (_gate, mut draft) = self.begin().await;

        let removed = self
            .checked("remove_permission", self.mutator(&mut draft).remove_grants(&removal))
            .await?;
        self.checked("remove_permission", self.repository.delete_grants(&removed).await)
            .await?;

        self.publish(draft).await;
        self.audit.record(
            AuditAction::PermissionRemoved,
            removal.role_id,
            json!({ "removed": removed }),
        );
        info!(
            "Removed {} grant(s) for {}:{} from role {}",
            removed.len(),
            removal.resource,
            removal.action,
            removal.role_id
        );

        Ok(removed.len())
    }

    /// Give a user a role; assigning a held role is a no-op
    pub async fn assign_role(&self, user: &str, role_id: RoleId) -> Result<()> {
        let (_gate, mut draft) = self.begin().await;

        let added = self
            .checked("assign_role", self.mutator(&mut draft).assign_role(user.to_string(), role_id))
            .await?;
        if !added {
            return Ok(());
        }
        self.checked("assign_role", self.repository.save_assignment(user, role_id).await)
            .await?;

        self.publish(draft).await;
        self.audit
            .record(AuditAction::RoleAssigned, role_id, json!({ "user": user }));
        info!("Assigned role {} to user '{}'", role_id, user);

        Ok(())
    }

    /// Take a role from a user
    pub async fn revoke_role(&self, user: &str, role_id: RoleId) -> Result<()> {
        let (_gate, mut draft) = self.begin().await;

        self.checked("revoke_role", self.mutator(&mut draft).revoke_role(user, role_id))
            .await?;
        self.checked("revoke_role", self.repository.delete_assignment(user, role_id).await)
            .await?;

        self.publish(draft).await;
        self.audit
            .record(AuditAction::RoleRevoked, role_id, json!({ "user": user }));
        info!("Revoked role {} from user '{}'", role_id, user);

        Ok(())
    }

    // ------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------

    /// Get engine metrics
    pub async fn metrics(&self) -> Option<EngineMetrics> {
        match &self.metrics {
            Some(metrics) => Some(metrics.get_metrics().await),
            None => None,
        }
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// The most recent audit entries, newest first
    pub fn audit_entries(&self, limit: usize) -> Vec<AuditEntry> {
        self.audit.recent(limit)
    }

    /// Audit entries about one role, oldest first
    pub fn audit_entries_for_role(&self, role_id: RoleId) -> Vec<AuditEntry> {
        self.audit.for_role(role_id)
    }

    // Private helper methods

    /// Take the writer gate and a private copy of the published snapshot
    async fn begin(&self) -> (MutexGuard<'_, ()>, RoleStore) {
        let gate = self.writer.lock().await;
        let draft = (*self.snapshot()).clone();
        (gate, draft)
    }

    fn mutator<'s>(&self, draft: &'s mut RoleStore) -> HierarchyMutator<'s> {
        HierarchyMutator::new(draft).with_delete_policy(self.config.delete_policy)
    }

    /// Pass a result through, logging and counting a failure
    async fn checked<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_rejection() {
                warn!("{} rejected: {}", operation, e);
            } else {
                warn!("{} failed: {}", operation, e);
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_rejection().await;
            }
        }
        result
    }

    /// Publish a validated and persisted draft
    async fn publish(&self, mut draft: RoleStore) {
        let version = draft.bump_version();
        *self.snapshot.write() = Arc::new(draft);

        if let Some(cache) = &self.cache {
            cache.clear();
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_mutation().await;
        }

        debug!("Published role graph version {}", version);
    }

    async fn finish_check(&self, allowed: bool, start: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_check(allowed).await;
            metrics.record_latency(start.elapsed()).await;
        }
    }

    async fn note_cache(&self, hit: bool) {
        match &self.metrics {
            Some(metrics) if hit => metrics.record_cache_hit().await,
            Some(metrics) => metrics.record_cache_miss().await,
            None => {}
        }
    }
}

impl std::fmt::Debug for RbacEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.snapshot();
        f.debug_struct("RbacEngine")
            .field("roles", &store.len())
            .field("version", &store.version())
            .field("config", &self.config)
            .finish()
    }
}
