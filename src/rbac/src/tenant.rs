//! Per-tenant engines
//!
//! Each tenant owns an independent `RbacEngine`, so its writer gate and snapshot never
//! contend with another tenant's.

use crate::config::RbacConfig;
use crate::engine::RbacEngine;
use crate::error::Result;
use crate::repository::RoleRepository;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Registry of engines keyed by tenant id
pub struct TenantRegistry {
    engines: DashMap<String, Arc<RbacEngine>>,
    config: RbacConfig,
}

impl TenantRegistry {
    /// Create a registry; new tenants get engines built from `config`
    pub fn new(config: RbacConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engines: DashMap::new(),
            config,
        })
    }

    /// Engine for a tenant, creating an empty in-memory one on first use
    pub fn get_or_create(&self, tenant: &str) -> Result<Arc<RbacEngine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.clone());
        }

        let engine = self
            .engines
            .entry(tenant.to_string())
            .or_try_insert_with(|| {
                info!("Creating RBAC engine for tenant '{}'", tenant);
                RbacEngine::new(self.config.clone()).map(Arc::new)
            })?
            .clone();

        Ok(engine)
    }

    /// Load a tenant's engine from a repository, replacing any existing one
    pub async fn register(
        &self,
        tenant: &str,
        repository: Arc<dyn RoleRepository>,
    ) -> Result<Arc<RbacEngine>> {
        let engine = Arc::new(RbacEngine::load(self.config.clone(), repository).await?);
        self.insert(tenant, engine.clone());
        Ok(engine)
    }

    /// Install an engine for a tenant, returning the one it replaced
    pub fn insert(&self, tenant: &str, engine: Arc<RbacEngine>) -> Option<Arc<RbacEngine>> {
        info!("Registered RBAC engine for tenant '{}'", tenant);
        self.engines.insert(tenant.to_string(), engine)
    }

    /// Engine for a tenant, if registered
    pub fn get(&self, tenant: &str) -> Option<Arc<RbacEngine>> {
        self.engines.get(tenant).map(|e| e.clone())
    }

    /// Drop a tenant's engine
    pub fn remove(&self, tenant: &str) -> Option<Arc<RbacEngine>> {
        self.engines.remove(tenant).map(|(_, engine)| engine)
    }

    /// Registered tenant ids, sorted
    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        tenants.sort();
        tenants
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
