//! # CretoAI RBAC Engine
//!
//! Hierarchical role-based access control with inherited, context-scoped grants.
//!
//! ## Features
//!
//! - **Role forest** with derived levels, cycle and depth checks on every move
//! - **Inheritance** where the nearest grant wins and the most specific grant decides
//! - **Context scopes** (`project=apollo`, `project=*`) on individual grants
//! - **Copy-on-write snapshots** so checks never wait on administration
//! - **Write-through persistence** behind the async `RoleRepository` trait
//! - **Version-keyed caching**, metrics and an audit trail
//!
//! ## Example
//!
//! ```rust
//! use cretoai_rbac::{NewRole, PermissionGrant, RbacConfig, RbacEngine, Subject};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = RbacEngine::new(RbacConfig::default())?;
//!
//!     let org_admin = engine.create_role(NewRole::new("org_admin", "Org Admin")).await?;
//!     let team_lead = engine
//!         .create_role(NewRole::new("team_lead", "Team Lead").with_parent(org_admin.id))
//!         .await?;
//!
//!     engine.add_permission(PermissionGrant::allow(org_admin.id, "users", "*")).await?;
//!     engine.add_permission(PermissionGrant::deny(team_lead.id, "users", "read")).await?;
//!
//!     let lead = Subject::Role(team_lead.id);
//!     assert!(engine.check_permission(&lead, "users", "create", None).await?);
//!     assert!(!engine.check_permission(&lead, "users", "read", None).await?);
//!
//!     engine.assign_role("alice", team_lead.id).await?;
//!     let alice = Subject::User("alice".to_string());
//!     assert!(engine.check_permission(&alice, "users", "delete", None).await?);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod permissions;
pub mod repository;
pub mod telemetry;
pub mod tenant;
pub mod types;

// Re-export commonly used types
pub use config::{DeletePolicy, RbacConfig};
pub use engine::{RbacEngine, RoleHierarchy};
pub use error::{RbacError, Result};
pub use hierarchy::TreeRow;
pub use permissions::{
    EffectivePermission, EffectivePermissionSet, PermissionGrant, PermissionRemoval,
    PermissionSource, RequestContext,
};
pub use repository::{InMemoryRoleRepository, RoleRepository};
pub use tenant::TenantRegistry;
pub use types::{NewRole, Role, RoleId, RoleUpdate, Subject, UserId, MAX_DEPTH};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
