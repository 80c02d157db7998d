//! Permission grants and effective permission resolution
//!
//! Grants attach `(resource, action)` pairs to roles, optionally scoped to a context such as
//! `project=apollo`, as an allow or an explicit deny. Resolution walks a role's ancestor
//! chain nearest first.
//!
//! # Example
//!
//! ```rust
//! use cretoai_rbac::hierarchy::{HierarchyMutator, RoleStore};
//! use cretoai_rbac::permissions::{PermissionGrant, PermissionResolver};
//! use cretoai_rbac::{NewRole, Subject};
//!
//! let mut store = RoleStore::new();
//! let mut mutator = HierarchyMutator::new(&mut store);
//! let org_admin = mutator.create_role(NewRole::new("org_admin", "Org Admin")).unwrap();
//! let team_lead = mutator
//!     .create_role(NewRole::new("team_lead", "Team Lead").with_parent(org_admin.id))
//!     .unwrap();
//!
//! mutator.add_grant(PermissionGrant::allow(org_admin.id, "users", "*")).unwrap();
//! mutator.add_grant(PermissionGrant::deny(team_lead.id, "users", "read")).unwrap();
//!
//! let resolver = PermissionResolver::new(&store);
//! let lead = Subject::Role(team_lead.id);
//! assert!(!resolver.check_permission(&lead, "users", "read", None).unwrap());
//! assert!(resolver.check_permission(&lead, "users", "delete", None).unwrap());
//! ```

pub mod context;
pub mod resolver;
pub mod types;


pub use context::{ContextMatcher, ContextQuery, Scope};
pub use resolver::PermissionResolver;
pub use types::{
    EffectivePermission, EffectivePermissionSet, GrantKey, PermissionGrant, PermissionRemoval,
    PermissionSource, RequestContext, WILDCARD,
};
