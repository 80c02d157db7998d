//! Role hierarchy module
//!
//! Holds the role forest and every structural operation on it.
//!
//! # Features
//!
//! - **Id-indexed arena**: parents stored as ids, iterative ancestor walks
//! - **Level derivation**: `hierarchy_level` always computed from parent links
//! - **Cycle prevention**: upward walk with a visited set before any reparent
//! - **Depth limit**: no role deeper than the configured maximum, checked for whole subtrees
//! - **Load validation**: Kahn-style rebuild from persisted rows with cycle path reporting
//!
//! # Example
//!
//! ```rust
//! use cretoai_rbac::hierarchy::{HierarchyMutator, RoleStore};
//! use cretoai_rbac::{NewRole, RbacError};
//!
//! let mut store = RoleStore::new();
//! let mut mutator = HierarchyMutator::new(&mut store);
//!
//! let admin = mutator.create_role(NewRole::new("admin", "Administrator")).unwrap();
//! let lead = mutator
//!     .create_role(NewRole::new("team_lead", "Team Lead").with_parent(admin.id))
//!     .unwrap();
//!
//! // admin cannot move under its own child
//! let err = mutator.set_parent(admin.id, Some(lead.id)).unwrap_err();
//! assert!(matches!(err, RbacError::CircularDependency(_)));
//!
//! assert_eq!(store.get(lead.id).unwrap().hierarchy_level, 1);
//! ```

pub mod eligible;
pub mod graph;
pub mod mutator;
pub mod store;
pub mod tree;
pub mod validator;


pub use eligible::EligibleParentResolver;
pub use graph::RoleStoreBuilder;
pub use mutator::{Deleted, HierarchyMutator, Reparented};
pub use store::RoleStore;
pub use tree::{flatten_tree, TreeRow};
pub use validator::CycleValidator;
