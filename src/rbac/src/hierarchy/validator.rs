//! Cycle and depth predicates for reparenting
//!
//! Both checks are pure: they never fail, callers decide what a `true` means.

use super::store::RoleStore;
use crate::types::RoleId;
use std::collections::HashSet;

/// Structural predicates over a role store
#[derive(Debug, Clone, Copy)]
pub struct CycleValidator<'a> {
    store: &'a RoleStore,
}

impl<'a> CycleValidator<'a> {
    /// Create a validator over a store snapshot
    pub fn new(store: &'a RoleStore) -> Self {
        Self { store }
    }

    /// Whether making `child` a child of `proposed_parent` would create a cycle
    ///
    /// Walks upward from `proposed_parent`; meeting `child` (including
    /// `proposed_parent == child`) means `child` would become its own ancestor.
    /// O(depth); the visited set guarantees termination over corrupted links.
    pub fn would_create_cycle(&self, child: RoleId, proposed_parent: RoleId) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(proposed_parent);

        while let Some(id) = current {
            if id == child {
                return true;
            }
            if !visited.insert(id) {
                // Pre-existing loop that does not pass through `child`
                return false;
            }
            current = self.store.get(id).and_then(|r| r.parent_role_id);
        }

        false
    }

    /// Whether a child of `proposed_parent` would sit deeper than the maximum level
    ///
    /// Unknown parents are reported as exceeding so they are never offered as targets.
    pub fn exceeds_depth(&self, proposed_parent: RoleId) -> bool {
        self.store
            .get(proposed_parent)
            .map_or(true, |p| p.hierarchy_level + 1 > self.store.max_depth())
    }

    /// Whether moving `role` and its whole subtree under `proposed_parent` (or to the top
    /// level when `None`) would push any descendant past the maximum level
    pub fn subtree_exceeds_depth(&self, role: RoleId, proposed_parent: Option<RoleId>) -> bool {
        let new_level = match proposed_parent {
            None => 0,
            Some(parent) => match self.store.get(parent) {
                Some(p) => p.hierarchy_level + 1,
                None => return true,
            },
        };

        new_level + self.store.subtree_height(role) > self.store.max_depth()
    }
}
