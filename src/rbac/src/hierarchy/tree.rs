//! Flattened tree view of the role forest

use super::store::RoleStore;
use crate::types::{Role, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One row of a depth-first, name-ordered tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRow {
    /// Role id
    pub role_id: RoleId,
    /// Unique name
    pub name: String,
    /// Human readable name
    pub display_name: String,
    /// Parent role id
    pub parent_role_id: Option<RoleId>,
    /// Indentation depth (equals the hierarchy level)
    pub depth: u32,
    /// Number of direct children
    pub child_count: usize,
    /// System role flag
    pub is_system: bool,
    /// Active flag
    pub is_active: bool,
}

impl TreeRow {
    fn from_role(role: &Role, depth: u32, child_count: usize) -> Self {
        Self {
            role_id: role.id,
            name: role.name.clone(),
            display_name: role.display_name.clone(),
            parent_role_id: role.parent_role_id,
            depth,
            child_count,
            is_system: role.is_system,
            is_active: role.is_active,
        }
    }

    /// Whether the row has children to expand
    pub fn has_children(&self) -> bool {
        self.child_count > 0
    }

    /// Display name prefixed with `indent` repeated `depth` times
    pub fn indented(&self, indent: &str) -> String {
        format!("{}{}", indent.repeat(self.depth as usize), self.display_name)
    }
}

/// Project the forest into rows: roots by name, each followed by its subtree
///
/// Siblings are ordered by name. Iterative, and a role is emitted at most once.
pub fn flatten_tree(store: &RoleStore) -> Vec<TreeRow> {
    let mut rows = Vec::with_capacity(store.len());
    let mut seen = HashSet::with_capacity(store.len());

    let mut roots: Vec<&Role> = store.roots().collect();
    roots.sort_by(|a, b| b.name.cmp(&a.name));
    let mut stack: Vec<(&Role, u32)> = roots.into_iter().map(|r| (r, 0)).collect();

    while let Some((role, depth)) = stack.pop() {
        if !seen.insert(role.id) {
            continue;
        }

        let mut children = store.children(role.id);
        rows.push(TreeRow::from_role(role, depth, children.len()));

        // Reverse name order so the smallest name is popped first
        children.sort_by(|a, b| b.name.cmp(&a.name));
        stack.extend(children.into_iter().map(|c| (c, depth + 1)));
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyMutator;
    use crate::types::NewRole;

    #[test]
    fn test_flatten_orders_depth_first_by_name() {
        let mut store = RoleStore::new();
        let mut m = HierarchyMutator::new(&mut store);
        let viewer = m.create_role(NewRole::new("viewer", "Viewer")).unwrap().id;
        let admin = m.create_role(NewRole::new("admin", "Admin")).unwrap().id;
        let support = m.create_role(NewRole::new("support", "Support").with_parent(admin)).unwrap().id;
        m.create_role(NewRole::new("manager", "Manager").with_parent(admin)).unwrap();
        m.create_role(NewRole::new("tier_one", "Tier One").with_parent(support)).unwrap();
        m.create_role(NewRole::new("guest", "Guest").with_parent(viewer)).unwrap();

        let rows = flatten_tree(&store);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["admin", "manager", "support", "tier_one", "viewer", "guest"]
        );

        let depths: Vec<u32> = rows.iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 2, 0, 1]);

        assert_eq!(rows[0].child_count, 2);
        assert!(rows[2].has_children());
        assert!(!rows[3].has_children());
        assert_eq!(rows[3].indented("  "), "    Tier One");
    }

    #[test]
    fn test_depth_matches_hierarchy_level() {
        let mut store = RoleStore::new();
        let mut m = HierarchyMutator::new(&mut store);
        let mut parent = None;
        for i in 0..5 {
            let mut input = NewRole::new(format!("level_{}", i), format!("Level {}", i));
            input.parent_role_id = parent;
            parent = Some(m.create_role(input).unwrap().id);
        }

        for row in flatten_tree(&store) {
            assert_eq!(row.depth, store.get(row.role_id).unwrap().hierarchy_level);
        }
    }

    #[test]
    fn test_empty_store() {
        assert!(flatten_tree(&RoleStore::new()).is_empty());
    }
}
