//! Legal reparent targets for a role

use super::store::RoleStore;
use super::validator::CycleValidator;
use crate::error::Result;
use crate::types::{Role, RoleId};
use std::collections::HashSet;

/// Computes which roles may become the parent of a given role
#[derive(Debug, Clone, Copy)]
pub struct EligibleParentResolver<'a> {
    store: &'a RoleStore,
    exclude_system: bool,
}

impl<'a> EligibleParentResolver<'a> {
    /// Create a resolver; system roles are excluded by default
    pub fn new(store: &'a RoleStore) -> Self {
        Self {
            store,
            exclude_system: true,
        }
    }

    /// Whether system roles may be offered as parents
    pub fn exclude_system(mut self, exclude: bool) -> Self {
        self.exclude_system = exclude;
        self
    }

    /// Every role `role_id` could be attached under, ordered by hierarchy level then name
    ///
    /// Excludes the role itself, its descendants (one downward traversal), parents already
    /// at the deepest level, and parents under which the role's subtree would not fit.
    /// System roles cannot be reparented, so they have no eligible parents.
    pub fn eligible_parents(&self, role_id: RoleId) -> Result<Vec<&'a Role>> {
        if self.store.require(role_id)?.is_system {
            return Ok(Vec::new());
        }

        let descendants: HashSet<RoleId> = self.store.descendants(role_id).into_iter().collect();
        let validator = CycleValidator::new(self.store);
        let height = self.store.subtree_height(role_id);
        let max_depth = self.store.max_depth();

        let mut eligible: Vec<&'a Role> = self
            .store
            .all()
            .filter(|r| r.id != role_id)
            .filter(|r| !descendants.contains(&r.id))
            .filter(|r| !(self.exclude_system && r.is_system))
            .filter(|r| !validator.exceeds_depth(r.id))
            .filter(|r| r.hierarchy_level + 1 + height <= max_depth)
            .collect();

        eligible.sort_by(|a, b| {
            a.hierarchy_level
                .cmp(&b.hierarchy_level)
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(eligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RbacError;
    use crate::hierarchy::HierarchyMutator;
    use crate::types::NewRole;

    fn names(roles: &[&Role]) -> Vec<String> {
        roles.iter().map(|r| r.name.clone()).collect()
    }

    #[test]
    fn test_excludes_self_and_descendants() {
        let mut store = RoleStore::new();
        let mut m = HierarchyMutator::new(&mut store);
        let admin = m.create_role(NewRole::new("admin", "Admin")).unwrap().id;
        let manager = m.create_role(NewRole::new("manager", "Manager").with_parent(admin)).unwrap().id;
        m.create_role(NewRole::new("engineer", "Engineer").with_parent(manager)).unwrap();
        m.create_role(NewRole::new("auditor", "Auditor")).unwrap();

        let resolver = EligibleParentResolver::new(&store);
        let eligible = resolver.eligible_parents(manager).unwrap();
        assert_eq!(names(&eligible), vec!["admin", "auditor"]);

        let eligible = resolver.eligible_parents(admin).unwrap();
        assert_eq!(names(&eligible), vec!["auditor"]);
    }

    #[test]
    fn test_system_role_policy_knob() {
        let mut store = RoleStore::new();
        let mut m = HierarchyMutator::new(&mut store);
        m.create_role(NewRole::new("super_admin", "Super Admin").system()).unwrap();
        let custom = m.create_role(NewRole::new("custom", "Custom")).unwrap().id;

        let excluded = EligibleParentResolver::new(&store).eligible_parents(custom).unwrap();
        assert!(excluded.is_empty());

        let included = EligibleParentResolver::new(&store)
            .exclude_system(false)
            .eligible_parents(custom)
            .unwrap();
        assert_eq!(names(&included), vec!["super_admin"]);
    }

    #[test]
    fn test_system_role_has_no_eligible_parents() {
        let mut store = RoleStore::new();
        let mut m = HierarchyMutator::new(&mut store);
        let platform = m.create_role(NewRole::new("platform", "Platform").system()).unwrap().id;
        let custom = m.create_role(NewRole::new("custom", "Custom")).unwrap().id;

        let eligible = EligibleParentResolver::new(&store)
            .exclude_system(false)
            .eligible_parents(platform)
            .unwrap();
        assert!(eligible.is_empty());

        let err = HierarchyMutator::new(&mut store)
            .set_parent(platform, Some(custom))
            .unwrap_err();
        assert!(matches!(err, RbacError::ProtectedRole(_)));
    }

    #[test]
    fn test_depth_limited_parents_excluded() {
        let mut store = RoleStore::with_max_depth(2);
        let mut m = HierarchyMutator::new(&mut store);
        let l0 = m.create_role(NewRole::new("l0", "L0")).unwrap().id;
        let l1 = m.create_role(NewRole::new("l1", "L1").with_parent(l0)).unwrap().id;
        m.create_role(NewRole::new("l2", "L2").with_parent(l1)).unwrap();
        let loner = m.create_role(NewRole::new("loner", "Loner")).unwrap().id;
        let pair = m.create_role(NewRole::new("pair", "Pair")).unwrap().id;
        m.create_role(NewRole::new("pair_child", "Pair Child").with_parent(pair)).unwrap();

        // l2 is at the deepest level
        let eligible = EligibleParentResolver::new(&store).eligible_parents(loner).unwrap();
        assert_eq!(names(&eligible), vec!["l0", "pair", "l1", "pair_child"]);

        // pair has a child, so it only fits under roots
        let eligible = EligibleParentResolver::new(&store).eligible_parents(pair).unwrap();
        assert_eq!(names(&eligible), vec!["l0", "loner"]);
    }

    #[test]
    fn test_unknown_role() {
        let store = RoleStore::new();
        assert!(matches!(
            EligibleParentResolver::new(&store).eligible_parents(1),
            Err(RbacError::NotFound(_))
        ));
    }
}
