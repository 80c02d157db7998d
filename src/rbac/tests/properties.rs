//! Property tests: random administration sequences keep the forest valid

use cretoai_rbac::{
    NewRole, PermissionGrant, RbacConfig, RbacEngine, RbacError, Role, RoleId, Subject, MAX_DEPTH,
};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

const ROLES: usize = 8;

async fn flat_roles(engine: &RbacEngine) -> Vec<RoleId> {
    let mut ids = Vec::with_capacity(ROLES);
    for i in 0..ROLES {
        let role = engine
            .create_role(NewRole::new(format!("role_{}", i), format!("Role {}", i)))
            .await
            .unwrap();
        ids.push(role.id);
    }
    ids
}

fn assert_forest(roles: &[Role]) {
    let by_id: HashMap<RoleId, &Role> = roles.iter().map(|r| (r.id, r)).collect();

    for role in roles {
        match role.parent_role_id {
            None => assert_eq!(role.hierarchy_level, 0),
            Some(parent) => {
                assert_eq!(role.hierarchy_level, by_id[&parent].hierarchy_level + 1)
            }
        }
        assert!(role.hierarchy_level <= MAX_DEPTH);

        let mut seen = HashSet::from([role.id]);
        let mut current = role.parent_role_id;
        while let Some(id) = current {
            assert!(seen.insert(id), "{} is its own ancestor", role);
            current = by_id[&id].parent_role_id;
        }
    }
}

proptest! {
    #[test]
    fn test_random_reparents_keep_forest_valid(
        moves in prop::collection::vec((0..ROLES, prop::option::of(0..ROLES)), 1..40)
    ) {
        tokio_test::block_on(async {
            let engine = RbacEngine::new(RbacConfig::default()).unwrap();
            let ids = flat_roles(&engine).await;

            for (role, parent) in moves {
                let before = engine.list_roles();
                let role_id = ids[role];
                let parent_id = parent.map(|p| ids[p]);

                match engine.set_role_parent(role_id, parent_id).await {
                    Ok(moved) => assert_eq!(moved.parent_role_id, parent_id),
                    Err(RbacError::CircularDependency(_)) => {
                        assert_eq!(engine.list_roles(), before);
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }

                assert_forest(&engine.list_roles());
            }
        });
    }

    #[test]
    fn test_eligible_parents_are_exactly_the_accepted_moves(
        moves in prop::collection::vec((0..ROLES, 0..ROLES), 0..20),
        target in 0..ROLES,
    ) {
        tokio_test::block_on(async {
            let engine = RbacEngine::new(RbacConfig::default()).unwrap();
            let ids = flat_roles(&engine).await;

            for (role, parent) in moves {
                let _ = engine.set_role_parent(ids[role], Some(ids[parent])).await;
            }

            let role_id = ids[target];
            let eligible: HashSet<RoleId> = engine
                .get_eligible_parent_roles(role_id)
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect();

            let descendants: HashSet<RoleId> =
                engine.snapshot().descendants(role_id).into_iter().collect();
            for candidate in &ids {
                let expected = *candidate != role_id && !descendants.contains(candidate);
                assert_eq!(eligible.contains(candidate), expected);
            }

            // Moving a role never changes its own subtree, so every target stays eligible
            for candidate in &eligible {
                let moved = engine.set_role_parent(role_id, Some(*candidate)).await.unwrap();
                assert_eq!(moved.parent_role_id, Some(*candidate));
            }
            for descendant in &descendants {
                let err = engine
                    .set_role_parent(role_id, Some(*descendant))
                    .await
                    .unwrap_err();
                assert!(matches!(err, RbacError::CircularDependency(_)));
            }
            assert_forest(&engine.list_roles());
        });
    }

    #[test]
    fn test_effective_permissions_contain_direct_grants(
        grants in prop::collection::vec(
            (0..3usize, "[a-c]", "(read|write|\\*)", any::<bool>()),
            1..20,
        )
    ) {
        tokio_test::block_on(async {
            let engine = RbacEngine::new(RbacConfig::default()).unwrap();
            let mut chain: Vec<RoleId> = Vec::new();
            for i in 0..3 {
                let mut input = NewRole::new(format!("tier_{}", i), format!("Tier {}", i));
                if let Some(parent) = chain.last() {
                    input = input.with_parent(*parent);
                }
                chain.push(engine.create_role(input).await.unwrap().id);
            }

            for (tier, resource, action, granted) in grants {
                let grant = if granted {
                    PermissionGrant::allow(chain[tier], resource, action)
                } else {
                    PermissionGrant::deny(chain[tier], resource, action)
                };
                engine.add_permission(grant).await.unwrap();
            }

            for role_id in &chain {
                let effective = engine
                    .get_effective_permissions(&Subject::Role(*role_id), None)
                    .await
                    .unwrap();
                for grant in engine.list_permissions(*role_id).unwrap() {
                    let entry = effective
                        .iter()
                        .find(|e| e.resource == grant.resource && e.action == grant.action)
                        .unwrap();
                    assert_eq!(entry.is_granted, grant.is_granted);
                    assert_eq!(entry.source_role_id, *role_id);
                }
            }
        });
    }
}
