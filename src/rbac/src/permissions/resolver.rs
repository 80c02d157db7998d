//! Effective permission resolution over the inheritance chain
//!
//! A role's chain is the role itself followed by its ancestors, nearest first. Grants are
//! collected along the chain and resolved nearest-wins:
//!
//! - a grant is dropped when a strictly nearer role holds a grant that covers it (same or
//!   wildcard resource and action, and in listing mode a covering context scope)
//! - grants at the same distance for the same tuple resolve deny-wins
//!
//! User subjects resolve each held active role separately and union the results. Where an
//! allow from one role overlaps a deny from another, and the denying role's own set denies
//! the overlap, the overlap enters the union as a deny. Checks look up that union, so a
//! user's check always agrees with their listing.

use super::context::{ContextMatcher, ContextQuery};
use super::types::{
    pattern_matches, EffectivePermission, EffectivePermissionSet, PermissionGrant,
    PermissionSource, RequestContext,
};
use crate::error::{RbacError, Result};
use crate::hierarchy::RoleStore;
use crate::types::{RoleId, Subject};
use std::collections::BTreeMap;
use tracing::debug;

/// Tuple identity used for same-distance conflicts
type TupleKey<'g> = (&'g str, &'g str, Option<&'g str>, Option<&'g str>);

/// Read-only resolver over a store snapshot
#[derive(Debug, Clone, Copy)]
pub struct PermissionResolver<'a> {
    store: &'a RoleStore,
}

impl<'a> PermissionResolver<'a> {
    /// Create a resolver over a store snapshot
    pub fn new(store: &'a RoleStore) -> Self {
        Self { store }
    }

    /// Effective permissions of a role
    ///
    /// Without a context every grant participates and keeps its own scope. With a context
    /// only grants applying to it participate.
    ///
    /// # Errors
    ///
    /// `NotFound` if the role does not exist
    pub fn effective_permissions(
        &self,
        role_id: RoleId,
        context: Option<&RequestContext>,
    ) -> Result<EffectivePermissionSet> {
        self.resolve_role(role_id, ContextQuery::listing(context))
    }

    /// Effective permissions of a role or user
    ///
    /// A user's set is the deny-wins union over the active roles they hold. A user without
    /// assignments has an empty set.
    pub fn effective_for_subject(
        &self,
        subject: &Subject,
        context: Option<&RequestContext>,
    ) -> Result<EffectivePermissionSet> {
        let query = ContextQuery::listing(context);

        match subject {
            Subject::Role(role_id) => self.resolve_role(*role_id, query),
            Subject::User(user) => self.resolve_user(user, query, |_| true),
        }
    }

    /// Whether `subject` may perform `action` on `resource`
    ///
    /// Without a context only global grants apply. No matching entry means deny.
    ///
    /// # Errors
    ///
    /// `ValidationError` for an empty resource or action, `NotFound` for an unknown role
    pub fn check_permission(
        &self,
        subject: &Subject,
        resource: &str,
        action: &str,
        context: Option<&RequestContext>,
    ) -> Result<bool> {
        Ok(self
            .decide(subject, resource, action, context)?
            .is_some_and(|entry| entry.is_granted))
    }

    /// The entry that decides a check, if any
    ///
    /// The most specific matching entry of the subject's set. For a user only entries
    /// matching the request enter the union; overlaps of non-matching entries never match
    /// it either.
    pub fn decide(
        &self,
        subject: &Subject,
        resource: &str,
        action: &str,
        context: Option<&RequestContext>,
    ) -> Result<Option<EffectivePermission>> {
        if resource.trim().is_empty() || action.trim().is_empty() {
            return Err(RbacError::ValidationError(
                "Permission check requires a resource and an action".to_string(),
            ));
        }

        let query = ContextQuery::request(context);

        match subject {
            Subject::Role(role_id) => {
                let set = self.resolve_role(*role_id, query)?;
                Ok(set.lookup(resource, action).cloned())
            }
            Subject::User(user) => {
                let set = self.resolve_user(user, query, |entry| entry.matches(resource, action))?;
                let decisive = set.lookup(resource, action).cloned();

                if let Some(entry) = decisive.as_ref().filter(|e| !e.is_granted) {
                    debug!(
                        "User '{}' denied {}:{} by role {}",
                        user, resource, action, entry.source_role_id
                    );
                }

                Ok(decisive)
            }
        }
    }

    /// Deny-wins union over the active roles a user holds, keeping entries that pass `keep`
    fn resolve_user(
        &self,
        user: &str,
        query: ContextQuery<'_>,
        keep: impl Fn(&EffectivePermission) -> bool,
    ) -> Result<EffectivePermissionSet> {
        let sets = self
            .active_roles_of(user)
            .into_iter()
            .map(|role_id| self.resolve_role(role_id, query))
            .collect::<Result<Vec<_>>>()?;

        let mut merged = EffectivePermissionSet::default();

        for (index, set) in sets.iter().enumerate() {
            let mut entries: Vec<EffectivePermission> =
                set.iter().filter(|&e| keep(e)).cloned().collect();

            for (other, denying) in sets.iter().enumerate() {
                if other == index {
                    continue;
                }
                for allow in set.iter().filter(|&e| e.is_granted && keep(e)) {
                    for deny in denying.iter().filter(|&e| !e.is_granted && keep(e)) {
                        let Some(shared) = overlap(deny, allow) else {
                            continue;
                        };
                        if denying
                            .lookup(&shared.resource, &shared.action)
                            .is_some_and(|e| !e.is_granted)
                        {
                            entries.push(shared);
                        }
                    }
                }
            }

            merged = merged.merge_deny_wins(EffectivePermissionSet::new(entries));
        }

        Ok(merged)
    }

    /// Resolve one role's chain under a query
    pub(crate) fn resolve_role(
        &self,
        role_id: RoleId,
        query: ContextQuery<'_>,
    ) -> Result<EffectivePermissionSet> {
        let role = self.store.require(role_id)?;

        let mut chain = Vec::with_capacity(role.hierarchy_level as usize + 1);
        chain.push(role);
        chain.extend(self.store.ancestors(role_id));

        let mut winners: Vec<(&PermissionGrant, usize)> = Vec::new();

        for (distance, chain_role) in chain.iter().enumerate() {
            let mut level: BTreeMap<TupleKey<'_>, &PermissionGrant> = BTreeMap::new();

            for grant in self.store.grants_for(chain_role.id) {
                if !ContextMatcher::applies(grant, query) {
                    continue;
                }
                if winners.iter().any(|(nearer, _)| shadows(nearer, grant, query)) {
                    continue;
                }

                level
                    .entry(tuple_key(grant, query))
                    .and_modify(|existing| {
                        if existing.is_granted && !grant.is_granted {
                            *existing = grant;
                        }
                    })
                    .or_insert(grant);
            }

            winners.extend(level.into_values().map(|g| (g, distance)));
        }

        let entries = winners
            .into_iter()
            .map(|(grant, distance)| {
                let source = if distance == 0 {
                    PermissionSource::Direct
                } else {
                    PermissionSource::Inherited
                };
                EffectivePermission::from_grant(grant, source)
            })
            .collect();

        Ok(EffectivePermissionSet::new(entries))
    }

    /// Active roles held by a user
    fn active_roles_of(&self, user: &str) -> Vec<RoleId> {
        self.store
            .roles_of_user(user)
            .into_iter()
            .filter(|id| self.store.get(*id).is_some_and(|r| r.is_active))
            .collect()
    }
}

/// Whether a grant from a nearer role hides `farther`
fn shadows(nearer: &PermissionGrant, farther: &PermissionGrant, query: ContextQuery<'_>) -> bool {
    pattern_matches(&nearer.resource, &farther.resource)
        && pattern_matches(&nearer.action, &farther.action)
        && (query.is_concrete() || ContextMatcher::covers(nearer, farther))
}

/// The deny entry for the requests both `deny` and `allow` answer, if they share any
fn overlap(deny: &EffectivePermission, allow: &EffectivePermission) -> Option<EffectivePermission> {
    let resource = narrower(&deny.resource, &allow.resource)?;
    let action = narrower(&deny.action, &allow.action)?;

    let (context_type, context_value) = if ContextMatcher::scope_covers(deny.scope(), allow.scope()) {
        allow.scope()
    } else if ContextMatcher::scope_covers(allow.scope(), deny.scope()) {
        deny.scope()
    } else {
        return None;
    };

    Some(EffectivePermission {
        resource,
        action,
        context_type: context_type.map(str::to_string),
        context_value: context_value.map(str::to_string),
        is_granted: false,
        source: deny.source,
        source_role_id: deny.source_role_id,
    })
}

/// The narrower of two patterns, if one includes the other
fn narrower(a: &str, b: &str) -> Option<String> {
    if pattern_matches(a, b) {
        Some(b.to_string())
    } else if pattern_matches(b, a) {
        Some(a.to_string())
    } else {
        None
    }
}

/// Within a concrete request every surviving grant applies to the same context, so the
/// scope is not part of the tuple
fn tuple_key<'g>(grant: &'g PermissionGrant, query: ContextQuery<'_>) -> TupleKey<'g> {
    if query.is_concrete() {
        (grant.resource.as_str(), grant.action.as_str(), None, None)
    } else {
        (
            grant.resource.as_str(),
            grant.action.as_str(),
            grant.context_type.as_deref(),
            grant.context_value.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyMutator;
    use crate::types::NewRole;

    /// org_admin (users:*) -> team_lead (users:read denied)
    fn org_store() -> (RoleStore, RoleId, RoleId) {
        let mut store = RoleStore::new();
        let mut m = HierarchyMutator::new(&mut store);
        let org_admin = m.create_role(NewRole::new("org_admin", "Org Admin")).unwrap().id;
        let team_lead = m
            .create_role(NewRole::new("team_lead", "Team Lead").with_parent(org_admin))
            .unwrap()
            .id;
        m.add_grant(PermissionGrant::allow(org_admin, "users", "*")).unwrap();
        m.add_grant(PermissionGrant::deny(team_lead, "users", "read")).unwrap();
        (store, org_admin, team_lead)
    }

    #[test]
    fn test_wildcard_parent_with_direct_deny() {
        let (store, org_admin, team_lead) = org_store();
        let resolver = PermissionResolver::new(&store);
        let role = Subject::Role(team_lead);

        assert!(!resolver.check_permission(&role, "users", "read", None).unwrap());
        for action in ["create", "update", "delete"] {
            assert!(resolver.check_permission(&role, "users", action, None).unwrap());
        }

        let decisive = resolver.decide(&role, "users", "create", None).unwrap().unwrap();
        assert_eq!(decisive.source, PermissionSource::Inherited);
        assert_eq!(decisive.source_role_id, org_admin);

        let decisive = resolver.decide(&role, "users", "read", None).unwrap().unwrap();
        assert_eq!(decisive.source, PermissionSource::Direct);
    }

    #[test]
    fn test_nearer_wildcard_shadows_farther_concrete() {
        let mut store = RoleStore::new();
        let mut m = HierarchyMutator::new(&mut store);
        let parent = m.create_role(NewRole::new("parent", "Parent")).unwrap().id;
        let child = m.create_role(NewRole::new("child", "Child").with_parent(parent)).unwrap().id;
        m.add_grant(PermissionGrant::allow(parent, "reports", "read")).unwrap();
        m.add_grant(PermissionGrant::deny(child, "reports", "*")).unwrap();

        let set = PermissionResolver::new(&store).effective_permissions(child, None).unwrap();
        assert_eq!(set.len(), 1);
        assert!(!set.is_allowed("reports", "read"));
    }

    #[test]
    fn test_same_distance_conflict_is_deny_wins() {
        let mut store = RoleStore::new();
        let mut m = HierarchyMutator::new(&mut store);
        let role = m.create_role(NewRole::new("editor", "Editor")).unwrap().id;
        m.add_grant(PermissionGrant::allow(role, "docs", "write")).unwrap();
        m.add_grant(PermissionGrant::deny(role, "docs", "write").in_context("project", "apollo"))
            .unwrap();

        let resolver = PermissionResolver::new(&store);
        let apollo = RequestContext::new("project", "apollo");
        let gemini = RequestContext::new("project", "gemini");
        let subject = Subject::Role(role);

        assert!(!resolver.check_permission(&subject, "docs", "write", Some(&apollo)).unwrap());
        assert!(resolver.check_permission(&subject, "docs", "write", Some(&gemini)).unwrap());
        assert!(resolver.check_permission(&subject, "docs", "write", None).unwrap());

        // Listing keeps both scopes
        assert_eq!(resolver.effective_permissions(role, None).unwrap().len(), 2);
    }

    #[test]
    fn test_user_check_agrees_with_listing() {
        let mut store = RoleStore::new();
        let mut m = HierarchyMutator::new(&mut store);
        let reader = m.create_role(NewRole::new("reader", "Reader")).unwrap().id;
        let locked = m.create_role(NewRole::new("locked", "Locked")).unwrap().id;
        m.add_grant(PermissionGrant::allow(reader, "users", "read")).unwrap();
        m.add_grant(PermissionGrant::allow(reader, "docs", "read")).unwrap();
        m.add_grant(PermissionGrant::deny(locked, "users", "*")).unwrap();
        m.assign_role("alice".to_string(), reader).unwrap();
        m.assign_role("alice".to_string(), locked).unwrap();

        let resolver = PermissionResolver::new(&store);
        let alice = Subject::User("alice".to_string());
        let listing = resolver.effective_for_subject(&alice, None).unwrap();

        for (resource, action) in [("users", "read"), ("users", "delete"), ("docs", "read")] {
            let check = resolver.check_permission(&alice, resource, action, None).unwrap();
            assert_eq!(check, listing.is_allowed(resource, action), "{}:{}", resource, action);
        }
        assert!(!listing.is_allowed("users", "read"));
        assert!(listing.is_allowed("docs", "read"));

        let decisive = resolver.decide(&alice, "users", "read", None).unwrap().unwrap();
        assert!(!decisive.is_granted);
        assert_eq!(decisive.source_role_id, locked);
    }

    #[test]
    fn test_overlap_of_partial_wildcards() {
        let allow = EffectivePermission::from_grant(
            &PermissionGrant::allow(1, "*", "read"),
            PermissionSource::Direct,
        );
        let deny = EffectivePermission::from_grant(
            &PermissionGrant::deny(2, "billing", "*").in_context("project", "apollo"),
            PermissionSource::Inherited,
        );

        let shared = overlap(&deny, &allow).unwrap();
        assert_eq!((shared.resource.as_str(), shared.action.as_str()), ("billing", "read"));
        assert_eq!(shared.scope(), (Some("project"), Some("apollo")));
        assert!(!shared.is_granted);
        assert_eq!(shared.source_role_id, 2);

        let other = EffectivePermission::from_grant(
            &PermissionGrant::allow(1, "docs", "write"),
            PermissionSource::Direct,
        );
        assert!(overlap(&deny, &other).is_none());
    }

    #[test]
    fn test_unknown_role_is_not_found() {
        let store = RoleStore::new();
        let resolver = PermissionResolver::new(&store);
        assert!(matches!(
            resolver.effective_permissions(5, None),
            Err(RbacError::NotFound(_))
        ));
        assert!(matches!(
            resolver.check_permission(&Subject::Role(5), "users", "read", None),
            Err(RbacError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_resource_rejected() {
        let (store, _, team_lead) = org_store();
        let resolver = PermissionResolver::new(&store);
        assert!(matches!(
            resolver.check_permission(&Subject::Role(team_lead), "", "read", None),
            Err(RbacError::ValidationError(_))
        ));
    }
}
