//! Context scoping for permission grants
//!
//! A grant is either global or scoped to a context dimension such as `project` or `team`,
//! optionally narrowed to one value. Scoped values support the `*` wildcard.

use super::types::{PermissionGrant, RequestContext, WILDCARD};

/// A `(context_type, context_value)` pair; `(None, None)` is global
pub type Scope<'a> = (Option<&'a str>, Option<&'a str>);

/// What context a resolution runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextQuery<'a> {
    /// Listing mode: every grant participates and keeps its own context
    All,
    /// Request without context: only global grants apply
    Global,
    /// Request inside a concrete context
    Within(&'a RequestContext),
}

impl<'a> ContextQuery<'a> {
    /// Listing when no context is given
    pub fn listing(context: Option<&'a RequestContext>) -> Self {
        context.map_or(ContextQuery::All, ContextQuery::Within)
    }

    /// Global request when no context is given
    pub fn request(context: Option<&'a RequestContext>) -> Self {
        context.map_or(ContextQuery::Global, ContextQuery::Within)
    }

    /// Whether the query is a concrete authorization request
    pub fn is_concrete(&self) -> bool {
        !matches!(self, ContextQuery::All)
    }
}

/// Decides whether a grant's scope applies to a query
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextMatcher;

impl ContextMatcher {
    /// Whether `grant` participates in a resolution under `query`
    pub fn applies(grant: &PermissionGrant, query: ContextQuery<'_>) -> bool {
        match query {
            ContextQuery::All => true,
            ContextQuery::Global => grant.is_global(),
            ContextQuery::Within(request) => Self::applies_to_request(grant, request),
        }
    }

    /// A grant applies to `(ctype, cval)` if it is unscoped, or scoped to the same type with
    /// the same value, `*`, or no value at all
    pub fn applies_to_request(grant: &PermissionGrant, request: &RequestContext) -> bool {
        let Some(ctype) = grant.context_type.as_deref() else {
            return true;
        };

        if ctype != request.context_type {
            return false;
        }

        match grant.context_value.as_deref() {
            None | Some(WILDCARD) => true,
            Some(value) => value == request.context_value,
        }
    }

    /// Whether the scope of `nearer` includes every request the scope of `farther` applies to
    ///
    /// Unscoped covers everything; a type-wide or `*` scope covers every value of its type.
    pub fn covers(nearer: &PermissionGrant, farther: &PermissionGrant) -> bool {
        Self::scope_covers(
            (nearer.context_type.as_deref(), nearer.context_value.as_deref()),
            (farther.context_type.as_deref(), farther.context_value.as_deref()),
        )
    }

    /// [`ContextMatcher::covers`] over bare `(context_type, context_value)` scopes
    pub fn scope_covers(outer: Scope<'_>, inner: Scope<'_>) -> bool {
        let (Some(outer_type), outer_value) = outer else {
            return true;
        };

        if inner.0 != Some(outer_type) {
            return false;
        }

        match outer_value {
            None | Some(WILDCARD) => true,
            Some(value) => inner.1 == Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant() -> PermissionGrant {
        PermissionGrant::allow(1, "docs", "read")
    }

    #[test]
    fn test_global_grant_applies_everywhere() {
        let request = RequestContext::new("project", "apollo");
        assert!(ContextMatcher::applies_to_request(&grant(), &request));
        assert!(ContextMatcher::applies(&grant(), ContextQuery::Global));
        assert!(ContextMatcher::applies(&grant(), ContextQuery::All));
    }

    #[test]
    fn test_scoped_grant_matching() {
        let apollo = RequestContext::new("project", "apollo");
        let gemini = RequestContext::new("project", "gemini");
        let team = RequestContext::new("team", "apollo");

        let scoped = grant().in_context("project", "apollo");
        assert!(ContextMatcher::applies_to_request(&scoped, &apollo));
        assert!(!ContextMatcher::applies_to_request(&scoped, &gemini));
        assert!(!ContextMatcher::applies_to_request(&scoped, &team));
        assert!(!ContextMatcher::applies(&scoped, ContextQuery::Global));
        assert!(ContextMatcher::applies(&scoped, ContextQuery::All));
    }

    #[test]
    fn test_wildcard_and_type_wide_scopes() {
        let gemini = RequestContext::new("project", "gemini");
        let team = RequestContext::new("team", "core");

        let any_project = grant().in_context("project", "*");
        assert!(ContextMatcher::applies_to_request(&any_project, &gemini));
        assert!(!ContextMatcher::applies_to_request(&any_project, &team));

        let type_wide = grant().in_context_type("project");
        assert!(ContextMatcher::applies_to_request(&type_wide, &gemini));
        assert!(!ContextMatcher::applies_to_request(&type_wide, &team));
    }

    #[test]
    fn test_coverage() {
        let global = grant();
        let any_project = grant().in_context("project", "*");
        let apollo = grant().in_context("project", "apollo");
        let gemini = grant().in_context("project", "gemini");
        let team = grant().in_context("team", "core");

        assert!(ContextMatcher::covers(&global, &apollo));
        assert!(ContextMatcher::covers(&global, &team));
        assert!(ContextMatcher::covers(&any_project, &apollo));
        assert!(ContextMatcher::covers(&apollo, &apollo));

        assert!(!ContextMatcher::covers(&apollo, &global));
        assert!(!ContextMatcher::covers(&apollo, &gemini));
        assert!(!ContextMatcher::covers(&apollo, &any_project));
        assert!(!ContextMatcher::covers(&any_project, &team));

        assert!(ContextMatcher::scope_covers((None, None), (Some("team"), Some("core"))));
        assert!(ContextMatcher::scope_covers((Some("project"), None), (Some("project"), Some("apollo"))));
        assert!(!ContextMatcher::scope_covers((Some("project"), Some("apollo")), (None, None)));
    }

    #[test]
    fn test_query_constructors() {
        let ctx = RequestContext::new("project", "apollo");
        assert_eq!(ContextQuery::listing(None), ContextQuery::All);
        assert_eq!(ContextQuery::request(None), ContextQuery::Global);
        assert_eq!(ContextQuery::request(Some(&ctx)), ContextQuery::Within(&ctx));
        assert!(!ContextQuery::All.is_concrete());
        assert!(ContextQuery::Global.is_concrete());
    }
}
