//! Permission grant and effective permission types

use crate::error::{RbacError, Result};
use crate::types::RoleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Literal matching any concrete resource, action or context value
pub const WILDCARD: &str = "*";

/// A (resource, action, optional context, granted/denied) tuple attached to a role
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Role holding the grant
    pub role_id: RoleId,

    /// Resource name or `*`
    pub resource: String,

    /// Action name or `*`
    pub action: String,

    /// Context dimension (e.g., "project"); absent means global
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_type: Option<String>,

    /// Context value or `*`; requires `context_type`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_value: Option<String>,

    /// `false` is an explicit deny
    pub is_granted: bool,
}

impl PermissionGrant {
    /// Create a global allow grant
    pub fn allow(role_id: RoleId, resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            role_id,
            resource: resource.into(),
            action: action.into(),
            context_type: None,
            context_value: None,
            is_granted: true,
        }
    }

    /// Create a global explicit deny
    pub fn deny(role_id: RoleId, resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            is_granted: false,
            ..Self::allow(role_id, resource, action)
        }
    }

    /// Scope the grant to a context
    pub fn in_context(mut self, context_type: impl Into<String>, context_value: impl Into<String>) -> Self {
        self.context_type = Some(context_type.into());
        self.context_value = Some(context_value.into());
        self
    }

    /// Scope the grant to every value of a context type
    pub fn in_context_type(mut self, context_type: impl Into<String>) -> Self {
        self.context_type = Some(context_type.into());
        self.context_value = None;
        self
    }

    /// Validate field shapes
    pub fn validate(&self) -> Result<()> {
        if self.resource.trim().is_empty() {
            return Err(RbacError::ValidationError(
                "Permission resource cannot be empty".to_string(),
            ));
        }

        if self.action.trim().is_empty() {
            return Err(RbacError::ValidationError(
                "Permission action cannot be empty".to_string(),
            ));
        }

        match (&self.context_type, &self.context_value) {
            (None, Some(value)) => {
                return Err(RbacError::ValidationError(format!(
                    "context_value '{}' requires a context_type",
                    value
                )))
            }
            (Some(ctype), _) if ctype.trim().is_empty() || ctype == WILDCARD => {
                return Err(RbacError::ValidationError(
                    "context_type must be a concrete, non-empty name".to_string(),
                ))
            }
            (Some(_), Some(value)) if value.trim().is_empty() => {
                return Err(RbacError::ValidationError(
                    "context_value cannot be empty".to_string(),
                ))
            }
            _ => {}
        }

        Ok(())
    }

    /// Storage key of this grant
    pub fn key(&self) -> GrantKey {
        GrantKey {
            resource: self.resource.clone(),
            action: self.action.clone(),
            context_type: self.context_type.clone(),
            context_value: self.context_value.clone(),
        }
    }

    /// Whether the grant is unscoped
    pub fn is_global(&self) -> bool {
        self.context_type.is_none()
    }
}

impl fmt::Display for PermissionGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let effect = if self.is_granted { "allow" } else { "deny" };
        write!(f, "{} {}:{}", effect, self.resource, self.action)?;
        if let Some(ctype) = &self.context_type {
            write!(f, " @{}={}", ctype, self.context_value.as_deref().unwrap_or(WILDCARD))?;
        }
        Ok(())
    }
}

/// Identity of a grant within one role, `role_permissions` primary key minus the role
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantKey {
    /// Resource name or `*`
    pub resource: String,
    /// Action name or `*`
    pub action: String,
    /// Context dimension
    pub context_type: Option<String>,
    /// Context value
    pub context_value: Option<String>,
}

/// Input for removing grants from a role
///
/// Without a context every grant for the resource/action pair is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRemoval {
    /// Role holding the grant
    pub role_id: RoleId,
    /// Resource name
    pub resource: String,
    /// Action name
    pub action: String,
    /// Narrow removal to one context dimension
    #[serde(default)]
    pub context_type: Option<String>,
    /// Narrow removal to one context value
    #[serde(default)]
    pub context_value: Option<String>,
}

impl PermissionRemoval {
    /// Remove every context of a resource/action pair
    pub fn new(role_id: RoleId, resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            role_id,
            resource: resource.into(),
            action: action.into(),
            context_type: None,
            context_value: None,
        }
    }

    /// Remove only the grant scoped to this context
    pub fn in_context(mut self, context_type: impl Into<String>, context_value: Option<String>) -> Self {
        self.context_type = Some(context_type.into());
        self.context_value = context_value;
        self
    }

    /// Whether a stored grant falls under this removal
    pub fn matches(&self, grant: &PermissionGrant) -> bool {
        if grant.resource != self.resource || grant.action != self.action {
            return false;
        }

        match &self.context_type {
            None => true,
            Some(ctype) => {
                grant.context_type.as_deref() == Some(ctype.as_str())
                    && grant.context_value == self.context_value
            }
        }
    }
}

/// Context of an authorization request (e.g., project = "apollo")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestContext {
    /// Context dimension
    pub context_type: String,
    /// Concrete value
    pub context_value: String,
}

impl RequestContext {
    /// Create a request context
    pub fn new(context_type: impl Into<String>, context_value: impl Into<String>) -> Self {
        Self {
            context_type: context_type.into(),
            context_value: context_value.into(),
        }
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.context_type, self.context_value)
    }
}

/// Where an effective permission came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionSource {
    /// Granted on the queried role itself
    Direct,
    /// Inherited from an ancestor
    Inherited,
}

/// Resolved outcome for one resource/action/context tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermission {
    /// Resource name or `*`
    pub resource: String,
    /// Action name or `*`
    pub action: String,
    /// Context dimension of the winning grant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_type: Option<String>,
    /// Context value of the winning grant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_value: Option<String>,
    /// Outcome
    pub is_granted: bool,
    /// Direct or inherited
    pub source: PermissionSource,
    /// Role contributing the winning grant
    pub source_role_id: RoleId,
}

impl EffectivePermission {
    pub(crate) fn from_grant(grant: &PermissionGrant, source: PermissionSource) -> Self {
        Self {
            resource: grant.resource.clone(),
            action: grant.action.clone(),
            context_type: grant.context_type.clone(),
            context_value: grant.context_value.clone(),
            is_granted: grant.is_granted,
            source,
            source_role_id: grant.role_id,
        }
    }

    /// Whether this entry answers a query for `resource`/`action`
    ///
    /// A stored `*` matches any requested value; a concrete stored value never matches a
    /// wildcard request.
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        pattern_matches(&self.resource, resource) && pattern_matches(&self.action, action)
    }

    /// Context scope of the winning grant
    pub(crate) fn scope(&self) -> (Option<&str>, Option<&str>) {
        (self.context_type.as_deref(), self.context_value.as_deref())
    }

    /// Lookup rank: 0 exact, 1 wildcard resource, 2 wildcard action, 3 full wildcard
    pub(crate) fn specificity_rank(&self) -> u8 {
        match (self.resource == WILDCARD, self.action == WILDCARD) {
            (false, false) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (true, true) => 3,
        }
    }

    fn sort_key(&self) -> (String, String, Option<String>, Option<String>) {
        (
            self.resource.clone(),
            self.action.clone(),
            self.context_type.clone(),
            self.context_value.clone(),
        )
    }
}

/// Match a stored pattern against a requested value
pub(crate) fn pattern_matches(stored: &str, requested: &str) -> bool {
    stored == WILDCARD || stored == requested
}

/// Effective permissions of a subject, one entry per resolved tuple
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissionSet {
    entries: Vec<EffectivePermission>,
}

impl EffectivePermissionSet {
    /// Build a set, ordering entries by tuple
    pub fn new(mut entries: Vec<EffectivePermission>) -> Self {
        entries.sort_by_key(|e| e.sort_key());
        Self { entries }
    }

    /// All entries
    pub fn entries(&self) -> &[EffectivePermission] {
        &self.entries
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = &EffectivePermission> {
        self.entries.iter()
    }

    /// Consume into a plain list
    pub fn into_vec(self) -> Vec<EffectivePermission> {
        self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact tuple lookup (no wildcard expansion)
    pub fn get(
        &self,
        resource: &str,
        action: &str,
        context_type: Option<&str>,
        context_value: Option<&str>,
    ) -> Option<&EffectivePermission> {
        self.entries.iter().find(|e| {
            e.resource == resource
                && e.action == action
                && e.context_type.as_deref() == context_type
                && e.context_value.as_deref() == context_value
        })
    }

    /// Most specific entry answering `resource`/`action`
    ///
    /// Order: exact resource+action, wildcard resource, wildcard action, full wildcard.
    /// Entries of equal rank resolve deny-first.
    pub fn lookup(&self, resource: &str, action: &str) -> Option<&EffectivePermission> {
        self.entries
            .iter()
            .filter(|e| e.matches(resource, action))
            .min_by_key(|e| (e.specificity_rank(), e.is_granted))
    }

    /// Decision for `resource`/`action`, defaulting to deny
    pub fn is_allowed(&self, resource: &str, action: &str) -> bool {
        self.lookup(resource, action).is_some_and(|e| e.is_granted)
    }

    /// Union with another role's set; conflicting tuples resolve deny-wins
    pub fn merge_deny_wins(self, other: EffectivePermissionSet) -> Self {
        let mut merged: BTreeMap<(String, String, Option<String>, Option<String>), EffectivePermission> =
            BTreeMap::new();

        for entry in self.entries.into_iter().chain(other.entries) {
            match merged.get(&entry.sort_key()) {
                Some(existing) if !existing.is_granted => {}
                Some(_) if entry.is_granted => {}
                _ => {
                    merged.insert(entry.sort_key(), entry);
                }
            }
        }

        Self::new(merged.into_values().collect())
    }
}

impl IntoIterator for EffectivePermissionSet {
    type Item = EffectivePermission;
    type IntoIter = std::vec::IntoIter<EffectivePermission>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
