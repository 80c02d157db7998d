//! In-memory audit trail of published mutations

use crate::types::RoleId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use uuid::Uuid;

/// Kind of mutation recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    ParentChanged,
    PermissionAdded,
    PermissionRemoved,
    RoleAssigned,
    RoleRevoked,
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry id
    pub id: Uuid,
    /// When the mutation was published
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub action: AuditAction,
    /// Role the mutation was about
    pub role_id: RoleId,
    /// Action specific payload
    pub details: Value,
}

/// Bounded ring of audit entries, oldest dropped first
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditLog {
    /// Create a log retaining at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry
    pub fn record(&self, action: AuditAction, role_id: RoleId, details: Value) -> AuditEntry {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            role_id,
            details,
        };

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());

        entry
    }

    /// Retained entries, oldest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// The most recent `limit` entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Retained entries about one role, oldest first
    pub fn for_role(&self, role_id: RoleId) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.role_id == role_id)
            .cloned()
            .collect()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is retained
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
