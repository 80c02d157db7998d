//! Version-keyed cache for effective permission sets and check decisions

use crate::permissions::{EffectivePermissionSet, RequestContext};
use crate::types::Subject;
use blake3::Hasher;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub capacity: usize,

    /// Time-to-live for cached entries
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(60),
        }
    }
}

/// Cache key type (BLAKE3 hash)
type CacheKey = [u8; 32];

#[derive(Debug, Clone)]
enum CachedValue {
    Set(EffectivePermissionSet),
    Decision(bool),
}

/// Cached entry with TTL
#[derive(Debug, Clone)]
struct CachedEntry {
    value: CachedValue,
    cached_at: Instant,
}

impl CachedEntry {
    fn new(value: CachedValue) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Effective permission cache
///
/// Keys hash the snapshot version together with the subject and context, so a published
/// mutation makes every older entry unreachable even before `clear` runs.
pub struct PermissionCache {
    entries: DashMap<CacheKey, CachedEntry>,
    config: CacheConfig,
    hits: AtomicUsize,
    misses: AtomicUsize,
    expirations: AtomicUsize,
}

impl PermissionCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::with_capacity(config.capacity.min(1_024)),
            config,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            expirations: AtomicUsize::new(0),
        }
    }

    /// Cached effective set for a listing query
    pub fn get_set(
        &self,
        version: u64,
        subject: &Subject,
        context: Option<&RequestContext>,
    ) -> Option<EffectivePermissionSet> {
        match self.lookup(&set_key(version, subject, context))? {
            CachedValue::Set(set) => Some(set),
            CachedValue::Decision(_) => None,
        }
    }

    /// Store an effective set
    pub fn put_set(
        &self,
        version: u64,
        subject: &Subject,
        context: Option<&RequestContext>,
        set: EffectivePermissionSet,
    ) {
        self.insert(set_key(version, subject, context), CachedValue::Set(set));
    }

    /// Cached check decision
    pub fn get_decision(
        &self,
        version: u64,
        subject: &Subject,
        resource: &str,
        action: &str,
        context: Option<&RequestContext>,
    ) -> Option<bool> {
        match self.lookup(&check_key(version, subject, resource, action, context))? {
            CachedValue::Decision(allowed) => Some(allowed),
            CachedValue::Set(_) => None,
        }
    }

    /// Store a check decision
    pub fn put_decision(
        &self,
        version: u64,
        subject: &Subject,
        resource: &str,
        action: &str,
        context: Option<&RequestContext>,
        allowed: bool,
    ) {
        self.insert(
            check_key(version, subject, resource, action, context),
            CachedValue::Decision(allowed),
        );
    }

    /// Drop every entry; counters are kept
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.entries.len(),
            max_entries: self.config.capacity,
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(self.config.ttl) {
                drop(entry);
                self.entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }

            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn insert(&self, key: CacheKey, value: CachedValue) {
        if self.entries.len() >= self.config.capacity {
            self.evict();
        }
        self.entries.insert(key, CachedEntry::new(value));
    }

    /// Drop expired entries, then the oldest tenth if still full
    fn evict(&self) {
        let ttl = self.config.ttl;
        self.entries.retain(|_, entry| !entry.is_expired(ttl));

        if self.entries.len() < self.config.capacity {
            return;
        }

        let mut by_age: Vec<(CacheKey, Instant)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().cached_at))
            .collect();
        by_age.sort_by_key(|(_, cached_at)| *cached_at);

        let to_remove = (self.config.capacity / 10).max(1);
        for (key, _) in by_age.into_iter().take(to_remove) {
            self.entries.remove(&key);
        }
    }
}

fn hash_prefix(hasher: &mut Hasher, kind: &[u8], version: u64, subject: &Subject) {
    hasher.update(kind);
    hasher.update(&version.to_le_bytes());
    match subject {
        Subject::Role(id) => {
            hasher.update(b"role");
            hasher.update(&id.to_le_bytes());
        }
        Subject::User(user) => {
            hasher.update(b"user");
            hash_str(hasher, user);
        }
    }
}

fn hash_context(hasher: &mut Hasher, context: Option<&RequestContext>) {
    match context {
        None => {
            hasher.update(&[0u8]);
        }
        Some(ctx) => {
            hasher.update(&[1u8]);
            hash_str(hasher, &ctx.context_type);
            hash_str(hasher, &ctx.context_value);
        }
    }
}

/// Length-prefixed so ("ab", "c") and ("a", "bc") differ
fn hash_str(hasher: &mut Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn set_key(version: u64, subject: &Subject, context: Option<&RequestContext>) -> CacheKey {
    let mut hasher = Hasher::new();
    hash_prefix(&mut hasher, b"set", version, subject);
    hash_context(&mut hasher, context);
    *hasher.finalize().as_bytes()
}

fn check_key(
    version: u64,
    subject: &Subject,
    resource: &str,
    action: &str,
    context: Option<&RequestContext>,
) -> CacheKey {
    let mut hasher = Hasher::new();
    hash_prefix(&mut hasher, b"check", version, subject);
    hash_str(&mut hasher, resource);
    hash_str(&mut hasher, action);
    hash_context(&mut hasher, context);
    *hasher.finalize().as_bytes()
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
