//! Short-lived cache of verified caller identities.
//!
//! Entries are keyed by the SHA-256 of the bearer token so raw tokens are
//! never held in memory longer than one request. Only successful lookups are
//! cached; a rejected token is re-verified on every request.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::identity::CallerIdentity;

// ═══════════════════════════════════════════════════════════
// CachedIdentity
// ═══════════════════════════════════════════════════════════

struct CachedIdentity {
    identity: CallerIdentity,
    expires_at: Instant,
}

fn token_key(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

// ═══════════════════════════════════════════════════════════
// AuthCache
// ═══════════════════════════════════════════════════════════

/// Bounded TTL cache. Constructed once at startup and shared through the
/// API context.
pub struct AuthCache {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<[u8; 32], CachedIdentity>,
}

impl AuthCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, token: &str) -> Option<CallerIdentity> {
        self.get_at(token, Instant::now())
    }

    pub fn insert(&mut self, token: &str, identity: CallerIdentity) {
        self.insert_at(token, identity, Instant::now());
    }

    /// Lookup at an explicit instant. Expired entries are dropped on read.
    pub fn get_at(&mut self, token: &str, now: Instant) -> Option<CallerIdentity> {
        let key = token_key(token);
        match self.entries.get(&key) {
            Some(entry) if entry.expires_at > now => Some(entry.identity.clone()),
            Some(_) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert_at(&mut self, token: &str, identity: CallerIdentity, now: Instant) {
        let key = token_key(token);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.purge_expired(now);
            if self.entries.len() >= self.max_entries {
                self.evict_soonest();
            }
        }
        self.entries.insert(
            key,
            CachedIdentity {
                identity,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn evict(&mut self, token: &str) {
        self.entries.remove(&token_key(token));
    }

    pub fn purge_expired(&mut self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    fn evict_soonest(&mut self) {
        if let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| *key)
        {
            self.entries.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AuthCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 1024)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::Role;

    fn identity(id: &str) -> CallerIdentity {
        CallerIdentity {
            user_id: id.into(),
            role: Role::Doctor,
            email: None,
        }
    }

    #[test]
    fn new_cache_is_empty() {
        let cache = AuthCache::default();
        assert!(cache.is_empty());
    }

    #[test]
    fn hit_within_ttl() {
        let mut cache = AuthCache::new(Duration::from_secs(30), 8);
        let t0 = Instant::now();
        cache.insert_at("tok", identity("u1"), t0);
        let hit = cache.get_at("tok", t0 + Duration::from_secs(29)).unwrap();
        assert_eq!(hit.user_id, "u1");
    }

    #[test]
    fn expired_entry_is_a_miss_and_removed() {
        let mut cache = AuthCache::new(Duration::from_secs(30), 8);
        let t0 = Instant::now();
        cache.insert_at("tok", identity("u1"), t0);
        assert!(cache.get_at("tok", t0 + Duration::from_secs(30)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_is_bounded() {
        let mut cache = AuthCache::new(Duration::from_secs(30), 2);
        let t0 = Instant::now();
        cache.insert_at("a", identity("a"), t0);
        cache.insert_at("b", identity("b"), t0 + Duration::from_secs(1));
        cache.insert_at("c", identity("c"), t0 + Duration::from_secs(2));
        assert_eq!(cache.len(), 2);
        let now = t0 + Duration::from_secs(3);
        assert!(cache.get_at("a", now).is_none(), "oldest entry evicted");
        assert!(cache.get_at("b", now).is_some());
        assert!(cache.get_at("c", now).is_some());
    }

    #[test]
    fn expired_entries_are_purged_before_evicting_live_ones() {
        let mut cache = AuthCache::new(Duration::from_secs(10), 2);
        let t0 = Instant::now();
        cache.insert_at("a", identity("a"), t0);
        cache.insert_at("b", identity("b"), t0 + Duration::from_secs(8));
        cache.insert_at("c", identity("c"), t0 + Duration::from_secs(12));
        let now = t0 + Duration::from_secs(13);
        assert!(cache.get_at("b", now).is_some());
        assert!(cache.get_at("c", now).is_some());
    }

    #[test]
    fn evict_and_clear() {
        let mut cache = AuthCache::default();
        cache.insert("a", identity("a"));
        cache.insert("b", identity("b"));
        cache.evict("a");
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_are_hashed() {
        assert_ne!(token_key("a"), token_key("b"));
        assert_eq!(token_key("a").len(), 32);
    }
}
