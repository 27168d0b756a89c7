//! Bounded, expiring cache of user name to role

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::core::count_cache::DEFAULT_MAX_ENTRIES;

#[derive(Debug, Clone, PartialEq, Eq)]
struct RoleEntry {
    role: String,
    expires_at: Instant,
}

/// Roles resolved per user, each valid until its expiry
#[derive(Debug)]
pub struct RolesCache {
    entries: DashMap<String, RoleEntry>,
    max_entries: usize,
}

impl RolesCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    /// A cache holding at most `max_entries` users
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// The cached role of `user_name`, unless expired
    pub fn get(&self, user_name: &str) -> Option<String> {
        self.entries
            .get(user_name)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.role.clone())
    }

    /// Cache `role` for `user_name` for `ttl`, replacing any previous entry
    pub fn insert(&self, user_name: &str, role: &str, ttl: Duration) {
        if !self.entries.contains_key(user_name) {
            self.make_room();
        }
        self.entries.insert(
            user_name.to_string(),
            RoleEntry {
                role: role.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn make_room(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);

        while self.entries.len() >= self.max_entries {
            let soonest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());
            match soonest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn remove(&self, user_name: &str) {
        self.entries.remove(user_name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for RolesCache {
    fn default() -> Self {
        Self::new()
    }
}
