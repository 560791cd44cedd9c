//! Format registry entry and configuration types shared between the
//! contract layer and `eventwire-registry`'s implementation.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// What kind of thing a registry key names. Only `Format` entries count
/// against `RegistryConfig::max_entries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Format,
    Alias,
    Factory,
}

/// One registry slot. `last_access_nanos` and `access_count` are atomics so
/// `Get` can bump them without taking the entry-table lock.
#[derive(Debug)]
pub struct RegistryEntry<V> {
    pub value: V,
    pub created_at: i64,
    pub last_access_nanos: AtomicI64,
    pub access_count: AtomicU64,
}

impl<V> RegistryEntry<V> {
    pub fn new(value: V, now_nanos: i64) -> Self {
        Self {
            value,
            created_at: now_nanos,
            last_access_nanos: AtomicI64::new(now_nanos),
            access_count: AtomicU64::new(1),
        }
    }

    pub fn touch(&self, now_nanos: i64) {
        self.last_access_nanos.store(now_nanos, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_access(&self) -> i64 {
        self.last_access_nanos.load(Ordering::Relaxed)
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// 0 = unbounded.
    pub max_entries: usize,
    pub ttl: Duration,
    pub enable_lru: bool,
    pub cleanup_interval: Duration,
    /// 0-100.
    pub memory_pressure_threshold: u8,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_entries: 0,
            ttl: Duration::from_secs(3600),
            enable_lru: true,
            cleanup_interval: Duration::from_secs(300),
            memory_pressure_threshold: 80,
        }
    }
}

impl RegistryConfig {
    /// Validates the invariants from the data model: `ttl` and
    /// `max_entries` are unsigned by construction; only the pressure
    /// threshold needs an explicit bound check.
    pub fn validate(&self) -> Result<(), String> {
        if self.memory_pressure_threshold > 100 {
            return Err(format!(
                "memory_pressure_threshold must be in [0,100], got {}",
                self.memory_pressure_threshold
            ));
        }
        Ok(())
    }
}

/// Canonicalise a MIME type: lowercase, with any `;parameters` suffix
/// stripped.
pub fn canonical_mime(mime: &str) -> String {
    mime.split(';').next().unwrap_or(mime).trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_mime_lowercases_and_strips_params() {
        assert_eq!(canonical_mime("Application/JSON; charset=utf-8"), "application/json");
        assert_eq!(canonical_mime("text/plain"), "text/plain");
    }

    #[test]
    fn config_rejects_out_of_range_threshold() {
        let mut config = RegistryConfig::default();
        config.memory_pressure_threshold = 150;
        assert!(config.validate().is_err());
    }

    #[test]
    fn entry_touch_bumps_access_metadata() {
        let entry = RegistryEntry::new("value", 100);
        assert_eq!(entry.access_count(), 1);
        entry.touch(200);
        assert_eq!(entry.last_access(), 200);
        assert_eq!(entry.access_count(), 2);
    }
}
