//! Concurrent format registry: resolves `(entryType, mimeType) -> value`,
//! bounds memory via LRU eviction, and expires stale entries by TTL.

mod lru;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use eventwire_contracts::{canonical_mime, RegistryConfig, RegistryEntry};
use lru::LruList;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry has been closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, RegistryError>;

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Concurrent, bounded, TTL-aware store for codec/format values keyed by
/// canonical MIME type. `Format` entries participate in LRU eviction;
/// `Factory` entries are ancillary; `Alias` entries map one MIME to
/// another and are cascade-removed when their target format is evicted.
pub struct FormatRegistry<V> {
    config: RegistryConfig,
    formats: DashMap<String, Arc<RegistryEntry<V>>>,
    factories: DashMap<String, Arc<RegistryEntry<V>>>,
    aliases: DashMap<String, Arc<RegistryEntry<String>>>,
    lru: Mutex<LruList>,
    format_count: AtomicUsize,
    closed: AtomicBool,
}

impl<V: Clone + Send + Sync + 'static> FormatRegistry<V> {
    /// # Panics
    ///
    /// Panics if `config.memory_pressure_threshold` is out of `[0, 100]`.
    pub fn new(config: RegistryConfig) -> Self {
        config.validate().expect("invalid RegistryConfig");
        Self {
            config,
            formats: DashMap::new(),
            factories: DashMap::new(),
            aliases: DashMap::new(),
            lru: Mutex::new(LruList::new()),
            format_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed);
        }
        Ok(())
    }

    /// `Set(Format, mime, value)`.
    pub fn set_format(&self, mime: &str, value: V) -> Result<()> {
        self.ensure_open()?;
        let mime = canonical_mime(mime);

        let mut lru = self.lru.lock();
        let is_new = !self.formats.contains_key(&mime);
        if is_new && self.config.max_entries > 0 && self.format_count.load(Ordering::Acquire) >= self.config.max_entries {
            if let Some(evicted) = lru.pop_back() {
                self.evict_format(&evicted);
            }
        }

        let now = now_nanos();
        self.formats.insert(mime.clone(), Arc::new(RegistryEntry::new(value, now)));
        lru.push_front(mime);
        if is_new {
            self.format_count.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    /// `Get(Format, mime)`.
    pub fn get_format(&self, mime: &str) -> Option<V> {
        let mime = canonical_mime(mime);
        let entry = self.formats.get(&mime)?;
        entry.touch(now_nanos());
        if self.config.enable_lru {
            self.lru.lock().touch(&mime);
        }
        Some(entry.value.clone())
    }

    pub fn set_factory(&self, mime: &str, value: V) -> Result<()> {
        self.ensure_open()?;
        let mime = canonical_mime(mime);
        self.factories.insert(mime, Arc::new(RegistryEntry::new(value, now_nanos())));
        Ok(())
    }

    pub fn get_factory(&self, mime: &str) -> Option<V> {
        let mime = canonical_mime(mime);
        let entry = self.factories.get(&mime)?;
        entry.touch(now_nanos());
        Some(entry.value.clone())
    }

    /// `Set(Alias, alias, targetMime)`.
    pub fn set_alias(&self, alias: &str, target_mime: &str) -> Result<()> {
        self.ensure_open()?;
        let alias = canonical_mime(alias);
        let target = canonical_mime(target_mime);
        self.aliases.insert(alias, Arc::new(RegistryEntry::new(target, now_nanos())));
        Ok(())
    }

    /// `ResolveAlias(mime)`: alias lookup, then `;parameters` stripping,
    /// falling back to the lowercase input.
    pub fn resolve_alias(&self, mime: &str) -> String {
        let canonical = canonical_mime(mime);
        if let Some(entry) = self.aliases.get(&canonical) {
            entry.touch(now_nanos());
            return entry.value.clone();
        }
        canonical
    }

    /// Cascade-removes a format and every alias/factory entry sharing its
    /// MIME type; called both from LRU eviction and forced pressure
    /// eviction.
    fn evict_format(&self, mime: &str) {
        if self.formats.remove(mime).is_some() {
            self.format_count.fetch_sub(1, Ordering::AcqRel);
        }
        self.factories.remove(mime);
        self.aliases.retain(|_, entry| entry.value != mime);
        tracing::debug!(mime, "evicted format entry and cascaded aliases/factories");
    }

    /// `CleanupExpired()`.
    pub fn cleanup_expired(&self) {
        if self.config.ttl.is_zero() {
            return;
        }
        let cutoff = now_nanos() - self.config.ttl.as_nanos() as i64;
        self.cleanup_where(|entry| entry.created_at < cutoff);
    }

    /// `CleanupByAccessTime(maxAge)`.
    pub fn cleanup_by_access_time(&self, max_age: Duration) {
        let cutoff = now_nanos() - max_age.as_nanos() as i64;
        self.cleanup_where(|entry| entry.last_access() < cutoff);
    }

    fn cleanup_where(&self, predicate: impl Fn(&RegistryEntry<V>) -> bool) {
        let stale: Vec<String> = self
            .formats
            .iter()
            .filter(|entry| predicate(entry.value().as_ref()))
            .map(|entry| entry.key().clone())
            .collect();
        for mime in stale {
            let mut lru = self.lru.lock();
            lru.remove(&mime);
            drop(lru);
            self.evict_format(&mime);
        }
        self.factories.retain(|_, entry| !predicate(entry.as_ref()));
    }

    /// `AdaptToMemoryPressure(level)`.
    pub fn adapt_to_memory_pressure(&self, level: u8) {
        const MAX_FORCED_EVICTIONS: usize = 500;
        let fallback_hour = Duration::from_secs(3600);
        let fallback_half_hour = Duration::from_secs(1800);

        match level {
            1 => {}
            2 => {
                let max_age = halve(self.config.ttl).unwrap_or(fallback_hour);
                self.cleanup_by_access_time(max_age);
            }
            3 => {
                let max_age = quarter(self.config.ttl).unwrap_or(fallback_half_hour);
                self.cleanup_by_access_time(max_age);
                self.force_evict_toward(2 * self.config.max_entries.max(1), MAX_FORCED_EVICTIONS);
            }
            _ => {}
        }
    }

    fn force_evict_toward(&self, target: usize, max_evictions: usize) {
        let mut evicted = 0;
        while evicted < max_evictions && self.format_count.load(Ordering::Acquire) > target {
            let popped = self.lru.lock().pop_back();
            match popped {
                Some(mime) => {
                    self.evict_format(&mime);
                    evicted += 1;
                }
                None => break,
            }
        }
    }

    /// `Close()`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn format_count(&self) -> usize {
        self.format_count.load(Ordering::Acquire)
    }
}

fn halve(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then(|| d / 2)
}

fn quarter(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then(|| d / 4)
}

/// Spawns the background cleanup loop: a timer fires every
/// `cleanup_interval` and runs `CleanupExpired`; when the format count
/// exceeds 80% of `max_entries` it also runs a `CleanupByAccessTime(ttl/2)`
/// pass.
pub fn spawn_background_cleanup<V>(registry: Arc<FormatRegistry<V>>) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(registry.config.cleanup_interval);
        loop {
            interval.tick().await;
            if registry.is_closed() {
                break;
            }
            registry.cleanup_expired();
            if registry.config.max_entries > 0 {
                let pressure = registry.format_count() as f64 / registry.config.max_entries as f64;
                if pressure > 0.8 {
                    if let Some(half) = halve(registry.config.ttl) {
                        registry.cleanup_by_access_time(half);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_entries: usize) -> RegistryConfig {
        RegistryConfig {
            max_entries,
            ttl: Duration::from_secs(3600),
            enable_lru: true,
            cleanup_interval: Duration::from_secs(60),
            memory_pressure_threshold: 80,
        }
    }

    #[test]
    fn get_returns_none_for_missing_entry() {
        let registry: FormatRegistry<String> = FormatRegistry::new(config(0));
        assert_eq!(registry.get_format("application/json"), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let registry = FormatRegistry::new(config(0));
        registry.set_format("Application/JSON; charset=utf-8", 42).unwrap();
        assert_eq!(registry.get_format("application/json"), Some(42));
    }

    #[test]
    fn lru_evicts_oldest_format_after_capacity() {
        let registry = FormatRegistry::new(config(2));
        registry.set_format("a/1", 1).unwrap();
        registry.set_format("a/2", 2).unwrap();
        registry.set_format("a/3", 3).unwrap();

        assert_eq!(registry.get_format("a/1"), None);
        assert_eq!(registry.get_format("a/2"), Some(2));
        assert_eq!(registry.get_format("a/3"), Some(3));
        assert_eq!(registry.format_count(), 2);
    }

    #[test]
    fn get_refreshes_lru_position() {
        let registry = FormatRegistry::new(config(2));
        registry.set_format("a/1", 1).unwrap();
        registry.set_format("a/2", 2).unwrap();
        registry.get_format("a/1");
        registry.set_format("a/3", 3).unwrap();

        assert_eq!(registry.get_format("a/2"), None);
        assert_eq!(registry.get_format("a/1"), Some(1));
        assert_eq!(registry.get_format("a/3"), Some(3));
    }

    #[test]
    fn eviction_cascades_to_aliases_and_factories() {
        let registry = FormatRegistry::new(config(1));
        registry.set_format("a/1", 1).unwrap();
        registry.set_factory("a/1", 100).unwrap();
        registry.set_alias("a/one", "a/1").unwrap();

        registry.set_format("a/2", 2).unwrap();

        assert_eq!(registry.get_format("a/1"), None);
        assert_eq!(registry.get_factory("a/1"), None);
        assert_eq!(registry.resolve_alias("a/one"), "a/one");
    }

    #[test]
    fn resolve_alias_falls_back_to_stripped_input() {
        let registry: FormatRegistry<String> = FormatRegistry::new(config(0));
        assert_eq!(registry.resolve_alias("Text/Plain; charset=utf-8"), "text/plain");
    }

    #[test]
    fn closed_registry_rejects_writes() {
        let registry = FormatRegistry::new(config(0));
        registry.close();
        assert!(registry.set_format("a/1", 1).is_err());
    }

    #[test]
    fn memory_pressure_level_three_forces_eviction_toward_double_capacity() {
        let registry = FormatRegistry::new(config(2));
        for i in 0..10 {
            registry.set_format(&format!("a/{i}", i = i), i).unwrap();
        }
        registry.adapt_to_memory_pressure(3);
        assert!(registry.format_count() <= 4);
    }
}
