//! The keyed store holding in-flight and completed renders.
//!
//! The [`RendererImageProvider`](crate::provider::RendererImageProvider) only ever needs plain
//! `get` and `set` from its store: it serializes the lookup-or-create sequence for a key itself.
//! Capacity, expiration and any other eviction policy are entirely up to the store.

use std::hash::Hash;
use std::sync::Arc;

use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;

use crate::config::RenderCacheConfig;

/// A mapping from key to an in-flight or completed entry.
pub trait KeyedStore<K, V>: Send + Sync + 'static {
    /// Looks up the entry for `key`.
    fn get(&self, key: &K) -> Option<V>;

    /// Inserts or replaces the entry for `key`.
    fn set(&self, key: K, value: V);

    /// Removes the entry for `key`, if any.
    fn remove(&self, key: &K);

    /// The number of entries currently held.
    fn entry_count(&self) -> u64;
}

impl<K, V, S> KeyedStore<K, V> for Arc<S>
where
    S: KeyedStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn set(&self, key: K, value: V) {
        (**self).set(key, value)
    }

    fn remove(&self, key: &K) {
        (**self).remove(key)
    }

    fn entry_count(&self) -> u64 {
        (**self).entry_count()
    }
}

/// A bounded in-memory store, backed by a [`moka`] cache.
///
/// Entries are evicted when the store grows beyond its configured
/// [`in_memory_capacity`](RenderCacheConfig::in_memory_capacity), and optionally after their
/// [`time_to_live`](RenderCacheConfig::time_to_live) or
/// [`time_to_idle`](RenderCacheConfig::time_to_idle) passed.
pub struct MemoryStore<K, V> {
    cache: moka::sync::Cache<K, V>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &str, config: &RenderCacheConfig) -> Self {
        let cache_name = name.to_owned();
        let mut builder = moka::sync::Cache::builder()
            .name(name)
            .max_capacity(config.in_memory_capacity)
            // a new entry may be an in-flight render, it must never be rejected on admission
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |_key, _value, cause: RemovalCause| {
                // explicit removals and replacements are done by ourselves
                if !cause.was_evicted() {
                    return;
                }
                let cause = match cause {
                    RemovalCause::Expired => "expired",
                    _ => "size",
                };
                tracing::trace!(cache = %cache_name, cause, "Evicted render from memory");
                metric!(
                    counter("render.memory.evicted") += 1,
                    "cache" => &cache_name,
                    "cause" => cause,
                );
            });
        if let Some(ttl) = config.time_to_live {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        Self {
            cache: builder.build(),
        }
    }
}

impl<K, V> KeyedStore<K, V> for MemoryStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        self.cache.get(key)
    }

    fn set(&self, key: K, value: V) {
        self.cache.insert(key, value)
    }

    fn remove(&self, key: &K) {
        self.cache.invalidate(key)
    }

    fn entry_count(&self) -> u64 {
        // moka only updates its counters while doing its housekeeping
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl<K, V> std::fmt::Debug for MemoryStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.cache.name())
            .finish_non_exhaustive()
    }
}
