//! Caching policy enforcer provider
//!
//! Wraps a [`PolicyEnforcerLoader`] with an LRU cache whose entries expire
//! after a TTL. Absence is cached as well, so a deleted policy does not send
//! every signal to the loader. Loader failures are never cached.
//!
//! Invalidation bumps a generation counter; a load that started before the
//! bump returns its result to its caller but does not cache it. Concurrent
//! misses for the same policy are not coalesced and each reach the loader.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;
use twin_telemetry::metrics::ENFORCER_CACHE;
use twin_types::PolicyId;

use crate::domain::{EnforcementConfig, PolicyEnforcer};
use crate::error::{ConfigError, StageResult};
use crate::ports::{PolicyEnforcerLoader, PolicyEnforcerProvider};

#[derive(Clone)]
struct CacheEntry {
    enforcer: Option<PolicyEnforcer>,
    loaded_at: Instant,
}

struct Cache {
    entries: LruCache<PolicyId, CacheEntry>,
    generation: u64,
}

/// LRU + TTL cache in front of a loader.
pub struct CachingPolicyEnforcerProvider<L> {
    loader: L,
    cache: Mutex<Cache>,
    ttl: Duration,
}

impl<L: PolicyEnforcerLoader> CachingPolicyEnforcerProvider<L> {
    pub fn new(loader: L, capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            loader,
            cache: Mutex::new(Cache {
                entries: LruCache::new(capacity),
                generation: 0,
            }),
            ttl,
        }
    }

    pub fn from_config(loader: L, config: &EnforcementConfig) -> Result<Self, ConfigError> {
        let capacity = NonZeroUsize::new(config.enforcer_cache_capacity).ok_or(ConfigError::Zero {
            field: "enforcer_cache_capacity",
        })?;
        Ok(Self::new(loader, capacity, config.enforcer_cache_ttl))
    }

    /// Drop the cached entry for `policy_id`, e.g. after the policy changed.
    /// Loads already in flight for it are not cached.
    pub fn invalidate(&self, policy_id: &PolicyId) {
        let mut cache = self.cache.lock();
        cache.generation += 1;
        if cache.entries.pop(policy_id).is_some() {
            debug!(%policy_id, "Invalidated cached policy enforcer");
        }
    }

    pub fn invalidate_all(&self) {
        let mut cache = self.cache.lock();
        cache.generation += 1;
        cache.entries.clear();
    }

    /// Number of cached entries, expired ones included.
    pub fn len(&self) -> usize {
        self.cache.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Ok(entry)` on a fresh hit, otherwise the generation to load under.
    /// Expired entries are evicted.
    fn lookup(&self, policy_id: &PolicyId) -> Result<Option<PolicyEnforcer>, u64> {
        let mut cache = self.cache.lock();
        let generation = cache.generation;
        let fresh = match cache.entries.get(policy_id) {
            Some(entry) if entry.loaded_at.elapsed() < self.ttl => Some(entry.enforcer.clone()),
            Some(_) => None,
            None => {
                ENFORCER_CACHE.with_label_values(&["miss"]).inc();
                return Err(generation);
            }
        };
        match fresh {
            Some(enforcer) => {
                ENFORCER_CACHE.with_label_values(&["hit"]).inc();
                Ok(enforcer)
            }
            None => {
                cache.entries.pop(policy_id);
                ENFORCER_CACHE.with_label_values(&["expired"]).inc();
                Err(generation)
            }
        }
    }
}

#[async_trait]
impl<L: PolicyEnforcerLoader> PolicyEnforcerProvider for CachingPolicyEnforcerProvider<L> {
    async fn get_policy_enforcer(&self, policy_id: &PolicyId) -> StageResult<Option<PolicyEnforcer>> {
        let generation = match self.lookup(policy_id) {
            Ok(cached) => return Ok(cached),
            Err(generation) => generation,
        };

        let enforcer = self.loader.load(policy_id).await?;
        debug!(
            %policy_id,
            present = enforcer.is_some(),
            "Loaded policy enforcer"
        );
        let mut cache = self.cache.lock();
        if cache.generation == generation {
            cache.entries.put(
                policy_id.clone(),
                CacheEntry {
                    enforcer: enforcer.clone(),
                    loaded_at: Instant::now(),
                },
            );
        } else {
            debug!(%policy_id, "Invalidated while loading, not cached");
        }
        Ok(enforcer)
    }
}
