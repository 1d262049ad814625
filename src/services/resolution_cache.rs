//! Three-tier component resolution cache.
//!
//! | Tier | Storage | Lifetime |
//! |------|---------|----------|
//! | L1 | in-process LRU | process |
//! | L2 | [`ResolutionStore`] (`SQLite`) | until the library fingerprint changes |
//! | L3 | [`ComponentLibrary`] | authoritative |
//!
//! A hit in a slower tier fills every faster one. Concurrent misses for the
//! same path share one library load. Tiers are written only after the load
//! succeeds, so an abandoned or failed resolution leaves nothing behind.
//!
//! Every [`TieredCache::invalidate_all`] starts a new generation. A load or
//! L2 read begun in an earlier generation is returned to its caller but
//! never written into a tier, and later callers never join its flight.

use lru::LruCache;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tracing::instrument;

use crate::library::ComponentLibrary;
use crate::models::ResolvedComponent;
use crate::storage::ResolutionStore;
use crate::{Error, Result};

/// Default L1 capacity.
pub const DEFAULT_L1_CAPACITY: usize = 100;

/// Which tier served a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// In-process LRU.
    L1,
    /// Persistent store.
    L2,
    /// Library load.
    L3,
}

impl CacheTier {
    /// Returns the tier as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::L3 => "l3",
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved component and the tier it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The component.
    pub component: Arc<ResolvedComponent>,
    /// Provenance.
    pub tier: CacheTier,
}

/// Counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// L1 hits.
    pub l1_hits: u64,
    /// L2 hits.
    pub l2_hits: u64,
    /// Library loads actually performed.
    pub l3_loads: u64,
    /// Resolutions that waited on another caller's library load.
    pub shared_loads: u64,
    /// L1/L2 failures that fell through to a slower tier.
    pub degraded: u64,
}

#[derive(Default)]
struct Counters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    l3_loads: AtomicU64,
    shared_loads: AtomicU64,
    degraded: AtomicU64,
}

type FlightResult = Result<Arc<ResolvedComponent>>;

struct Flight {
    generation: u64,
    result: Mutex<Option<FlightResult>>,
    done: Condvar,
}

impl Flight {
    const fn new(generation: u64) -> Self {
        Self {
            generation,
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, result: FlightResult) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.done.notify_all();
    }

    fn wait(&self) -> FlightResult {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self
                .done
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Removes the in-flight entry and wakes waiters, even if the leader unwinds.
struct FlightGuard<'a> {
    cache: &'a TieredCache,
    path: &'a str,
    flight: Arc<Flight>,
    completed: bool,
}

impl FlightGuard<'_> {
    fn finish(mut self, result: FlightResult) {
        self.flight.complete(result);
        self.completed = true;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.flight.complete(Err(Error::operation(
                "resolve",
                format!("resolution of {} was abandoned", self.path),
            )));
        }
        let mut in_flight = self
            .cache
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // A newer generation may have replaced this flight.
        if in_flight
            .get(self.path)
            .is_some_and(|current| Arc::ptr_eq(current, &self.flight))
        {
            in_flight.remove(self.path);
        }
    }
}

/// Three-tier resolution cache with single-flight library loads.
pub struct TieredCache {
    l1: Mutex<LruCache<String, Arc<ResolvedComponent>>>,
    l2: Option<Arc<dyn ResolutionStore>>,
    library: Arc<dyn ComponentLibrary>,
    in_flight: Mutex<HashMap<String, Arc<Flight>>>,
    generation: AtomicU64,
    /// Fills hold it shared; invalidation holds it exclusively.
    fills: RwLock<()>,
    counters: Counters,
}

impl TieredCache {
    /// Creates a cache with the default L1 capacity and no L2.
    #[must_use]
    pub fn new(library: Arc<dyn ComponentLibrary>) -> Self {
        Self::with_capacity(library, DEFAULT_L1_CAPACITY)
    }

    /// Creates a cache with an explicit L1 capacity (0 means the default).
    #[must_use]
    pub fn with_capacity(library: Arc<dyn ComponentLibrary>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_L1_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            l1: Mutex::new(LruCache::new(capacity)),
            l2: None,
            library,
            in_flight: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            fills: RwLock::new(()),
            counters: Counters::default(),
        }
    }

    /// Attaches the persistent tier.
    #[must_use]
    pub fn with_l2(mut self, store: Arc<dyn ResolutionStore>) -> Self {
        self.l2 = Some(store);
        self
    }

    /// Resolves a component path through L1, L2 and the library.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ComponentNotFound`] if the library cannot load the
    /// path. L1 and L2 failures never fail the call.
    #[instrument(skip(self), fields(tier = tracing::field::Empty))]
    pub fn resolve(&self, path: &str) -> Result<Resolution> {
        let start = Instant::now();
        let result = self.resolve_inner(path);

        let tier = match &result {
            Ok(r) => r.tier.as_str(),
            Err(_) => "error",
        };
        tracing::Span::current().record("tier", tier);
        metrics::counter!("cardsmith_cache_resolutions_total", "tier" => tier).increment(1);
        metrics::histogram!("cardsmith_cache_resolve_duration_ms", "tier" => tier)
            .record(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    fn resolve_inner(&self, path: &str) -> Result<Resolution> {
        let generation = self.generation.load(Ordering::SeqCst);
        if let Some(component) = self.l1_get(path) {
            self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Resolution {
                component,
                tier: CacheTier::L1,
            });
        }

        if let Some(component) = self.l2_get(path) {
            self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
            let component = Arc::new(component);
            self.fill(path, &component, generation, CacheTier::L1);
            return Ok(Resolution {
                component,
                tier: CacheTier::L2,
            });
        }

        self.load_single_flight(path, generation)
    }

    fn load_single_flight(&self, path: &str, generation: u64) -> Result<Resolution> {
        let (flight, leader) = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(path) {
                Some(existing) if existing.generation == generation => {
                    (Arc::clone(existing), false)
                },
                _ => {
                    let flight = Arc::new(Flight::new(generation));
                    in_flight.insert(path.to_string(), Arc::clone(&flight));
                    (flight, true)
                },
            }
        };

        if !leader {
            self.counters.shared_loads.fetch_add(1, Ordering::Relaxed);
            return flight.wait().map(|component| Resolution {
                component,
                tier: CacheTier::L3,
            });
        }

        let guard = FlightGuard {
            cache: self,
            path,
            flight,
            completed: false,
        };

        // A previous leader may have filled L1 between our miss and our
        // registration.
        if let Some(component) = self.l1_get(path) {
            self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
            guard.finish(Ok(Arc::clone(&component)));
            return Ok(Resolution {
                component,
                tier: CacheTier::L1,
            });
        }

        self.counters.l3_loads.fetch_add(1, Ordering::Relaxed);
        let loaded = self
            .library
            .resolve_from_library(path)
            .map(Arc::new)
            .map_err(|e| match e {
                Error::ComponentNotFound(_) => e,
                other => {
                    tracing::warn!(path, error = %other, "Library failed to load component");
                    Error::ComponentNotFound(path.to_string())
                },
            });

        if let Ok(component) = &loaded {
            self.fill(path, component, generation, CacheTier::L2);
        }
        guard.finish(loaded.clone());

        loaded.map(|component| Resolution {
            component,
            tier: CacheTier::L3,
        })
    }

    /// Writes a resolution into every tier up to and including `upto`,
    /// unless the cache was invalidated since `generation` was read.
    fn fill(&self, path: &str, component: &Arc<ResolvedComponent>, generation: u64, upto: CacheTier) {
        let _fill = self.fills.read().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(path, "Discarding resolution loaded before invalidation");
            return;
        }
        if upto == CacheTier::L2 {
            self.l2_put(path, component);
        }
        self.l1_put(path, component);
    }

    fn l1_lock(&self) -> Option<MutexGuard<'_, LruCache<String, Arc<ResolvedComponent>>>> {
        match self.l1.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                self.degrade(CacheTier::L1, "lock poisoned");
                None
            },
        }
    }

    fn l1_get(&self, path: &str) -> Option<Arc<ResolvedComponent>> {
        self.l1_lock()?.get(path).cloned()
    }

    fn l1_put(&self, path: &str, component: &Arc<ResolvedComponent>) {
        if let Some(mut l1) = self.l1_lock() {
            l1.put(path.to_string(), Arc::clone(component));
        }
    }

    fn l2_get(&self, path: &str) -> Option<ResolvedComponent> {
        let l2 = self.l2.as_ref()?;
        match l2.get(path) {
            Ok(found) => found,
            Err(e) => {
                self.degrade(CacheTier::L2, &e.to_string());
                None
            },
        }
    }

    fn l2_put(&self, path: &str, component: &ResolvedComponent) {
        if let Some(l2) = &self.l2
            && let Err(e) = l2.put(path, component)
        {
            self.degrade(CacheTier::L2, &e.to_string());
        }
    }

    fn degrade(&self, tier: CacheTier, cause: &str) {
        self.counters.degraded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cardsmith_cache_degraded_total", "tier" => tier.as_str()).increment(1);
        tracing::warn!(tier = tier.as_str(), cause, "Cache tier unavailable, falling through");
    }

    /// Drops every L1 entry and wholesale invalidates L2 for a new library.
    ///
    /// Loads still in flight finish for their callers but are not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if L2 cannot be cleared.
    #[instrument(skip(self))]
    pub fn invalidate_all(&self, fingerprint: &str) -> Result<()> {
        let _fills = self.fills.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.l1.lock().unwrap_or_else(PoisonError::into_inner).clear();
        if let Some(l2) = &self.l2 {
            l2.invalidate(fingerprint)?;
        }
        tracing::info!("Resolution cache invalidated");
        Ok(())
    }

    /// Invalidates only if L2 was filled from a different library.
    ///
    /// Returns true if the cache was invalidated.
    ///
    /// # Errors
    ///
    /// Returns an error if L2 cannot be read or cleared.
    pub fn reconcile(&self, fingerprint: &str) -> Result<bool> {
        let stale = match &self.l2 {
            Some(l2) => l2.fingerprint()?.as_deref() != Some(fingerprint),
            None => true,
        };
        if stale {
            self.invalidate_all(fingerprint)?;
        }
        Ok(stale)
    }

    /// Number of L1 entries.
    #[must_use]
    pub fn l1_len(&self) -> usize {
        self.l1.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            l3_loads: self.counters.l3_loads.load(Ordering::Relaxed),
            shared_loads: self.counters.shared_loads.load(Ordering::Relaxed),
            degraded: self.counters.degraded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::ComponentRegistry;
    use crate::models::ComponentDescriptor;
    use crate::storage::SqliteResolutionStore;
    use std::sync::atomic::AtomicUsize;

    struct CountingLibrary {
        inner: ComponentRegistry,
        calls: AtomicUsize,
    }

    impl ComponentLibrary for CountingLibrary {
        fn describe(&self) -> Result<Vec<ComponentDescriptor>> {
            self.inner.describe()
        }
        fn resolve_from_library(&self, path: &str) -> Result<ResolvedComponent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve_from_library(path)
        }
    }

    struct BrokenStore;

    impl ResolutionStore for BrokenStore {
        fn get(&self, _path: &str) -> Result<Option<ResolvedComponent>> {
            Err(Error::operation("l2_get", "disk I/O error"))
        }
        fn put(&self, _path: &str, _component: &ResolvedComponent) -> Result<()> {
            Err(Error::operation("l2_put", "disk I/O error"))
        }
        fn invalidate(&self, _fingerprint: &str) -> Result<()> {
            Ok(())
        }
        fn fingerprint(&self) -> Result<Option<String>> {
            Ok(None)
        }
        fn len(&self) -> Result<usize> {
            Ok(0)
        }
    }

    fn library() -> Arc<CountingLibrary> {
        let mut registry = ComponentRegistry::new();
        registry
            .register(ComponentDescriptor::class("card", "Button"))
            .unwrap();
        registry
            .register(ComponentDescriptor::class("card", "Image"))
            .unwrap();
        Arc::new(CountingLibrary {
            inner: registry,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_tiers_fill_on_the_way_back() {
        let lib = library();
        let l2 = Arc::new(SqliteResolutionStore::in_memory("fp1").unwrap());
        let cache = TieredCache::new(lib.clone()).with_l2(l2.clone());

        let first = cache.resolve("card.Button").unwrap();
        assert_eq!(first.tier, CacheTier::L3);
        assert_eq!(l2.len().unwrap(), 1);

        let second = cache.resolve("card.Button").unwrap();
        assert_eq!(second.tier, CacheTier::L1);
        assert_eq!(lib.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_l2_survives_a_new_process() {
        let lib = library();
        let l2 = Arc::new(SqliteResolutionStore::in_memory("fp1").unwrap());
        TieredCache::new(lib.clone())
            .with_l2(l2.clone())
            .resolve("card.Image")
            .unwrap();

        let fresh = TieredCache::new(lib.clone()).with_l2(l2);
        let hit = fresh.resolve("card.Image").unwrap();
        assert_eq!(hit.tier, CacheTier::L2);
        assert_eq!(fresh.resolve("card.Image").unwrap().tier, CacheTier::L1);
        assert_eq!(lib.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_path_writes_nothing() {
        let lib = library();
        let l2 = Arc::new(SqliteResolutionStore::in_memory("fp1").unwrap());
        let cache = TieredCache::new(lib).with_l2(l2.clone());

        let err = cache.resolve("card.Carousel").unwrap_err();
        assert!(matches!(err, Error::ComponentNotFound(_)));
        assert_eq!(cache.l1_len(), 0);
        assert!(l2.is_empty().unwrap());
    }

    #[test]
    fn test_broken_l2_degrades_to_library() {
        let lib = library();
        let cache = TieredCache::new(lib.clone()).with_l2(Arc::new(BrokenStore));

        let hit = cache.resolve("card.Button").unwrap();
        assert_eq!(hit.tier, CacheTier::L3);
        assert!(cache.stats().degraded >= 2);
        assert_eq!(cache.resolve("card.Button").unwrap().tier, CacheTier::L1);
    }

    #[test]
    fn test_l1_evicts_least_recent() {
        let lib = library();
        let cache = TieredCache::with_capacity(lib.clone(), 1);
        cache.resolve("card.Button").unwrap();
        cache.resolve("card.Image").unwrap();
        assert_eq!(cache.l1_len(), 1);
        assert_eq!(cache.resolve("card.Button").unwrap().tier, CacheTier::L3);
        assert_eq!(lib.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalidate_and_reconcile() {
        let lib = library();
        let l2 = Arc::new(SqliteResolutionStore::in_memory("fp1").unwrap());
        let cache = TieredCache::new(lib).with_l2(l2.clone());
        cache.resolve("card.Button").unwrap();

        assert!(!cache.reconcile("fp1").unwrap());
        assert_eq!(l2.len().unwrap(), 1);

        assert!(cache.reconcile("fp2").unwrap());
        assert_eq!(cache.l1_len(), 0);
        assert!(l2.is_empty().unwrap());
        assert_eq!(l2.fingerprint().unwrap().as_deref(), Some("fp2"));
    }

    /// Serves `card.Button` with docs naming the current version. The first
    /// load pauses between reading the version and returning.
    struct VersionedLibrary {
        version: AtomicUsize,
        hold: std::sync::atomic::AtomicBool,
        started: std::sync::Barrier,
        release: std::sync::Barrier,
    }

    impl ComponentLibrary for VersionedLibrary {
        fn describe(&self) -> Result<Vec<ComponentDescriptor>> {
            Ok(Vec::new())
        }
        fn resolve_from_library(&self, _path: &str) -> Result<ResolvedComponent> {
            let docs = format!("v{}", self.version.load(Ordering::SeqCst));
            if self.hold.swap(false, Ordering::SeqCst) {
                self.started.wait();
                self.release.wait();
            }
            let descriptor = ComponentDescriptor::class("card", "Button").with_docs(docs);
            Ok(ResolvedComponent::from(&descriptor))
        }
    }

    #[test]
    fn test_load_in_flight_during_invalidation_is_not_cached() {
        let lib = Arc::new(VersionedLibrary {
            version: AtomicUsize::new(1),
            hold: std::sync::atomic::AtomicBool::new(true),
            started: std::sync::Barrier::new(2),
            release: std::sync::Barrier::new(2),
        });
        let l2 = Arc::new(SqliteResolutionStore::in_memory("fp1").unwrap());
        let cache = TieredCache::new(lib.clone()).with_l2(l2.clone());

        std::thread::scope(|s| {
            let stale = s.spawn(|| cache.resolve("card.Button").unwrap());
            lib.started.wait();
            lib.version.store(2, Ordering::SeqCst);
            cache.invalidate_all("fp2").unwrap();

            // Arrives after invalidation, so it must not join the old flight.
            let fresh = s.spawn(|| cache.resolve("card.Button").unwrap());
            assert_eq!(fresh.join().unwrap().component.docs, "v2");
            lib.release.wait();
            assert_eq!(stale.join().unwrap().component.docs, "v1");
        });

        assert_eq!(cache.resolve("card.Button").unwrap().component.docs, "v2");
        assert_eq!(l2.get("card.Button").unwrap().unwrap().docs, "v2");
        let restarted = TieredCache::new(lib).with_l2(l2);
        let hit = restarted.resolve("card.Button").unwrap();
        assert_eq!(hit.tier, CacheTier::L2);
        assert_eq!(hit.component.docs, "v2");
    }

    #[test]
    fn test_concurrent_misses_share_one_load() {
        struct SlowLibrary {
            calls: AtomicUsize,
        }
        impl ComponentLibrary for SlowLibrary {
            fn describe(&self) -> Result<Vec<ComponentDescriptor>> {
                Ok(Vec::new())
            }
            fn resolve_from_library(&self, path: &str) -> Result<ResolvedComponent> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(50));
                let descriptor = ComponentDescriptor::class("card", "Button");
                assert_eq!(path, descriptor.path());
                Ok(ResolvedComponent::from(&descriptor))
            }
        }

        let lib = Arc::new(SlowLibrary {
            calls: AtomicUsize::new(0),
        });
        let cache = TieredCache::new(lib.clone());
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| cache.resolve("card.Button").unwrap());
            }
        });
        assert_eq!(lib.calls.load(Ordering::SeqCst), 1);
    }
}
