//! Eval 代码缓存
//!
//! Bounded memoization of compiled eval code, keyed by (source, call site).
//!
//! - Lookups never compile and never mutate.
//! - A miss compiles first and only then checks capacity, so a failing
//!   compile leaves the cache untouched and a full cache never blocks
//!   execution.
//! - Once full the cache stops inserting. Nothing is evicted; the owner
//!   clears the whole cache when it discards its compiled code.
//! - Every stored unit is reported to the collector on each mark pass.

use hashbrown::HashMap;
use serde::Serialize;
use tracing::{debug, trace};

use super::compiler::{CompileError, CompileParams, CompileRequest, EvalCompiler};
use super::key::CacheKey;
use super::scope::VariableEnvironment;
use crate::runtime::gc::{TracedRef, Tracer, GC};
use crate::runtime::memory::Gc;

/// Entries a cache holds unless configured otherwise
pub const DEFAULT_CAPACITY: usize = 64;

/// Counters kept by [`EvalCodeCache::get_or_compile`] and [`EvalCodeCache::clear`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvalCacheStats {
    pub hits: usize,
    pub misses: usize,
    pub insertions: usize,
    /// Successful compiles not stored because the cache was full
    pub skipped_insertions: usize,
    pub compile_failures: usize,
    pub clears: usize,
}

impl EvalCacheStats {
    /// Hit rate in percent
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Add another cache's counters to these
    pub fn merge(
        &mut self,
        other: &EvalCacheStats,
    ) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.insertions += other.insertions;
        self.skipped_insertions += other.skipped_insertions;
        self.compile_failures += other.compile_failures;
        self.clears += other.clears;
    }
}

/// Per-owner cache of compiled eval units
#[derive(Debug)]
pub struct EvalCodeCache<T> {
    entries: HashMap<CacheKey, TracedRef<T>>,
    capacity: usize,
    stats: EvalCacheStats,
}

impl<T> EvalCodeCache<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            stats: EvalCacheStats::default(),
        }
    }

    /// Look up a cached unit without compiling
    pub fn try_get(
        &self,
        key: &CacheKey,
    ) -> Option<Gc<T>> {
        self.entries.get(key).map(TracedRef::get)
    }

    /// Return the cached unit for `key`, compiling it on a miss
    ///
    /// The freshly compiled unit is returned whether or not there was room
    /// to cache it. Compile errors are passed through and never cached.
    pub fn get_or_compile<C>(
        &mut self,
        heap: &mut GC<T>,
        compiler: &mut C,
        key: CacheKey,
        params: &CompileParams<'_>,
    ) -> Result<Gc<T>, CompileError>
    where
        C: EvalCompiler<T> + ?Sized,
    {
        if let Some(unit) = self.try_get(&key) {
            self.stats.hits += 1;
            trace!("eval cache hit for {}", key);
            return Ok(unit);
        }
        self.stats.misses += 1;

        let mut variables_under_tdz = VariableEnvironment::new();
        params
            .scope
            .collect_variables_under_tdz(&mut variables_under_tdz);

        let request = CompileRequest {
            source: key.source(),
            call_site: key.call_site(),
            flags: params.flags,
            variables_under_tdz: &variables_under_tdz,
            owner: params.owner,
        };
        let unit = match compiler.compile(heap, &request) {
            Ok(unit) => unit,
            Err(err) => {
                self.stats.compile_failures += 1;
                debug!("eval compile failed for {}: {}", key, err);
                return Err(err);
            }
        };

        if self.entries.len() < self.capacity {
            trace!("caching eval {} as {:?}", key, unit);
            let slot = TracedRef::new(heap, params.owner, unit);
            self.entries.insert(key, slot);
            self.stats.insertions += 1;
        } else {
            self.stats.skipped_insertions += 1;
            debug!(capacity = self.capacity, "eval cache full, not caching {}", key);
        }

        Ok(unit)
    }

    pub fn contains(
        &self,
        key: &CacheKey,
    ) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn stats(&self) -> &EvalCacheStats {
        &self.stats
    }

    /// Drop every entry at once
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!("clearing {} cached eval units", self.entries.len());
        }
        self.entries.clear();
        self.stats.clears += 1;
    }

    /// Report every cached unit to `tracer`, once each
    pub fn trace_for_gc(
        &self,
        tracer: &mut dyn Tracer,
    ) {
        for slot in self.entries.values() {
            slot.trace(tracer);
        }
    }

    /// Cached keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> + '_ {
        self.entries.keys()
    }
}

impl<T> Default for EvalCodeCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
