//! Eval 缓存单元测试
//!
//! 使用计数编译器替身验证缓存的命中、容量与 GC 追踪行为


use crate::runtime::eval::{
    CacheKey, CallSiteIndex, CompileError, CompileParams, CompileRequest, EmptyScope,
    EvalCodeCache, EvalCompiler, EvalFlags, Scope,
};
use crate::runtime::gc::{OwnerId, Tracer, GC};
use crate::runtime::memory::{CellId, Gc};
use crate::util::span::Position;

const OWNER: OwnerId = OwnerId::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestUnit {
    source: String,
    call_site: u32,
    tdz: Vec<String>,
    flags: EvalFlags,
}

/// Compiler double that counts invocations and rejects sources containing `@`
#[derive(Debug, Default)]
struct CountingCompiler {
    calls: usize,
}

impl EvalCompiler<TestUnit> for CountingCompiler {
    fn compile(
        &mut self,
        heap: &mut GC<TestUnit>,
        request: &CompileRequest<'_>,
    ) -> Result<Gc<TestUnit>, CompileError> {
        self.calls += 1;
        if let Some(column) = request.source.as_str().find('@') {
            return Err(CompileError::syntax(
                "unexpected '@'",
                Position::new(1, column + 1),
            ));
        }
        Ok(heap.alloc(TestUnit {
            source: request.source.to_string(),
            call_site: request.call_site.bits(),
            tdz: request
                .variables_under_tdz
                .iter()
                .map(str::to_string)
                .collect(),
            flags: request.flags,
        }))
    }
}

#[derive(Debug, Default)]
struct RecordingTracer {
    visited: Vec<CellId>,
}

impl Tracer for RecordingTracer {
    fn visit(
        &mut self,
        cell: CellId,
    ) {
        self.visited.push(cell);
    }
}

fn key(
    source: &str,
    site: u32,
) -> CacheKey {
    CacheKey::new(source, CallSiteIndex::new(site))
}

struct Fixture {
    heap: GC<TestUnit>,
    compiler: CountingCompiler,
    cache: EvalCodeCache<TestUnit>,
}

impl Fixture {
    fn new(capacity: usize) -> Self {
        Self {
            heap: GC::default(),
            compiler: CountingCompiler::default(),
            cache: EvalCodeCache::with_capacity(capacity),
        }
    }

    fn eval_in(
        &mut self,
        key: CacheKey,
        flags: EvalFlags,
        scope: &dyn Scope,
    ) -> Result<Gc<TestUnit>, CompileError> {
        let params = CompileParams::new(OWNER, flags, scope);
        self.cache
            .get_or_compile(&mut self.heap, &mut self.compiler, key, &params)
    }

    fn eval(
        &mut self,
        source: &str,
        site: u32,
    ) -> Result<Gc<TestUnit>, CompileError> {
        self.eval_in(key(source, site), EvalFlags::default(), &EmptyScope)
    }

    fn traced(&self) -> Vec<CellId> {
        let mut tracer = RecordingTracer::default();
        self.cache.trace_for_gc(&mut tracer);
        let mut visited = tracer.visited;
        visited.sort();
        visited
    }
}

#[cfg(test)]
mod lookup_tests {
    use super::*;

    #[test]
    fn test_try_get_misses_on_empty_cache() {
        let fixture = Fixture::new(4);
        assert!(fixture.cache.is_empty());
        assert_eq!(fixture.cache.try_get(&key("x+1", 0)), None);
        assert_eq!(fixture.cache.try_get(&key("", 0)), None);
    }

    #[test]
    fn test_second_call_is_served_from_cache() {
        let mut fixture = Fixture::new(4);
        let first = fixture.eval("x+1", 0).unwrap();
        let second = fixture.eval("x+1", 0).unwrap();

        assert_eq!(first, second);
        assert_eq!(fixture.compiler.calls, 1);
        assert_eq!(fixture.cache.try_get(&key("x+1", 0)), Some(first));
    }

    #[test]
    fn test_lookup_uses_content_not_identity() {
        let mut fixture = Fixture::new(4);
        let unit = fixture.eval("x+1", 0).unwrap();
        let rebuilt = CacheKey::new(String::from("x") + "+1", CallSiteIndex::new(0));
        assert_eq!(fixture.cache.try_get(&rebuilt), Some(unit));
    }

    #[test]
    fn test_same_site_different_source() {
        let mut fixture = Fixture::new(4);
        let a = fixture.eval("x+1", 0).unwrap();
        let b = fixture.eval("x+2", 0).unwrap();

        assert_ne!(a, b);
        assert_eq!(fixture.cache.len(), 2);
        assert_eq!(fixture.cache.try_get(&key("x+1", 0)), Some(a));
        assert_eq!(fixture.cache.try_get(&key("x+2", 0)), Some(b));
    }

    #[test]
    fn test_same_source_different_site() {
        let mut fixture = Fixture::new(4);
        let a = fixture.eval("x+1", 0).unwrap();
        let b = fixture.eval("x+1", 1).unwrap();

        assert_ne!(a, b);
        assert_eq!(fixture.compiler.calls, 2);
        assert_eq!(fixture.cache.try_get(&key("x+1", 0)), Some(a));
        assert_eq!(fixture.cache.try_get(&key("x+1", 1)), Some(b));
        assert_eq!(fixture.heap.get(b).unwrap().call_site, 1);
    }

    #[test]
    fn test_colliding_hashes_stay_distinct() {
        let left = key("a", 0);
        let site = left.source().hash_value() ^ key("b", 0).source().hash_value();
        let right = key("b", site);
        assert_eq!(left.hash_value(), right.hash_value());
        assert_ne!(left, right);

        let mut fixture = Fixture::new(4);
        let a = fixture.eval("a", 0).unwrap();
        let b = fixture.eval("b", site).unwrap();
        assert_eq!(fixture.cache.try_get(&left), Some(a));
        assert_eq!(fixture.cache.try_get(&right), Some(b));
    }
}

#[cfg(test)]
mod capacity_tests {
    use super::*;

    #[test]
    fn test_overflow_compiles_but_does_not_insert() {
        const N: usize = 3;
        let mut fixture = Fixture::new(N);
        let stored: Vec<_> = (0..N)
            .map(|i| fixture.eval(&format!("v{}", i), 0).unwrap())
            .collect();
        assert!(fixture.cache.is_full());

        let overflow = fixture.eval("overflow", 0).unwrap();
        assert_eq!(fixture.compiler.calls, N + 1);
        assert_eq!(fixture.heap.get(overflow).unwrap().source, "overflow");
        assert_eq!(fixture.cache.try_get(&key("overflow", 0)), None);
        assert_eq!(fixture.cache.len(), N);

        for (i, unit) in stored.iter().enumerate() {
            assert_eq!(fixture.cache.try_get(&key(&format!("v{}", i), 0)), Some(*unit));
        }
    }

    #[test]
    fn test_overflow_recompiles_every_time() {
        let mut fixture = Fixture::new(1);
        fixture.eval("kept", 0).unwrap();
        let first = fixture.eval("extra", 0).unwrap();
        let second = fixture.eval("extra", 0).unwrap();

        assert_ne!(first, second);
        assert_eq!(fixture.compiler.calls, 3);
        assert_eq!(fixture.cache.stats().skipped_insertions, 2);
    }

    #[test]
    fn test_capacity_two_scenario() {
        let mut fixture = Fixture::new(2);
        let a = fixture.eval("x+1", 0).unwrap();
        let b = fixture.eval("x+1", 1).unwrap();
        fixture.eval("x+2", 0).unwrap();

        assert_eq!(fixture.cache.len(), 2);
        assert_eq!(fixture.cache.try_get(&key("x+1", 0)), Some(a));
        assert_eq!(fixture.cache.try_get(&key("x+1", 1)), Some(b));
        assert_eq!(fixture.cache.try_get(&key("x+2", 0)), None);

        let again = fixture.eval("x+2", 0);
        assert!(again.is_ok());
        assert_eq!(fixture.compiler.calls, 4);
        assert_eq!(fixture.cache.len(), 2);
        assert!(fixture.cache.contains(&key("x+1", 0)));
        assert!(fixture.cache.contains(&key("x+1", 1)));
        assert!(!fixture.cache.contains(&key("x+2", 0)));
    }

    #[test]
    fn test_zero_capacity_never_caches() {
        let mut fixture = Fixture::new(0);
        fixture.eval("x", 0).unwrap();
        fixture.eval("x", 0).unwrap();
        assert!(fixture.cache.is_empty());
        assert_eq!(fixture.compiler.calls, 2);
    }

    #[test]
    fn test_default_capacity() {
        let cache: EvalCodeCache<TestUnit> = EvalCodeCache::default();
        assert_eq!(cache.capacity(), crate::runtime::eval::DEFAULT_CAPACITY);
        assert_eq!(cache.capacity(), 64);
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[test]
    fn test_failed_compile_leaves_cache_unchanged() {
        let mut fixture = Fixture::new(4);
        let ok = fixture.eval("ok", 0).unwrap();

        let err = fixture.eval("bad @", 0).unwrap_err();
        assert_eq!(err.message(), "unexpected '@'");
        assert_eq!(err.position().column, 5);
        assert_eq!(fixture.cache.len(), 1);
        assert_eq!(fixture.cache.try_get(&key("ok", 0)), Some(ok));
        assert_eq!(fixture.cache.try_get(&key("bad @", 0)), None);
    }

    #[test]
    fn test_failures_are_not_memoized() {
        let mut fixture = Fixture::new(4);
        assert!(fixture.eval("@", 0).is_err());
        assert!(fixture.eval("@", 0).is_err());
        assert_eq!(fixture.compiler.calls, 2);
        assert_eq!(fixture.cache.stats().compile_failures, 2);
        assert!(fixture.cache.is_empty());
    }

    #[test]
    fn test_failure_on_full_cache() {
        let mut fixture = Fixture::new(1);
        fixture.eval("a", 0).unwrap();
        assert!(fixture.eval("@", 0).is_err());
        assert_eq!(fixture.cache.stats().skipped_insertions, 0);
        assert_eq!(fixture.cache.len(), 1);
    }
}

#[cfg(test)]
mod clear_tests {
    use super::*;

    #[test]
    fn test_clear_empties_cache() {
        let mut fixture = Fixture::new(4);
        fixture.eval("a", 0).unwrap();
        fixture.eval("b", 1).unwrap();

        fixture.cache.clear();
        assert!(fixture.cache.is_empty());
        assert_eq!(fixture.cache.try_get(&key("a", 0)), None);
        assert_eq!(fixture.cache.try_get(&key("b", 1)), None);
    }

    #[test]
    fn test_clear_on_empty_cache() {
        let mut fixture = Fixture::new(4);
        fixture.cache.clear();
        assert!(fixture.cache.is_empty());
        assert_eq!(fixture.cache.stats().clears, 1);
    }

    #[test]
    fn test_clear_reopens_full_cache() {
        let mut fixture = Fixture::new(1);
        fixture.eval("a", 0).unwrap();
        fixture.cache.clear();

        let b = fixture.eval("b", 0).unwrap();
        assert_eq!(fixture.cache.try_get(&key("b", 0)), Some(b));
        // Cleared entries compile again
        fixture.cache.clear();
        fixture.eval("a", 0).unwrap();
        assert_eq!(fixture.compiler.calls, 3);
    }
}

#[cfg(test)]
mod trace_tests {
    use super::*;

    #[test]
    fn test_trace_reports_each_entry_once() {
        let mut fixture = Fixture::new(4);
        let mut expected = vec![
            fixture.eval("a", 0).unwrap().cell(),
            fixture.eval("a", 1).unwrap().cell(),
            fixture.eval("b", 0).unwrap().cell(),
        ];
        // Hits must not add duplicate reports
        fixture.eval("a", 0).unwrap();
        expected.sort();

        assert_eq!(fixture.traced(), expected);
    }

    #[test]
    fn test_trace_skips_uncached_units() {
        let mut fixture = Fixture::new(1);
        let cached = fixture.eval("a", 0).unwrap();
        fixture.eval("b", 0).unwrap();
        assert_eq!(fixture.traced(), vec![cached.cell()]);
    }

    #[test]
    fn test_trace_after_clear_reports_nothing() {
        let mut fixture = Fixture::new(4);
        fixture.eval("a", 0).unwrap();
        fixture.cache.clear();
        assert!(fixture.traced().is_empty());

        let fresh = fixture.eval("c", 0).unwrap();
        assert_eq!(fixture.traced(), vec![fresh.cell()]);
    }

    #[test]
    fn test_trace_is_repeatable() {
        let mut fixture = Fixture::new(4);
        fixture.eval("a", 0).unwrap();
        assert_eq!(fixture.traced(), fixture.traced());
        assert_eq!(fixture.cache.len(), 1);
    }

    #[test]
    fn test_insertion_runs_write_barrier() {
        let mut fixture = Fixture::new(1);
        fixture.eval("a", 0).unwrap();
        assert!(fixture.heap.is_remembered(OWNER));
    }
}

#[cfg(test)]
mod params_tests {
    use super::*;
    use crate::runtime::eval::{BindingKind, DerivedContextType, EvalContextType, LexicalScope};

    #[test]
    fn test_tdz_set_reaches_compiler() {
        let scope = LexicalScope::new();
        scope.declare("pending", BindingKind::Let);
        scope.declare("ready", BindingKind::Const);
        scope.initialize("ready");

        let mut fixture = Fixture::new(4);
        let unit = fixture
            .eval_in(key("pending + ready", 0), EvalFlags::default(), &*scope)
            .unwrap();
        assert_eq!(fixture.heap.get(unit).unwrap().tdz, vec!["pending"]);
    }

    #[test]
    fn test_flags_reach_compiler() {
        let flags = EvalFlags {
            in_strict_context: true,
            derived_context_type: DerivedContextType::DerivedConstructorContext,
            is_arrow_function_context: true,
            eval_context_type: EvalContextType::FunctionEvalContext,
        };
        let mut fixture = Fixture::new(4);
        let unit = fixture.eval_in(key("x", 3), flags, &EmptyScope).unwrap();
        assert_eq!(fixture.heap.get(unit).unwrap().flags, flags);
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let mut fixture = Fixture::new(4);
        fixture.eval("a", 0).unwrap();
        fixture.eval("a", 0).unwrap();
        fixture.eval("a", 0).unwrap();
        fixture.eval("b", 0).unwrap();

        let stats = *fixture.cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.insertions, 2);
        assert!((stats.hit_rate() - 50.0).abs() < f64::EPSILON);

        // Lookups are not counted
        fixture.cache.try_get(&key("a", 0));
        assert_eq!(fixture.cache.stats().hits, 2);
    }
}
