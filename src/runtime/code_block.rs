//! Code block
//!
//! A compiled function body that may contain direct eval calls. Each block
//! owns one eval cache and is the GC owner of everything that cache holds.

use tracing::debug;

use super::eval::{
    CacheKey, CallSiteIndex, CompileError, CompileParams, EvalCodeCache, EvalCompiler, EvalFlags,
    Scope, SourceText,
};
use super::gc::{OwnerId, Trace, Tracer, GC};
use super::memory::Gc;

/// Owner of an eval cache
#[derive(Debug)]
pub struct CodeBlock<T> {
    id: OwnerId,
    name: String,
    eval_cache: EvalCodeCache<T>,
}

impl<T> CodeBlock<T> {
    pub fn new(
        id: OwnerId,
        name: impl Into<String>,
        eval_cache_capacity: usize,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            eval_cache: EvalCodeCache::with_capacity(eval_cache_capacity),
        }
    }

    pub fn id(&self) -> OwnerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn eval_cache(&self) -> &EvalCodeCache<T> {
        &self.eval_cache
    }

    /// Resolve a direct eval at `call_site` to a compiled unit
    pub fn eval<C>(
        &mut self,
        heap: &mut GC<T>,
        compiler: &mut C,
        source: impl Into<SourceText>,
        call_site: CallSiteIndex,
        flags: EvalFlags,
        scope: &dyn Scope,
    ) -> Result<Gc<T>, CompileError>
    where
        C: EvalCompiler<T> + ?Sized,
    {
        let key = CacheKey::new(source, call_site);
        let params = CompileParams::new(self.id, flags, scope);
        self.eval_cache
            .get_or_compile(heap, compiler, key, &params)
    }

    /// Discard cached eval code, e.g. when the block's own code is jettisoned
    pub fn clear_eval_cache(&mut self) {
        debug!("{} ({}) dropping eval cache", self.name, self.id);
        self.eval_cache.clear();
    }
}

impl<T> Trace for CodeBlock<T> {
    fn owner(&self) -> Option<OwnerId> {
        Some(self.id)
    }

    fn trace(
        &self,
        tracer: &mut dyn Tracer,
    ) {
        self.eval_cache.trace_for_gc(tracer);
    }
}
