//! Execution agent
//!
//! Ties one heap, one compiler and the live code blocks together. Code blocks
//! are the collector's roots; the agent decides when their eval caches are
//! dropped.

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info};

use super::code_block::CodeBlock;
use super::eval::{
    CallSiteIndex, CompileError, EvalCacheStats, EvalCompiler, EvalExecutable, EvalFlags, Scope,
    SourceText,
};
use super::gc::{CollectStats, CollectionKind, GcError, OwnerId, Trace, GC};
use super::memory::Gc;
use crate::util::config::RuntimeConfig;

/// Agent errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("unknown code block {0}")]
    UnknownCodeBlock(OwnerId),
}

/// Runtime state for evaluating code
///
/// Handles returned by [`Agent::eval`] stay valid across collections only
/// while the unit sits in its code block's eval cache.
#[derive(Debug)]
pub struct Agent<C> {
    config: RuntimeConfig,
    heap: GC<EvalExecutable>,
    code_blocks: IndexMap<OwnerId, CodeBlock<EvalExecutable>>,
    compiler: C,
    next_owner: u32,
}

impl<C> Agent<C>
where
    C: EvalCompiler<EvalExecutable>,
{
    pub fn new(
        config: RuntimeConfig,
        compiler: C,
    ) -> Self {
        let heap = GC::new(config.gc.clone());
        Self {
            config,
            heap,
            code_blocks: IndexMap::new(),
            compiler,
            next_owner: 0,
        }
    }

    /// Register a new code block with an empty eval cache
    pub fn create_code_block(
        &mut self,
        name: impl Into<String>,
    ) -> OwnerId {
        let id = OwnerId::new(self.next_owner);
        self.next_owner += 1;
        let block = CodeBlock::new(id, name, self.config.eval_cache.capacity);
        debug!("created code block {} ({})", block.name(), id);
        self.code_blocks.insert(id, block);
        id
    }

    /// Drop a code block. Its cached units become garbage.
    pub fn destroy_code_block(
        &mut self,
        id: OwnerId,
    ) -> bool {
        self.code_blocks.shift_remove(&id).is_some()
    }

    pub fn code_block(
        &self,
        id: OwnerId,
    ) -> Option<&CodeBlock<EvalExecutable>> {
        self.code_blocks.get(&id)
    }

    pub fn code_blocks(&self) -> impl Iterator<Item = &CodeBlock<EvalExecutable>> + '_ {
        self.code_blocks.values()
    }

    /// Run a direct eval inside code block `owner`
    pub fn eval(
        &mut self,
        owner: OwnerId,
        source: impl Into<SourceText>,
        call_site: CallSiteIndex,
        flags: EvalFlags,
        scope: &dyn Scope,
    ) -> Result<Gc<EvalExecutable>, AgentError> {
        let block = self
            .code_blocks
            .get_mut(&owner)
            .ok_or(AgentError::UnknownCodeBlock(owner))?;
        let unit = block.eval(
            &mut self.heap,
            &mut self.compiler,
            source,
            call_site,
            flags,
            scope,
        )?;
        Ok(unit)
    }

    pub fn executable(
        &self,
        unit: Gc<EvalExecutable>,
    ) -> Result<&EvalExecutable, GcError> {
        self.heap.get(unit)
    }

    pub fn heap(&self) -> &GC<EvalExecutable> {
        &self.heap
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Counters of every live code block's eval cache, summed
    pub fn cache_stats(&self) -> EvalCacheStats {
        let mut total = EvalCacheStats::default();
        for block in self.code_blocks.values() {
            total.merge(block.eval_cache().stats());
        }
        total
    }

    /// Run a collection with every code block as a root
    pub fn collect_garbage(
        &mut self,
        kind: CollectionKind,
    ) -> CollectStats {
        if kind == CollectionKind::Full && self.config.eval_cache.clear_on_full_collection {
            for block in self.code_blocks.values_mut() {
                block.clear_eval_cache();
            }
        }

        let roots: Vec<&dyn Trace> = self
            .code_blocks
            .values()
            .map(|block| block as &dyn Trace)
            .collect();
        let stats = self.heap.collect(kind, &roots);
        info!(
            "{} collection: {} freed, {} live",
            stats.kind, stats.freed, stats.live
        );
        stats
    }

    /// Minor collection once the allocation threshold is crossed
    pub fn collect_if_needed(&mut self) -> Option<CollectStats> {
        if self.heap.should_collect() {
            Some(self.collect_garbage(CollectionKind::Minor))
        } else {
            None
        }
    }
}
