//! Synthetic eval workload
//!
//! Drives an [`Agent`] with random (source, call site) pairs so cache
//! behavior can be observed from the command line and in benchmarks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, warn};

use crate::runtime::agent::{Agent, AgentError};
use crate::runtime::eval::{
    BasicCompiler, BindingKind, CallSiteIndex, EvalCacheStats, EvalFlags, LexicalScope, SourceText,
};
use crate::runtime::gc::{CollectStats, CollectionKind};
use crate::util::config::RuntimeConfig;

/// Shape of a workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOptions {
    /// Distinct call sites in the code block
    pub call_sites: u32,
    /// Distinct source strings
    pub sources: usize,
    pub iterations: usize,
    pub seed: u64,
    /// Run a full collection every this many evals, 0 to rely on the threshold only
    pub collect_every: usize,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            call_sites: 8,
            sources: 16,
            iterations: 10_000,
            seed: 0,
            collect_every: 0,
        }
    }
}

/// What a workload did to the cache and the heap
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationReport {
    pub iterations: usize,
    pub failed_evals: usize,
    pub compilations: usize,
    pub cache: EvalCacheStats,
    pub cached_entries: usize,
    pub minor_collections: usize,
    pub full_collections: usize,
    pub freed: usize,
    pub live_cells: usize,
}

impl SimulationReport {
    fn record(
        &mut self,
        stats: &CollectStats,
    ) {
        match stats.kind {
            CollectionKind::Minor => self.minor_collections += 1,
            CollectionKind::Full => self.full_collections += 1,
        }
        self.freed += stats.freed;
    }
}

/// Run a workload in a single code block
pub fn simulate(
    config: RuntimeConfig,
    options: &SimulationOptions,
) -> Result<SimulationReport, AgentError> {
    let mut agent = Agent::new(config, BasicCompiler::new());
    let main = agent.create_code_block("main");

    let scope = LexicalScope::new();
    scope.declare("pending", BindingKind::Let);
    scope.declare("ready", BindingKind::Const);
    scope.initialize("ready");

    let sources: Vec<SourceText> = (0..options.sources.max(1))
        .map(|i| SourceText::from(format!("ready + v{} * {}", i, i)))
        .collect();
    let call_sites = options.call_sites.max(1);
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut report = SimulationReport {
        iterations: options.iterations,
        ..SimulationReport::default()
    };

    for step in 1..=options.iterations {
        let site = CallSiteIndex::new(rng.random_range(0..call_sites));
        let source = &sources[rng.random_range(0..sources.len())];
        match agent.eval(main, source, site, EvalFlags::default(), &*scope) {
            Ok(_) => {}
            Err(AgentError::Compile(err)) => {
                report.failed_evals += 1;
                warn!("eval at {} failed: {}", site, err);
            }
            Err(err) => return Err(err),
        }

        if options.collect_every > 0 && step % options.collect_every == 0 {
            report.record(&agent.collect_garbage(CollectionKind::Full));
        } else if let Some(stats) = agent.collect_if_needed() {
            report.record(&stats);
        }
    }

    report.compilations = agent.compiler().compilations();
    report.cache = agent.cache_stats();
    report.cached_entries = agent
        .code_block(main)
        .map_or(0, |block| block.eval_cache().len());
    report.live_cells = agent.heap().live_cells();
    debug!(
        hits = report.cache.hits,
        misses = report.cache.misses,
        "simulation finished"
    );
    Ok(report)
}
