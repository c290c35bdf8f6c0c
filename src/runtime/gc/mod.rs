//! Garbage collector
//!
//! Mark-and-sweep over a typed [`Heap`]. Roots are host objects implementing
//! [`Trace`]; they report the cells they hold to a [`Tracer`].
//!
//! Stores of young cells into an owner go through a [`WriteBarrier`], which
//! records the owner in a remembered set. A minor collection traces only
//! remembered owners and frees only young cells: an owner that stored nothing
//! since the last collection can only hold cells that survived it.

use std::fmt;
use std::time::{Duration, Instant};

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::memory::{CellId, Gc, Heap};

/// Identity of an object that owns traced references (a code block, a closure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OwnerId(u32);

impl OwnerId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Visitor the collector hands to roots during a mark pass
pub trait Tracer {
    /// Report one reachable cell
    fn visit(
        &mut self,
        cell: CellId,
    );
}

/// Something that holds references into the heap
pub trait Trace {
    /// Owner identity used to consult the remembered set.
    ///
    /// Roots without an owner are traced by every collection.
    fn owner(&self) -> Option<OwnerId> {
        None
    }

    /// Report every held reference to `tracer`. Must not mutate `self`.
    fn trace(
        &self,
        tracer: &mut dyn Tracer,
    );
}

/// Hook run whenever an owner stores a heap reference
pub trait WriteBarrier {
    fn record_write(
        &mut self,
        owner: OwnerId,
        target: CellId,
    );
}

/// A heap reference stored inside an owner
///
/// The only constructor runs the write barrier, so every stored reference is
/// known to the collector before the next mark pass.
pub struct TracedRef<T> {
    target: Gc<T>,
    owner: OwnerId,
}

impl<T> TracedRef<T> {
    pub fn new<B: WriteBarrier + ?Sized>(
        barrier: &mut B,
        owner: OwnerId,
        target: Gc<T>,
    ) -> Self {
        barrier.record_write(owner, target.cell());
        Self { target, owner }
    }

    #[inline]
    pub fn get(&self) -> Gc<T> {
        self.target
    }

    #[inline]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Report the target to `tracer`
    #[inline]
    pub fn trace(
        &self,
        tracer: &mut dyn Tracer,
    ) {
        tracer.visit(self.target.cell());
    }
}

impl<T> fmt::Debug for TracedRef<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TracedRef")
            .field("target", &self.target)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Tracer that records marked cells
#[derive(Debug, Default)]
pub struct MarkTracer {
    marked: HashSet<CellId>,
    visits: usize,
}

impl MarkTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_marked(
        &self,
        cell: CellId,
    ) -> bool {
        self.marked.contains(&cell)
    }

    /// Distinct cells marked
    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    /// Total `visit` calls, duplicates included
    pub fn visits(&self) -> usize {
        self.visits
    }
}

impl Tracer for MarkTracer {
    fn visit(
        &mut self,
        cell: CellId,
    ) {
        self.visits += 1;
        self.marked.insert(cell);
    }
}

/// GC configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCConfig {
    /// Allocations between automatic minor collections
    #[serde(default = "default_collection_threshold")]
    pub collection_threshold: usize,
    /// Pauses longer than this are reported
    #[serde(default = "default_max_pause_ms")]
    pub max_pause_ms: u64,
}

fn default_collection_threshold() -> usize {
    256
}

fn default_max_pause_ms() -> u64 {
    10
}

impl Default for GCConfig {
    fn default() -> Self {
        Self {
            collection_threshold: default_collection_threshold(),
            max_pause_ms: default_max_pause_ms(),
        }
    }
}

/// GC state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GCState {
    Idle,
    Marking,
    Sweeping,
}

/// Collection scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CollectionKind {
    /// Remembered owners only, young cells only
    Minor,
    /// Every root, every cell
    Full,
}

impl fmt::Display for CollectionKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            CollectionKind::Minor => write!(f, "minor"),
            CollectionKind::Full => write!(f, "full"),
        }
    }
}

/// Outcome of one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectStats {
    pub kind: CollectionKind,
    /// Roots whose `trace` was called
    pub traced_roots: usize,
    /// Roots skipped by a minor collection because they were not remembered
    pub skipped_roots: usize,
    pub marked: usize,
    pub freed: usize,
    pub promoted: usize,
    /// Live cells after the sweep
    pub live: usize,
    pub pause: Duration,
}

/// GC errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    #[error("stale reference to {0}")]
    StaleReference(CellId),
}

/// Garbage collector
#[derive(Debug)]
pub struct GC<T> {
    /// Configuration
    config: GCConfig,
    /// State
    state: GCState,
    /// Heap
    heap: Heap<T>,
    /// Owners that stored a young cell since the last collection
    remembered: HashSet<OwnerId>,
    allocated_since_collect: usize,
    collections: usize,
    /// Pause time tracking
    total_pause: Duration,
    last_pause: Duration,
}

impl<T> GC<T> {
    /// Create a new GC
    pub fn new(config: GCConfig) -> Self {
        Self {
            config,
            state: GCState::Idle,
            heap: Heap::new(),
            remembered: HashSet::new(),
            allocated_since_collect: 0,
            collections: 0,
            total_pause: Duration::ZERO,
            last_pause: Duration::ZERO,
        }
    }

    /// Allocate a young cell
    pub fn alloc(
        &mut self,
        value: T,
    ) -> Gc<T> {
        self.allocated_since_collect += 1;
        self.heap.alloc(value)
    }

    /// Borrow a cell, failing if it has been collected
    pub fn get(
        &self,
        handle: Gc<T>,
    ) -> Result<&T, GcError> {
        self.heap
            .get(handle.cell())
            .ok_or(GcError::StaleReference(handle.cell()))
    }

    pub fn is_live(
        &self,
        handle: Gc<T>,
    ) -> bool {
        self.heap.contains(handle.cell())
    }

    /// Whether the cell has survived a collection
    pub fn is_old(
        &self,
        handle: Gc<T>,
    ) -> bool {
        self.heap.is_old(handle.cell())
    }

    /// Number of live cells
    pub fn live_cells(&self) -> usize {
        self.heap.len()
    }

    /// Check if collection is needed
    pub fn should_collect(&self) -> bool {
        self.allocated_since_collect >= self.config.collection_threshold
    }

    pub fn is_remembered(
        &self,
        owner: OwnerId,
    ) -> bool {
        self.remembered.contains(&owner)
    }

    pub fn remembered_owners(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.remembered.iter().copied()
    }

    /// Run one collection over `roots`
    ///
    /// Roots are borrowed immutably for the whole mark pass, so nothing they
    /// own can change while they are being traced.
    pub fn collect(
        &mut self,
        kind: CollectionKind,
        roots: &[&dyn Trace],
    ) -> CollectStats {
        let start = Instant::now();

        self.state = GCState::Marking;
        let mut tracer = MarkTracer::new();
        let mut traced_roots = 0;
        let mut skipped_roots = 0;
        for root in roots {
            if kind == CollectionKind::Minor {
                if let Some(owner) = root.owner() {
                    if !self.remembered.contains(&owner) {
                        skipped_roots += 1;
                        continue;
                    }
                }
            }
            root.trace(&mut tracer);
            traced_roots += 1;
        }

        self.state = GCState::Sweeping;
        let cells: Vec<CellId> = self.heap.live_cells().collect();
        let mut freed = 0;
        let mut promoted = 0;
        for cell in cells {
            if tracer.is_marked(cell) {
                if self.heap.promote(cell) {
                    promoted += 1;
                }
            } else if kind == CollectionKind::Full || !self.heap.is_old(cell) {
                self.heap.free(cell);
                freed += 1;
                trace!("freed {}", cell);
            }
        }

        self.state = GCState::Idle;
        self.remembered.clear();
        self.allocated_since_collect = 0;
        self.collections += 1;

        let pause = start.elapsed();
        self.last_pause = pause;
        self.total_pause += pause;
        if pause > Duration::from_millis(self.config.max_pause_ms) {
            warn!(
                "{} collection paused for {:?} (limit {}ms)",
                kind, pause, self.config.max_pause_ms
            );
        }

        let stats = CollectStats {
            kind,
            traced_roots,
            skipped_roots,
            marked: tracer.marked_count(),
            freed,
            promoted,
            live: self.heap.len(),
            pause,
        };
        debug!(
            kind = %kind,
            traced = stats.traced_roots,
            skipped = stats.skipped_roots,
            freed = stats.freed,
            live = stats.live,
            "collection finished"
        );
        stats
    }

    pub fn state(&self) -> GCState {
        self.state
    }

    pub fn config(&self) -> &GCConfig {
        &self.config
    }

    /// Collections run so far
    pub fn collections(&self) -> usize {
        self.collections
    }

    /// Get total pause time
    pub fn total_pause(&self) -> Duration {
        self.total_pause
    }

    /// Get last pause time
    pub fn last_pause(&self) -> Duration {
        self.last_pause
    }
}

impl<T> WriteBarrier for GC<T> {
    fn record_write(
        &mut self,
        owner: OwnerId,
        target: CellId,
    ) {
        // Old targets survive minor collections anyway
        if self.heap.contains(target) && !self.heap.is_old(target) {
            self.remembered.insert(owner);
            trace!("{} remembered for {}", owner, target);
        }
    }
}

impl<T> Default for GC<T> {
    fn default() -> Self {
        Self::new(GCConfig::default())
    }
}
