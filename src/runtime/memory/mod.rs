//! Typed cell heap
//!
//! Cells live in a slot arena. Every slot carries a generation counter that is
//! bumped when the slot is freed, so a handle to a reclaimed cell never aliases
//! whatever is allocated into the same slot afterwards.
//!
//! The heap itself knows nothing about reachability; [`crate::runtime::gc`]
//! decides which cells to free.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Untyped identity of a heap cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    index: u32,
    generation: u32,
}

impl CellId {
    /// Slot index in the arena
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this cell was allocated
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for CellId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "cell#{}@{}", self.index, self.generation)
    }
}

/// Typed handle to a cell in a [`Heap<T>`]
///
/// Handles are plain copyable identifiers. Holding one does not keep the cell
/// alive; only being reported to a tracer during a collection does.
pub struct Gc<T> {
    cell: CellId,
    marker: PhantomData<fn() -> T>,
}

impl<T> Gc<T> {
    #[inline]
    fn from_cell(cell: CellId) -> Self {
        Self {
            cell,
            marker: PhantomData,
        }
    }

    /// Untyped identity, as reported to tracers
    #[inline]
    pub fn cell(&self) -> CellId {
        self.cell
    }
}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Gc<T> {}

impl<T> PartialEq for Gc<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.cell == other.cell
    }
}

impl<T> Eq for Gc<T> {}

impl<T> Hash for Gc<T> {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.cell.hash(state);
    }
}

impl<T> fmt::Debug for Gc<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Gc({})", self.cell)
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    generation: u32,
    /// Survived at least one collection
    old: bool,
}

/// Slot arena holding cells of a single type
#[derive(Debug)]
pub struct Heap<T> {
    slots: Vec<Slot<T>>,
    /// Freed slot indices, reused LIFO
    free: Vec<u32>,
    live: usize,
}

impl<T> Heap<T> {
    /// Create an empty heap
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Allocate a new young cell
    pub fn alloc(
        &mut self,
        value: T,
    ) -> Gc<T> {
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            slot.old = false;
            return Gc::from_cell(CellId {
                index,
                generation: slot.generation,
            });
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            value: Some(value),
            generation: 0,
            old: false,
        });
        Gc::from_cell(CellId {
            index,
            generation: 0,
        })
    }

    fn slot(
        &self,
        cell: CellId,
    ) -> Option<&Slot<T>> {
        self.slots
            .get(cell.index as usize)
            .filter(|slot| slot.generation == cell.generation && slot.value.is_some())
    }

    fn slot_mut(
        &mut self,
        cell: CellId,
    ) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(cell.index as usize)
            .filter(|slot| slot.generation == cell.generation && slot.value.is_some())
    }

    /// Borrow a live cell, `None` if it was freed
    pub fn get(
        &self,
        cell: CellId,
    ) -> Option<&T> {
        self.slot(cell).and_then(|slot| slot.value.as_ref())
    }

    /// Check whether a cell is still live
    pub fn contains(
        &self,
        cell: CellId,
    ) -> bool {
        self.slot(cell).is_some()
    }

    /// Free a cell and return its value
    ///
    /// The slot's generation is bumped, invalidating every outstanding handle.
    pub fn free(
        &mut self,
        cell: CellId,
    ) -> Option<T> {
        let slot = self.slot_mut(cell)?;
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        slot.old = false;
        self.free.push(cell.index);
        self.live -= 1;
        value
    }

    /// Whether the cell has survived a collection
    pub fn is_old(
        &self,
        cell: CellId,
    ) -> bool {
        self.slot(cell).is_some_and(|slot| slot.old)
    }

    /// Move a live cell into the old generation
    ///
    /// Returns `true` if the cell was young before the call.
    pub fn promote(
        &mut self,
        cell: CellId,
    ) -> bool {
        match self.slot_mut(cell) {
            Some(slot) if !slot.old => {
                slot.old = true;
                true
            }
            _ => false,
        }
    }

    /// Identities of all live cells, in slot order
    pub fn live_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| CellId {
                index: index as u32,
                generation: slot.generation,
            })
    }

    /// Number of live cells
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if no cell is live
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever created, live or free
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<T> Default for Heap<T> {
    fn default() -> Self {
        Self::new()
    }
}
