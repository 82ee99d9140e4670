//! Registry of symbols the compiled code resolves at run time.
//!
//! Every `Resolve*` and `Unresolved*` instruction reads its target from a slot of a
//! per-method table that the runtime patches on first execution. The builder registers
//! the slots here; code generation later assigns them addresses.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use strum::{Display, EnumIter};

use crate::runtime::MethodPtr;

/// What a table slot resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum SlotKind {
    /// Entry point of a static method
    Method,
    /// Vtable index of a virtual method
    VirtualMethod,
    /// Offset or address of a field
    Field,
    /// Class pointer
    Class,
    /// Managed class object, as loaded by `lda.type`
    ManagedClass,
}

/// Concurrent table of runtime-resolution slots.
///
/// Slots are keyed by the method being compiled, the symbol id and the slot kind, so a
/// symbol referenced several times from the same method occupies one slot.
#[derive(Debug, Default)]
pub struct UnresolvedTypes {
    slots: DashMap<(MethodPtr, u32, SlotKind), usize>,
    next: AtomicUsize,
}

impl UnresolvedTypes {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a slot and returns its index. Registering an existing slot returns the
    /// index it already has.
    pub fn add_table_slot(&self, method: MethodPtr, id: u32, kind: SlotKind) -> usize {
        let slot = *self
            .slots
            .entry((method, id, kind))
            .or_insert_with(|| self.next.fetch_add(1, Ordering::Relaxed));
        log::debug!("table slot {slot} for {kind} {id} of {method}");
        slot
    }

    /// Looks up the slot of a symbol.
    #[must_use]
    pub fn table_slot(&self, method: MethodPtr, id: u32, kind: SlotKind) -> Option<usize> {
        self.slots.get(&(method, id, kind)).map(|slot| *slot)
    }

    /// All slots registered for `method`, sorted by slot index.
    #[must_use]
    pub fn slots_of(&self, method: MethodPtr) -> Vec<(u32, SlotKind, usize)> {
        let mut slots: Vec<(u32, SlotKind, usize)> = self
            .slots
            .iter()
            .filter(|entry| entry.key().0 == method)
            .map(|entry| (entry.key().1, entry.key().2, *entry.value()))
            .collect();
        slots.sort_by_key(|&(_, _, slot)| slot);
        slots
    }

    /// Number of registered slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slot has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
