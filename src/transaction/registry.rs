use parking_lot::{const_mutex, Condvar, Mutex};
use thiserror::Error;

use crate::types::{OwnerTag, Timestamp};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("all {capacity} transaction manager slots are in use")]
    Exhausted { capacity: usize },
    #[error("too many live manager registries (at most {max})")]
    TooManyRegistries { max: usize },
}

/// Ids of live registries. An item can only carry the tag of a live manager, and a manager keeps
/// its registry alive, so ids of dropped registries can be handed out again.
struct RegistryIds {
    next: u16,
    free: Vec<u16>,
}

static REGISTRY_IDS: Mutex<RegistryIds> = const_mutex(RegistryIds { next: 1, free: Vec::new() });

fn allocate_registry_id() -> Result<u16, RegistryError> {
    let mut ids = REGISTRY_IDS.lock();
    if let Some(id) = ids.free.pop() {
        return Ok(id);
    }
    // 0 stays reserved for the empty tag
    if ids.next == 0 {
        return Err(RegistryError::TooManyRegistries { max: u16::MAX as usize });
    }
    let id = ids.next;
    ids.next = ids.next.wrapping_add(1);
    Ok(id)
}

fn release_registry_id(id: u16) {
    REGISTRY_IDS.lock().free.push(id);
}

/// What a contender needs to see of another manager. Everything in here is only touched
/// under the slot's mutex.
#[derive(Debug, Default)]
pub(super) struct SlotState {
    pub(super) timestamp: Timestamp,
    pub(super) generation: u32,
}

/// The wait queue of one transaction manager: its mutex, its condition variable and the bits of its
/// state that others are allowed to read.
pub(super) struct ManagerSlot {
    pub(super) state: Mutex<SlotState>,
    pub(super) released: Condvar,
}

impl ManagerSlot {
    fn new() -> Self {
        Self { state: Mutex::new(SlotState::default()), released: Condvar::new() }
    }
}

impl SlotState {
    /// Moves the slot to a new logical transaction and returns the tag records will carry while
    /// that transaction owns them. The generation survives unregister/register, so a manager
    /// that reuses a slot can never produce a tag a waiter has seen before (modulo 2^32 wraps).
    pub(super) fn advance(&mut self, registry: u16, slot: u16, timestamp: Timestamp) -> OwnerTag {
        self.generation = self.generation.wrapping_add(1).max(1);
        self.timestamp = timestamp;
        OwnerTag::new(registry, slot, self.generation)
    }
}

/// Fixed-size arena of manager slots. Owner tags stored in records carry the registry id next to
/// the slot index, so a manager can tell an item held through another registry apart from one it
/// holds itself. Contending across registries is refused though: managers only ever wait on
/// managers of their own registry.
pub struct ManagerRegistry {
    id: u16,
    slots: Box<[ManagerSlot]>,
    free: Mutex<Vec<u16>>,
}

impl ManagerRegistry {
    pub fn new(capacity: u16) -> Result<Self, RegistryError> {
        let id = allocate_registry_id()?;
        let slots: Vec<ManagerSlot> = (0..capacity).map(|_| ManagerSlot::new()).collect();
        // Hand out low indices first, purely so logs are easier to read
        let free = (0..capacity).rev().collect();
        Ok(Self { id, slots: slots.into_boxed_slice(), free: Mutex::new(free) })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.lock().len()
    }

    pub(super) fn register(&self) -> Result<u16, RegistryError> {
        self.free.lock().pop().ok_or(RegistryError::Exhausted { capacity: self.slots.len() })
    }

    pub(super) fn unregister(&self, slot: u16) {
        let mut free = self.free.lock();
        debug_assert!(!free.contains(&slot), "slot {} unregistered twice", slot);
        free.push(slot);
    }

    pub(super) fn owns(&self, tag: OwnerTag) -> bool {
        tag.registry() == self.id && (tag.slot() as usize) < self.slots.len()
    }

    pub(super) fn slot(&self, slot: u16) -> &ManagerSlot {
        &self.slots[slot as usize]
    }
}

impl Drop for ManagerRegistry {
    fn drop(&mut self) {
        release_registry_id(self.id);
    }
}
