use std::fmt::Display;

// All three are plain u64 counters under the hood. Only Timestamp is ever used to order things,
// the ids are there so we have something to print.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct TxId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Timestamp(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct ItemId(pub u64);

impl Timestamp {
    /// Timestamp of a record nobody has claimed yet and of a manager that never called `begin`.
    pub const ZERO: Timestamp = Timestamp(0);
}

impl Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ts{}", self.0)
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// What actually sits in the owner slot of a record.
///
/// From the top: 16 bits registry id, 32 bits generation of the registry slot, 16 bits slot index.
/// Registry ids and generations both start at 1, so a packed value of 0 can never be a real owner
/// and is used as "nobody owns this". The registry id keeps slot 0 of one registry from looking
/// like slot 0 of another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct OwnerTag(u64);

impl OwnerTag {
    pub const EMPTY: OwnerTag = OwnerTag(0);

    pub(crate) fn new(registry: u16, slot: u16, generation: u32) -> Self {
        debug_assert!(registry != 0, "registry id 0 is reserved for the empty tag");
        debug_assert!(generation != 0, "generation 0 is reserved for the empty tag");
        Self(((registry as u64) << 48) | ((generation as u64) << 16) | slot as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn registry(&self) -> u16 {
        (self.0 >> 48) as u16
    }

    pub fn slot(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub fn generation(&self) -> u32 {
        ((self.0 >> 16) & 0xFFFF_FFFF) as u32
    }
}

impl Display for OwnerTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "<free>")
        } else {
            write!(f, "reg{}/slot{}@gen{}", self.registry(), self.slot(), self.generation())
        }
    }
}
