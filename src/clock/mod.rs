use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::types::{ItemId, Timestamp, TxId};

/// Source of transaction ids, timestamps and item ids.
///
/// Every counter must hand out unique, strictly increasing values (per counter) no matter how many
/// threads pull from it. The lock protocol relies on timestamps never tying: two transactions with
/// the same timestamp can wait on each other forever.
#[cfg_attr(test, mockall::automock)]
pub trait LogicalClock: Send + Sync {
    fn next_tx_id(&self) -> TxId;
    fn next_timestamp(&self) -> Timestamp;
    fn next_item_id(&self) -> ItemId;
}

/// The normal clock. Each counter is one `fetch_add`, so it's wait-free.
/// The first value of every counter is 1, which keeps 0 free for "never begun" / "never claimed".
pub struct AtomicClock {
    tx_ids: AtomicU64,
    timestamps: AtomicU64,
    item_ids: AtomicU64,
}

impl AtomicClock {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// The first timestamp issued will be `last_issued + 1`.
    pub fn starting_at(last_issued: u64) -> Self {
        Self {
            tx_ids: AtomicU64::new(0),
            timestamps: AtomicU64::new(last_issued),
            item_ids: AtomicU64::new(0),
        }
    }
}

impl Default for AtomicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LogicalClock for AtomicClock {
    fn next_tx_id(&self) -> TxId {
        TxId(self.tx_ids.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn next_timestamp(&self) -> Timestamp {
        // A single RMW location has a total modification order, Relaxed is enough for uniqueness.
        Timestamp(self.timestamps.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn next_item_id(&self) -> ItemId {
        ItemId(self.item_ids.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Hands out a fixed list of timestamps first, then keeps counting up from the largest one it has
/// seen. Meant for tests that need "transaction A has timestamp 5, B has 3".
///
/// Nothing stops a script from containing duplicates or going backwards. That's on purpose for
/// tests, but a script with ties can deadlock two contending managers.
pub struct ScriptedClock {
    script: Mutex<VecDeque<u64>>,
    fallback: AtomicU64,
    ids: AtomicClock,
}

impl ScriptedClock {
    pub fn new<I: IntoIterator<Item = u64>>(timestamps: I) -> Self {
        let script: VecDeque<u64> = timestamps.into_iter().collect();
        let max = script.iter().copied().max().unwrap_or(0);
        Self {
            script: Mutex::new(script),
            fallback: AtomicU64::new(max),
            ids: AtomicClock::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl LogicalClock for ScriptedClock {
    fn next_tx_id(&self) -> TxId {
        self.ids.next_tx_id()
    }

    fn next_timestamp(&self) -> Timestamp {
        match self.script.lock().pop_front() {
            Some(ts) => Timestamp(ts),
            None => Timestamp(self.fallback.fetch_add(1, Ordering::Relaxed) + 1),
        }
    }

    fn next_item_id(&self) -> ItemId {
        self.ids.next_item_id()
    }
}
