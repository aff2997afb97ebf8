use std::ops::AddAssign;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::clock::LogicalClock;
use crate::types::{OwnerTag, Timestamp, TxId};

use super::item::{Claimable, LockableItem};
use super::registry::{ManagerRegistry, RegistryError};

// Most transactions touch way fewer items than this, saves some reallocation in the common case
const OWNED_RESERVE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Idle,
    Active,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnStats {
    pub commits: u64,
    pub rollbacks: u64,
    /// Number of acquires that had to block on another manager at least once.
    pub waits: u64,
    /// Holder was younger than us, gave up without waiting.
    pub eager_aborts: u64,
    /// Got the item but someone younger had already claimed it before.
    pub stale_aborts: u64,
}

impl AddAssign for TxnStats {
    fn add_assign(&mut self, other: Self) {
        self.commits += other.commits;
        self.rollbacks += other.rollbacks;
        self.waits += other.waits;
        self.eager_aborts += other.eager_aborts;
        self.stale_aborts += other.stale_aborts;
    }
}

/// One per thread. Runs any number of logical transactions one after the other:
/// `begin`, `acquire` everything the transaction is going to write, then `commit`, or `rollback`
/// as soon as an `acquire` returns false.
///
/// Only `acquire` can block, and only while another manager holds the item and is older than us.
/// If the holder is younger we'd fail the timestamp check on the item anyway once it's released,
/// so we abort right away instead of waiting for it. Since timestamps never tie, in every pair of
/// managers waiting on each other one of them aborts, which is why there's no deadlock detector.
pub struct TransactionManager<'a> {
    tx_id: TxId,
    slot: u16,
    tag: OwnerTag,
    tx_timestamp: Timestamp,
    state: TxnState,
    owned: Vec<&'a LockableItem>,
    registry: Arc<ManagerRegistry>,
    clock: Arc<dyn LogicalClock>,
    stats: TxnStats,
}

impl<'a> TransactionManager<'a> {
    pub fn new(
        registry: Arc<ManagerRegistry>,
        clock: Arc<dyn LogicalClock>,
    ) -> Result<Self, RegistryError> {
        let slot = registry.register()?;
        let tx_id = clock.next_tx_id();
        trace!("{} registered in slot {}", tx_id, slot);
        Ok(Self {
            tx_id,
            slot,
            tag: OwnerTag::EMPTY,
            tx_timestamp: Timestamp::ZERO,
            state: TxnState::Idle,
            owned: Vec::with_capacity(OWNED_RESERVE),
            registry,
            clock,
            stats: TxnStats::default(),
        })
    }

    pub fn id(&self) -> TxId {
        self.tx_id
    }

    pub fn tx_timestamp(&self) -> Timestamp {
        self.tx_timestamp
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn stats(&self) -> TxnStats {
        self.stats
    }

    pub fn owned_count(&self) -> usize {
        self.owned.len()
    }

    /// Whether the current logical transaction holds `item`.
    pub fn holds<C: Claimable + ?Sized>(&self, item: &C) -> bool {
        self.state == TxnState::Active && item.lockable().owner_tag() == self.tag
    }

    pub fn begin(&mut self) {
        if !self.owned.is_empty() {
            warn!(
                "{} begin while still holding {} items from {}, rolling back",
                self.tx_id,
                self.owned.len(),
                self.tx_timestamp
            );
            self.rollback();
        }
        let slot = self.registry.slot(self.slot);
        let mut state = slot.state.lock();
        let ts = self.clock.next_timestamp();
        self.tag = state.advance(self.registry.id(), self.slot, ts);
        self.tx_timestamp = ts;
        drop(state);
        self.state = TxnState::Active;
        trace!("{} begin at {} as {}", self.tx_id, ts, self.tag);
    }

    /// Tries to take `item` for the current transaction. `false` means the transaction is done for
    /// and `rollback` has to be called, also for the item this call just failed on, it may well be
    /// ours already.
    pub fn acquire<C: Claimable + ?Sized>(&mut self, item: &'a C) -> bool {
        let item = item.lockable();
        if self.state != TxnState::Active {
            warn!(
                "{} acquire of {} outside of a transaction ({:?})",
                self.tx_id,
                item.id(),
                self.state
            );
            return false;
        }
        loop {
            match item.try_claim(self.tag) {
                Ok(()) => {
                    self.owned.push(item);
                    let last = item.last_claim_timestamp();
                    if self.tx_timestamp > last {
                        item.stamp(self.tx_timestamp);
                        trace!("{} at {} acquired {}", self.tx_id, self.tx_timestamp, item.id());
                        return true;
                    }
                    // Someone younger claimed the item since we began
                    self.stats.stale_aborts += 1;
                    debug!(
                        "{} at {} too old for {} (last claimed at {})",
                        self.tx_id,
                        self.tx_timestamp,
                        item.id(),
                        last
                    );
                    return false;
                }
                Err(holder) if holder == self.tag => return true,
                Err(holder) if !self.registry.owns(holder) => {
                    // Nobody to wait on from here, and the holder's timestamp isn't ours to read
                    warn!(
                        "{} acquire of {} held by {} from another registry (ours is reg{})",
                        self.tx_id,
                        item.id(),
                        holder,
                        self.registry.id()
                    );
                    return false;
                }
                Err(holder) => {
                    if !self.wait_for_release(item, holder) {
                        return false;
                    }
                    // Released (or handed over), go back and race for it again
                }
            }
        }
    }

    /// Acquires `items` in order and stops at the first failure.
    pub fn acquire_all<C, I>(&mut self, items: I) -> bool
    where
        C: Claimable + ?Sized + 'a,
        I: IntoIterator<Item = &'a C>,
    {
        items.into_iter().all(|item| self.acquire(item))
    }

    /// Blocks on the holder's condition variable until `item` no longer carries `holder`.
    /// Returns false without blocking if the holder is younger than us.
    fn wait_for_release(&mut self, item: &LockableItem, holder: OwnerTag) -> bool {
        let slot = self.registry.slot(holder.slot());
        let mut state = slot.state.lock();
        let mut waited = false;
        // Comparing full tags, not just slots: if the holder commits and grabs the item again in a
        // new transaction before we wake up, the generation differs and we start over.
        while item.owner_tag() == holder {
            debug_assert_eq!(state.generation, holder.generation());
            if state.timestamp > self.tx_timestamp {
                self.stats.eager_aborts += 1;
                debug!(
                    "{} at {} gives up on {}, held by {} at {}",
                    self.tx_id, self.tx_timestamp, item.id(), holder, state.timestamp
                );
                return false;
            }
            if !waited {
                waited = true;
                self.stats.waits += 1;
                debug!(
                    "{} at {} waiting on {} for {}",
                    self.tx_id,
                    self.tx_timestamp,
                    holder,
                    item.id()
                );
            }
            slot.released.wait(&mut state);
        }
        true
    }

    pub fn commit(&mut self) {
        trace!("{} commit at {} ({} items)", self.tx_id, self.tx_timestamp, self.owned.len());
        self.release_all();
        self.stats.commits += 1;
        self.state = TxnState::Committed;
    }

    pub fn rollback(&mut self) {
        debug!("{} rollback at {} ({} items)", self.tx_id, self.tx_timestamp, self.owned.len());
        self.release_all();
        self.stats.rollbacks += 1;
        self.state = TxnState::Aborted;
    }

    fn release_all(&mut self) {
        let slot = self.registry.slot(self.slot);
        let state = slot.state.lock();
        while let Some(item) = self.owned.pop() {
            item.release(self.tag);
        }
        slot.released.notify_all();
        drop(state);
    }
}

impl Drop for TransactionManager<'_> {
    fn drop(&mut self) {
        if !self.owned.is_empty() {
            warn!("{} dropped while holding {} items", self.tx_id, self.owned.len());
            self.rollback();
        }
        self.registry.unregister(self.slot);
    }
}
