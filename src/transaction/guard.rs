use crate::types::{Timestamp, TxId};

use super::item::Claimable;
use super::manager::TransactionManager;

/// One logical transaction on a borrowed manager. Rolls back on drop unless `commit` was called, so
/// an early return after a failed `acquire` can't leave items claimed.
pub struct TxnGuard<'m, 'a> {
    manager: &'m mut TransactionManager<'a>,
    finished: bool,
}

impl<'a> TransactionManager<'a> {
    /// `begin` plus a guard that takes care of the rollback.
    pub fn scope(&mut self) -> TxnGuard<'_, 'a> {
        self.begin();
        TxnGuard { manager: self, finished: false }
    }
}

impl<'m, 'a> TxnGuard<'m, 'a> {
    pub fn acquire<C: Claimable + ?Sized>(&mut self, item: &'a C) -> bool {
        self.manager.acquire(item)
    }

    pub fn acquire_all<C, I>(&mut self, items: I) -> bool
    where
        C: Claimable + ?Sized + 'a,
        I: IntoIterator<Item = &'a C>,
    {
        self.manager.acquire_all(items)
    }

    pub fn holds<C: Claimable + ?Sized>(&self, item: &C) -> bool {
        self.manager.holds(item)
    }

    pub fn id(&self) -> TxId {
        self.manager.id()
    }

    pub fn tx_timestamp(&self) -> Timestamp {
        self.manager.tx_timestamp()
    }

    pub fn commit(mut self) {
        self.finished = true;
        self.manager.commit();
    }

    pub fn rollback(mut self) {
        self.finished = true;
        self.manager.rollback();
    }
}

impl Drop for TxnGuard<'_, '_> {
    fn drop(&mut self) {
        if !self.finished {
            self.manager.rollback();
        }
    }
}
