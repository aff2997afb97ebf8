use atomic::{Atomic, Ordering};

use crate::clock::LogicalClock;
use crate::types::{ItemId, OwnerTag, Timestamp};

/// The part of a record the lock protocol cares about. Application records embed one of these and
/// implement [`Claimable`] to hand it out.
///
/// There is no lock in here. The owner slot is only ever changed by compare-and-swap (claim) or by
/// the current owner (release), and `last_claim` is only written by whoever currently owns the
/// item.
#[derive(Debug)]
pub struct LockableItem {
    id: ItemId,
    owner: Atomic<OwnerTag>,
    last_claim: Atomic<Timestamp>,
}

impl LockableItem {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            owner: Atomic::new(OwnerTag::EMPTY),
            last_claim: Atomic::new(Timestamp::ZERO),
        }
    }

    pub fn with_clock(clock: &dyn LogicalClock) -> Self {
        Self::new(clock.next_item_id())
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn last_claim_timestamp(&self) -> Timestamp {
        self.last_claim.load(Ordering::Acquire)
    }

    /// Racy by nature, only good for assertions and logging.
    pub fn is_claimed(&self) -> bool {
        !self.owner.load(Ordering::Acquire).is_empty()
    }

    pub(crate) fn owner_tag(&self) -> OwnerTag {
        self.owner.load(Ordering::Acquire)
    }

    /// Ok if the slot was empty and now holds `tag`, otherwise the tag that's in there.
    pub(crate) fn try_claim(&self, tag: OwnerTag) -> Result<(), OwnerTag> {
        self.owner
            .compare_exchange(OwnerTag::EMPTY, tag, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    pub(crate) fn release(&self, tag: OwnerTag) {
        debug_assert_eq!(self.owner_tag(), tag, "releasing {} which we don't own", self.id);
        self.owner.store(OwnerTag::EMPTY, Ordering::Release);
    }

    /// Only the owner calls this, and only with a timestamp larger than the current one.
    pub(crate) fn stamp(&self, ts: Timestamp) {
        debug_assert!(ts > self.last_claim_timestamp());
        self.last_claim.store(ts, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn with_last_claim(id: ItemId, ts: Timestamp) -> Self {
        let item = Self::new(id);
        item.last_claim.store(ts, Ordering::Relaxed);
        item
    }
}

/// Anything a [`TransactionManager`](super::TransactionManager) can acquire.
pub trait Claimable {
    fn lockable(&self) -> &LockableItem;

    fn id(&self) -> ItemId {
        self.lockable().id()
    }

    fn last_claim_timestamp(&self) -> Timestamp {
        self.lockable().last_claim_timestamp()
    }
}

impl Claimable for LockableItem {
    fn lockable(&self) -> &LockableItem {
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::AtomicClock;

    use super::*;

    #[test]
    fn fresh_item_is_unclaimed() {
        let item = LockableItem::new(ItemId(3));
        assert_eq!(item.id(), ItemId(3));
        assert_eq!(item.last_claim_timestamp(), Timestamp::ZERO);
        assert!(!item.is_claimed());
    }

    #[test]
    fn claim_is_exclusive() {
        let item = LockableItem::new(ItemId(1));
        let a = OwnerTag::new(1, 0, 1);
        let b = OwnerTag::new(1, 1, 1);
        assert!(item.try_claim(a).is_ok());
        assert_eq!(item.try_claim(b), Err(a));
        // Claiming again with the same tag also fails, the manager turns that into success
        assert_eq!(item.try_claim(a), Err(a));
        item.release(a);
        assert!(!item.is_claimed());
        assert!(item.try_claim(b).is_ok());
    }

    #[test]
    fn ids_come_from_the_clock() {
        let clock = AtomicClock::new();
        let first = LockableItem::with_clock(&clock);
        let second = LockableItem::with_clock(&clock);
        assert!(first.id() < second.id());
    }

    struct Account {
        lock: LockableItem,
        #[allow(dead_code)]
        balance: i64,
    }

    impl Claimable for Account {
        fn lockable(&self) -> &LockableItem {
            &self.lock
        }
    }

    #[test]
    fn composed_record_exposes_id_and_timestamp() {
        let account =
            Account { lock: LockableItem::with_last_claim(ItemId(9), Timestamp(4)), balance: 100 };
        assert_eq!(Claimable::id(&account), ItemId(9));
        assert_eq!(account.last_claim_timestamp(), Timestamp(4));
    }
}
