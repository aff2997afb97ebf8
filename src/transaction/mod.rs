
/*
    Timestamp ordered pessimistic locking for transactions that update several items at once.

    Every item has an owner slot and the timestamp of the last transaction that claimed it. A
    transaction has to claim every item it wants to write before it touches any of them. Claiming is
    a CAS on the owner slot. If the slot is taken we look at the holder: if it's younger than us we
    give up right away (we'd lose the timestamp check later anyway), otherwise we sleep on the
    holder's condition variable until it commits or rolls back. Since nothing is written before
    everything is claimed there is no undo log, rollback just releases.

    Owner slots hold a generation tagged index into a ManagerRegistry, not a pointer to the manager.
    The tag also carries the registry id, so managers of different registries never mistake each
    other for themselves. The generation is bumped on every begin, so a waiter can tell "the same
    manager holds it again in a new transaction" apart from "still the transaction I was waiting
    for".
 */

mod guard;
mod item;
mod manager;
mod registry;

pub use guard::TxnGuard;
pub use item::{Claimable, LockableItem};
pub use manager::{TransactionManager, TxnState, TxnStats};
pub use registry::{ManagerRegistry, RegistryError};
