pub mod clock;
pub mod config;
pub mod transaction;
pub mod types;
pub mod workload;

pub use clock::{AtomicClock, LogicalClock, ScriptedClock};
pub use transaction::{Claimable, LockableItem, ManagerRegistry, TransactionManager, TxnGuard};
pub use types::{ItemId, Timestamp, TxId};
