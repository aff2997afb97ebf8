use std::fmt::Display;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ahash::RandomState;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::clock::LogicalClock;
use crate::config::{ConfigError, WorkloadConfig};
use crate::transaction::{
    Claimable, LockableItem, ManagerRegistry, RegistryError, TransactionManager, TxnGuard, TxnStats,
};
use crate::types::ItemId;

pub const PAYLOAD_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("bad workload config: {0}")]
    Config(#[from] ConfigError),
    #[error("could not set up transaction managers: {0}")]
    Registry(#[from] RegistryError),
}

/// A record with a payload that gets overwritten in full by every transaction holding it.
///
/// The bytes are atomics only so two threads scribbling over the same item at once is a detectable
/// race instead of undefined behaviour. Each byte is written independently, so an unprotected
/// concurrent update shows up as a payload that matches neither writer.
pub struct TestItem {
    lock: LockableItem,
    payload: [AtomicU8; PAYLOAD_SIZE],
}

impl Claimable for TestItem {
    fn lockable(&self) -> &LockableItem {
        &self.lock
    }
}

impl TestItem {
    pub fn new(id: ItemId) -> Self {
        Self { lock: LockableItem::new(id), payload: std::array::from_fn(|_| AtomicU8::new(0)) }
    }

    pub fn snapshot(&self) -> [u8; PAYLOAD_SIZE] {
        std::array::from_fn(|i| self.payload[i].load(Ordering::Relaxed))
    }

    /// Overwrites the payload with no locking at all. Returns true if a race was detected.
    pub fn singlethreaded_update<R: Rng>(&self, rng: &mut R, hasher: &RandomState) -> bool {
        let raced = self.overwrite(rng, hasher);
        if raced {
            error!("ST RACE FOUND! {}", self.lock.id());
        }
        raced
    }

    /// Same as `singlethreaded_update` but inside a transaction that must hold this item.
    pub fn transactional_update<R: Rng>(
        &self,
        tx: &TxnGuard<'_, '_>,
        rng: &mut R,
        hasher: &RandomState,
    ) -> bool {
        let mut raced = !tx.holds(self);
        if raced {
            error!("{} updating {} without holding it", tx.id(), self.lock.id());
        }
        if self.overwrite(rng, hasher) {
            error!("TX RACE FOUND! ids: {} {} at {}", tx.id(), self.lock.id(), tx.tx_timestamp());
            raced = true;
        }
        raced
    }

    fn overwrite<R: Rng>(&self, rng: &mut R, hasher: &RandomState) -> bool {
        let mut local = [0u8; PAYLOAD_SIZE];
        for (slot, shared) in local.iter_mut().zip(self.payload.iter()) {
            let c = rng.gen_range(0..=127u8);
            *slot = c;
            shared.store(c, Ordering::Relaxed);
        }
        hash_bytes(hasher, &self.snapshot()) != hash_bytes(hasher, &local)
    }
}

fn hash_bytes(hasher: &RandomState, bytes: &[u8]) -> u64 {
    let mut state = hasher.build_hasher();
    bytes.hash(&mut state);
    state.finish()
}

#[derive(Debug, Clone, Default)]
pub struct WorkloadReport {
    pub threads: u16,
    pub committed: u64,
    pub aborted: u64,
    pub races: u64,
    pub stats: TxnStats,
    pub elapsed: Duration,
}

impl Display for WorkloadReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "threads: {} committed: {} aborted: {} (stale: {}, eager: {}) waits: {} races: {} \
             in {:?}",
            self.threads,
            self.committed,
            self.aborted,
            self.stats.stale_aborts,
            self.stats.eager_aborts,
            self.stats.waits,
            self.races,
            self.elapsed
        )
    }
}

struct ThreadOutcome {
    stats: TxnStats,
    races: u64,
}

/// Builds a pool of `n_items` test items and lets `n_threads` managers hammer it with
/// all-or-nothing updates over random subsets. Aborted transactions are not retried.
pub fn run_workload(
    config: &WorkloadConfig,
    clock: Arc<dyn LogicalClock>,
) -> Result<WorkloadReport, WorkloadError> {
    config.validate()?;
    info!(
        "starting threads: {} items: {} transactions: {} refs: {}",
        config.n_threads, config.n_items, config.transactions_per_thread, config.max_refs
    );
    let items: Vec<TestItem> =
        (0..config.n_items).map(|_| TestItem::new(clock.next_item_id())).collect();
    let registry = Arc::new(ManagerRegistry::new(config.n_threads)?);
    // Register everything before spawning so running out of slots is an error, not a worker panic
    let managers = (0..config.n_threads)
        .map(|_| TransactionManager::new(registry.clone(), clock.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let started = Instant::now();
    let outcomes: Vec<ThreadOutcome> = thread::scope(|s| {
        let handles: Vec<_> = managers
            .into_iter()
            .enumerate()
            .map(|(i, tx)| {
                let items = &items;
                let rng = match config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                    None => StdRng::from_entropy(),
                };
                s.spawn(move || run_thread(tx, items, config, rng))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    let mut report = WorkloadReport {
        threads: config.n_threads,
        elapsed: started.elapsed(),
        ..Default::default()
    };
    for outcome in outcomes {
        report.stats += outcome.stats;
        report.races += outcome.races;
    }
    report.committed = report.stats.commits;
    report.aborted = report.stats.rollbacks;
    info!("joined, {}", report);
    Ok(report)
}

fn run_thread<'a>(
    mut tx: TransactionManager<'a>,
    items: &'a [TestItem],
    config: &WorkloadConfig,
    mut rng: StdRng,
) -> ThreadOutcome {
    let hasher = RandomState::with_seeds(5432123, 456532, 123454321, 424242);
    let mut indices: Vec<usize> = Vec::with_capacity(config.max_refs);
    let mut races = 0;

    for _ in 0..config.transactions_per_thread {
        // Duplicates are fine, a repeated acquire of the same item just succeeds
        let refs_count = rng.gen_range(1..=config.max_refs);
        indices.clear();
        indices.extend((0..refs_count).map(|_| rng.gen_range(0..items.len())));

        let mut guard = tx.scope();
        if guard.acquire_all(indices.iter().map(move |&i| &items[i])) {
            for &i in &indices {
                if items[i].transactional_update(&guard, &mut rng, &hasher) {
                    races += 1;
                }
            }
            guard.commit();
        } else {
            guard.rollback();
        }
    }
    debug!("{} done: {:?}", tx.id(), tx.stats());
    ThreadOutcome { stats: tx.stats(), races }
}

#[cfg(test)]
mod tests {
    use crate::clock::AtomicClock;

    use super::*;

    fn seeded(
        n_threads: u16,
        n_items: usize,
        transactions_per_thread: usize,
        max_refs: usize,
    ) -> WorkloadConfig {
        WorkloadConfig {
            n_threads,
            n_items,
            transactions_per_thread,
            max_refs,
            seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn single_threaded_update_never_races() {
        let item = TestItem::new(ItemId(1));
        let hasher = RandomState::with_seeds(1, 2, 3, 4);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(!item.singlethreaded_update(&mut rng, &hasher));
        }
        assert!(item.snapshot().iter().all(|&c| c <= 127));
    }

    #[test]
    fn update_without_holding_is_flagged() {
        let registry = Arc::new(ManagerRegistry::new(1).unwrap());
        let clock: Arc<dyn LogicalClock> = Arc::new(AtomicClock::new());
        let item = TestItem::new(ItemId(1));
        let other = TestItem::new(ItemId(2));
        let hasher = RandomState::with_seeds(1, 2, 3, 4);
        let mut rng = StdRng::seed_from_u64(7);
        let mut tx = TransactionManager::new(registry, clock).unwrap();
        let mut guard = tx.scope();
        assert!(guard.acquire(&item));
        assert!(!item.transactional_update(&guard, &mut rng, &hasher));
        assert!(other.transactional_update(&guard, &mut rng, &hasher));
        guard.commit();
    }

    #[test]
    fn single_thread_workload_commits_everything() {
        let clock: Arc<dyn LogicalClock> = Arc::new(AtomicClock::new());
        let report = run_workload(&seeded(1, 100, 200, 10), clock).unwrap();
        // Alone there's nobody to conflict with
        assert_eq!(report.committed, 200);
        assert_eq!(report.aborted, 0);
        assert_eq!(report.races, 0);
        assert_eq!(report.stats.waits, 0);
    }

    #[test]
    fn contended_workload_has_no_lost_updates() {
        // Few items, many refs per transaction, lots of contention
        let clock: Arc<dyn LogicalClock> = Arc::new(AtomicClock::new());
        let config = seeded(8, 64, 2_000, 8);
        let report = run_workload(&config, clock).unwrap();
        assert_eq!(report.races, 0);
        assert_eq!(report.committed + report.aborted, 8 * 2_000);
        assert!(report.committed > 0);
    }

    #[test]
    fn default_sized_workload_has_no_races() {
        let clock: Arc<dyn LogicalClock> = Arc::new(AtomicClock::new());
        let report = run_workload(&seeded(4, 10_000, 100, 50), clock).unwrap();
        assert_eq!(report.races, 0);
        assert_eq!(report.committed + report.aborted, 400);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let clock: Arc<dyn LogicalClock> = Arc::new(AtomicClock::new());
        let result = run_workload(&seeded(0, 10, 10, 1), clock);
        assert!(matches!(result, Err(WorkloadError::Config(ConfigError::OutOfRange { .. }))));
    }
}
