//! In-process execution substrate: regions, tasks, phase barriers, and the
//! per-partition [`Context`] every operation takes explicitly.

pub mod config;
pub mod phase_barrier;
pub mod region;
pub mod task;
pub mod world;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::ThreadPool;

use crate::algs::collective::{CollectiveRegistry, DynColl, ReduceOp, Reducible};
use crate::halo_error::HaloError;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::region::Element;
use crate::runtime::task::{TaskHandle, TaskLauncher};

/// Execution context of one partition.
///
/// Carries the partition's identity, the shared task pool, the runtime
/// configuration and the collective registry. There is no global runtime:
/// every operation receives the context it runs in.
pub struct Context {
    partition: usize,
    num_partitions: usize,
    pool: Arc<ThreadPool>,
    config: Arc<RuntimeConfig>,
    collectives: CollectiveRegistry,
    tasks_issued: AtomicU64,
}

impl Context {
    pub(crate) fn new(
        partition: usize,
        num_partitions: usize,
        pool: Arc<ThreadPool>,
        config: Arc<RuntimeConfig>,
        collectives: CollectiveRegistry,
    ) -> Self {
        Self {
            partition,
            num_partitions,
            pool,
            config,
            collectives,
            tasks_issued: AtomicU64::new(0),
        }
    }

    /// Context for a world of one partition.
    pub fn standalone(config: RuntimeConfig) -> Result<Self, HaloError> {
        let pool = Arc::new(config.build_pool()?);
        Ok(Self::new(
            0,
            1,
            pool,
            Arc::new(config),
            CollectiveRegistry::new(1),
        ))
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Issue `launcher` without blocking.
    pub fn execute_task<T: Element>(&self, launcher: TaskLauncher<T>) -> TaskHandle {
        self.tasks_issued.fetch_add(1, Ordering::Relaxed);
        launcher.launch(Arc::clone(&self.pool))
    }

    /// Number of tasks this partition has issued so far.
    pub fn tasks_issued(&self) -> u64 {
        self.tasks_issued.load(Ordering::Relaxed)
    }

    /// This partition's handle on the collective for `(op, T)`.
    pub fn collective<T: Reducible>(&self, op: ReduceOp) -> DynColl<T> {
        self.collectives.handle(op, self.partition)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("partition", &self.partition)
            .field("num_partitions", &self.num_partitions)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}
