//! Collective reductions of one scalar per partition.
//!
//! Handles are long-lived: a [`CollectiveRegistry`] keeps one shared
//! rendezvous per `(operator, element type)` and hands every partition a cheap
//! [`DynColl`] onto it. Contributions are combined in partition-id order, so a
//! fixed partitioning always produces the same bits.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use num_traits::Zero;
use parking_lot::{Condvar, Mutex};

use crate::runtime::region::Element;

/// Scalars that can be combined across partitions.
pub trait Reducible: Element + PartialOrd + Zero {}
impl<T: Element + PartialOrd + Zero> Reducible for T {}

/// Reduction operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    pub fn combine<T: Reducible>(self, a: T, b: T) -> T {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Min => {
                if b < a {
                    b
                } else {
                    a
                }
            }
            ReduceOp::Max => {
                if b > a {
                    b
                } else {
                    a
                }
            }
        }
    }
}

/// Combine one local value with every other partition's.
///
/// Blocks until all partitions have contributed; every caller receives the
/// same result.
pub trait AllReduce<T> {
    fn all_reduce(&self, local: T) -> T;
}

struct RoundState<T> {
    round: u64,
    arrived: usize,
    contributions: Vec<Option<T>>,
    /// Finished rounds: `(result, readers still to collect it)`.
    results: HashMap<u64, (T, usize)>,
}

struct CollectiveShared<T> {
    op: ReduceOp,
    parties: usize,
    next_round: Vec<AtomicU64>,
    state: Mutex<RoundState<T>>,
    cond: Condvar,
}

impl<T: Reducible> CollectiveShared<T> {
    fn new(op: ReduceOp, parties: usize) -> Self {
        Self {
            op,
            parties,
            next_round: (0..parties).map(|_| AtomicU64::new(0)).collect(),
            state: Mutex::new(RoundState {
                round: 0,
                arrived: 0,
                contributions: vec![None; parties],
                results: HashMap::new(),
            }),
            cond: Condvar::new(),
        }
    }
}

/// One partition's handle on an in-process collective.
pub struct DynColl<T> {
    partition: usize,
    shared: Arc<CollectiveShared<T>>,
}

impl<T> Clone for DynColl<T> {
    fn clone(&self) -> Self {
        Self {
            partition: self.partition,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Reducible> DynColl<T> {
    pub fn op(&self) -> ReduceOp {
        self.shared.op
    }

    pub fn parties(&self) -> usize {
        self.shared.parties
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Whether two handles share the same rendezvous.
    pub fn same_collective(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T: Reducible> AllReduce<T> for DynColl<T> {
    fn all_reduce(&self, local: T) -> T {
        let shared = &*self.shared;
        let round = shared.next_round[self.partition].fetch_add(1, Ordering::Relaxed);
        let mut st = shared.state.lock();
        debug_assert_eq!(st.round, round, "partition {} out of step", self.partition);
        debug_assert!(st.contributions[self.partition].is_none());
        st.contributions[self.partition] = Some(local);
        st.arrived += 1;
        if st.arrived == shared.parties {
            let value = st
                .contributions
                .iter_mut()
                .filter_map(Option::take)
                .reduce(|a, b| shared.op.combine(a, b))
                .unwrap_or_else(T::zero);
            st.results.insert(round, (value, shared.parties));
            st.arrived = 0;
            st.round += 1;
            shared.cond.notify_all();
        }
        loop {
            if let Some(slot) = st.results.get_mut(&round) {
                let value = slot.0;
                slot.1 -= 1;
                if slot.1 == 0 {
                    st.results.remove(&round);
                }
                return value;
            }
            shared.cond.wait(&mut st);
        }
    }
}

/// Arena of collectives keyed by `(operator, element type)`.
#[derive(Clone)]
pub struct CollectiveRegistry {
    parties: usize,
    arena: Arc<DashMap<(ReduceOp, TypeId), Arc<dyn Any + Send + Sync>>>,
}

impl CollectiveRegistry {
    pub fn new(parties: usize) -> Self {
        Self {
            parties,
            arena: Arc::new(DashMap::new()),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of distinct collectives created so far.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Handle for `partition` on the `(op, T)` collective, creating it on first use.
    pub fn handle<T: Reducible>(&self, op: ReduceOp, partition: usize) -> DynColl<T> {
        assert!(
            partition < self.parties,
            "partition {partition} outside a world of {}",
            self.parties
        );
        let parties = self.parties;
        let entry = self
            .arena
            .entry((op, TypeId::of::<T>()))
            .or_insert_with(|| {
                log::debug!(
                    "registering {op:?} collective over {} for {parties} partitions",
                    std::any::type_name::<T>()
                );
                let shared: Arc<dyn Any + Send + Sync> =
                    Arc::new(CollectiveShared::<T>::new(op, parties));
                shared
            })
            .value()
            .clone();
        match entry.downcast::<CollectiveShared<T>>() {
            Ok(shared) => DynColl { partition, shared },
            Err(_) => unreachable!("collective arena keyed by TypeId"),
        }
    }
}

impl std::fmt::Debug for CollectiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectiveRegistry")
            .field("parties", &self.parties)
            .field("collectives", &self.arena.len())
            .finish()
    }
}

/// A collective that only ever sees its own contribution.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess<T>(PhantomData<T>);

impl<T> SingleProcess<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> AllReduce<T> for SingleProcess<T> {
    fn all_reduce(&self, local: T) -> T {
        local
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{AllReduce, ReduceOp, Reducible};
    use mpi::collective::SystemOperation;
    use mpi::datatype::Equivalence;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// Collective over an MPI communicator. MPI must be initialized first.
    pub struct MpiCollective {
        comm: SimpleCommunicator,
        op: ReduceOp,
    }

    impl MpiCollective {
        pub fn new(comm: SimpleCommunicator, op: ReduceOp) -> Self {
            Self { comm, op }
        }

        /// Bound to the world communicator.
        pub fn world(op: ReduceOp) -> Self {
            Self::new(SimpleCommunicator::world(), op)
        }

        fn system_op(&self) -> SystemOperation {
            match self.op {
                ReduceOp::Sum => SystemOperation::sum(),
                ReduceOp::Min => SystemOperation::min(),
                ReduceOp::Max => SystemOperation::max(),
            }
        }
    }

    impl<T: Reducible + Equivalence> AllReduce<T> for MpiCollective {
        fn all_reduce(&self, local: T) -> T {
            let mut global = T::zero();
            self.comm
                .all_reduce_into(&local, &mut global, self.system_op());
            global
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiCollective;
