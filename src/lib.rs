#![cfg_attr(docsrs, feature(doc_cfg))]
//! # spmd-halo
//!
//! spmd-halo is the communication core of a distributed sparse iterative
//! solver: it keeps every partition's copy of neighbor-owned boundary values
//! current (the halo exchange) and computes globally reduced inner products.
//!
//! ## Features
//! - Pull-based halo exchange sequenced by generation-counted phase barriers
//! - Lazily created, fixed-size shadow containers per neighbor
//! - Collective dot product with the reduction time accounted separately
//! - In-process SPMD [`World`](runtime::world::World) driving one thread per
//!   partition, copy tasks on a shared rayon pool
//! - Optional MPI all-reduce backend (`mpi-support`)
//!
//! ## Determinism
//!
//! The in-process collective combines contributions in partition order, so a
//! dot product is bit-reproducible for a fixed partitioning.
//!
//! ## Usage
//!
//! ```
//! use spmd_halo::prelude::*;
//!
//! let descriptors = vec![
//!     MatrixDescriptor::new(0, 4).with_neighbor(1, vec![2, 3], 1),
//!     MatrixDescriptor::new(1, 2).with_neighbor(0, vec![0], 2),
//! ];
//! let world = World::<f64>::new(descriptors, RuntimeConfig::default()).unwrap();
//! let halos = world
//!     .run(|ctx, matrix| {
//!         let owned: Vec<f64> = (0..matrix.local_rows()).map(|i| (ctx.partition() * 10 + i) as f64).collect();
//!         let mut x = Array::new(owned);
//!         exchange_halo(ctx, matrix, &mut x).unwrap();
//!         let theirs = matrix.neighbors()[0];
//!         x.ghost_values(theirs).unwrap()
//!     })
//!     .unwrap();
//! assert_eq!(halos[0], vec![10.0]);
//! assert_eq!(halos[1], vec![2.0, 3.0]);
//! ```

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod halo_error;
pub mod runtime;

pub use debug_invariants::DebugInvariants;
pub use halo_error::{ConfigurationError, HaloError};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::collective::{AllReduce, DynColl, ReduceOp, Reducible, SingleProcess};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::collective::MpiCollective;
    pub use crate::algs::{compute_dot_product, ensure_ghosts, exchange_halo};
    pub use crate::data::array::{Array, ShadowContainer};
    pub use crate::data::matrix::{MatrixDescriptor, SparseMatrix};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::halo_error::{ConfigurationError, HaloError};
    pub use crate::runtime::Context;
    pub use crate::runtime::config::{BarrierDiscipline, RuntimeConfig};
    pub use crate::runtime::phase_barrier::{PhaseBarrier, PhaseBarriers};
    pub use crate::runtime::world::{Partition, World};
}
