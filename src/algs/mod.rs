//! Re-export public algorithms.

pub mod collective;
pub mod dot_product;
pub mod exchange_halo;
pub mod ghosts;

pub use collective::{AllReduce, CollectiveRegistry, DynColl, ReduceOp, Reducible, SingleProcess};
#[cfg(feature = "mpi-support")]
pub use collective::MpiCollective;
pub use dot_product::compute_dot_product;
pub use exchange_halo::exchange_halo;
pub use ghosts::ensure_ghosts;
