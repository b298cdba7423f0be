//! HaloError: Unified error type for spmd-halo public APIs
//!
//! Setup and ghost-construction problems surface as [`ConfigurationError`];
//! precondition violations (short arrays, mismatched shadow sizes) are fatal
//! assertions and never reach this type.

use thiserror::Error;

/// Malformed or inconsistent partition/neighbor metadata.
///
/// Raised while a [`World`](crate::runtime::world::World) is set up or while
/// shadow containers are created, never during an exchange.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No descriptors were supplied.
    #[error("cannot set up a world without partitions")]
    EmptyWorld,
    /// Descriptor at `position` claims to describe another partition.
    #[error("descriptor at position {position} declares partition {declared}")]
    PartitionIndexMismatch { position: usize, declared: usize },
    /// The per-neighbor count lists do not match the neighbor list.
    #[error(
        "partition {partition}: {neighbors} neighbors but {send_counts} send counts and {receive_counts} receive counts"
    )]
    NeighborListLength {
        partition: usize,
        neighbors: usize,
        send_counts: usize,
        receive_counts: usize,
    },
    /// A partition listed itself as a neighbor.
    #[error("partition {partition} lists itself as a neighbor")]
    SelfNeighbor { partition: usize },
    /// A neighbor id appears twice.
    #[error("partition {partition} lists neighbor {neighbor} more than once")]
    DuplicateNeighbor { partition: usize, neighbor: usize },
    /// A neighbor id outside the world.
    #[error("partition {partition} lists neighbor {neighbor}, but the world has {world_size} partitions")]
    UnknownNeighbor {
        partition: usize,
        neighbor: usize,
        world_size: usize,
    },
    /// `total_to_be_sent` disagrees with the per-neighbor send counts.
    #[error("partition {partition}: total send count is {declared}, per-neighbor counts sum to {sum}")]
    SendCountMismatch {
        partition: usize,
        declared: usize,
        sum: usize,
    },
    /// The flattened send list has the wrong length.
    #[error("partition {partition}: send list holds {actual} indices, expected {declared}")]
    SendListLength {
        partition: usize,
        declared: usize,
        actual: usize,
    },
    /// The pull buffer cannot hold every value to be sent.
    #[error("partition {partition}: pull buffer capacity {capacity} < {required} values to send")]
    PullBufferTooSmall {
        partition: usize,
        capacity: usize,
        required: usize,
    },
    /// A send index points outside the owned index space.
    #[error("partition {partition}: send index {index} outside 0..{local_rows}")]
    SendIndexOutOfRange {
        partition: usize,
        index: usize,
        local_rows: usize,
    },
    /// The same local index appears twice in one neighbor's send range.
    #[error("partition {partition}: index {index} sent twice to neighbor {neighbor}")]
    DuplicateSendIndex {
        partition: usize,
        neighbor: usize,
        index: usize,
    },
    /// `neighbor` does not list `partition` back.
    #[error("partition {partition} lists neighbor {neighbor}, which does not list it back")]
    AsymmetricLink { partition: usize, neighbor: usize },
    /// `partition` expects `expected` values from `neighbor`, which provides `provided`.
    #[error(
        "partition {partition} expects {expected} values from neighbor {neighbor}, which sends {provided}"
    )]
    ContributionMismatch {
        partition: usize,
        neighbor: usize,
        expected: usize,
        provided: usize,
    },
    /// No exposed pull-buffer slice is wired for this neighbor.
    #[error("partition {partition} has no ghost source for neighbor {neighbor}")]
    MissingGhostSource { partition: usize, neighbor: usize },
}

/// Unified error type for spmd-halo operations.
#[derive(Debug, Error)]
pub enum HaloError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// Another flow of control is exchanging on the same matrix.
    #[error("an exchange is already in progress on partition {0}")]
    ExchangeInProgress(usize),
    /// The flow of control for a partition panicked.
    #[error("partition {0} panicked")]
    PartitionPanicked(usize),
    /// A partition thread could not be spawned.
    #[error("failed to spawn partition thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The task pool could not be built.
    #[error("failed to build task pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    /// Runtime configuration rejected before use.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),
    /// A data structure's internal bookkeeping is inconsistent.
    #[error("broken invariant: {0}")]
    BrokenInvariant(String),
}
