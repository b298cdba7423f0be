//! Per-partition matrix metadata and the exchange state hanging off it.
//!
//! [`MatrixDescriptor`] is the plain, serializable description a setup phase
//! produces. [`SparseMatrix`] is the runtime object built from it: the pull
//! buffer neighbors copy from, the exposed slices of neighbor pull buffers,
//! and the phase barriers sequencing both.

use std::collections::BTreeMap;
use std::ops::Range;

use itertools::Itertools;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::debug_invariants::DebugInvariants;
use crate::halo_error::{ConfigurationError, HaloError};
use crate::runtime::phase_barrier::{PhaseBarrier, PhaseBarriers};
use crate::runtime::region::{Element, LogicalRegion, RegionSlice};

/// Immutable description of one partition's halo.
///
/// `elements_to_send` is grouped by neighbor in `neighbors` order; the group
/// for `neighbors[i]` holds `send_lengths[i]` indices. `receive_lengths[i]` is
/// how many values `neighbors[i]` sends back.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixDescriptor {
    pub partition: usize,
    /// Owned rows `n`.
    pub local_rows: usize,
    pub neighbors: Vec<usize>,
    pub send_lengths: Vec<usize>,
    pub receive_lengths: Vec<usize>,
    pub total_to_be_sent: usize,
    pub pull_buffer_capacity: usize,
    pub elements_to_send: Vec<usize>,
}

impl MatrixDescriptor {
    /// A partition with `local_rows` owned rows and no neighbors yet.
    pub fn new(partition: usize, local_rows: usize) -> Self {
        Self {
            partition,
            local_rows,
            ..Default::default()
        }
    }

    /// Append a neighbor: the local indices sent to it and how many values it
    /// sends back. Keeps the derived totals consistent.
    pub fn with_neighbor(mut self, neighbor: usize, send: Vec<usize>, receive_len: usize) -> Self {
        self.neighbors.push(neighbor);
        self.send_lengths.push(send.len());
        self.receive_lengths.push(receive_len);
        self.total_to_be_sent += send.len();
        self.pull_buffer_capacity = self.pull_buffer_capacity.max(self.total_to_be_sent);
        self.elements_to_send.extend(send);
        self
    }

    pub fn num_neighbors(&self) -> usize {
        self.neighbors.len()
    }

    /// Position of `neighbor` in the neighbor list.
    pub fn neighbor_position(&self, neighbor: usize) -> Option<usize> {
        self.neighbors.iter().position(|&n| n == neighbor)
    }

    /// `(neighbor, pull-buffer range)` for every neighbor, in list order.
    pub fn send_ranges(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        self.neighbors
            .iter()
            .zip(&self.send_lengths)
            .scan(0usize, |offset, (&nid, &len)| {
                let start = *offset;
                *offset += len;
                Some((nid, start..start + len))
            })
    }

    /// Slice of the pull buffer `neighbor` reads.
    pub fn send_range_for(&self, neighbor: usize) -> Option<Range<usize>> {
        self.send_ranges()
            .find(|(nid, _)| *nid == neighbor)
            .map(|(_, r)| r)
    }

    pub fn receive_length_for(&self, neighbor: usize) -> Option<usize> {
        self.neighbor_position(neighbor)
            .and_then(|i| self.receive_lengths.get(i).copied())
    }

    /// Values received from all neighbors together.
    pub fn total_to_be_received(&self) -> usize {
        self.receive_lengths.iter().sum()
    }

    /// Check the descriptor on its own, without looking at any neighbor.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let p = self.partition;
        if self.send_lengths.len() != self.neighbors.len()
            || self.receive_lengths.len() != self.neighbors.len()
        {
            return Err(ConfigurationError::NeighborListLength {
                partition: p,
                neighbors: self.neighbors.len(),
                send_counts: self.send_lengths.len(),
                receive_counts: self.receive_lengths.len(),
            });
        }
        if self.neighbors.contains(&p) {
            return Err(ConfigurationError::SelfNeighbor { partition: p });
        }
        if let Some(&neighbor) = self.neighbors.iter().duplicates().next() {
            return Err(ConfigurationError::DuplicateNeighbor {
                partition: p,
                neighbor,
            });
        }
        let sum: usize = self.send_lengths.iter().sum();
        if sum != self.total_to_be_sent {
            return Err(ConfigurationError::SendCountMismatch {
                partition: p,
                declared: self.total_to_be_sent,
                sum,
            });
        }
        if self.elements_to_send.len() != self.total_to_be_sent {
            return Err(ConfigurationError::SendListLength {
                partition: p,
                declared: self.total_to_be_sent,
                actual: self.elements_to_send.len(),
            });
        }
        if self.pull_buffer_capacity < self.total_to_be_sent {
            return Err(ConfigurationError::PullBufferTooSmall {
                partition: p,
                capacity: self.pull_buffer_capacity,
                required: self.total_to_be_sent,
            });
        }
        if let Some(&index) = self
            .elements_to_send
            .iter()
            .find(|&&i| i >= self.local_rows)
        {
            return Err(ConfigurationError::SendIndexOutOfRange {
                partition: p,
                index,
                local_rows: self.local_rows,
            });
        }
        for (neighbor, range) in self.send_ranges() {
            if let Some(&index) = self.elements_to_send[range].iter().duplicates().next() {
                return Err(ConfigurationError::DuplicateSendIndex {
                    partition: p,
                    neighbor,
                    index,
                });
            }
        }
        Ok(())
    }
}

impl DebugInvariants for MatrixDescriptor {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "MatrixDescriptor");
    }

    fn validate_invariants(&self) -> Result<(), HaloError> {
        Ok(self.validate()?)
    }
}

/// Barrier state of one partition.
#[derive(Debug)]
pub struct Synchronizers {
    /// Guards this partition's own pull buffer.
    pub mine: PhaseBarriers,
    /// Handles onto each neighbor's `mine` pair, keyed by neighbor id.
    pub neighbors: BTreeMap<usize, PhaseBarriers>,
}

/// Runtime side of one partition's matrix.
#[derive(Debug)]
pub struct SparseMatrix<T = f64> {
    descriptor: MatrixDescriptor,
    pull_buffer: LogicalRegion<T>,
    ghost_sources: BTreeMap<usize, RegionSlice<T>>,
    synchronizers: Mutex<Synchronizers>,
}

impl<T: Element> SparseMatrix<T> {
    pub(crate) fn new(
        descriptor: MatrixDescriptor,
        pull_buffer: LogicalRegion<T>,
        ghost_sources: BTreeMap<usize, RegionSlice<T>>,
        synchronizers: Synchronizers,
    ) -> Self {
        Self {
            descriptor,
            pull_buffer,
            ghost_sources,
            synchronizers: Mutex::new(synchronizers),
        }
    }

    /// A matrix not wired to any neighbor: its pull buffer is private and no
    /// ghost sources exist. The descriptor is taken as-is.
    pub fn detached(descriptor: MatrixDescriptor) -> Self {
        let pull_buffer = LogicalRegion::with_len(
            format!("pull-buffer[{}]", descriptor.partition),
            descriptor.pull_buffer_capacity,
        );
        let synchronizers = Synchronizers {
            mine: PhaseBarriers {
                ready: PhaseBarrier::new(1),
                done: PhaseBarrier::new(0),
            },
            neighbors: BTreeMap::new(),
        };
        Self::new(descriptor, pull_buffer, BTreeMap::new(), synchronizers)
    }

    pub fn descriptor(&self) -> &MatrixDescriptor {
        &self.descriptor
    }

    pub fn partition(&self) -> usize {
        self.descriptor.partition
    }

    pub fn local_rows(&self) -> usize {
        self.descriptor.local_rows
    }

    pub fn neighbors(&self) -> &[usize] {
        &self.descriptor.neighbors
    }

    /// Staging region neighbors pull from.
    pub fn pull_buffer(&self) -> &LogicalRegion<T> {
        &self.pull_buffer
    }

    /// The part of `neighbor`'s pull buffer this partition reads.
    pub fn ghost_source(&self, neighbor: usize) -> Option<&RegionSlice<T>> {
        self.ghost_sources.get(&neighbor)
    }

    /// Exclusive access to the barrier state.
    ///
    /// Holding the guard keeps any exchange on this matrix from starting.
    pub fn lock_synchronizers(&self) -> MutexGuard<'_, Synchronizers> {
        self.synchronizers.lock()
    }

    pub(crate) fn try_lock_synchronizers(&self) -> Option<MutexGuard<'_, Synchronizers>> {
        self.synchronizers.try_lock()
    }
}
