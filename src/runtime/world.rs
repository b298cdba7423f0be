//! Setting up a set of partitions that exchange halos inside one process.
//!
//! A [`World`] validates every partition's [`MatrixDescriptor`] against its
//! neighbors, allocates the pull buffers, primes the phase barriers and
//! wires each partition's ghost sources to the matching slice of its
//! neighbors' pull buffers. Each partition is then driven by its own flow of
//! control, either through [`World::run`] or by taking the partitions apart
//! with [`World::into_partitions`].

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use crate::algs::collective::CollectiveRegistry;
use crate::data::matrix::{MatrixDescriptor, SparseMatrix, Synchronizers};
use crate::debug_invariants::DebugInvariants;
use crate::halo_error::{ConfigurationError, HaloError};
use crate::runtime::Context;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::phase_barrier::{PhaseBarrier, PhaseBarriers};
use crate::runtime::region::{Element, LogicalRegion};

/// One partition: its execution context and its matrix.
#[derive(Debug)]
pub struct Partition<T = f64> {
    context: Context,
    matrix: SparseMatrix<T>,
}

impl<T: Element> Partition<T> {
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn matrix(&self) -> &SparseMatrix<T> {
        &self.matrix
    }

    pub fn into_parts(self) -> (Context, SparseMatrix<T>) {
        (self.context, self.matrix)
    }
}

/// A validated, fully wired set of partitions.
#[derive(Debug)]
pub struct World<T = f64> {
    partitions: Vec<Partition<T>>,
    config: Arc<RuntimeConfig>,
}

impl<T: Element> World<T> {
    /// Validate `descriptors` (indexed by partition id) and wire them up.
    ///
    /// # Errors
    /// [`ConfigurationError`] for any malformed or inconsistent descriptor,
    /// [`HaloError::InvalidConfig`] or [`HaloError::Pool`] if the runtime
    /// configuration cannot be honored.
    pub fn new(descriptors: Vec<MatrixDescriptor>, config: RuntimeConfig) -> Result<Self, HaloError> {
        validate_world(&descriptors)?;
        descriptors.iter().for_each(DebugInvariants::debug_assert_invariants);
        let size = descriptors.len();
        let pool = Arc::new(config.build_pool()?);
        let config = Arc::new(config);
        let collectives = CollectiveRegistry::new(size);

        let pull_buffers: Vec<LogicalRegion<T>> = descriptors
            .iter()
            .map(|d| LogicalRegion::with_len(format!("pull-buffer[{}]", d.partition), d.pull_buffer_capacity))
            .collect();

        // Every neighbor reads this partition's buffer, so readers == neighbors.
        let mine: Vec<PhaseBarriers> = descriptors
            .iter()
            .map(|d| {
                let readers = d.num_neighbors();
                let done = PhaseBarrier::new(readers);
                if readers > 0 {
                    // Nobody has read yet: the first repack may go ahead.
                    done.arrive(readers);
                }
                PhaseBarriers {
                    ready: PhaseBarrier::new(1),
                    done,
                }
            })
            .collect();

        let send_ranges: Vec<BTreeMap<usize, Range<usize>>> = descriptors
            .iter()
            .map(|d| d.send_ranges().collect())
            .collect();

        let mut partitions = Vec::with_capacity(size);
        for (p, desc) in descriptors.into_iter().enumerate() {
            let mut ghost_sources = BTreeMap::new();
            let mut links = BTreeMap::new();
            for &nid in &desc.neighbors {
                let range = send_ranges[nid].get(&p).cloned().ok_or(
                    ConfigurationError::MissingGhostSource {
                        partition: p,
                        neighbor: nid,
                    },
                )?;
                ghost_sources.insert(nid, pull_buffers[nid].slice(range));
                // A reader's first copy waits on generation 0 of `ready` and
                // arrives on generation 1 of `done`.
                links.insert(
                    nid,
                    PhaseBarriers {
                        ready: mine[nid].ready.clone(),
                        done: mine[nid].done.advance(),
                    },
                );
            }
            log::debug!(
                "partition {p}: {} owned rows, {} neighbors, sends {} receives {}",
                desc.local_rows,
                desc.num_neighbors(),
                desc.total_to_be_sent,
                desc.total_to_be_received()
            );
            let synchronizers = Synchronizers {
                mine: mine[p].clone(),
                neighbors: links,
            };
            let matrix = SparseMatrix::new(desc, pull_buffers[p].clone(), ghost_sources, synchronizers);
            let context = Context::new(
                p,
                size,
                Arc::clone(&pool),
                Arc::clone(&config),
                collectives.clone(),
            );
            partitions.push(Partition { context, matrix });
        }
        log::debug!("world of {size} partitions ready");
        Ok(Self {
            partitions,
            config,
        })
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn partition(&self, p: usize) -> Option<&Partition<T>> {
        self.partitions.get(p)
    }

    /// Hand the partitions over to caller-managed flows of control.
    pub fn into_partitions(self) -> Vec<Partition<T>> {
        self.partitions
    }

    /// Run `f` once per partition, each on its own named thread, and collect
    /// the results in partition order.
    ///
    /// # Errors
    /// [`HaloError::Spawn`] if a thread cannot be started and
    /// [`HaloError::PartitionPanicked`] for the first partition whose flow
    /// panicked.
    ///
    /// A panic is only reported once every other partition returns. Peers
    /// blocked on the panicked partition (waiting in an exchange or in a
    /// collective) never do, so `run` then blocks forever, like any other
    /// partition that stops participating.
    pub fn run<F, R>(self, f: F) -> Result<Vec<R>, HaloError>
    where
        F: Fn(&Context, &SparseMatrix<T>) -> R + Sync,
        R: Send,
    {
        let prefix = self.config.thread_name_prefix.clone();
        let f = &f;
        std::thread::scope(|s| {
            let mut handles = Vec::with_capacity(self.partitions.len());
            for part in &self.partitions {
                let handle = std::thread::Builder::new()
                    .name(format!("{prefix}-partition-{}", part.context.partition()))
                    .spawn_scoped(s, move || f(&part.context, &part.matrix))?;
                handles.push(handle);
            }
            // join everything before reporting, so no panicked thread is left
            // for the scope to re-raise
            let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
            joined
                .into_iter()
                .enumerate()
                .map(|(p, r)| {
                    r.map_err(|_| {
                        log::warn!("partition {p} panicked");
                        HaloError::PartitionPanicked(p)
                    })
                })
                .collect()
        })
    }
}

/// Cross-partition checks; descriptors are validated one by one first.
fn validate_world(descriptors: &[MatrixDescriptor]) -> Result<(), ConfigurationError> {
    if descriptors.is_empty() {
        return Err(ConfigurationError::EmptyWorld);
    }
    let size = descriptors.len();
    for (position, d) in descriptors.iter().enumerate() {
        if d.partition != position {
            return Err(ConfigurationError::PartitionIndexMismatch {
                position,
                declared: d.partition,
            });
        }
        d.validate()?;
    }
    for d in descriptors {
        let p = d.partition;
        for (&nid, &expected) in d.neighbors.iter().zip(&d.receive_lengths) {
            if nid >= size {
                return Err(ConfigurationError::UnknownNeighbor {
                    partition: p,
                    neighbor: nid,
                    world_size: size,
                });
            }
            let other = &descriptors[nid];
            let Some(range) = other.send_range_for(p) else {
                return Err(ConfigurationError::AsymmetricLink {
                    partition: p,
                    neighbor: nid,
                });
            };
            if range.len() != expected {
                return Err(ConfigurationError::ContributionMismatch {
                    partition: p,
                    neighbor: nid,
                    expected,
                    provided: range.len(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Vec<MatrixDescriptor> {
        vec![
            MatrixDescriptor::new(0, 3).with_neighbor(1, vec![2], 2),
            MatrixDescriptor::new(1, 3).with_neighbor(0, vec![0, 1], 1),
        ]
    }

    fn config_err(descriptors: Vec<MatrixDescriptor>) -> ConfigurationError {
        match World::<f64>::new(descriptors, RuntimeConfig::default()) {
            Err(HaloError::Configuration(e)) => e,
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[test]
    fn empty_world_is_rejected() {
        assert_eq!(config_err(vec![]), ConfigurationError::EmptyWorld);
    }

    #[test]
    fn descriptors_must_be_in_partition_order() {
        let mut d = pair();
        d.swap(0, 1);
        assert_eq!(
            config_err(d),
            ConfigurationError::PartitionIndexMismatch { position: 0, declared: 1 }
        );
    }

    #[test]
    fn neighbor_outside_world() {
        let d = vec![MatrixDescriptor::new(0, 2).with_neighbor(4, vec![0], 1)];
        assert_eq!(
            config_err(d),
            ConfigurationError::UnknownNeighbor { partition: 0, neighbor: 4, world_size: 1 }
        );
    }

    #[test]
    fn one_sided_link() {
        let d = vec![
            MatrixDescriptor::new(0, 2).with_neighbor(1, vec![0], 1),
            MatrixDescriptor::new(1, 2),
        ];
        assert_eq!(
            config_err(d),
            ConfigurationError::AsymmetricLink { partition: 0, neighbor: 1 }
        );
    }

    #[test]
    fn receive_count_must_match_neighbor_send_count() {
        let mut d = pair();
        d[0].receive_lengths[0] = 3;
        assert_eq!(
            config_err(d),
            ConfigurationError::ContributionMismatch {
                partition: 0,
                neighbor: 1,
                expected: 3,
                provided: 2
            }
        );
    }

    #[test]
    fn wires_ghost_sources_and_primes_barriers() {
        let world = World::<f64>::new(pair(), RuntimeConfig::default()).unwrap();
        assert_eq!(world.len(), 2);
        let p0 = world.partition(0).unwrap();
        let p1 = world.partition(1).unwrap();

        let src = p0.matrix().ghost_source(1).unwrap();
        assert_eq!(src.region().id(), p1.matrix().pull_buffer().id());
        assert_eq!(src.range(), 0..2);
        assert_eq!(p1.matrix().ghost_source(0).unwrap().range(), 0..1);

        let syncs = p0.matrix().lock_synchronizers();
        assert!(syncs.mine.done.has_triggered());
        assert!(!syncs.mine.ready.has_triggered());
        let link = &syncs.neighbors[&1];
        assert_eq!(link.ready.generation(), 0);
        assert_eq!(link.done.generation(), 1);
        assert_eq!(p0.context().num_partitions(), 2);
    }

    #[test]
    fn run_reports_panicking_partition() {
        let world = World::<f64>::new(pair(), RuntimeConfig::default()).unwrap();
        let res = world.run(|ctx, _| {
            if ctx.partition() == 1 {
                panic!("boom");
            }
            ctx.partition()
        });
        assert!(matches!(res, Err(HaloError::PartitionPanicked(1))));
    }

    #[test]
    fn run_collects_in_partition_order() {
        let world = World::<f64>::new(pair(), RuntimeConfig::default()).unwrap();
        let names = world
            .run(|ctx, m| (ctx.partition(), m.local_rows(), std::thread::current().name().map(str::to_owned)))
            .unwrap();
        assert_eq!(names[0].0, 0);
        assert_eq!(names[1].1, 3);
        assert_eq!(names[1].2.as_deref(), Some("halo-partition-1"));
    }
}
