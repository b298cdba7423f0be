//! Pull-based halo exchange.
//!
//! Each partition packs the values its neighbors need into its own pull
//! buffer and announces it on `mine.ready`. Every neighbor then issues a copy
//! task that pulls its slice of that buffer into a private shadow container
//! and arrives on the owner's `done` barrier. The owner waits on `done` before
//! repacking, so round `k + 1` never overwrites data a round-`k` reader is
//! still copying. Generations double-buffer the hand-off; the buffer itself is
//! single.
//!
//! Round `r` (counting from 1) uses these generations:
//!
//! | step                | barrier                | generation |
//! |---------------------|------------------------|------------|
//! | owner waits         | `mine.done`            | `r - 1`    |
//! | owner announces     | `mine.ready`           | `r - 1`    |
//! | reader copy waits   | neighbor's `ready`     | `r - 1`    |
//! | reader copy arrives | neighbor's `done`      | `r`        |
//!
//! Generation 0 of `done` is primed at setup.

use crate::algs::ghosts::ensure_ghosts;
use crate::data::array::Array;
use crate::data::matrix::SparseMatrix;
use crate::halo_error::HaloError;
use crate::runtime::Context;
use crate::runtime::config::BarrierDiscipline;
use crate::runtime::region::{Coherence, Element, Privilege, RegionRequirement};
use crate::runtime::task::{TaskLauncher, TaskRegions};

/// Refresh every shadow container of `x` with the neighbors' current
/// boundary values. Owned entries are left untouched.
///
/// Copies are issued asynchronously; read them through
/// [`Array::ghost_values`] or [`Array::map_externals`], which wait for the
/// copies to land.
///
/// # Errors
/// - [`ConfigurationError`](crate::halo_error::ConfigurationError) only while
///   the shadows of `x` are first created.
/// - [`HaloError::ExchangeInProgress`] if another flow is exchanging on
///   `matrix`.
///
/// # Panics
/// If `x` is shorter than the owned row count, or if a neighbor has no ghost
/// source, barrier link or matching shadow container. All of these are checked
/// before any barrier or the pull buffer is touched.
pub fn exchange_halo<T: Element>(
    ctx: &Context,
    matrix: &SparseMatrix<T>,
    x: &mut Array<T>,
) -> Result<(), HaloError> {
    let desc = matrix.descriptor();
    let partition = desc.partition;
    let mut syncs = matrix
        .try_lock_synchronizers()
        .ok_or(HaloError::ExchangeInProgress(partition))?;
    assert!(
        x.len() >= desc.local_rows,
        "array of length {} shorter than {} owned rows",
        x.len(),
        desc.local_rows
    );

    ensure_ghosts(ctx, x, matrix)?;

    // Resolve every neighbor's wiring before any barrier moves.
    let mut sources = Vec::with_capacity(desc.neighbors.len());
    for &nid in &desc.neighbors {
        let Some(source) = matrix.ghost_source(nid) else {
            panic!("partition {partition}: no ghost source for neighbor {nid}");
        };
        assert!(
            syncs.neighbors.contains_key(&nid),
            "partition {partition}: no barrier link for neighbor {nid}"
        );
        let Some(shadow) = x.ghosts().and_then(|g| g.get(nid)) else {
            panic!("partition {partition}: array has no shadow container for neighbor {nid}");
        };
        assert_eq!(
            shadow.len(),
            source.len(),
            "shadow container for neighbor {nid} does not match its contribution"
        );
        sources.push((nid, source.clone()));
    }

    match ctx.config().barrier_discipline {
        BarrierDiscipline::Enforced => syncs.mine.done.wait(),
        BarrierDiscipline::SkipDoneWait => log::warn!(
            "partition {partition}: repacking without waiting for readers (fault injection)"
        ),
    }
    syncs.mine.done = syncs.mine.done.advance();

    {
        let mut pull = matrix.pull_buffer().write();
        let owned = x.values();
        for (slot, &i) in pull.iter_mut().zip(&desc.elements_to_send) {
            *slot = owned[i];
        }
    }
    log::trace!(
        "partition {partition}: packed {} values, announcing generation {}",
        desc.total_to_be_sent,
        syncs.mine.ready.generation()
    );
    syncs.mine.ready.arrive(1);
    syncs.mine.ready = syncs.mine.ready.advance();

    let Some(ghosts) = x.ghosts_mut() else {
        unreachable!("shadows resolved above");
    };
    for (nid, source) in sources {
        let (Some(link), Some(shadow)) = (syncs.neighbors.get_mut(&nid), ghosts.get_mut(nid))
        else {
            unreachable!("wiring resolved above");
        };
        let launcher = TaskLauncher::new("region-to-region-copy", region_to_region_copy::<T>)
            .add_region_requirement(RegionRequirement::new(
                source,
                Privilege::ReadOnly,
                Coherence::Exclusive,
            ))
            .add_region_requirement(RegionRequirement::new(
                shadow.region().whole(),
                Privilege::WriteDiscard,
                Coherence::Exclusive,
            ))
            // wait for the owner to announce its pull buffer...
            .add_wait_barrier(link.ready.clone())
            // ...and tell it when we are done reading
            .add_arrival_barrier(link.done.clone());
        link.ready = link.ready.advance();
        link.done = link.done.advance();

        log::trace!("partition {partition}: pulling from neighbor {nid}");
        shadow.set_pending(ctx.execute_task(launcher));
    }
    Ok(())
}

fn region_to_region_copy<T: Element>(regions: &mut TaskRegions<'_, T>) {
    let (src, dst) = regions.read_write(0, 1);
    debug_assert_eq!(src.len(), dst.len());
    dst.copy_from_slice(src);
}
