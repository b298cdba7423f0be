//! Lazy creation of shadow containers.

use crate::data::DebugInvariants;
use crate::data::array::{Array, GhostSet, ShadowContainer};
use crate::data::matrix::SparseMatrix;
use crate::halo_error::{ConfigurationError, HaloError};
use crate::runtime::Context;
use crate::runtime::region::{Element, LogicalRegion};

/// Give `array` one shadow container per neighbor of `matrix`.
///
/// Idempotent: an array that already has shadows is left untouched, so the
/// containers keep their identity and size for the array's lifetime. Each new
/// shadow holds exactly the number of values the neighbor sends.
///
/// # Errors
/// [`ConfigurationError`] when the descriptor is malformed or a neighbor has
/// no exposed source of the declared size. Nothing is installed on error.
pub fn ensure_ghosts<T: Element>(
    ctx: &Context,
    array: &mut Array<T>,
    matrix: &SparseMatrix<T>,
) -> Result<(), HaloError> {
    if array.has_ghosts() {
        return Ok(());
    }
    let desc = matrix.descriptor();
    desc.validate()?;

    let mut ghosts = GhostSet::new();
    for (&nid, &expected) in desc.neighbors.iter().zip(&desc.receive_lengths) {
        let source = matrix
            .ghost_source(nid)
            .ok_or(ConfigurationError::MissingGhostSource {
                partition: desc.partition,
                neighbor: nid,
            })?;
        if source.len() != expected {
            return Err(ConfigurationError::ContributionMismatch {
                partition: desc.partition,
                neighbor: nid,
                expected,
                provided: source.len(),
            }
            .into());
        }
        let region = LogicalRegion::with_len(format!("ghost[{}<-{nid}]", desc.partition), expected);
        ghosts.insert(ShadowContainer::new(nid, region));
    }
    ghosts.debug_assert_invariants();
    log::debug!(
        "partition {}: created {} shadow containers ({} values)",
        ctx.partition(),
        ghosts.len(),
        ghosts.total_len()
    );
    array.install_ghosts(ghosts);
    Ok(())
}
