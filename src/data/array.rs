//! Solver vectors and their shadow containers.
//!
//! An [`Array`] owns a contiguous buffer whose first `n` entries belong to
//! this partition. Boundary values of neighbors live in one
//! [`ShadowContainer`] per neighbor, created on the first exchange and kept
//! for the array's lifetime.

use std::collections::BTreeMap;

use crate::debug_invariants::DebugInvariants;
use crate::halo_error::HaloError;
use crate::runtime::region::{Element, LogicalRegion};
use crate::runtime::task::TaskHandle;

/// Local mirror of the boundary values one neighbor sends.
#[derive(Debug)]
pub struct ShadowContainer<T> {
    neighbor: usize,
    region: LogicalRegion<T>,
    /// Copy filling this container, if one was issued.
    pending: Option<TaskHandle>,
}

impl<T: Element> ShadowContainer<T> {
    pub(crate) fn new(neighbor: usize, region: LogicalRegion<T>) -> Self {
        Self {
            neighbor,
            region,
            pending: None,
        }
    }

    pub fn neighbor(&self) -> usize {
        self.neighbor
    }

    pub fn region(&self) -> &LogicalRegion<T> {
        &self.region
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Block until the latest copy into this container has finished.
    pub fn wait(&self) {
        if let Some(h) = &self.pending {
            h.wait();
        }
    }

    /// Current contents, after the latest copy has landed.
    pub fn values(&self) -> Vec<T> {
        self.wait();
        self.region.read().clone()
    }

    pub(crate) fn set_pending(&mut self, handle: TaskHandle) {
        self.pending = Some(handle);
    }
}

/// The shadow containers of one array, keyed by neighbor id.
#[derive(Debug)]
pub struct GhostSet<T> {
    shadows: BTreeMap<usize, ShadowContainer<T>>,
    /// Neighbor ids in descriptor order; fixes where each shadow lands in the
    /// external part of the array.
    order: Vec<usize>,
}

impl<T: Element> GhostSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            shadows: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, shadow: ShadowContainer<T>) {
        self.order.push(shadow.neighbor);
        self.shadows.insert(shadow.neighbor, shadow);
    }

    pub fn get(&self, neighbor: usize) -> Option<&ShadowContainer<T>> {
        self.shadows.get(&neighbor)
    }

    pub(crate) fn get_mut(&mut self, neighbor: usize) -> Option<&mut ShadowContainer<T>> {
        self.shadows.get_mut(&neighbor)
    }

    /// Neighbor ids in descriptor order.
    pub fn neighbors(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Values held across all shadows.
    pub fn total_len(&self) -> usize {
        self.shadows.values().map(ShadowContainer::len).sum()
    }

    /// Shadows in descriptor order.
    pub fn iter(&self) -> impl Iterator<Item = &ShadowContainer<T>> + '_ {
        self.order.iter().filter_map(|n| self.shadows.get(n))
    }
}

impl<T: Element> DebugInvariants for GhostSet<T> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "GhostSet");
    }

    fn validate_invariants(&self) -> Result<(), HaloError> {
        if self.order.len() != self.shadows.len() {
            return Err(HaloError::BrokenInvariant(format!(
                "ghost set lists {} neighbors but holds {} shadows",
                self.order.len(),
                self.shadows.len()
            )));
        }
        for (&nid, shadow) in &self.shadows {
            if shadow.neighbor != nid {
                return Err(HaloError::BrokenInvariant(format!(
                    "shadow for neighbor {} filed under {nid}",
                    shadow.neighbor
                )));
            }
        }
        Ok(())
    }
}

/// A solver vector: owned entries first, optionally followed by room for
/// external (neighbor-owned) entries.
#[derive(Debug)]
pub struct Array<T = f64> {
    values: Vec<T>,
    ghosts: Option<GhostSet<T>>,
}

impl<T: Element> Array<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self {
            values,
            ghosts: None,
        }
    }

    pub fn zeros(len: usize) -> Self {
        Self::new(vec![T::default(); len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn has_ghosts(&self) -> bool {
        self.ghosts.is_some()
    }

    pub fn ghosts(&self) -> Option<&GhostSet<T>> {
        self.ghosts.as_ref()
    }

    pub(crate) fn ghosts_mut(&mut self) -> Option<&mut GhostSet<T>> {
        self.ghosts.as_mut()
    }

    pub(crate) fn install_ghosts(&mut self, ghosts: GhostSet<T>) {
        debug_assert!(self.ghosts.is_none(), "ghosts installed twice");
        self.ghosts = Some(ghosts);
    }

    /// Contents of the shadow for `neighbor`, once its latest copy has landed.
    pub fn ghost_values(&self, neighbor: usize) -> Option<Vec<T>> {
        self.ghosts.as_ref()?.get(neighbor).map(ShadowContainer::values)
    }

    /// Block until every issued copy into this array's shadows has finished.
    pub fn wait_ghosts(&self) {
        if let Some(g) = &self.ghosts {
            g.iter().for_each(ShadowContainer::wait);
        }
    }

    /// Write every shadow into the external part of the buffer, in neighbor
    /// order starting at `local_rows`. Waits for outstanding copies first.
    ///
    /// # Panics
    /// If the buffer has no room for `local_rows` plus every shadow value.
    pub fn map_externals(&mut self, local_rows: usize) {
        let Some(ghosts) = &self.ghosts else {
            return;
        };
        let needed = local_rows + ghosts.total_len();
        assert!(
            self.values.len() >= needed,
            "array of length {} cannot hold {local_rows} owned and {} external entries",
            self.values.len(),
            ghosts.total_len()
        );
        let mut offset = local_rows;
        for shadow in ghosts.iter() {
            shadow.wait();
            let src = shadow.region.read();
            self.values[offset..offset + src.len()].copy_from_slice(&src);
            offset += src.len();
        }
    }
}
