//! Named data containers and the access declarations tasks make on them.
//!
//! A [`LogicalRegion`] is a shared, identified buffer; a [`RegionSlice`] is a
//! contiguous window into one. Tasks never touch a region directly: they
//! declare a [`RegionRequirement`] and the runtime maps it for the duration of
//! the task body.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

/// Values that can live in a region and cross task boundaries.
pub trait Element: Copy + Default + Send + Sync + 'static {}
impl<T: Copy + Default + Send + Sync + 'static> Element for T {}

static NEXT_REGION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a logical region.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(u64);

impl RegionId {
    fn fresh() -> Self {
        Self(NEXT_REGION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// What a task may do with a region.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Privilege {
    ReadOnly,
    ReadWrite,
    /// Write access; prior contents are not meaningful to the task.
    WriteDiscard,
}

/// How a task's access interleaves with other tasks on the same region.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Coherence {
    /// The task has the region to itself for the whole body.
    Exclusive,
}

/// A named, shared buffer.
pub struct LogicalRegion<T> {
    id: RegionId,
    name: Arc<str>,
    data: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for LogicalRegion<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Element> LogicalRegion<T> {
    pub fn new(name: impl Into<Arc<str>>, values: Vec<T>) -> Self {
        Self {
            id: RegionId::fresh(),
            name: name.into(),
            data: Arc::new(RwLock::new(values)),
        }
    }

    /// A region of `len` default values.
    pub fn with_len(name: impl Into<Arc<str>>, len: usize) -> Self {
        Self::new(name, vec![T::default(); len])
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole region as a slice.
    pub fn whole(&self) -> RegionSlice<T> {
        let len = self.len();
        self.slice(0..len)
    }

    /// A window onto `range`.
    ///
    /// # Panics
    /// If `range` does not lie within the region.
    pub fn slice(&self, range: Range<usize>) -> RegionSlice<T> {
        let len = self.len();
        assert!(
            range.start <= range.end && range.end <= len,
            "slice {range:?} outside region `{}` of length {len}",
            self.name
        );
        RegionSlice {
            region: self.clone(),
            range,
        }
    }

    /// Shared access to the whole buffer.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.data.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.data.write()
    }
}

impl<T> fmt::Debug for LogicalRegion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalRegion")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// A contiguous window into a [`LogicalRegion`].
pub struct RegionSlice<T> {
    region: LogicalRegion<T>,
    range: Range<usize>,
}

impl<T> Clone for RegionSlice<T> {
    fn clone(&self) -> Self {
        Self {
            region: self.region.clone(),
            range: self.range.clone(),
        }
    }
}

impl<T: Element> RegionSlice<T> {
    pub fn region(&self) -> &LogicalRegion<T> {
        &self.region
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Shared access to the window.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, [T]> {
        let range = self.range.clone();
        RwLockReadGuard::map(self.region.data.read(), move |v| &v[range])
    }

    fn write(&self) -> MappedRwLockWriteGuard<'_, [T]> {
        let range = self.range.clone();
        RwLockWriteGuard::map(self.region.data.write(), move |v| &mut v[range])
    }
}

impl<T> fmt::Debug for RegionSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionSlice")
            .field("region", &self.region)
            .field("range", &self.range)
            .finish()
    }
}

/// One access declaration of a task.
#[derive(Clone, Debug)]
pub struct RegionRequirement<T> {
    pub slice: RegionSlice<T>,
    pub privilege: Privilege,
    pub coherence: Coherence,
}

impl<T: Element> RegionRequirement<T> {
    pub fn new(slice: RegionSlice<T>, privilege: Privilege, coherence: Coherence) -> Self {
        Self {
            slice,
            privilege,
            coherence,
        }
    }

    /// Acquire the declared access; held until the returned mapping drops.
    pub(crate) fn map(&self) -> PhysicalRegion<'_, T> {
        match (self.privilege, self.coherence) {
            (Privilege::ReadOnly, Coherence::Exclusive) => PhysicalRegion::Read(self.slice.read()),
            (Privilege::ReadWrite | Privilege::WriteDiscard, Coherence::Exclusive) => {
                PhysicalRegion::Write(self.slice.write())
            }
        }
    }
}

/// A mapped requirement, valid for the duration of a task body.
pub enum PhysicalRegion<'a, T> {
    Read(MappedRwLockReadGuard<'a, [T]>),
    Write(MappedRwLockWriteGuard<'a, [T]>),
}

impl<T> PhysicalRegion<'_, T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            PhysicalRegion::Read(g) => &**g,
            PhysicalRegion::Write(g) => &**g,
        }
    }

    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        match self {
            PhysicalRegion::Read(_) => None,
            PhysicalRegion::Write(g) => Some(&mut **g),
        }
    }
}
