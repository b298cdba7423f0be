//! Generation-counted phase barriers.
//!
//! A [`PhaseBarrier`] is a *handle* onto one generation of a shared barrier.
//! Every generation expects the same number of arrivals. Handles are cheap to
//! clone; [`advance`](PhaseBarrier::advance) yields a handle on the next
//! generation and leaves the current one untouched, so an owner can start
//! producing generation `g + 1` while readers are still arriving on `g`.
//!
//! There is no timeout: a generation that never receives its arrivals blocks
//! its waiters forever.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

/// Generation index of a phase barrier.
pub type Generation = u64;

type Deferred = Box<dyn FnOnce() + Send>;

static NEXT_BARRIER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct BarrierState {
    /// Arrivals for generations at or above `triggered_below`.
    arrivals: HashMap<Generation, usize>,
    /// Every generation below this one has triggered.
    triggered_below: Generation,
    /// Work deferred until a generation triggers.
    deferred: HashMap<Generation, Vec<Deferred>>,
}

impl BarrierState {
    fn has_triggered(&self, generation: Generation, expected: usize) -> bool {
        generation < self.triggered_below
            || self.arrivals.get(&generation).copied().unwrap_or(0) >= expected
    }

    /// Slide the watermark over every contiguous triggered generation.
    fn compact(&mut self, expected: usize) {
        while self
            .arrivals
            .get(&self.triggered_below)
            .is_some_and(|&n| n >= expected)
        {
            self.arrivals.remove(&self.triggered_below);
            self.triggered_below += 1;
        }
    }
}

struct BarrierInner {
    id: u64,
    expected: usize,
    state: Mutex<BarrierState>,
    cond: Condvar,
}

/// Handle onto one generation of a reusable barrier.
#[derive(Clone)]
pub struct PhaseBarrier {
    inner: Arc<BarrierInner>,
    generation: Generation,
}

impl PhaseBarrier {
    /// Create a barrier whose generations each trigger after
    /// `expected_arrivals` arrivals. The returned handle is on generation 0.
    ///
    /// A barrier expecting zero arrivals is always triggered.
    pub fn new(expected_arrivals: usize) -> Self {
        Self {
            inner: Arc::new(BarrierInner {
                id: NEXT_BARRIER_ID.fetch_add(1, Ordering::Relaxed),
                expected: expected_arrivals,
                state: Mutex::new(BarrierState::default()),
                cond: Condvar::new(),
            }),
            generation: 0,
        }
    }

    /// Identity shared by every handle of this barrier.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn expected_arrivals(&self) -> usize {
        self.inner.expected
    }

    /// Register `count` arrivals on this handle's generation.
    ///
    /// Work deferred on the generation runs on the calling thread once the
    /// generation triggers, after the internal lock is released.
    pub fn arrive(&self, count: usize) {
        if count == 0 {
            return;
        }
        let expected = self.inner.expected;
        let ready = {
            let mut st = self.inner.state.lock();
            debug_assert!(
                self.generation >= st.triggered_below,
                "barrier {} generation {} already triggered",
                self.inner.id,
                self.generation
            );
            let n = st.arrivals.entry(self.generation).or_insert(0);
            *n += count;
            debug_assert!(
                *n <= expected,
                "barrier {} generation {}: {} arrivals, {} expected",
                self.inner.id,
                self.generation,
                *n,
                expected
            );
            if *n < expected {
                return;
            }
            let ready = st.deferred.remove(&self.generation).unwrap_or_default();
            st.compact(expected);
            ready
        };
        self.inner.cond.notify_all();
        for job in ready {
            job();
        }
    }

    /// Block until this handle's generation has triggered.
    pub fn wait(&self) {
        let expected = self.inner.expected;
        let mut st = self.inner.state.lock();
        while !st.has_triggered(self.generation, expected) {
            self.inner.cond.wait(&mut st);
        }
    }

    /// Whether this handle's generation has received all its arrivals.
    pub fn has_triggered(&self) -> bool {
        self.inner
            .state
            .lock()
            .has_triggered(self.generation, self.inner.expected)
    }

    /// Handle on the next generation of the same barrier.
    #[must_use]
    pub fn advance(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            generation: self.generation + 1,
        }
    }

    /// Run `job` once this handle's generation triggers; immediately on the
    /// calling thread if it already has.
    pub(crate) fn on_trigger<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut st = self.inner.state.lock();
            if !st.has_triggered(self.generation, self.inner.expected) {
                st.deferred
                    .entry(self.generation)
                    .or_default()
                    .push(Box::new(job));
                return;
            }
        }
        job();
    }
}

impl PartialEq for PhaseBarrier {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id && self.generation == other.generation
    }
}

impl Eq for PhaseBarrier {}

impl fmt::Debug for PhaseBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseBarrier")
            .field("id", &self.inner.id)
            .field("generation", &self.generation)
            .field("expected", &self.inner.expected)
            .finish()
    }
}

/// The ready/done pair guarding one pull buffer.
#[derive(Clone, Debug)]
pub struct PhaseBarriers {
    /// Owner announces "pull buffer holds fresh data".
    pub ready: PhaseBarrier,
    /// Readers announce "finished copying out of the pull buffer".
    pub done: PhaseBarrier,
}

static_assertions::assert_impl_all!(PhaseBarrier: Send, Sync, Clone);
