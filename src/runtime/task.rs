//! Asynchronous tasks with declared region access and barrier effects.
//!
//! A [`TaskLauncher`] bundles a body with its region requirements, the barrier
//! generations it must wait for, and the generations it arrives on when done.
//! Launching never blocks: the task is parked on its wait barriers and only
//! handed to the worker pool once all of them have triggered.

use std::fmt;
use std::sync::Arc;

use rayon::ThreadPool;

use crate::runtime::phase_barrier::PhaseBarrier;
use crate::runtime::region::{Element, PhysicalRegion, RegionRequirement};

type TaskBody<T> = Box<dyn for<'a> FnOnce(&mut TaskRegions<'a, T>) + Send>;

/// Regions mapped for one task body, indexed in declaration order.
pub struct TaskRegions<'a, T> {
    mapped: Vec<PhysicalRegion<'a, T>>,
}

impl<T> TaskRegions<'_, T> {
    pub fn len(&self) -> usize {
        self.mapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapped.is_empty()
    }

    /// Read access to requirement `idx`.
    pub fn read(&self, idx: usize) -> &[T] {
        self.mapped[idx].as_slice()
    }

    /// Write access to requirement `idx`.
    ///
    /// # Panics
    /// If the requirement was declared read-only.
    pub fn write(&mut self, idx: usize) -> &mut [T] {
        match self.mapped[idx].as_mut_slice() {
            Some(s) => s,
            None => panic!("requirement {idx} is mapped read-only"),
        }
    }

    /// Read access to `src` alongside write access to `dst`.
    pub fn read_write(&mut self, src: usize, dst: usize) -> (&[T], &mut [T]) {
        assert_ne!(src, dst, "a requirement cannot be both source and destination");
        let (src, dst) = if src < dst {
            let (lo, hi) = self.mapped.split_at_mut(dst);
            (&lo[src], &mut hi[0])
        } else {
            let (lo, hi) = self.mapped.split_at_mut(src);
            (&hi[0], &mut lo[dst])
        };
        match dst.as_mut_slice() {
            Some(d) => (src.as_slice(), d),
            None => panic!("destination requirement is mapped read-only"),
        }
    }
}

/// Description of one asynchronous task.
pub struct TaskLauncher<T> {
    name: &'static str,
    requirements: Vec<RegionRequirement<T>>,
    wait_barriers: Vec<PhaseBarrier>,
    arrival_barriers: Vec<PhaseBarrier>,
    body: TaskBody<T>,
}

impl<T: Element> TaskLauncher<T> {
    pub fn new<F>(name: &'static str, body: F) -> Self
    where
        F: for<'a> FnOnce(&mut TaskRegions<'a, T>) + Send + 'static,
    {
        Self {
            name,
            requirements: Vec::new(),
            wait_barriers: Vec::new(),
            arrival_barriers: Vec::new(),
            body: Box::new(body),
        }
    }

    pub fn add_region_requirement(mut self, req: RegionRequirement<T>) -> Self {
        self.requirements.push(req);
        self
    }

    /// The task will not start before this generation triggers.
    pub fn add_wait_barrier(mut self, barrier: PhaseBarrier) -> Self {
        self.wait_barriers.push(barrier);
        self
    }

    /// The task arrives once on this generation after its body returns.
    pub fn add_arrival_barrier(mut self, barrier: PhaseBarrier) -> Self {
        self.arrival_barriers.push(barrier);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Hand the task to `pool` once every wait barrier has triggered.
    pub(crate) fn launch(mut self, pool: Arc<ThreadPool>) -> TaskHandle {
        let completion = PhaseBarrier::new(1);
        let handle = TaskHandle {
            name: self.name,
            completion: completion.clone(),
        };
        let waits = std::mem::take(&mut self.wait_barriers);
        when_all(waits, move || pool.spawn(move || self.run(completion)));
        handle
    }

    fn run(self, completion: PhaseBarrier) {
        let TaskLauncher {
            name,
            requirements,
            arrival_barriers,
            body,
            ..
        } = self;
        log::trace!("task `{name}`: mapping {} regions", requirements.len());
        {
            // lock parents in id order so overlapping launches cannot deadlock
            let mut order: Vec<usize> = (0..requirements.len()).collect();
            order.sort_by_key(|&i| requirements[i].slice.region().id());
            let mut slots: Vec<Option<PhysicalRegion<'_, T>>> =
                requirements.iter().map(|_| None).collect();
            for i in order {
                slots[i] = Some(requirements[i].map());
            }
            let mut regions = TaskRegions {
                mapped: slots.into_iter().flatten().collect(),
            };
            body(&mut regions);
        }
        for b in &arrival_barriers {
            b.arrive(1);
        }
        completion.arrive(1);
    }
}

impl<T> fmt::Debug for TaskLauncher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLauncher")
            .field("name", &self.name)
            .field("requirements", &self.requirements.len())
            .field("wait_barriers", &self.wait_barriers)
            .field("arrival_barriers", &self.arrival_barriers)
            .finish()
    }
}

/// Chain `then` behind every barrier in `barriers`.
fn when_all<F>(mut barriers: Vec<PhaseBarrier>, then: F)
where
    F: FnOnce() + Send + 'static,
{
    match barriers.pop() {
        None => then(),
        Some(b) => b.on_trigger(move || when_all(barriers, then)),
    }
}

/// Completion event of a launched task.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    name: &'static str,
    completion: PhaseBarrier,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Block until the task body has run and its arrivals are registered.
    pub fn wait(&self) {
        self.completion.wait();
    }

    pub fn is_complete(&self) -> bool {
        self.completion.has_triggered()
    }
}
