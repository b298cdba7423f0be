//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::halo_error::HaloError;

/// How the owner of a pull buffer treats its "done" barrier.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BarrierDiscipline {
    /// Wait for every reader of the previous round before repacking.
    #[default]
    Enforced,
    /// Fault injection: repack without waiting for the previous round's
    /// readers. Only meant for stress tests that must observe stale data.
    ///
    /// The owner skips its *wait* on `done` rather than readers skipping their
    /// *arrival*: a missing arrival never triggers the generation, so it can
    /// only deadlock the owner, never expose stale data.
    SkipDoneWait,
}

/// Settings shared by every partition of a [`World`](crate::runtime::world::World).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads for copy tasks; `None` lets rayon decide.
    pub worker_threads: Option<usize>,
    /// Prefix for worker and partition thread names.
    pub thread_name_prefix: String,
    pub barrier_discipline: BarrierDiscipline,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name_prefix: "halo".to_string(),
            barrier_discipline: BarrierDiscipline::Enforced,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), HaloError> {
        if self.worker_threads == Some(0) {
            return Err(HaloError::InvalidConfig(
                "worker_threads must be at least 1".into(),
            ));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(HaloError::InvalidConfig(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Build the task pool described by this configuration.
    pub(crate) fn build_pool(&self) -> Result<rayon::ThreadPool, HaloError> {
        self.validate()?;
        let prefix = self.thread_name_prefix.clone();
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(move |i| format!("{prefix}-worker-{i}"));
        if let Some(n) = self.worker_threads {
            builder = builder.num_threads(n);
        }
        Ok(builder.build()?)
    }
}
