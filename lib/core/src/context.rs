//! Explicit execution context passed to every entry point.

use crate::exec::TaskRunner;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static VALIDATION: AtomicBool = AtomicBool::new(false);

/// Turns the process-wide invariant check on or off.
pub fn set_validation(enabled: bool) {
    VALIDATION.store(enabled, Ordering::Release);
}

/// Current state of the process-wide invariant check.
pub fn validation_enabled() -> bool {
    VALIDATION.load(Ordering::Acquire)
}

/// Configuration for an [`RvdContext`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RvdConfig {
    /// Worker threads; `None` uses one per core, `Some(1)` runs tasks inline.
    pub parallelism: Option<usize>,
    pub samples_per_partition: usize,
    pub max_sample_size: usize,
    pub seed: u64,
    /// Validate every constructed RVD, regardless of the process-wide toggle.
    pub validate: bool,
}

impl Default for RvdConfig {
    fn default() -> Self {
        Self {
            parallelism: None,
            samples_per_partition: 20,
            max_sample_size: 1_000_000,
            seed: 0,
            validate: false,
        }
    }
}

impl RvdConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RvdConfig =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<()> {
        if self.parallelism == Some(0) {
            return Err(Error::InvalidConfig("parallelism must be at least 1".into()));
        }
        if self.samples_per_partition == 0 || self.max_sample_size == 0 {
            return Err(Error::InvalidConfig("sample sizes must be positive".into()));
        }
        Ok(())
    }
}

/// Immutable configuration plus the handle used to run partition tasks.
#[derive(Debug, Clone)]
pub struct RvdContext {
    config: Arc<RvdConfig>,
    runner: TaskRunner,
}

impl RvdContext {
    pub fn new(config: RvdConfig) -> Result<Self> {
        config.check()?;
        let runner = match config.parallelism {
            Some(1) => TaskRunner::sequential(),
            threads => TaskRunner::parallel(threads)?,
        };
        Ok(Self {
            config: Arc::new(config),
            runner,
        })
    }

    /// Default configuration, tasks run inline on the calling thread.
    pub fn sequential() -> Self {
        Self {
            config: Arc::new(RvdConfig {
                parallelism: Some(1),
                ..RvdConfig::default()
            }),
            runner: TaskRunner::sequential(),
        }
    }

    #[inline]
    pub fn config(&self) -> &RvdConfig {
        &self.config
    }

    #[inline]
    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Whether invariant checks run at this boundary.
    #[inline]
    pub fn should_validate(&self) -> bool {
        self.config.validate || validation_enabled()
    }
}
