use std::collections::HashMap;

use crate::error::{Error, Result};

const DEFAULT_CONCURRENCY: usize = 1;
const DEFAULT_CHANNEL_CAPACITY: usize = 3;

const ENV_PIPELINE_CONCURRENCY: &str = "PIPELINE_CONCURRENCY";
const ENV_PIPELINE_CHANNEL_CAPACITY: &str = "PIPELINE_CHANNEL_CAPACITY";

/// Execution settings of a [crate::Pipeline].
///
/// A concurrency of 0 or 1 runs every operation inline on the calling task. Anything above
/// spawns that many workers per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of workers used by the concurrent executors.
    pub concurrency: usize,
    /// Capacity of every internal channel (work queue, results and partial folds).
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            concurrency: DEFAULT_CONCURRENCY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Loads the config from the given environment variables, unset variables keep their
    /// defaults.
    pub fn load(
        env_vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<Self> {
        let env_vars: HashMap<String, String> = env_vars
            .into_iter()
            .map(|(key, val)| (key.into(), val.into()))
            .filter(|(key, _val)| {
                [ENV_PIPELINE_CONCURRENCY, ENV_PIPELINE_CHANNEL_CAPACITY].contains(&key.as_str())
            })
            .collect();

        let parse_var = |var: &str| -> Result<Option<usize>> {
            env_vars
                .get(var)
                .map(|val| {
                    val.trim().parse::<usize>().map_err(|e| {
                        Error::Config(format!("Environment variable {var}={val} is invalid: {e}"))
                    })
                })
                .transpose()
        };

        let mut config = PipelineConfig::default();
        if let Some(concurrency) = parse_var(ENV_PIPELINE_CONCURRENCY)? {
            config.concurrency = concurrency;
        }
        if let Some(capacity) = parse_var(ENV_PIPELINE_CHANNEL_CAPACITY)? {
            if capacity == 0 {
                return Err(Error::Config(format!(
                    "Environment variable {ENV_PIPELINE_CHANNEL_CAPACITY} must be at least 1"
                )));
            }
            config.channel_capacity = capacity;
        }
        Ok(config)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the internal channel capacity, a capacity of 0 is raised to 1.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Returns true if operations run on a worker pool.
    pub fn is_concurrent(&self) -> bool {
        self.concurrency > 1
    }

    /// Channel capacity actually used by the executors, never 0.
    pub(crate) fn capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }
}
