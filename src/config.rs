use std::{env, num::NonZeroUsize, str::FromStr, thread};

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

const THREADS_VAR: &str = "LAE_THREADS";
const SEED_VAR: &str = "LAE_SEED";

/// The settings of a `LinearAlgebraEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    pub threads: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl EngineConfig {
    /// Creates a new `EngineConfig` with fatigue multipliers drawn from the OS rng.
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            seed: None,
        }
    }

    /// Makes the pool's fatigue multipliers reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the config from `LAE_THREADS` and `LAE_SEED`.
    ///
    /// The thread count defaults to the available parallelism, the seed to none.
    ///
    /// # Returns
    /// The config or an `InvalidArgument` error if a variable doesn't parse.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            env::var(THREADS_VAR).ok().as_deref(),
            env::var(SEED_VAR).ok().as_deref(),
        )
    }

    fn from_vars(threads: Option<&str>, seed: Option<&str>) -> Result<Self> {
        let threads = match parse(THREADS_VAR, threads)? {
            Some(threads) => threads,
            None => thread::available_parallelism().map_or(1, NonZeroUsize::get),
        };

        Ok(Self {
            threads,
            seed: parse(SEED_VAR, seed)?,
        })
    }

    /// The generator the pool's fatigue multipliers are drawn from.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

fn parse<T: FromStr>(name: &str, raw: Option<&str>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    raw.map(|raw| {
        raw.trim()
            .parse()
            .map_err(|e| EngineError::invalid(format!("malformed {name} {raw:?}: {e}")))
    })
    .transpose()
}
