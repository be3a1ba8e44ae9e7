//! Execution configuration shared by both substrates.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding [`ExecConfig::parallel_threshold`].
pub const ENV_PARALLEL_THRESHOLD: &str = "STRAND_PARALLEL_THRESHOLD";
/// Environment variable overriding [`ExecConfig::grid_dim`].
pub const ENV_GRID_DIM: &str = "STRAND_GRID_DIM";
/// Environment variable overriding [`ExecConfig::block_dim`].
pub const ENV_BLOCK_DIM: &str = "STRAND_BLOCK_DIM";

/// Largest accepted [`ExecConfig::block_dim`].
pub const MAX_BLOCK_DIM: usize = 1024;
/// Largest accepted `grid_dim * block_dim`. Every lane is an OS thread.
pub const MAX_LANES: usize = 4096;

/// Tuning knobs for the host and grid engines.
///
/// Missing fields deserialize to their defaults, so a partial JSON object
/// such as `{"grid_dim": 16}` is a valid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Host engines go data-parallel only above this many elements.
    pub parallel_threshold: usize,

    /// Thread-groups per grid launch.
    pub grid_dim: usize,

    /// Lanes per thread-group.
    pub block_dim: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 2048,
            grid_dim: 4,
            block_dim: 8,
        }
    }
}

impl ExecConfig {
    pub fn with_parallel_threshold(mut self, n: usize) -> Self {
        self.parallel_threshold = n;
        self
    }

    pub fn with_grid_dim(mut self, n: usize) -> Self {
        self.grid_dim = n;
        self
    }

    pub fn with_block_dim(mut self, n: usize) -> Self {
        self.block_dim = n;
        self
    }

    /// Whether a host job over `n` elements should run on rayon.
    pub fn is_parallel(&self, n: usize) -> bool {
        n > self.parallel_threshold
    }

    /// Reject configurations no launch can run with.
    pub fn validate(&self) -> Result<()> {
        if self.grid_dim == 0 {
            return Err(Error::Config("grid_dim must be at least 1".into()));
        }
        if self.block_dim == 0 {
            return Err(Error::Config("block_dim must be at least 1".into()));
        }
        if self.block_dim > MAX_BLOCK_DIM {
            return Err(Error::Config(format!(
                "block_dim {} exceeds {MAX_BLOCK_DIM}",
                self.block_dim
            )));
        }
        match self.grid_dim.checked_mul(self.block_dim) {
            Some(lanes) if lanes <= MAX_LANES => Ok(()),
            _ => Err(Error::Config(format!(
                "grid_dim {} x block_dim {} exceeds {MAX_LANES} lanes",
                self.grid_dim, self.block_dim
            ))),
        }
    }

    /// Parse a JSON object; absent fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: ExecConfig =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by the `STRAND_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ExecConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        let read = |key: &str, slot: &mut usize| -> Result<()> {
            if let Some(raw) = lookup(key) {
                *slot = raw
                    .trim()
                    .parse()
                    .map_err(|_| Error::Config(format!("{key}={raw:?} is not a valid count")))?;
            }
            Ok(())
        };
        read(ENV_PARALLEL_THRESHOLD, &mut cfg.parallel_threshold)?;
        read(ENV_GRID_DIM, &mut cfg.grid_dim)?;
        read(ENV_BLOCK_DIM, &mut cfg.block_dim)?;
        cfg.validate()?;
        tracing::debug!(?cfg, "execution config loaded");
        Ok(cfg)
    }
}
