//! # Stage configuration
//!
//! Knobs shared by every batching stage. The defaults match a two-deep
//! pipeline (fill one batch while the previous one is inferred).

use serde::{Deserialize, Serialize};
use crate::error::{BatchingError, Result};

/// Normalization applied by host-side preprocessing: `(v * scale - mean) / std`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub scale: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            scale: 1.0 / 255.0,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl NormalizeConfig {
    /// Leaves pixel values untouched.
    pub fn identity() -> Self {
        Self { scale: 1.0, mean: [0.0; 3], std: [1.0; 3] }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Objects per inference batch.
    pub batch_size: u32,
    /// Number of slots in the resource pool.
    pub pool_depth: usize,
    /// Upper bound on tasks running at once in [`crate::executor::TaskExecutor`].
    pub max_concurrent_tasks: usize,
    /// Accelerator the device transforms run on.
    pub device_id: i32,
    pub normalize: NormalizeConfig,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            pool_depth: 2,
            max_concurrent_tasks: 8,
            device_id: 0,
            normalize: NormalizeConfig::default(),
        }
    }
}

impl StageConfig {
    /// Parses a TOML document. Missing keys take their default value.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: StageConfig = toml::from_str(contents)
            .map_err(|e| BatchingError::InvalidConfig(format!("failed to parse stage config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BatchingError::InvalidConfig("batch_size must be greater than 0".into()));
        }
        if self.pool_depth == 0 {
            return Err(BatchingError::InvalidConfig("pool_depth must be greater than 0".into()));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(BatchingError::InvalidConfig(
                "max_concurrent_tasks must be greater than 0".into(),
            ));
        }
        if self.normalize.scale <= 0.0 {
            return Err(BatchingError::InvalidConfig("normalize.scale must be greater than 0".into()));
        }
        if let Some((i, s)) = self.normalize.std.iter().enumerate().find(|(_, s)| **s <= 0.0) {
            return Err(BatchingError::InvalidConfig(format!(
                "normalize.std[{i}] must be greater than 0, got {s}"
            )));
        }
        Ok(())
    }
}
