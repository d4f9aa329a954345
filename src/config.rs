//! Kernel configuration.
//!
//! Every field has a default, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! quantum = 5
//! max_processes = 16
//!
//! [tvm]
//! memory_words = 512
//! branch_prediction = false
//!
//! [lambda]
//! max_steps = 2000
//! ```

use std::fs;
use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::lambda::reduce::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_STEPS};
use crate::tvm::predictor::PREDICTOR_ENTRIES;

/// TVM sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TvmConfig {
    /// Memory size in 27-trit words.
    pub memory_words: usize,
    /// Instruction cache slots; must be a power of two.
    pub icache_size: usize,
    pub branch_prediction: bool,
    pub predictor_entries: usize,
}

impl Default for TvmConfig {
    fn default() -> Self {
        Self {
            memory_words: 1024,
            icache_size: 64,
            branch_prediction: true,
            predictor_entries: PREDICTOR_ENTRIES,
        }
    }
}

/// Limits for lambda syscalls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LambdaConfig {
    pub max_steps: u64,
    pub max_depth: usize,
}

impl Default for LambdaConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Ticks per scheduling quantum.
    pub quantum: u64,
    /// Process table capacity, kernel process included.
    pub max_processes: usize,
    /// TVM instructions a process may run per tick.
    pub instructions_per_tick: u64,
    pub kernel_stack_pages: usize,
    pub user_stack_pages: usize,
    /// Physical frames managed by the frame allocator.
    pub frames: usize,
    /// Bytes per frame.
    pub frame_size: usize,
    pub tvm: TvmConfig,
    pub lambda: LambdaConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            quantum: 10,
            max_processes: 64,
            instructions_per_tick: 64,
            kernel_stack_pages: 2,
            user_stack_pages: 4,
            frames: 1024,
            frame_size: 256,
            tvm: TvmConfig::default(),
            lambda: LambdaConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("reading {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quantum == 0 {
            return Err(ConfigError::Invalid("quantum must be positive".into()));
        }
        if self.max_processes == 0 {
            return Err(ConfigError::Invalid("max_processes must be positive".into()));
        }
        if self.frames == 0 || self.frame_size == 0 {
            return Err(ConfigError::Invalid("physical memory must be non-empty".into()));
        }
        if self.tvm.memory_words == 0 {
            return Err(ConfigError::Invalid("tvm.memory_words must be positive".into()));
        }
        if !self.tvm.icache_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "tvm.icache_size {} is not a power of two",
                self.tvm.icache_size
            )));
        }
        if !self.tvm.predictor_entries.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "tvm.predictor_entries {} is not a power of two",
                self.tvm.predictor_entries
            )));
        }
        Ok(())
    }
}

/// Errors loading a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid TOML: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.quantum, 10);
        assert_eq!(config.tvm.icache_size, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = KernelConfig::from_toml_str(
            "quantum = 3\n[tvm]\nmemory_words = 128\nbranch_prediction = false\n",
        )
        .unwrap();
        assert_eq!(config.quantum, 3);
        assert_eq!(config.tvm.memory_words, 128);
        assert!(!config.tvm.branch_prediction);
        assert_eq!(config.tvm.icache_size, 64);
        assert_eq!(config.lambda.max_steps, DEFAULT_MAX_STEPS);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = KernelConfig { quantum: 7, ..KernelConfig::default() };
        let text = config.to_toml_string().unwrap();
        assert_eq!(KernelConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(KernelConfig::from_toml_str("quantum = 0"), Err(ConfigError::Invalid(_))));
        assert!(matches!(KernelConfig::from_toml_str("[tvm]\nicache_size = 48"), Err(ConfigError::Invalid(_))));
        assert!(matches!(KernelConfig::from_toml_str("quantum = \"x\""), Err(ConfigError::Parse(_))));
    }
}
