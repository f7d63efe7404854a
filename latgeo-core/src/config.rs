use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::orchestrate::ProbePlan;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Catalog file; the built-in catalog is used when absent.
    #[serde(default)]
    pub catalog_path: Option<String>,
    #[serde(default = "default_target_samples")]
    pub target_samples: usize,
    #[serde(default = "default_reference_samples")]
    pub reference_samples: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Gap between consecutive echo requests to the same host.
    #[serde(default = "default_spacing_ms")]
    pub spacing_ms: u64,
    #[serde(default = "default_pacing_spin_us")]
    pub pacing_spin_us: u64,
    /// Pause between handing out probe jobs. Pacing only.
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_multilateration_count")]
    pub multilateration_count: usize,
    #[serde(default = "default_top_count")]
    pub top_count: usize,
    /// JSONL run log; nothing is written when absent.
    #[serde(default)]
    pub output_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: None,
            target_samples: default_target_samples(),
            reference_samples: default_reference_samples(),
            timeout_ms: default_timeout_ms(),
            spacing_ms: default_spacing_ms(),
            pacing_spin_us: default_pacing_spin_us(),
            stagger_ms: default_stagger_ms(),
            max_workers: default_max_workers(),
            multilateration_count: default_multilateration_count(),
            top_count: default_top_count(),
            output_path: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let cfg = serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            what: path.display().to_string(),
            source,
        })?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_samples == 0 || self.reference_samples == 0 {
            return Err(ConfigError::Invalid(
                "targetSamples and referenceSamples must be > 0".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeoutMs must be > 0".into()));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("maxWorkers must be > 0".into()));
        }
        if self.multilateration_count < 3 {
            return Err(ConfigError::Invalid(
                "multilaterationCount must be >= 3".into(),
            ));
        }
        if let Some(path) = &self.catalog_path {
            if path.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "catalogPath must not be empty when set".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }

    pub fn probe_plan(&self) -> ProbePlan {
        ProbePlan {
            target_samples: self.target_samples,
            reference_samples: self.reference_samples,
            timeout: self.timeout(),
            stagger: Duration::from_millis(self.stagger_ms),
            max_workers: self.max_workers,
        }
    }
}

fn default_target_samples() -> usize {
    5
}

fn default_reference_samples() -> usize {
    3
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_spacing_ms() -> u64 {
    1_000
}

fn default_pacing_spin_us() -> u64 {
    200
}

fn default_stagger_ms() -> u64 {
    10
}

fn default_max_workers() -> usize {
    64
}

fn default_multilateration_count() -> usize {
    10
}

fn default_top_count() -> usize {
    15
}
