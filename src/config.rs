use crate::{AnalysisError, Result, io_err};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hard-to-predict branch criteria, with counts normalized to a 30M
/// instruction window as in "Branch Prediction Is Not A Solved Problem"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct H2pThresholds {
    /// branches at or above this accuracy are never H2P
    pub max_accuracy: f64,
    pub min_executions_per_30m: f64,
    pub min_mispredictions_per_30m: f64,
}

impl Default for H2pThresholds {
    fn default() -> Self {
        Self {
            max_accuracy: 0.99,
            min_executions_per_30m: 15000.0,
            min_mispredictions_per_30m: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// largest K of the top-K misprediction share curve
    pub top_k: usize,
    pub h2p: H2pThresholds,
    /// where the parsed report table is cached
    pub cache_path: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_k: 50,
            h2p: H2pThresholds::default(),
            cache_path: PathBuf::from("cbp2016_all_results.json"),
        }
    }
}

impl AnalysisConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(io_err(path))?;
        serde_json::from_slice(&content).map_err(|source| AnalysisError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Config from `path` when given, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }
}
