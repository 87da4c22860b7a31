// src/config.rs
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CdiError;
use crate::io::GridSource;
use crate::processing::{
    CellRule, MissingDataPolicy, Orientation, ParallelGridExecutor, TimeAlignment, WorkerCount,
};
use crate::weights::WeightVector;

/// Everything one CDI run needs, read once at startup.
///
/// ```json
/// {
///   "inputs": [
///     { "name": "ndvi", "path": "ndvi.nc" },
///     { "name": "spi",  "path": "spi.nc", "variable": "spi2" },
///     { "name": "et",   "path": "et.tif", "rank": false }
///   ],
///   "output": "cdi.tif",
///   "weights": { "ndvi": 0.2, "spi": 0.4, "et": 0.2 },
///   "workers": "all-but-one"
/// }
/// ```
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub inputs: Vec<InputConfig>,
    pub output: PathBuf,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub weights_file: Option<PathBuf>,
    #[serde(default)]
    pub workers: WorkerSetting,
    #[serde(default)]
    pub chunk_cells: Option<usize>,
    #[serde(default)]
    pub alignment: TimeAlignment,
    #[serde(default)]
    pub cell_rule: CellRule,
    #[serde(default = "default_output_variable")]
    pub output_variable: String,
    /// Drop all-missing time steps from each ranked grid.
    #[serde(default)]
    pub drop_empty_ranked: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct InputConfig {
    pub name: String,
    pub path: PathBuf,
    /// Variable inside the file; defaults to `name`.
    #[serde(default)]
    pub variable: Option<String>,
    /// Percentile-rank the grid before combining. Turn off for inputs that
    /// are already ranked.
    #[serde(default = "default_true")]
    pub rank: bool,
    /// Overrides the registry's orientation for this variable.
    #[serde(default)]
    pub invert: Option<bool>,
}

/// Worker pool size as written in a config file: a number or one of
/// `single`, `all`, `all-but-one`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum WorkerSetting {
    Count(i64),
    Named(String),
}

impl Default for WorkerSetting {
    fn default() -> Self {
        WorkerSetting::Named("all-but-one".to_string())
    }
}

impl WorkerSetting {
    pub fn worker_count(&self) -> Result<WorkerCount, CdiError> {
        match self {
            WorkerSetting::Count(n) => n.to_string().parse(),
            WorkerSetting::Named(s) => s.parse(),
        }
    }
}

fn default_output_variable() -> String {
    "cdi".to_string()
}

fn default_true() -> bool {
    true
}

impl InputConfig {
    pub fn source(&self) -> GridSource {
        GridSource::new(
            self.name.clone(),
            self.path.clone(),
            self.variable.clone().unwrap_or_else(|| self.name.clone()),
        )
    }

    pub fn orientation_override(&self) -> Option<Orientation> {
        self.invert.map(|invert| {
            if invert {
                Orientation::Inverted
            } else {
                Orientation::Direct
            }
        })
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, CdiError> {
        if !path.exists() {
            return Err(CdiError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Checks everything that can be checked without touching grid files.
    pub fn validate(&self) -> Result<WeightVector, CdiError> {
        if self.inputs.is_empty() {
            return Err(CdiError::config("no inputs configured"));
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if input.name.trim().is_empty() {
                return Err(CdiError::config("input with an empty name"));
            }
            if !seen.insert(input.name.as_str()) {
                return Err(CdiError::config(format!("input '{}' listed twice", input.name)));
            }
        }

        if self.chunk_cells == Some(0) {
            return Err(CdiError::config("chunk_cells must be at least 1"));
        }
        self.workers.worker_count()?;

        let weights = self.weight_vector()?;
        weights.resolve(&self.input_names())?;
        Ok(weights)
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|i| i.name.as_str()).collect()
    }

    pub fn sources(&self) -> Vec<GridSource> {
        self.inputs.iter().map(InputConfig::source).collect()
    }

    /// Inline weights, or the weight file; not both.
    pub fn weight_vector(&self) -> Result<WeightVector, CdiError> {
        match &self.weights_file {
            Some(_) if !self.weights.is_empty() => Err(CdiError::config(
                "give either inline weights or a weights file, not both",
            )),
            Some(path) => WeightVector::load(path),
            None => WeightVector::from_entries(self.weights.clone()),
        }
    }

    pub fn executor(&self) -> Result<ParallelGridExecutor, CdiError> {
        let executor = ParallelGridExecutor::new(self.workers.worker_count()?);
        match self.chunk_cells {
            Some(n) => executor.with_chunk_cells(n),
            None => Ok(executor),
        }
    }

    pub fn policy(&self) -> MissingDataPolicy {
        MissingDataPolicy::new(self.cell_rule)
    }
}
