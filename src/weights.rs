// src/weights.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use tracing::debug;

use crate::error::CdiError;

/// Per-variable combination weights.
///
/// Only explicitly supplied entries are stored. Variables without an entry
/// get `1 / N` when the vector is resolved against the `N` inputs of a run,
/// so an empty vector means uniform weighting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightVector {
    entries: BTreeMap<String, f64>,
}

impl WeightVector {
    pub fn uniform() -> Self {
        Self::default()
    }

    pub fn from_entries<I, S>(entries: I) -> Result<Self, CdiError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (name, weight) in entries {
            let name = name.into();
            if !weight.is_finite() || weight < 0.0 {
                return Err(CdiError::config(format!(
                    "weight for '{name}' must be a non-negative number, got {weight}"
                )));
            }
            if map.insert(name.clone(), weight).is_some() {
                return Err(CdiError::config(format!("duplicate weight for '{name}'")));
            }
        }
        Ok(Self { entries: map })
    }

    /// Reads a JSON object of `"variable": weight` pairs.
    pub fn load(path: &Path) -> Result<Self, CdiError> {
        if !path.exists() {
            return Err(CdiError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        let raw: BTreeMap<String, f64> = serde_json::from_str(&content)?;
        debug!(path = %path.display(), entries = raw.len(), "loaded weight file");
        Self::from_entries(raw)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.get(name).copied()
    }

    /// Weight for each of `inputs`, in order.
    ///
    /// Fails if an entry names a variable that is not an input, or if every
    /// resolved weight is zero.
    pub fn resolve(&self, inputs: &[&str]) -> Result<Vec<f64>, CdiError> {
        let unknown = self
            .entries
            .keys()
            .filter(|k| !inputs.contains(&k.as_str()))
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            return Err(CdiError::config(format!(
                "weights given for unknown variable(s) {}; inputs are {}",
                unknown.iter().join(", "),
                inputs.iter().join(", ")
            )));
        }

        let default = 1.0 / inputs.len().max(1) as f64;
        let weights: Vec<f64> = inputs
            .iter()
            .map(|name| self.get(name).unwrap_or(default))
            .collect();

        if weights.iter().all(|&w| w == 0.0) {
            return Err(CdiError::config("all weights are zero"));
        }
        Ok(weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vector_resolves_uniform() {
        let w = WeightVector::uniform().resolve(&["a", "b", "c", "d"]).unwrap();
        assert_eq!(w, vec![0.25; 4]);
    }

    #[test]
    fn unlisted_variables_get_default_share() {
        let w = WeightVector::from_entries([("spi", 0.4), ("ndvi", 0.2)])
            .unwrap()
            .resolve(&["ndvi", "spi", "awc", "et"])
            .unwrap();
        assert_eq!(w, vec![0.2, 0.4, 0.25, 0.25]);
    }

    #[test]
    fn rejects_negative_and_non_finite() {
        assert!(matches!(
            WeightVector::from_entries([("a", -0.1)]),
            Err(CdiError::Configuration(_))
        ));
        assert!(WeightVector::from_entries([("a", f64::NAN)]).is_err());
    }

    #[test]
    fn rejects_unknown_variable() {
        let err = WeightVector::from_entries([("soil", 1.0)])
            .unwrap()
            .resolve(&["ndvi", "spi"])
            .unwrap_err();
        assert!(err.to_string().contains("soil"));
    }

    #[test]
    fn rejects_all_zero() {
        let err = WeightVector::from_entries([("a", 0.0), ("b", 0.0)])
            .unwrap()
            .resolve(&["a", "b"])
            .unwrap_err();
        assert!(matches!(err, CdiError::Configuration(_)));
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        fs::write(&path, r#"{"ndvi": 0.2, "spi": 0.4}"#).unwrap();

        let w = WeightVector::load(&path).unwrap();
        assert_eq!(w.get("spi"), Some(0.4));
        assert_eq!(w.get("et"), None);

        fs::write(&path, r#"{"ndvi": -1}"#).unwrap();
        assert!(WeightVector::load(&path).is_err());
    }
}
