// src/processing/variables.rs
use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction in which a ranked index contributes to the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    /// High percentile means wet.
    Direct,
    /// High percentile means dry; contributes `100 - rank`.
    Inverted,
}

impl Orientation {
    pub fn apply(self, rank: f64) -> f64 {
        match self {
            Orientation::Direct => rank,
            Orientation::Inverted => 100.0 - rank,
        }
    }
}

/// Known drought index variables and how each one is combined.
///
/// Resolved once from the variable name when a run is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexVariable {
    /// Normalised Difference Vegetation Index
    Ndvi,
    /// Standardised Precipitation Index
    Spi,
    Evapotranspiration,
    /// Available water content / root-zone soil moisture
    SoilMoisture,
    Other(String),
}

impl IndexVariable {
    pub fn resolve(name: &str) -> Self {
        let key = name.trim().to_lowercase();
        match key.as_str() {
            "ndvi" => IndexVariable::Ndvi,
            "et" | "eto" | "evapotranspiration" => IndexVariable::Evapotranspiration,
            "awc" | "sm" | "soil_moisture" | "soil-moisture" | "soilmoisture" => {
                IndexVariable::SoilMoisture
            }
            k if k.starts_with("spi") => IndexVariable::Spi,
            _ => IndexVariable::Other(name.to_string()),
        }
    }

    pub fn orientation(&self) -> Orientation {
        match self {
            IndexVariable::Evapotranspiration => Orientation::Inverted,
            _ => Orientation::Direct,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            IndexVariable::Ndvi => "NDVI",
            IndexVariable::Spi => "SPI",
            IndexVariable::Evapotranspiration => "ET",
            IndexVariable::SoilMoisture => "AWC",
            IndexVariable::Other(name) => name,
        }
    }
}

impl fmt::Display for IndexVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_names() {
        assert_eq!(IndexVariable::resolve("NDVI"), IndexVariable::Ndvi);
        assert_eq!(IndexVariable::resolve("spi2"), IndexVariable::Spi);
        assert_eq!(IndexVariable::resolve("awc"), IndexVariable::SoilMoisture);
        assert_eq!(
            IndexVariable::resolve("rain"),
            IndexVariable::Other("rain".to_string())
        );
    }

    #[test]
    fn evapotranspiration_is_inverted() {
        let et = IndexVariable::resolve("et");
        assert_eq!(et.orientation(), Orientation::Inverted);
        assert_eq!(et.orientation().apply(30.0), 70.0);
        assert_eq!(IndexVariable::Ndvi.orientation().apply(30.0), 30.0);
    }

    #[test]
    fn display_uses_short_label() {
        assert_eq!(IndexVariable::resolve("eto").to_string(), "ET");
        assert_eq!(IndexVariable::resolve("soil_moisture").to_string(), "AWC");
        assert_eq!(IndexVariable::resolve("Rain").label(), "Rain");
    }
}
