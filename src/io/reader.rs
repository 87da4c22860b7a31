// src/io/reader.rs
use std::path::{Path, PathBuf};
use std::str::FromStr;

use gdal::raster::RasterBand;
use gdal::{Dataset, Metadata};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::CdiError;
use crate::grid::dataset::mask_value;
use crate::grid::GridDataset;
use crate::io::time::{decode_cf_time, parse_iso_date};
use crate::io::{TIME_KEY, UNITS_KEY, VARIABLE_KEY};

/// One input grid file and the variable to take from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSource {
    /// Label used for weights and the variable registry.
    pub name: String,
    pub path: PathBuf,
    /// Variable inside the file.
    pub variable: String,
}

impl GridSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, variable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            variable: variable.into(),
        }
    }
}

/// Parses `NAME=PATH` or `NAME:VAR=PATH`. Without `VAR` the file variable is
/// assumed to be called `NAME`.
impl FromStr for GridSource {
    type Err = CdiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, path) = s.split_once('=').ok_or_else(|| {
            CdiError::config(format!("input '{s}' must look like NAME=PATH or NAME:VAR=PATH"))
        })?;
        let (name, variable) = label.split_once(':').unwrap_or((label, label));
        if name.is_empty() || variable.is_empty() || path.is_empty() {
            return Err(CdiError::config(format!("input '{s}' has an empty name, variable or path")));
        }
        Ok(Self::new(name, path, variable))
    }
}

fn is_netcdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_lowercase().as_str(), "nc" | "nc4" | "cdf" | "netcdf"))
}

fn open_variable(source: &GridSource) -> Result<Dataset, CdiError> {
    let missing = || CdiError::MissingVariable {
        name: source.variable.clone(),
        path: source.path.clone(),
    };

    if is_netcdf(&source.path) {
        let subdataset = format!("NETCDF:\"{}\":{}", source.path.display(), source.variable);
        return Dataset::open(&subdataset).map_err(|_| missing());
    }

    let dataset = Dataset::open(&source.path)?;
    match dataset.metadata_item(VARIABLE_KEY, "") {
        Some(var) if var != source.variable => Err(missing()),
        Some(_) => Ok(dataset),
        None => {
            debug!(
                path = %source.path.display(),
                variable = %source.variable,
                "no {VARIABLE_KEY} item, taking the file's bands as the requested variable"
            );
            Ok(dataset)
        }
    }
}

/// Reads one variable of a raster file into a [`GridDataset`].
///
/// Each band is one time step. Latitude and longitude are the cell centres
/// of the geotransform; band nodata becomes missing.
///
/// netCDF files are opened by variable name, so an absent variable is a
/// `MissingVariable` error. Other rasters hold a single variable: a `VARIABLE`
/// item that names a different one is a `MissingVariable` error, while a file
/// without the item (a plain GeoTIFF from another tool) is read as the
/// requested variable.
pub fn read_grid(source: &GridSource) -> Result<GridDataset, CdiError> {
    if !source.path.exists() {
        return Err(CdiError::FileNotFound {
            path: source.path.clone(),
        });
    }

    let dataset = open_variable(source)?;
    let (width, height) = dataset.raster_size();
    let gt = dataset.geo_transform()?;
    let lon: Vec<f64> = (0..width).map(|i| gt[0] + (i as f64 + 0.5) * gt[1]).collect();
    let lat: Vec<f64> = (0..height).map(|j| gt[3] + (j as f64 + 0.5) * gt[5]).collect();

    let cf_units = dataset.metadata_item("time#units", "");
    let band_count = dataset.raster_count() as usize;

    let mut times = Vec::with_capacity(band_count);
    let mut slices = Vec::with_capacity(band_count);
    for index in 1..=band_count {
        let band = dataset.rasterband(index)?;
        times.push(band_date(&band, index, cf_units.as_deref())?);

        let nodata = band.no_data_value();
        let buffer = band.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
        slices.push(buffer.data().iter().map(|&v| mask_value(v, nodata)).collect());
    }

    debug!(
        path = %source.path.display(),
        variable = %source.variable,
        lat = height,
        lon = width,
        steps = band_count,
        "read grid"
    );

    let units = dataset
        .metadata_item(UNITS_KEY, "")
        .or_else(|| dataset.metadata_item(&format!("{}#units", source.variable), ""));
    let grid = GridDataset::from_time_major(source.name.clone(), lat, lon, times, slices)?;
    Ok(match units {
        Some(units) => grid.with_units(units),
        None => grid,
    })
}

/// Reads several sources in parallel, failing on the first bad one.
pub fn read_grids(sources: &[GridSource]) -> Result<Vec<GridDataset>, CdiError> {
    info!(files = sources.len(), "reading input grids");
    sources.par_iter().map(read_grid).collect()
}

fn band_date(band: &RasterBand, index: usize, cf_units: Option<&str>) -> Result<chrono::NaiveDate, CdiError> {
    if let (Some(raw), Some(units)) = (band.metadata_item("NETCDF_DIM_time", ""), cf_units) {
        let value: f64 = raw.trim().parse().map_err(|_| {
            CdiError::InvalidTimeAxis(format!("band {index}: time value '{raw}' is not a number"))
        })?;
        return decode_cf_time(value, units);
    }
    if let Some(iso) = band.metadata_item(TIME_KEY, "") {
        return parse_iso_date(&iso);
    }
    let description = band.description()?;
    parse_iso_date(&description).map_err(|_| {
        CdiError::InvalidTimeAxis(format!(
            "band {index} carries no date (no NETCDF_DIM_time, {TIME_KEY} or dated description)"
        ))
    })
}
