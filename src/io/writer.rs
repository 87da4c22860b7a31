// src/io/writer.rs
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, Driver, DriverManager, DriverType, Metadata};
use itertools::Itertools;
use tracing::{debug, info};

use crate::error::CdiError;
use crate::grid::GridDataset;
use crate::io::{TIME_KEY, UNITS_KEY, VARIABLE_KEY};

/// Written in place of missing values.
pub const NODATA_VALUE: f64 = -9999.0;

/// CF units of the time coordinate in netCDF output.
pub const NETCDF_TIME_UNITS: &str = "days since 1970-01-01";

// NC_DOUBLE
const NETCDF_DOUBLE: u32 = 6;

/// Writes `grid` as a multi-band raster, one band per date.
///
/// The driver is picked from the file extension. netCDF output gets a real
/// `time` dimension with CF units and the grid's variable name, so it reads
/// back as `NETCDF:"<path>":<variable>`. Other formats carry each date as
/// band description and `TIME` item and the dataset carries `VARIABLE` and
/// `UNITS`. Either way the file reads back with [`crate::io::read_grid`].
pub fn write_grid(grid: &GridDataset, output_path: &Path) -> Result<(), CdiError> {
    let (n_lat, n_lon, n_time) = grid.shape();
    if n_lat == 0 || n_lon == 0 || n_time == 0 {
        return Err(CdiError::InvalidGrid(format!(
            "nothing to write for '{}': grid shape is {n_lat}x{n_lon}x{n_time}",
            grid.variable()
        )));
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let driver = DriverManager::get_output_driver_for_dataset_name(output_path, DriverType::Raster)
        .ok_or_else(|| {
            CdiError::config(format!("no raster driver for output {}", output_path.display()))
        })?;

    match driver.short_name().as_str() {
        "netCDF" => write_netcdf(grid, &driver, output_path)?,
        _ => write_raster(grid, &driver, output_path)?,
    }

    info!(
        path = %output_path.display(),
        driver = %driver.short_name(),
        variable = grid.variable(),
        steps = n_time,
        "wrote grid"
    );
    Ok(())
}

/// Direct `Create` path for GeoTIFF and other band-oriented formats.
fn write_raster(grid: &GridDataset, driver: &Driver, output_path: &Path) -> Result<(), CdiError> {
    let (n_lat, n_lon, n_time) = grid.shape();

    // Create options vector
    let mut options = Vec::new();
    if driver.short_name() == "GTiff" {
        options.push("COMPRESS=DEFLATE".to_string());
        options.push("NUM_THREADS=ALL_CPUS".to_string());
    }
    let creation_options = RasterCreationOptions::from_iter(options);

    let mut output = driver.create_with_band_type_with_options::<f64, _>(
        output_path,
        n_lon,
        n_lat,
        n_time,
        &creation_options,
    )?;

    fill_dataset(&mut output, grid)?;
    output.set_metadata_item(VARIABLE_KEY, grid.variable(), "")?;
    if let Some(units) = grid.units() {
        output.set_metadata_item(UNITS_KEY, units, "")?;
    }

    for (t, date) in grid.times().iter().enumerate() {
        let date = date.format("%Y-%m-%d").to_string();
        let mut band = output.rasterband(t + 1)?;
        band.set_description(&date)?;
        band.set_metadata_item(TIME_KEY, &date, "")?;
    }

    output.flush_cache()?;
    Ok(())
}

/// netCDF `Create` cannot make extra dimensions, so the grid is staged in
/// memory with the `NETCDF_DIM_*` layout and copied out.
fn write_netcdf(grid: &GridDataset, driver: &Driver, output_path: &Path) -> Result<(), CdiError> {
    let (n_lat, n_lon, n_time) = grid.shape();
    let days = grid
        .times()
        .iter()
        .map(|date| days_since_epoch(*date))
        .collect::<Vec<_>>();

    let mut staged = DriverManager::get_driver_by_name("MEM")?
        .create_with_band_type::<f64, _>("", n_lon, n_lat, n_time)?;
    fill_dataset(&mut staged, grid)?;

    staged.set_metadata_item("NETCDF_DIM_EXTRA", "{time}", "")?;
    staged.set_metadata_item(
        "NETCDF_DIM_time_DEF",
        &format!("{{{n_time},{NETCDF_DOUBLE}}}"),
        "",
    )?;
    staged.set_metadata_item(
        "NETCDF_DIM_time_VALUES",
        &format!("{{{}}}", days.iter().join(",")),
        "",
    )?;
    staged.set_metadata_item("time#units", NETCDF_TIME_UNITS, "")?;
    staged.set_metadata_item("time#standard_name", "time", "")?;
    staged.set_metadata_item("time#calendar", "standard", "")?;
    staged.set_metadata_item("time#axis", "T", "")?;

    for (t, day) in days.iter().enumerate() {
        let mut band = staged.rasterband(t + 1)?;
        band.set_metadata_item("NETCDF_VARNAME", grid.variable(), "")?;
        band.set_metadata_item("NETCDF_DIM_time", &day.to_string(), "")?;
        if let Some(units) = grid.units() {
            band.set_metadata_item("units", units, "")?;
        }
    }

    let options = RasterCreationOptions::from_iter(["FORMAT=NC4", "COMPRESS=DEFLATE"]);
    let mut output = staged.create_copy(driver, output_path, &options)?;
    output.flush_cache()?;
    debug!(path = %output_path.display(), steps = n_time, "copied staged grid to netCDF");
    Ok(())
}

/// Georeferencing and band data shared by every output format.
fn fill_dataset(output: &mut Dataset, grid: &GridDataset) -> Result<(), CdiError> {
    let (n_lat, n_lon, n_time) = grid.shape();
    output.set_geo_transform(&geo_transform(grid))?;
    output.set_spatial_ref(&SpatialRef::from_epsg(4326)?)?;

    for t in 0..n_time {
        let mut band = output.rasterband(t + 1)?;
        band.set_no_data_value(Some(NODATA_VALUE))?;

        let data: Vec<f64> = grid
            .time_slice(t)
            .into_iter()
            .map(|v| v.unwrap_or(NODATA_VALUE))
            .collect();
        let mut buffer = Buffer::new((n_lon, n_lat), data);
        band.write((0, 0), (n_lon, n_lat), &mut buffer)?;
    }
    Ok(())
}

fn days_since_epoch(date: NaiveDate) -> i64 {
    (date - NaiveDate::default()).num_days()
}

/// Geotransform whose cell centres fall on the grid's coordinates.
fn geo_transform(grid: &GridDataset) -> [f64; 6] {
    let lat = grid.lat();
    let lon = grid.lon();
    let dx = if lon.len() > 1 { lon[1] - lon[0] } else { 1.0 };
    let dy = if lat.len() > 1 { lat[1] - lat[0] } else { -1.0 };
    [lon[0] - dx / 2.0, dx, 0.0, lat[0] - dy / 2.0, 0.0, dy]
}
