// src/grid/dataset.rs
use std::ops::Range;

use chrono::NaiveDate;
use itertools::Itertools;

use crate::error::CdiError;

/// Coordinates closer than this (degrees) are treated as the same location.
pub const COORD_TOLERANCE: f64 = 1e-6;

/// A labelled latitude × longitude × time grid of one variable.
///
/// Values are stored cell-major: the full time series of cell
/// `lat * n_lon + lon` occupies `values[cell * n_time..(cell + 1) * n_time]`.
/// Missing observations are `None`; NaN never appears in a built grid.
///
/// Grids are immutable snapshots. Every transform builds a new grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDataset {
    variable: String,
    units: Option<String>,
    lat: Vec<f64>,
    lon: Vec<f64>,
    times: Vec<NaiveDate>,
    values: Vec<Option<f64>>,
}

impl GridDataset {
    /// Builds a grid from cell-major values.
    pub fn new(
        variable: impl Into<String>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        times: Vec<NaiveDate>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, CdiError> {
        validate_time_axis(&times)?;
        let expected = lat.len() * lon.len() * times.len();
        if values.len() != expected {
            return Err(CdiError::InvalidGrid(format!(
                "expected {} values for a {}x{}x{} grid, got {}",
                expected,
                lat.len(),
                lon.len(),
                times.len(),
                values.len()
            )));
        }

        // NaN is never a value, whatever the caller handed in
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();

        Ok(Self {
            variable: variable.into(),
            units: None,
            lat,
            lon,
            times,
            values,
        })
    }

    /// Builds a grid from raw cell-major numbers, turning NaN and the
    /// `nodata` sentinel into missing values.
    pub fn from_raw(
        variable: impl Into<String>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        times: Vec<NaiveDate>,
        raw: Vec<f64>,
        nodata: Option<f64>,
    ) -> Result<Self, CdiError> {
        let values = raw.into_iter().map(|v| mask_value(v, nodata)).collect();
        Self::new(variable, lat, lon, times, values)
    }

    /// Builds a grid from one row-major `lat × lon` image per time step, the
    /// layout raster files deliver.
    pub fn from_time_major(
        variable: impl Into<String>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        times: Vec<NaiveDate>,
        slices: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, CdiError> {
        let n_cells = lat.len() * lon.len();
        let n_time = times.len();
        if slices.len() != n_time {
            return Err(CdiError::InvalidGrid(format!(
                "{} time slices for {} dates",
                slices.len(),
                n_time
            )));
        }
        if let Some((t, bad)) = slices.iter().find_position(|s| s.len() != n_cells) {
            return Err(CdiError::InvalidGrid(format!(
                "time slice {} holds {} cells, expected {}",
                t,
                bad.len(),
                n_cells
            )));
        }

        let mut values = vec![None; n_cells * n_time];
        for (t, slice) in slices.iter().enumerate() {
            for (cell, v) in slice.iter().enumerate() {
                values[cell * n_time + t] = *v;
            }
        }
        Self::new(variable, lat, lon, times, values)
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    pub fn times(&self) -> &[NaiveDate] {
        &self.times
    }

    /// `(n_lat, n_lon, n_time)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.lat.len(), self.lon.len(), self.times.len())
    }

    pub fn n_cells(&self) -> usize {
        self.lat.len() * self.lon.len()
    }

    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Value at `(lat_i, lon_i, t)`.
    ///
    /// # Panics
    /// If any index is outside the grid.
    pub fn value(&self, lat_i: usize, lon_i: usize, t: usize) -> Option<f64> {
        assert!(
            lat_i < self.lat.len() && lon_i < self.lon.len() && t < self.times.len(),
            "index ({lat_i}, {lon_i}, {t}) outside grid {:?}",
            self.shape()
        );
        self.values[(lat_i * self.lon.len() + lon_i) * self.times.len() + t]
    }

    pub fn is_missing(&self, lat_i: usize, lon_i: usize, t: usize) -> bool {
        self.value(lat_i, lon_i, t).is_none()
    }

    /// Value at the given coordinates, if they lie on the grid.
    ///
    /// Returns `None` both for off-grid coordinates and for missing values.
    pub fn value_at(&self, lat: f64, lon: f64, date: NaiveDate) -> Option<f64> {
        let lat_i = axis_position(&self.lat, lat)?;
        let lon_i = axis_position(&self.lon, lon)?;
        let t = self.time_index(date)?;
        self.value(lat_i, lon_i, t)
    }

    pub fn time_index(&self, date: NaiveDate) -> Option<usize> {
        self.times.binary_search(&date).ok()
    }

    /// Time series of one flattened cell.
    pub fn series(&self, cell: usize) -> &[Option<f64>] {
        let n = self.times.len();
        &self.values[cell * n..(cell + 1) * n]
    }

    /// One time step as a row-major `lat × lon` image.
    pub fn time_slice(&self, t: usize) -> Vec<Option<f64>> {
        let n = self.times.len();
        (0..self.n_cells()).map(|cell| self.values[cell * n + t]).collect()
    }

    /// Whether any cell holds data at time step `t`.
    pub fn has_data_at(&self, t: usize) -> bool {
        let n = self.times.len();
        (0..self.n_cells()).any(|cell| self.values[cell * n + t].is_some())
    }

    /// For every time step, whether any cell holds data there.
    pub fn slice_presence(&self) -> Vec<bool> {
        let n = self.times.len();
        let mut present = vec![false; n];
        if n == 0 {
            return present;
        }
        for series in self.values.chunks(n) {
            for (flag, v) in present.iter_mut().zip(series) {
                *flag |= v.is_some();
            }
        }
        present
    }

    /// Indices of time steps where every cell is missing.
    pub fn empty_slices(&self) -> Vec<usize> {
        self.slice_presence()
            .iter()
            .positions(|present| !present)
            .collect()
    }

    /// A borrowed view over the dates in `start..=end`.
    pub fn time_window(&self, start: NaiveDate, end: NaiveDate) -> GridView<'_> {
        let from = self.times.partition_point(|d| *d < start);
        let to = self.times.partition_point(|d| *d <= end).max(from);
        GridView {
            grid: self,
            range: from..to,
        }
    }

    /// New grid keeping only the listed time steps, in the given order.
    pub fn select_times(&self, keep: &[usize]) -> Result<Self, CdiError> {
        let n = self.times.len();
        if let Some(bad) = keep.iter().find(|&&t| t >= n) {
            return Err(CdiError::InvalidGrid(format!(
                "time step {bad} selected from '{}', which has {n}",
                self.variable
            )));
        }
        let times = keep.iter().map(|&t| self.times[t]).collect();
        let values = (0..self.n_cells())
            .flat_map(|cell| keep.iter().map(move |&t| (cell, t)))
            .map(|(cell, t)| self.values[cell * n + t])
            .collect();
        Ok(Self::new(self.variable.clone(), self.lat.clone(), self.lon.clone(), times, values)?
            .with_units_opt(self.units.clone()))
    }

    /// New grid without the time steps that hold no data anywhere.
    pub fn drop_empty_slices(&self) -> Result<Self, CdiError> {
        let keep: Vec<usize> = self.slice_presence().iter().positions(|&p| p).collect();
        self.select_times(&keep)
    }

    /// New grid with `f` applied to every present value. `f` may turn a value
    /// into missing but never the reverse.
    pub fn map_values<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> Option<f64>,
    {
        Self {
            variable: self.variable.clone(),
            units: self.units.clone(),
            lat: self.lat.clone(),
            lon: self.lon.clone(),
            times: self.times.clone(),
            values: self
                .values
                .iter()
                .map(|v| v.and_then(&f).filter(|x| !x.is_nan()))
                .collect(),
        }
    }

    pub fn with_units(self, units: impl Into<String>) -> Self {
        self.with_units_opt(Some(units.into()))
    }

    fn with_units_opt(mut self, units: Option<String>) -> Self {
        self.units = units;
        self
    }

    pub fn renamed(mut self, variable: impl Into<String>) -> Self {
        self.variable = variable.into();
        self
    }

    /// Fails with `ShapeMismatch` unless `other` has the same lat/lon axes.
    pub fn ensure_coregistered(&self, other: &GridDataset) -> Result<(), CdiError> {
        compare_axis("lat", &self.lat, &other.lat, &self.variable, &other.variable)?;
        compare_axis("lon", &self.lon, &other.lon, &self.variable, &other.variable)
    }
}

/// Borrowed view of a grid restricted to a contiguous time range.
#[derive(Debug, Clone)]
pub struct GridView<'a> {
    grid: &'a GridDataset,
    range: Range<usize>,
}

impl<'a> GridView<'a> {
    pub fn times(&self) -> &'a [NaiveDate] {
        &self.grid.times[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Value at `(lat_i, lon_i, t)` with `t` relative to the window start.
    pub fn value(&self, lat_i: usize, lon_i: usize, t: usize) -> Option<f64> {
        assert!(t < self.range.len(), "time index {t} outside window");
        self.grid.value(lat_i, lon_i, self.range.start + t)
    }

    pub fn is_missing(&self, lat_i: usize, lon_i: usize, t: usize) -> bool {
        self.value(lat_i, lon_i, t).is_none()
    }

    /// Copies the window into a standalone grid.
    pub fn to_grid(&self) -> Result<GridDataset, CdiError> {
        let keep: Vec<usize> = self.range.clone().collect();
        self.grid.select_times(&keep)
    }
}

pub(crate) fn mask_value(v: f64, nodata: Option<f64>) -> Option<f64> {
    match nodata {
        _ if v.is_nan() => None,
        Some(nd) if v == nd => None,
        _ => Some(v),
    }
}

fn validate_time_axis(times: &[NaiveDate]) -> Result<(), CdiError> {
    if let Some((a, b)) = times.iter().tuple_windows().find(|(a, b)| a >= b) {
        return Err(CdiError::InvalidTimeAxis(format!(
            "dates must be strictly increasing, found {a} followed by {b}"
        )));
    }
    Ok(())
}

fn axis_position(axis: &[f64], coord: f64) -> Option<usize> {
    axis.iter().position(|c| (c - coord).abs() <= COORD_TOLERANCE)
}

fn compare_axis(
    axis: &'static str,
    a: &[f64],
    b: &[f64],
    a_name: &str,
    b_name: &str,
) -> Result<(), CdiError> {
    if a.len() != b.len() {
        return Err(CdiError::ShapeMismatch {
            axis,
            detail: format!("'{a_name}' has {} values, '{b_name}' has {}", a.len(), b.len()),
        });
    }
    if let Some((i, (x, y))) = a
        .iter()
        .zip(b)
        .find_position(|(x, y)| (*x - *y).abs() > COORD_TOLERANCE)
    {
        return Err(CdiError::ShapeMismatch {
            axis,
            detail: format!("'{a_name}' has {x} at index {i}, '{b_name}' has {y}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn sample() -> GridDataset {
        // 1 lat x 2 lon x 3 times
        GridDataset::from_raw(
            "spi",
            vec![-30.0],
            vec![140.0, 141.0],
            vec![d(2000, 1), d(2000, 2), d(2000, 3)],
            vec![1.0, f64::NAN, 3.0, -9999.0, 5.0, 6.0],
            Some(-9999.0),
        )
        .unwrap()
    }

    #[test]
    fn raw_sentinels_become_missing() {
        let grid = sample();
        assert_eq!(grid.value(0, 0, 0), Some(1.0));
        assert!(grid.is_missing(0, 0, 1));
        assert!(grid.is_missing(0, 1, 0));
        assert_eq!(grid.value_at(-30.0, 141.0, d(2000, 3)), Some(6.0));
        assert_eq!(grid.value_at(-31.0, 141.0, d(2000, 3)), None);
    }

    #[test]
    fn time_major_and_cell_major_agree() {
        let grid = GridDataset::from_time_major(
            "spi",
            vec![-30.0],
            vec![140.0, 141.0],
            vec![d(2000, 1), d(2000, 2), d(2000, 3)],
            vec![
                vec![Some(1.0), None],
                vec![None, Some(5.0)],
                vec![Some(3.0), Some(6.0)],
            ],
        )
        .unwrap();
        assert_eq!(grid, sample());
        assert_eq!(grid.time_slice(2), vec![Some(3.0), Some(6.0)]);
    }

    #[test]
    fn rejects_unordered_time_axis() {
        let err = GridDataset::new("x", vec![0.0], vec![0.0], vec![d(2000, 2), d(2000, 1)], vec![None, None])
            .unwrap_err();
        assert!(matches!(err, CdiError::InvalidTimeAxis(_)));
    }

    #[test]
    fn rejects_wrong_value_count() {
        let err = GridDataset::new("x", vec![0.0], vec![0.0], vec![d(2000, 1)], vec![]).unwrap_err();
        assert!(matches!(err, CdiError::InvalidGrid(_)));
    }

    #[test]
    fn time_window_is_inclusive() {
        let grid = sample();
        let view = grid.time_window(d(2000, 2), d(2000, 3));
        assert_eq!(view.times(), &[d(2000, 2), d(2000, 3)]);
        assert_eq!(view.value(0, 1, 0), Some(5.0));

        let sub = view.to_grid().unwrap();
        assert_eq!(sub.shape(), (1, 2, 2));
        assert_eq!(sub.value(0, 0, 1), Some(3.0));

        assert!(grid.time_window(d(2001, 1), d(2001, 12)).is_empty());
    }

    #[test]
    fn drop_empty_slices_removes_all_missing_dates() {
        let grid = GridDataset::new(
            "x",
            vec![0.0],
            vec![0.0, 1.0],
            vec![d(2000, 1), d(2000, 2)],
            vec![Some(1.0), None, Some(2.0), None],
        )
        .unwrap();
        assert_eq!(grid.empty_slices(), vec![1]);
        let dropped = grid.drop_empty_slices().unwrap();
        assert_eq!(dropped.times(), &[d(2000, 1)]);
    }

    #[test]
    fn coregistration_checks_length_and_values() {
        let a = sample();
        let b = GridDataset::new("b", vec![-30.0], vec![140.0], vec![], vec![]).unwrap();
        assert!(matches!(
            a.ensure_coregistered(&b),
            Err(CdiError::ShapeMismatch { axis: "lon", .. })
        ));

        let c = GridDataset::new("c", vec![-30.5], vec![140.0, 141.0], vec![], vec![]).unwrap();
        assert!(matches!(
            a.ensure_coregistered(&c),
            Err(CdiError::ShapeMismatch { axis: "lat", .. })
        ));

        assert!(a.ensure_coregistered(&a.clone()).is_ok());
    }

    #[test]
    fn select_times_rejects_out_of_range_steps() {
        let grid = sample();
        let picked = grid.select_times(&[2, 0]).unwrap();
        assert_eq!(picked.times(), &[d(2000, 3), d(2000, 1)]);
        assert_eq!(picked.series(0), &[Some(3.0), Some(1.0)]);

        let err = grid.select_times(&[0, 3]).unwrap_err();
        assert!(matches!(err, CdiError::InvalidGrid(_)), "{err}");
    }

    #[test]
    fn slice_presence_per_step() {
        let grid = GridDataset::new(
            "x",
            vec![0.0],
            vec![0.0, 1.0],
            vec![d(2000, 1), d(2000, 2)],
            vec![None, None, Some(2.0), None],
        )
        .unwrap();
        assert!(grid.has_data_at(0));
        assert!(!grid.has_data_at(1));
        assert_eq!(grid.slice_presence(), vec![true, false]);
    }

    #[test]
    fn map_values_never_fills_missing() {
        let grid = sample().with_units("mm");
        let mapped = grid.map_values(|v| if v > 4.0 { None } else { Some(v * 10.0) });

        assert_eq!(mapped.series(0), &[Some(10.0), None, Some(30.0)]);
        // missing stays missing even though f would produce a value
        assert_eq!(mapped.series(1), &[None, None, None]);
        assert_eq!(mapped.units(), Some("mm"));

        let nan = grid.map_values(|_| Some(f64::NAN));
        assert!(nan.values().iter().all(Option::is_none));
    }

    #[test]
    fn renamed_keeps_data() {
        let grid = sample().with_units("mm");
        let renamed = grid.clone().renamed("spi3");
        assert_eq!(renamed.variable(), "spi3");
        assert_eq!(renamed.values(), grid.values());
        assert_eq!(renamed.units(), Some("mm"));
    }
}
